//! The tree view the patch engine plans against, and the mutations it emits.

use crate::dispatch::ElementKey;
use core::fmt::Debug;

/// One DOM change. Planners produce these; [`Document::apply`] executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<N> {
	SetAttribute { target: N, name: String, value: String },
	/// Swap `old` for the detached `new` in `old`'s parent.
	ReplaceNode { old: N, new: N },
	/// Parse `html`; replace `target` with its first root element, or set `target`'s inner content if there is none.
	ReplaceWithMarkup { target: N, html: String },
}

/// A form control inside a component, read for state collection.
#[derive(Debug, Clone, PartialEq)]
pub enum FormControl {
	Checkbox { name: Option<String>, id: Option<String>, checked: bool },
	Radio { name: Option<String>, id: Option<String>, value: String, checked: bool },
	Select { name: Option<String>, id: Option<String>, multiple: bool, value: String, selected: Vec<String> },
	/// `<input>` of any other type, or `<textarea>`.
	Text { name: Option<String>, id: Option<String>, value: String },
}

impl FormControl {
	/// The state key: `name`, falling back to `id`. Empty attributes count as missing.
	pub fn key(&self) -> Option<&str> {
		let (name, id) = match self {
			Self::Checkbox { name, id, .. } | Self::Radio { name, id, .. } | Self::Select { name, id, .. } | Self::Text { name, id, .. } => (name, id),
		};
		name.as_deref().filter(|n| !n.is_empty()).or_else(|| id.as_deref().filter(|i| !i.is_empty()))
	}
}

/// An element carrying the scroll marker attribute.
#[derive(Debug, Clone)]
pub struct ScrollContainer<N> {
	pub node: N,
	/// Value of the marker attribute; empty means "use the positional fallback".
	pub marker: String,
}

/// Read access to the live document plus an applier for [`Mutation`]s.
///
/// Implementations must make lookups reflect previously applied mutations.
pub trait Document {
	type Node: Clone + Debug + 'static;

	/// Identity of an element for debounce and throttle bookkeeping. Stable for the element's lifetime.
	fn element_key(&self, node: &Self::Node) -> ElementKey;

	/// The live element whose component id attribute equals `id`.
	fn find_component(&self, id: &str) -> Option<Self::Node>;

	/// Every component id in document order.
	fn component_ids(&self) -> Vec<String>;

	fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;

	fn attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
		self.attributes(node).into_iter().find(|(n, _)| n == name).map(|(_, v)| v)
	}

	fn has_parent(&self, node: &Self::Node) -> bool;

	/// Elements (below `within`, or in the whole document) whose `data-update` starts with `prefix`, with that attribute's value.
	fn find_update_targets(&self, within: Option<&Self::Node>, prefix: &str) -> Vec<(Self::Node, String)>;

	/// Parses `html` detached from the document and returns its first element carrying a component id.
	fn parse_component(&self, html: &str) -> Option<Self::Node>;

	fn form_controls(&self, component: &Self::Node) -> Vec<FormControl>;

	/// The root element's `lang`, if non-empty.
	fn language(&self) -> Option<String>;

	/// Returns the node that now stands where the target was.
	fn apply(&self, mutation: Mutation<Self::Node>) -> Option<Self::Node>;

	/// Text of the dynamic style element, or `None` if it doesn't exist yet.
	fn style_text(&self) -> Option<String>;

	/// Creates the dynamic style element if needed and replaces its text.
	fn set_style_text(&self, css: &str);

	fn scroll_containers(&self) -> Vec<ScrollContainer<Self::Node>>;
	fn scroll_top(&self, node: &Self::Node) -> f64;
	fn set_scroll_top(&self, node: &Self::Node, top: f64);

	fn element_by_id(&self, id: &str) -> Option<Self::Node>;

	/// `None` both for no match and for an invalid selector.
	fn query_within(&self, root: &Self::Node, selector: &str) -> Option<Self::Node>;

	fn is_select(&self, node: &Self::Node) -> bool;
	fn set_selected_index(&self, node: &Self::Node, index: i32);
	fn focus(&self, node: &Self::Node);

	/// Returns `false` if `node` has no text selection API.
	fn set_selection_range(&self, node: &Self::Node, start: u32, end: u32) -> bool;

	/// Current page URL; storage flushes are posted here.
	fn url(&self) -> String;

	fn replace_location(&self, url: &str);
	fn push_history(&self, url: &str);

	/// Installs a freshly navigated page. Returns `false` if the app root was missing on either side.
	fn swap_page(&self, html: &str) -> bool;
}
