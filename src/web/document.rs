use crate::{
	config::Config,
	dispatch::ElementKey,
	document::{Document, FormControl, Mutation, ScrollContainer},
	error::Error,
	focus::FocusInfo,
	names,
};
use core::cell::Cell;
use tracing::{error, instrument, trace, warn};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{DomParser, Element, HtmlElement, HtmlInputElement, HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement, Node, NodeList, SupportedType, Window};

/// Head elements a navigated page brings along.
const HEAD_TAGS: [&str; 4] = ["META", "LINK", "TITLE", "SCRIPT"];

/// Expando property carrying an element's [`ElementKey`].
const KEY_PROPERTY: &str = "__impulseKey";

fn elements(list: &NodeList) -> impl Iterator<Item = Element> + '_ {
	(0..list.length()).filter_map(move |index| list.item(index)).filter_map(|node| node.dyn_into::<Element>().ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.is_empty())
}

/// The live page.
pub struct WebDocument {
	window: Window,
	document: web_sys::Document,
	dynamic_style_id: String,
	app_root_id: String,
	next_key: Cell<u32>,
}

impl WebDocument {
	/// # Errors
	///
	/// If the window has no document.
	pub fn new(window: Window, config: &Config) -> Result<Self, Error> {
		let document = window.document().ok_or_else(|| Error::Js("window has no document".to_owned()))?;
		Ok(Self {
			window,
			document,
			dynamic_style_id: config.dynamic_style_id.clone(),
			app_root_id: config.app_root_id.clone(),
			next_key: Cell::new(0),
		})
	}

	pub fn window(&self) -> &Window {
		&self.window
	}

	fn select_all(&self, root: Option<&Element>, selector: &str) -> Vec<Element> {
		let list = match root {
			Some(root) => root.query_selector_all(selector),
			None => self.document.query_selector_all(selector),
		};
		match list {
			Ok(list) => elements(&list).collect(),
			Err(error) => {
				error!(selector, "Invalid selector: {:?}", error);
				Vec::new()
			}
		}
	}

	fn parse_fragment(&self, html: &str) -> Result<Element, Error> {
		let wrapper = self.document.create_element("div")?;
		wrapper.set_inner_html(html.trim());
		Ok(wrapper)
	}

	/// Reads the focused element's id, selection and selected index, for a round trip about to start.
	pub fn capture_focus(&self, update_target: Option<String>) -> FocusInfo {
		let mut focus = FocusInfo::for_target(update_target);
		let active = match self.document.active_element() {
			Some(active) => active,
			None => return focus,
		};
		focus.active_element_id = non_empty(Some(active.id()));
		if let Some(name) = non_empty(active.get_attribute("name")) {
			focus.active_element_selector = Some(format!("{}[name=\"{}\"]", active.tag_name().to_ascii_lowercase(), name.replace('"', "\\\"")));
		}
		if let Some(input) = active.dyn_ref::<HtmlInputElement>() {
			focus.selection_start = input.selection_start().ok().flatten();
			focus.selection_end = input.selection_end().ok().flatten();
		} else if let Some(textarea) = active.dyn_ref::<HtmlTextAreaElement>() {
			focus.selection_start = textarea.selection_start().ok().flatten();
			focus.selection_end = textarea.selection_end().ok().flatten();
		} else if let Some(select) = active.dyn_ref::<HtmlSelectElement>() {
			focus.selected_index = Some(select.selected_index());
		}
		focus
	}

	fn replace(old: &Element, new: &Node) -> bool {
		match old.parent_node() {
			Some(parent) => match parent.replace_child(new, old) {
				Ok(_) => true,
				Err(error) => {
					error!("Failed to replace node: {:?}", error);
					false
				}
			},
			None => {
				warn!("Node to replace is detached.");
				false
			}
		}
	}

	fn merge_head(&self, incoming: &web_sys::Document) -> Result<(), Error> {
		let (head, incoming_head) = match (self.document.head(), incoming.head()) {
			(Some(head), Some(incoming_head)) => (head, incoming_head),
			_ => return Ok(()),
		};
		let arriving: Vec<Element> = elements(&incoming_head.child_nodes())
			.filter(|element| HEAD_TAGS.contains(&element.tag_name().as_str()))
			.collect();

		if let Some(body) = self.document.body() {
			let strays: Vec<Element> = elements(&body.child_nodes()).collect();
			for stray in strays {
				let duplicate = HEAD_TAGS.contains(&stray.tag_name().as_str())
					&& arriving.iter().any(|element| element.is_equal_node(Some(&*stray)));
				if duplicate {
					stray.remove();
				}
			}
		}

		let current: Vec<Element> = elements(&head.child_nodes()).collect();
		for current in current {
			if !current.has_attribute(names::PERSISTENT) {
				current.remove();
			}
		}
		for element in arriving {
			let adopted: Node = if element.tag_name() == "SCRIPT" {
				// Parsed scripts are inert; a freshly created one executes.
				let script = self.document.create_element("script")?;
				let attributes = element.attributes();
				for index in 0..attributes.length() {
					if let Some(attribute) = attributes.item(index) {
						script.set_attribute(&attribute.name(), &attribute.value())?;
					}
				}
				script.set_text_content(element.text_content().as_deref());
				script.into()
			} else {
				self.document.import_node_with_deep(&element, true)?
			};
			head.append_child(&adopted)?;
		}
		Ok(())
	}
}

impl Document for WebDocument {
	type Node = Element;

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn element_key(&self, node: &Element) -> ElementKey {
		let property = JsValue::from_str(KEY_PROPERTY);
		if let Some(key) = js_sys::Reflect::get(node, &property).ok().and_then(|key| key.as_f64()) {
			return ElementKey(key as u32);
		}
		let key = self.next_key.get();
		self.next_key.set(key.wrapping_add(1));
		if let Err(error) = js_sys::Reflect::set(node, &property, &JsValue::from(key)) {
			error!("Failed to stamp element key: {:?}", error);
		}
		ElementKey(key)
	}

	fn find_component(&self, id: &str) -> Option<Element> {
		self.select_all(None, &format!("[{}]", names::COMPONENT_ID))
			.into_iter()
			.find(|element| element.get_attribute(names::COMPONENT_ID).as_deref() == Some(id))
	}

	fn component_ids(&self) -> Vec<String> {
		self.select_all(None, &format!("[{}]", names::COMPONENT_ID))
			.into_iter()
			.filter_map(|element| element.get_attribute(names::COMPONENT_ID))
			.collect()
	}

	fn attributes(&self, node: &Element) -> Vec<(String, String)> {
		let attributes = node.attributes();
		(0..attributes.length())
			.filter_map(|index| attributes.item(index))
			.map(|attribute| (attribute.name(), attribute.value()))
			.collect()
	}

	fn attribute(&self, node: &Element, name: &str) -> Option<String> {
		node.get_attribute(name)
	}

	fn has_parent(&self, node: &Element) -> bool {
		node.parent_node().is_some()
	}

	fn find_update_targets(&self, within: Option<&Element>, prefix: &str) -> Vec<(Element, String)> {
		self.select_all(within, &format!("[{}]", names::UPDATE))
			.into_iter()
			.filter_map(|element| {
				let update = element.get_attribute(names::UPDATE)?;
				if update.starts_with(prefix) {
					Some((element, update))
				} else {
					None
				}
			})
			.collect()
	}

	fn parse_component(&self, html: &str) -> Option<Element> {
		let wrapper = match self.parse_fragment(html) {
			Ok(wrapper) => wrapper,
			Err(error) => {
				error!("Failed to parse component markup: {}", error);
				return None;
			}
		};
		wrapper.query_selector(&format!("[{}]", names::COMPONENT_ID)).ok().flatten()
	}

	fn form_controls(&self, component: &Element) -> Vec<FormControl> {
		self.select_all(Some(component), "input, select, textarea")
			.into_iter()
			.filter_map(|element| {
				let name = element.get_attribute("name");
				let id = non_empty(Some(element.id()));
				if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
					Some(match input.type_().as_str() {
						"checkbox" => FormControl::Checkbox { name, id, checked: input.checked() },
						"radio" => FormControl::Radio {
							name,
							id,
							value: input.value(),
							checked: input.checked(),
						},
						_ => FormControl::Text { name, id, value: input.value() },
					})
				} else if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
					let options = select.selected_options();
					let selected = (0..options.length())
						.filter_map(|index| options.item(index))
						.filter_map(|option| option.dyn_into::<HtmlOptionElement>().ok())
						.map(|option| option.value())
						.collect();
					Some(FormControl::Select {
						name,
						id,
						multiple: select.multiple(),
						value: select.value(),
						selected,
					})
				} else {
					element
						.dyn_ref::<HtmlTextAreaElement>()
						.map(|textarea| FormControl::Text { name, id, value: textarea.value() })
				}
			})
			.collect()
	}

	fn language(&self) -> Option<String> {
		non_empty(self.document.document_element()?.get_attribute("lang"))
	}

	#[instrument(skip(self, mutation))]
	fn apply(&self, mutation: Mutation<Element>) -> Option<Element> {
		match mutation {
			Mutation::SetAttribute { target, name, value } => {
				if let Err(error) = target.set_attribute(&name, &value) {
					error!(%name, "Failed to set attribute: {:?}", error);
				}
				Some(target)
			}
			Mutation::ReplaceNode { old, new } => {
				if Self::replace(&old, &new) {
					Some(new)
				} else {
					None
				}
			}
			Mutation::ReplaceWithMarkup { target, html } => {
				let wrapper = match self.parse_fragment(&html) {
					Ok(wrapper) => wrapper,
					Err(error) => {
						error!("Failed to parse fragment: {}", error);
						return None;
					}
				};
				match wrapper.first_element_child() {
					Some(first) => {
						if Self::replace(&target, &first) {
							Some(first)
						} else {
							None
						}
					}
					None => {
						target.set_inner_html(&html);
						Some(target)
					}
				}
			}
		}
	}

	fn style_text(&self) -> Option<String> {
		self.document.get_element_by_id(&self.dynamic_style_id).map(|style| style.text_content().unwrap_or_default())
	}

	fn set_style_text(&self, css: &str) {
		let style = match self.document.get_element_by_id(&self.dynamic_style_id) {
			Some(style) => style,
			None => {
				let style = match self.document.create_element("style") {
					Ok(style) => style,
					Err(error) => return error!("Failed to create style element: {:?}", error),
				};
				style.set_id(&self.dynamic_style_id);
				let parent: Option<HtmlElement> = self.document.head().map(Into::into).or_else(|| self.document.body());
				match parent.map(|parent| parent.append_child(&style)) {
					Some(Ok(_)) => {}
					Some(Err(error)) => return error!("Failed to insert style element: {:?}", error),
					None => return warn!("No head or body to hold styles."),
				}
				style
			}
		};
		style.set_text_content(Some(css));
	}

	fn scroll_containers(&self) -> Vec<ScrollContainer<Element>> {
		self.select_all(None, &format!("[{}]", names::SAVE_SCROLL))
			.into_iter()
			.map(|node| {
				let marker = node.get_attribute(names::SAVE_SCROLL).unwrap_or_default();
				ScrollContainer { node, marker }
			})
			.collect()
	}

	fn scroll_top(&self, node: &Element) -> f64 {
		f64::from(node.scroll_top())
	}

	#[allow(clippy::cast_possible_truncation)]
	fn set_scroll_top(&self, node: &Element, top: f64) {
		node.set_scroll_top(top.round() as i32);
	}

	fn element_by_id(&self, id: &str) -> Option<Element> {
		self.document.get_element_by_id(id)
	}

	fn query_within(&self, root: &Element, selector: &str) -> Option<Element> {
		root.query_selector(selector).ok().flatten()
	}

	fn is_select(&self, node: &Element) -> bool {
		node.dyn_ref::<HtmlSelectElement>().is_some()
	}

	fn set_selected_index(&self, node: &Element, index: i32) {
		if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			select.set_selected_index(index);
		}
	}

	fn focus(&self, node: &Element) {
		if let Some(Err(error)) = node.dyn_ref::<HtmlElement>().map(HtmlElement::focus) {
			warn!("Failed to focus: {:?}", error);
		}
	}

	fn set_selection_range(&self, node: &Element, start: u32, end: u32) -> bool {
		let result = if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.set_selection_range(start, end)
		} else if let Some(textarea) = node.dyn_ref::<HtmlTextAreaElement>() {
			textarea.set_selection_range(start, end)
		} else {
			return false;
		};
		// Inputs like checkboxes throw here.
		result.is_ok()
	}

	fn url(&self) -> String {
		self.window.location().href().unwrap_or_default()
	}

	fn replace_location(&self, url: &str) {
		if let Err(error) = self.window.location().replace(url) {
			error!(%url, "Redirect failed: {:?}", error);
		}
	}

	fn push_history(&self, url: &str) {
		let pushed = self.window.history().and_then(|history| history.push_state_with_url(&JsValue::NULL, "", Some(url)));
		if let Err(error) = pushed {
			error!(%url, "History push failed: {:?}", error);
		}
	}

	#[instrument(skip(self, html), fields(len = html.len()))]
	fn swap_page(&self, html: &str) -> bool {
		let incoming = match DomParser::new().and_then(|parser| parser.parse_from_string(html, SupportedType::TextHtml)) {
			Ok(incoming) => incoming,
			Err(error) => {
				error!("Failed to parse page: {:?}", error);
				return false;
			}
		};
		if let Err(error) = self.merge_head(&incoming) {
			error!("Failed to merge head: {}", error);
		}

		match (incoming.get_element_by_id(&self.app_root_id), self.document.get_element_by_id(&self.app_root_id)) {
			(Some(next), Some(current)) => {
				let installed = self
					.document
					.import_node_with_deep(&next, true)
					.map_err(Error::from)
					.map(|next| Self::replace(&current, &next));
				trace!(?installed, "Swapped app root.");
				matches!(installed, Ok(true))
			}
			_ => false,
		}
	}
}
