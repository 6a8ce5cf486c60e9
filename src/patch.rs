//! Patch planning: each strategy is turned into [`Mutation`]s against a [`Document`] without touching it.

use crate::{
	document::{Document, Mutation},
	error::Error,
	names,
};
use serde_json::Value;
use tracing::{instrument, trace};

/// Mutations for one strategy, plus what has to happen after they ran.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPlan<N> {
	pub mutations: Vec<Mutation<N>>,
	/// Recompute the component registry by scanning the document.
	pub rescan: bool,
	/// Re-run the binding layer.
	pub rebind: bool,
	/// Restore focus inside the node produced by the last structural mutation.
	pub restore_focus: bool,
}

impl<N> PatchPlan<N> {
	fn new() -> Self {
		Self {
			mutations: Vec::new(),
			rescan: false,
			rebind: false,
			restore_focus: false,
		}
	}
}

/// Splits `"group@state"`. A key without `@` has an empty state.
fn split_key(key: &str) -> (&str, &str) {
	let mut parts = key.split('@');
	let group = parts.next().unwrap_or_default();
	(group, parts.next().unwrap_or_default())
}

/// Replaces every element whose `data-update` is `group@state` for a fragment keyed `group@state`.
///
/// Elements of the same group in another state are left alone.
#[instrument(skip(document, fragments, states))]
pub fn plan_fragments<D: Document>(document: &D, component_id: &str, fragments: &[(String, String)], states: Option<&Value>) -> PatchPlan<D::Node> {
	let mut plan = PatchPlan::new();
	for (key, html) in fragments {
		let (group, state) = split_key(key);
		for (target, update) in document.find_update_targets(None, &format!("{}@", group)) {
			let (_, target_state) = split_key(&update);
			if target_state.is_empty() || target_state != state {
				continue;
			}
			trace!(key = %key, "Fragment matched.");
			plan.mutations.push(Mutation::ReplaceWithMarkup { target, html: html.clone() });
		}
	}
	if let Some(states) = states {
		if let Some(component) = document.find_component(component_id) {
			plan.mutations.push(Mutation::SetAttribute {
				target: component,
				name: names::STATES.to_owned(),
				value: states.to_string(),
			});
		}
	}
	plan.rebind = true;
	plan
}

/// Replaces the single `data-update` element named by `update_target` inside the component.
///
/// Listeners of the rest of the component stay valid, so the binding layer is not re-run.
///
/// # Errors
///
/// [`Error::PatchTargetMissing`] if the component or the target inside it is gone.
#[instrument(skip(document, html, states))]
pub fn plan_targeted<D: Document>(
	document: &D,
	component_id: &str,
	update_target: &str,
	html: &str,
	states: Option<&Value>,
) -> Result<PatchPlan<D::Node>, Error> {
	let component = document
		.find_component(component_id)
		.ok_or_else(|| Error::PatchTargetMissing(format!("component {:?}", component_id)))?;
	let target = document
		.find_update_targets(Some(&component), update_target)
		.into_iter()
		.find(|(_, update)| update == update_target)
		.map(|(target, _)| target)
		.ok_or_else(|| Error::PatchTargetMissing(format!("update target {:?}", update_target)))?;

	let mut plan = PatchPlan::new();
	plan.mutations.push(Mutation::ReplaceWithMarkup { target, html: html.to_owned() });
	if let Some(states) = states {
		plan.mutations.push(Mutation::SetAttribute {
			target: component,
			name: names::STATES.to_owned(),
			value: states.to_string(),
		});
	}
	plan.restore_focus = true;
	Ok(plan)
}

/// Attributes to write onto the new component node so it keeps what the old one carried.
///
/// Classes are unioned (old first). `style` and `title`, every unreserved `data-*` and every `aria-*`
/// attribute are copied only where the new node doesn't define them.
pub fn merge_attributes(old: &[(String, String)], new: &[(String, String)]) -> Vec<(String, String)> {
	let defines = |name: &str| new.iter().any(|(n, _)| n == name);
	let mut writes = Vec::new();

	let old_classes = old.iter().find(|(name, _)| name == "class").map_or("", |(_, value)| value.as_str());
	let new_classes = new.iter().find(|(name, _)| name == "class").map_or("", |(_, value)| value.as_str());
	if !old_classes.trim().is_empty() {
		let mut merged: Vec<&str> = Vec::new();
		for class in old_classes.split_ascii_whitespace().chain(new_classes.split_ascii_whitespace()) {
			if !merged.contains(&class) {
				merged.push(class);
			}
		}
		writes.push(("class".to_owned(), merged.join(" ")));
	}

	for (name, value) in old {
		let preserved = names::PRESERVED_ATTRIBUTES.contains(&name.as_str()) && !value.is_empty();
		let passed_through = (name.starts_with("data-") && !names::RESERVED_DATA_ATTRIBUTES.contains(&name.as_str())) || name.starts_with("aria-");
		if (preserved || passed_through) && !defines(name) {
			writes.push((name.clone(), value.clone()));
		}
	}
	writes
}

/// Swaps the live component for `html`'s component root after merging attributes.
///
/// # Errors
///
/// [`Error::PatchTargetMissing`] if `html` has no component root, or the live node is missing or detached.
/// Nothing is planned in that case.
#[instrument(skip(document, html))]
pub fn plan_full_replace<D: Document>(document: &D, component_id: &str, html: &str) -> Result<PatchPlan<D::Node>, Error> {
	let new = document
		.parse_component(html)
		.ok_or_else(|| Error::PatchTargetMissing(format!("no component root in markup for {:?}", component_id)))?;
	let old = document
		.find_component(component_id)
		.filter(|old| document.has_parent(old))
		.ok_or_else(|| Error::PatchTargetMissing(format!("live component {:?}", component_id)))?;

	let mut plan = PatchPlan::new();
	for (name, value) in merge_attributes(&document.attributes(&old), &document.attributes(&new)) {
		plan.mutations.push(Mutation::SetAttribute { target: new.clone(), name, value });
	}
	plan.mutations.push(Mutation::ReplaceNode { old, new });
	plan.rescan = true;
	plan.rebind = true;
	plan.restore_focus = true;
	Ok(plan)
}
