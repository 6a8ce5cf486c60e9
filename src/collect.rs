//! Reads a component's editable state.

use crate::{
	document::{Document, FormControl},
	names,
};
use serde_json::{Map, Value};
use tracing::{instrument, warn};

pub type States = Map<String, Value>;

/// How the live controls are folded into the state map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectRule {
	/// Each control is its own field.
	Fields,
	/// The component models a single logical value spread over checkboxes or radios.
	Group,
}

/// The serialized state attribute as a baseline. Missing or unparsable attributes yield an empty map.
pub fn baseline(attribute: Option<&str>) -> States {
	match attribute.map(serde_json::from_str::<Value>) {
		Some(Ok(Value::Object(states))) => states,
		Some(Ok(other)) => {
			warn!("Ignoring non-object state attribute: {}", other);
			States::new()
		}
		Some(Err(error)) => {
			warn!("Ignoring unparsable state attribute: {}", error);
			States::new()
		}
		None => States::new(),
	}
}

/// Overlays live control values onto `states`.
pub fn overlay(mut states: States, controls: &[FormControl], rule: CollectRule) -> States {
	match rule {
		CollectRule::Fields => {
			for control in controls {
				let key = match control.key() {
					Some(key) => key.to_owned(),
					None => continue,
				};
				match control {
					FormControl::Checkbox { checked, .. } => {
						states.insert(key, Value::Bool(*checked));
					}
					FormControl::Radio { value, checked, .. } => {
						if *checked {
							states.insert(key, Value::String(value.clone()));
						}
					}
					FormControl::Select { multiple: true, selected, .. } => {
						states.insert(key, selected.iter().cloned().map(Value::String).collect());
					}
					FormControl::Select { value, .. } | FormControl::Text { value, .. } => {
						states.insert(key, Value::String(value.clone()));
					}
				}
			}
		}

		CollectRule::Group => {
			let value_key = states.get("name").and_then(Value::as_str).unwrap_or("value").to_owned();
			let radios = controls.iter().filter_map(|control| match control {
				FormControl::Radio { name, value, checked, .. } => Some((name.clone().unwrap_or_default(), value, *checked)),
				_ => None,
			});
			let mut group_name = None;
			for (name, value, checked) in radios {
				let group_name = group_name.get_or_insert(name);
				if checked && !value.is_empty() {
					states.insert(group_name.clone(), Value::String(value.clone()));
				}
			}

			let checkboxes: Vec<_> = controls
				.iter()
				.filter_map(|control| match control {
					FormControl::Checkbox { name, checked, .. } => Some((name.as_deref().unwrap_or_default(), *checked)),
					_ => None,
				})
				.collect();
			if !checkboxes.is_empty() {
				let value = match checkboxes.as_slice() {
					[(_, checked)] => Value::Bool(*checked),
					many => many.iter().filter(|(_, checked)| *checked).map(|(name, _)| Value::String((*name).to_owned())).collect(),
				};
				states.insert(value_key, value);
			}
		}
	}
	states
}

/// Whether a component uses [`CollectRule::Group`].
pub fn rule_for(component_id: &str, class_attribute: Option<&str>, group_class: &str) -> CollectRule {
	let has_class = class_attribute.map_or(false, |classes| classes.split_ascii_whitespace().any(|class| class == group_class));
	if has_class || component_id.contains("checkbox-radio") {
		CollectRule::Group
	} else {
		CollectRule::Fields
	}
}

/// Baseline state attribute overlaid with live controls. Unknown components collect to an empty map.
#[instrument(skip(document))]
pub fn collect<D: Document>(document: &D, component_id: &str, group_class: &str) -> States {
	let component = match document.find_component(component_id) {
		Some(component) => component,
		None => {
			warn!("Component not found while collecting states.");
			return States::new();
		}
	};
	let states = baseline(document.attribute(&component, names::STATES).as_deref());
	let rule = rule_for(component_id, document.attribute(&component, "class").as_deref(), group_class);
	overlay(states, &document.form_controls(&component), rule)
}
