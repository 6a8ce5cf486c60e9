//! Classification of server replies into a patch strategy plus side-channel payloads.

use crate::transport::HttpResponse;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{instrument, trace, warn};

/// Wire shape of an update reply. Every field is optional.
///
/// A field of the wrong type is dropped on its own, as is a malformed entry of `updates` or `events`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateResponse {
	#[serde(deserialize_with = "lenient_list")]
	pub updates: Option<Vec<ComponentUpdate>>,
	#[serde(deserialize_with = "lenient")]
	pub fragments: Option<Map<String, Value>>,
	#[serde(deserialize_with = "lenient")]
	pub result: Option<String>,
	pub states: Option<Value>,
	#[serde(deserialize_with = "lenient")]
	pub styles: Option<String>,
	#[serde(deserialize_with = "lenient_list")]
	pub events: Option<Vec<(String, Value)>>,
	#[serde(rename = "localStorage", deserialize_with = "lenient")]
	pub local_storage: Option<Map<String, Value>>,
	pub error: Option<Value>,
	#[serde(deserialize_with = "lenient")]
	pub message: Option<String>,
}

fn lenient<'de, D: Deserializer<'de>, T: DeserializeOwned>(deserializer: D) -> Result<Option<T>, D::Error> {
	Ok(from_value_or_warn(Value::deserialize(deserializer)?))
}

fn lenient_list<'de, D: Deserializer<'de>, T: DeserializeOwned>(deserializer: D) -> Result<Option<Vec<T>>, D::Error> {
	Ok(match Value::deserialize(deserializer)? {
		Value::Array(entries) => Some(entries.into_iter().filter_map(from_value_or_warn).collect()),
		other => from_value_or_warn::<Vec<T>>(other),
	})
}

fn from_value_or_warn<T: DeserializeOwned>(value: Value) -> Option<T> {
	if value.is_null() {
		return None;
	}
	serde_json::from_value(value).map_err(|error| warn!("Skipping malformed reply entry: {}", error)).ok()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentUpdate {
	pub component: String,
	pub html: String,
}

/// How a reply (or one nested update) changes the DOM.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchStrategy {
	/// `"group@state"` keys with replacement markup. `states` rewrites the component's state attribute.
	FragmentMap { fragments: Vec<(String, String)>, states: Option<Value> },
	/// Replace the requested update target inside the component.
	TargetedPatch { html: String, states: Option<Value> },
	/// Whole-component replacements, in order.
	FullReplace(Vec<ComponentUpdate>),
}

/// Payloads processed the same way whatever the strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideChannel {
	pub styles: Option<String>,
	pub events: Vec<(String, Value)>,
	/// `None` values delete.
	pub local_storage: Vec<(String, Option<Value>)>,
	pub error: Option<DeclaredError>,
}

impl SideChannel {
	fn absorb(&mut self, response: &UpdateResponse) {
		if let Some(styles) = &response.styles {
			match &mut self.styles {
				Some(existing) => {
					existing.push('\n');
					existing.push_str(styles);
				}
				None => self.styles = Some(styles.clone()),
			}
		}
		self.events.extend(response.events.iter().flatten().cloned());
		if let Some(local_storage) = &response.local_storage {
			self.local_storage.extend(local_storage.iter().map(|(key, value)| {
				let value = if value.is_null() { None } else { Some(value.clone()) };
				(key.clone(), value)
			}));
		}
		if let Some(error) = &response.error {
			if !is_falsy(error) && self.error.is_none() {
				self.error = Some(DeclaredError {
					error: error.clone(),
					message: response.message.clone().unwrap_or_else(|| match error {
						Value::String(text) => text.clone(),
						other => other.to_string(),
					}),
				});
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredError {
	pub error: Value,
	pub message: String,
}

/// A classified reply. `patches` pairs each strategy with the component it applies to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpretation {
	pub patches: Vec<(String, PatchStrategy)>,
	pub side: SideChannel,
}

fn is_falsy(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::Bool(flag) => !flag,
		Value::String(text) => text.is_empty(),
		Value::Number(number) => number.as_f64() == Some(0.0),
		_ => false,
	}
}

/// Classifies a reply to an action on `component_id`.
///
/// Non-JSON replies are taken as plain markup for the requesting component.
/// A JSON reply that fails to parse is logged and interpreted as empty.
#[instrument(skip(response), fields(status = response.status, len = response.body.len()))]
pub fn interpret(response: &HttpResponse, component_id: &str, update_target: Option<&str>) -> Interpretation {
	if !response.looks_like_json() {
		trace!("Plain markup reply.");
		return Interpretation {
			patches: vec![(
				component_id.to_owned(),
				PatchStrategy::FullReplace(vec![ComponentUpdate {
					component: component_id.to_owned(),
					html: response.body.clone(),
				}]),
			)],
			side: SideChannel::default(),
		};
	}

	match serde_json::from_str::<UpdateResponse>(&response.body) {
		Ok(parsed) => interpret_payload(&parsed, component_id, update_target),
		Err(error) => {
			warn!("Failed to parse response or malformed data: {}", error);
			Interpretation::default()
		}
	}
}

/// Classifies an already parsed payload: fragments first, then a targeted result, else whole-component updates.
pub fn interpret_payload(payload: &UpdateResponse, component_id: &str, update_target: Option<&str>) -> Interpretation {
	let mut interpretation = Interpretation::default();
	interpretation.side.absorb(payload);

	if let Some(strategy) = classify_nested(payload, update_target) {
		interpretation.patches.push((component_id.to_owned(), strategy));
		return interpretation;
	}

	for update in payload.updates.iter().flatten() {
		match nested_payload(&update.html) {
			Some(nested) => {
				interpretation.side.absorb(&nested);
				match classify_nested(&nested, update_target) {
					Some(strategy) => interpretation.patches.push((update.component.clone(), strategy)),
					None => warn!(component = %update.component, "Nested JSON update without fragments or result; skipping."),
				}
			}
			None => interpretation
				.patches
				.push((update.component.clone(), PatchStrategy::FullReplace(vec![update.clone()]))),
		}
	}
	interpretation
}

fn classify_nested(payload: &UpdateResponse, update_target: Option<&str>) -> Option<PatchStrategy> {
	if let Some(fragments) = &payload.fragments {
		return Some(PatchStrategy::FragmentMap {
			fragments: fragments
				.iter()
				.map(|(key, html)| (key.clone(), html.as_str().map_or_else(|| html.to_string(), str::to_owned)))
				.collect(),
			states: payload.states.clone(),
		});
	}
	match (&payload.result, update_target) {
		(Some(result), Some(_)) => Some(PatchStrategy::TargetedPatch {
			html: result.clone(),
			states: payload.states.clone(),
		}),
		_ => None,
	}
}

/// Update markup may itself be a JSON object carrying fragments or a targeted result.
fn nested_payload(html: &str) -> Option<UpdateResponse> {
	let trimmed = html.trim();
	if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
		return None;
	}
	serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn json_response(body: Value) -> HttpResponse {
		HttpResponse {
			status: 200,
			content_type: Some("application/json".to_owned()),
			body: body.to_string(),
		}
	}

	#[test]
	fn fragments_take_precedence() {
		let interpretation = interpret(
			&json_response(json!({
				"fragments": {"list@empty": "<li>No items</li>"},
				"result": "<p>ignored</p>",
				"updates": [{"component": "c1", "html": "<div data-impulse-id=\"c1\"></div>"}],
			})),
			"c1",
			Some("list@empty"),
		);
		assert_eq!(
			interpretation.patches,
			vec![(
				"c1".to_owned(),
				PatchStrategy::FragmentMap {
					fragments: vec![("list@empty".to_owned(), "<li>No items</li>".to_owned())],
					states: None,
				}
			)]
		);
	}

	#[test]
	fn result_only_targets_when_requested() {
		let body = json!({"result": "<span>3</span>", "states": {"count": 3}});
		let targeted = interpret(&json_response(body.clone()), "counter", Some("count"));
		assert_eq!(
			targeted.patches,
			vec![(
				"counter".to_owned(),
				PatchStrategy::TargetedPatch {
					html: "<span>3</span>".to_owned(),
					states: Some(json!({"count": 3})),
				}
			)]
		);

		let untargeted = interpret(&json_response(body), "counter", None);
		assert!(untargeted.patches.is_empty());
	}

	#[test]
	fn updates_become_full_replacements() {
		let interpretation = interpret(
			&json_response(json!({
				"updates": [
					{"component": "a", "html": "<div data-impulse-id=\"a\">A</div>"},
					{"component": "b", "html": "<div data-impulse-id=\"b\">B</div>"},
				],
			})),
			"a",
			None,
		);
		let components: Vec<_> = interpretation.patches.iter().map(|(component, _)| component.as_str()).collect();
		assert_eq!(components, vec!["a", "b"]);
		assert!(interpretation.patches.iter().all(|(_, strategy)| matches!(strategy, PatchStrategy::FullReplace(_))));
	}

	#[test]
	fn nested_fragment_update() {
		let nested = json!({
			"fragments": {"rows@loaded": "<tr></tr>"},
			"states": {"page": 2},
			"styles": ".rows{}",
		});
		let interpretation = interpret(
			&json_response(json!({"updates": [{"component": "table", "html": nested.to_string()}]})),
			"table",
			None,
		);
		assert_eq!(interpretation.side.styles.as_deref(), Some(".rows{}"));
		assert!(matches!(
			&interpretation.patches[..],
			[(component, PatchStrategy::FragmentMap { states: Some(_), .. })] if component == "table"
		));
	}

	#[test]
	fn side_channels() {
		let interpretation = interpret(
			&json_response(json!({
				"styles": ".a{}",
				"events": [["saved", {"id": 1}], ["closed", null]],
				"localStorage": {"theme": "dark", "session": null},
				"error": true,
				"message": "Nope",
			})),
			"c",
			None,
		);
		let side = interpretation.side;
		assert_eq!(side.styles.as_deref(), Some(".a{}"));
		assert_eq!(side.events, vec![("saved".to_owned(), json!({"id": 1})), ("closed".to_owned(), Value::Null)]);
		assert_eq!(
			side.local_storage,
			vec![("session".to_owned(), None), ("theme".to_owned(), Some(json!("dark")))]
		);
		assert_eq!(side.error.map(|error| error.message), Some("Nope".to_owned()));
	}

	#[test]
	fn false_error_is_not_an_error() {
		let interpretation = interpret(&json_response(json!({"error": false})), "c", None);
		assert!(interpretation.side.error.is_none());
	}

	#[test]
	fn plain_markup_replaces_requester() {
		let response = HttpResponse {
			status: 200,
			content_type: Some("text/html".to_owned()),
			body: "<div data-impulse-id=\"c\">x</div>".to_owned(),
		};
		let interpretation = interpret(&response, "c", None);
		assert!(matches!(&interpretation.patches[..], [(component, PatchStrategy::FullReplace(updates))] if component == "c" && updates.len() == 1));
	}

	#[test]
	fn malformed_entries_are_skipped_individually() {
		let interpretation = interpret(
			&json_response(json!({
				"updates": [{"component": "a", "html": null}, {"component": "b", "html": "<p data-impulse-id=\"b\"></p>"}],
				"events": [["orphan"], ["saved", {"id": 4}]],
				"styles": 12,
				"error": true,
				"message": "Quota exceeded",
			})),
			"a",
			None,
		);
		assert_eq!(interpretation.patches.len(), 1);
		assert_eq!(interpretation.patches[0].0, "b");
		assert_eq!(interpretation.side.events, vec![("saved".to_owned(), json!({"id": 4}))]);
		assert_eq!(interpretation.side.styles, None);
		assert_eq!(interpretation.side.error.map(|error| error.message), Some("Quota exceeded".to_owned()));
	}

	#[test]
	fn malformed_json_is_empty() {
		let response = HttpResponse {
			status: 200,
			content_type: None,
			body: "{ definitely not json }".to_owned(),
		};
		assert_eq!(interpret(&response, "c", None), Interpretation::default());
	}
}
