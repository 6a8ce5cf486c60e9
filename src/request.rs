//! Request bodies and headers for the action, event and navigation endpoints.

use crate::{collect::States, names, storage::Snapshot, storage::SyncMetadata, transport::Headers};
use base64::Engine as _;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Body of an action round trip. Built fresh per dispatch and never retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRequest {
	pub id: String,
	pub action: String,
	pub states: States,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	#[serde(rename = "update", skip_serializing_if = "Option::is_none")]
	pub update_target: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub slot: Option<String>,
	#[serde(rename = "_local_storage")]
	pub local_storage: Snapshot,
}

/// Body of an event emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRequest {
	pub emit: String,
	pub payload: Value,
	pub components: Vec<String>,
	#[serde(rename = "_local_storage")]
	pub local_storage: Snapshot,
	/// Caller-supplied top-level fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Body of a page navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationRequest {
	#[serde(rename = "_local_storage")]
	pub local_storage: Snapshot,
	#[serde(rename = "_locale")]
	pub locale: Option<String>,
	#[serde(rename = "_metadata")]
	pub metadata: SyncMetadata,
}

/// Decodes the component's slot attribute. Text that isn't valid base64 UTF-8 is forwarded as is.
pub fn decode_slot(attribute: &str) -> String {
	match base64::engine::general_purpose::STANDARD.decode(attribute.trim()) {
		Ok(bytes) => match String::from_utf8(bytes) {
			Ok(text) => text,
			Err(_) => {
				warn!("Slot is not UTF-8 once decoded; forwarding it encoded.");
				attribute.to_owned()
			}
		},
		Err(error) => {
			warn!("Slot is not valid base64 ({}); forwarding it verbatim.", error);
			attribute.to_owned()
		}
	}
}

fn with_language(mut headers: Headers, language: Option<&str>) -> Headers {
	if let Some(language) = language {
		headers.push((names::HEADER_LANGUAGE.to_owned(), language.to_owned()));
	}
	headers
}

pub fn action_headers<'a>(known_components: impl IntoIterator<Item = &'a str>, language: Option<&str>) -> Headers {
	let components: Vec<&str> = known_components.into_iter().collect();
	with_language(
		vec![
			(names::HEADER_CONTENT_TYPE.to_owned(), names::JSON.to_owned()),
			(names::HEADER_COMPONENTS.to_owned(), components.join(",")),
		],
		language,
	)
}

pub fn event_headers(language: Option<&str>, extra: &[(String, String)]) -> Headers {
	let mut headers = vec![
		(names::HEADER_CONTENT_TYPE.to_owned(), names::JSON.to_owned()),
		(names::HEADER_REQUESTED_WITH.to_owned(), names::XML_HTTP_REQUEST.to_owned()),
	];
	headers.extend(extra.iter().cloned());
	with_language(headers, language)
}

pub fn sync_headers(language: Option<&str>) -> Headers {
	with_language(
		vec![
			(names::HEADER_REQUESTED_WITH.to_owned(), names::XML_HTTP_REQUEST.to_owned()),
			(names::HEADER_CONTENT_TYPE.to_owned(), names::JSON.to_owned()),
			(names::HEADER_STORAGE_SYNC.to_owned(), "1".to_owned()),
			(names::HEADER_CACHE_CONTROL.to_owned(), "no-cache, no-store, must-revalidate".to_owned()),
		],
		language,
	)
}

pub fn navigation_headers(language: Option<&str>) -> Headers {
	with_language(
		vec![
			(names::HEADER_REQUESTED_WITH.to_owned(), names::XML_HTTP_REQUEST.to_owned()),
			(names::HEADER_CONTENT_TYPE.to_owned(), names::JSON.to_owned()),
		],
		language,
	)
}
