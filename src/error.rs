use serde_json::Value;
use thiserror::Error;
use wasm_bindgen::JsValue;

/// Failures of a single round trip or patch.
///
/// None of these corrupt runtime state: each is local to the action that triggered it.
#[derive(Debug, Error)]
pub enum Error {
	/// Network failure or non-2xx status.
	#[error("transport failure ({status:?}): {message}")]
	Transport { status: Option<u16>, message: String },

	/// The reply claimed to be JSON but could not be read as an update payload.
	#[error("malformed response: {0}")]
	MalformedResponse(String),

	/// The server answered with an `error` field.
	#[error("server error: {message}")]
	ServerDeclared { error: Value, message: String },

	/// The new subtree or the live node to patch could not be found.
	#[error("patch target missing: {0}")]
	PatchTargetMissing(String),

	#[error("focus target missing")]
	FocusTargetMissing,

	#[error("storage: {0}")]
	Storage(String),

	#[error("invalid configuration: {0}")]
	Config(#[from] serde_json::Error),

	#[error("JavaScript exception: {0}")]
	Js(String),
}

impl Error {
	pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
		Self::Transport { status, message: message.into() }
	}
}

impl From<JsValue> for Error {
	fn from(value: JsValue) -> Self {
		Self::Js(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
	}
}
