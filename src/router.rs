//! Page navigation replies.

use crate::transport::HttpResponse;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
	/// Leave for this location.
	Redirect(String),
	/// The server vetoed the navigation.
	Blocked,
	HttpError(u16),
	/// JSON that is neither a redirect nor a veto. Nothing changes.
	Unrecognized,
	/// A new page to install.
	Page(String),
}

pub fn classify_navigation(response: &HttpResponse) -> NavigationOutcome {
	if response.declares_json() {
		let json: Value = match serde_json::from_str(&response.body) {
			Ok(json) => json,
			Err(error) => {
				warn!("Navigation reply declared JSON but didn't parse: {}", error);
				return if response.is_success() { NavigationOutcome::Unrecognized } else { NavigationOutcome::Blocked };
			}
		};
		return match json.get("redirect") {
			Some(Value::String(location)) if !location.is_empty() => NavigationOutcome::Redirect(location.clone()),
			Some(Value::Bool(false)) => NavigationOutcome::Blocked,
			_ if !response.is_success() => NavigationOutcome::Blocked,
			_ => {
				warn!("Unrecognized navigation JSON: {}", json);
				NavigationOutcome::Unrecognized
			}
		};
	}

	if !response.is_success() {
		return NavigationOutcome::HttpError(response.status);
	}
	NavigationOutcome::Page(response.body.clone())
}
