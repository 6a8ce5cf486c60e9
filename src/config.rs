//! Runtime configuration.
//!
//! Every field has a default matching what the server side expects, so an empty
//! JSON object (or [`Config::default`]) is a complete configuration.

use crate::error::Error;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Path of the action and event endpoint.
	pub endpoint: String,
	/// How long an error banner stays visible.
	pub error_display_ms: u32,
	/// Scroll offsets are re-applied on this schedule after each patch.
	pub scroll_retry: RetryPolicy,
	/// Components carrying this class use the grouped checkbox/radio state rule.
	pub checkbox_group_class: String,
	/// `id` of the `<style>` element that accumulates server-sent styles.
	pub dynamic_style_id: String,
	/// `id` of the element swapped on page navigation.
	pub app_root_id: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			endpoint: "/impulse.php".to_owned(),
			error_display_ms: 6000,
			scroll_retry: RetryPolicy::default(),
			checkbox_group_class: "ui-checkbox-radio".to_owned(),
			dynamic_style_id: "impulse-dynamic-styles".to_owned(),
			app_root_id: "app".to_owned(),
		}
	}
}

impl Config {
	/// Parses a (possibly partial) JSON configuration.
	///
	/// # Errors
	///
	/// Iff `text` is not a JSON object matching [`Config`]'s fields.
	pub fn from_json(text: &str) -> Result<Self, Error> {
		Ok(serde_json::from_str(text)?)
	}
}

/// Bounded re-application schedule for scroll offsets.
///
/// Layout reflow after a DOM swap can reset offsets a few frames late, so each
/// saved offset is written once per entry in `delays_ms`, and once more after
/// `corrective_delay_ms` if it drifted further than `tolerance_px`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	pub delays_ms: Vec<u32>,
	pub corrective_delay_ms: u32,
	pub tolerance_px: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			delays_ms: vec![0, 10, 50],
			corrective_delay_ms: 10,
			tolerance_px: 5.0,
		}
	}
}
