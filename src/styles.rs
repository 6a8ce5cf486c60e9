use crate::document::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static STYLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?style[^>]*>").expect("constant pattern"));

/// Removes every tag starting with `<style` or `</style` and trims.
pub fn strip_style_tags(styles: &str) -> String {
	STYLE_TAG.replace_all(styles, "").trim().to_owned()
}

/// The dynamic style element's next text, or `None` if there's nothing new.
pub fn merged_style_text(existing: Option<&str>, incoming: &str) -> Option<String> {
	let cleaned = strip_style_tags(incoming);
	if cleaned.is_empty() {
		return None;
	}
	let existing = existing.unwrap_or_default();
	if existing.contains(&cleaned) {
		return None;
	}
	Some(format!("{}\n{}", existing, cleaned))
}

pub fn inject_styles<D: Document>(document: &D, styles: &str) {
	if let Some(text) = merged_style_text(document.style_text().as_deref(), styles) {
		trace!(len = text.len(), "Injecting styles.");
		document.set_style_text(&text);
	}
}
