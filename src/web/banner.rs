use super::scheduler::WindowScheduler;
use crate::{collaborators::ErrorDisplay, error::Error, scheduler::Scheduler};
use std::rc::Rc;
use tracing::error;
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{Document, Element, HtmlElement};

const CONTAINER_ID: &str = "impulse-error-container";
const FADE_MS: u32 = 400;

const CONTAINER_STYLE: &[(&str, &str)] = &[
	("position", "fixed"),
	("top", "1rem"),
	("left", "50%"),
	("transform", "translateX(-50%)"),
	("z-index", "9999"),
	("pointer-events", "none"),
	("width", "425px"),
];

const BANNER_STYLE: &[(&str, &str)] = &[
	("background", "#e11d48"),
	("color", "#fff"),
	("padding", "12px"),
	("font-family", "sans-serif"),
	("border-radius", "6px"),
	("box-shadow", "0 2px 12px #0003"),
	("opacity", "1"),
	("min-width", "280px"),
	("pointer-events", "auto"),
	("transition", "opacity 0.4s, transform 0.4s"),
	("margin-top", "6px"),
	("display", "flex"),
	("align-items", "center"),
	("font-size", "0.9rem"),
];

const CLOSE_STYLE: &[(&str, &str)] = &[
	("margin-left", "24px"),
	("background", "transparent"),
	("border", "none"),
	("color", "#fff"),
	("font-size", "22px"),
	("cursor", "pointer"),
];

fn styled(document: &Document, tag: &str, style: &[(&str, &str)]) -> Result<HtmlElement, Error> {
	let element: HtmlElement = document.create_element(tag)?.unchecked_into();
	let declaration = element.style();
	for (property, value) in style {
		declaration.set_property(property, value)?;
	}
	Ok(element)
}

fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stacked red banners at the top of the page that fade out on their own.
pub struct BannerErrorDisplay {
	document: Document,
	scheduler: Rc<WindowScheduler>,
	display_ms: u32,
}

impl BannerErrorDisplay {
	pub fn new(document: Document, scheduler: Rc<WindowScheduler>, display_ms: u32) -> Self {
		Self { document, scheduler, display_ms }
	}

	fn container(&self) -> Result<Element, Error> {
		if let Some(container) = self.document.get_element_by_id(CONTAINER_ID) {
			return Ok(container);
		}
		let container = styled(&self.document, "div", CONTAINER_STYLE)?;
		container.set_id(CONTAINER_ID);
		self.document
			.body()
			.ok_or_else(|| Error::Js("document has no body".to_owned()))?
			.append_child(&container)?;
		Ok(container.into())
	}

	fn try_show(&self, message: &str) -> Result<(), Error> {
		let container = self.container()?;
		let children = container.children();
		let already_shown = (0..children.length())
			.filter_map(|index| children.item(index))
			.any(|banner| collapse_whitespace(&banner.text_content().unwrap_or_default()).contains(message));
		if already_shown {
			return Ok(());
		}

		let banner = styled(&self.document, "div", BANNER_STYLE)?;
		let text = self.document.create_element("span")?;
		text.set_text_content(Some(message));
		banner.append_child(&text)?;

		let close = styled(&self.document, "button", CLOSE_STYLE)?;
		close.set_attribute("aria-label", "Close")?;
		close.set_text_content(Some("\u{d7}"));
		let on_close = {
			let banner = banner.clone();
			let scheduler = Rc::clone(&self.scheduler);
			Closure::once_into_js(move || dismiss(&banner, &scheduler))
		};
		close.add_event_listener_with_callback("click", on_close.unchecked_ref())?;
		banner.append_child(&close)?;
		container.append_child(&banner)?;

		let scheduler = Rc::clone(&self.scheduler);
		self.scheduler.set_timeout(self.display_ms, Box::new(move || dismiss(&banner, &scheduler)));
		Ok(())
	}
}

fn dismiss(banner: &HtmlElement, scheduler: &WindowScheduler) {
	let style = banner.style();
	if style.set_property("opacity", "0").and(style.set_property("transform", "translateY(-60px)")).is_err() {
		error!("Failed to fade out error banner.");
	}
	let banner = banner.clone();
	scheduler.set_timeout(FADE_MS, Box::new(move || banner.remove()));
}

impl ErrorDisplay for BannerErrorDisplay {
	fn show(&self, message: &str) {
		if let Err(error) = self.try_show(message) {
			error!("Unable to display error {:?}: {}", message, error);
		}
	}
}
