//! Browser implementations of the platform seams, and the page wiring.

mod banner;
mod closure_map;
mod document;
mod scheduler;
mod storage;
mod transport;

pub use banner::BannerErrorDisplay;
pub use document::WebDocument;
pub use scheduler::WindowScheduler;
pub use storage::WebStorage;
pub use transport::FetchTransport;

use crate::{
	collaborators::Binder,
	config::Config,
	document::Document,
	error::Error,
	runtime::{Parts, Runtime},
	scheduler::Scheduler,
	storage::ExternalChange,
};
use futures::FutureExt;
use serde_json::json;
use std::rc::Rc;
use tracing::{error, info, instrument};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{CustomEvent, CustomEventInit, Event, StorageEvent, Window};

pub type WebRuntime = Runtime<WebDocument, FetchTransport, WebStorage, WindowScheduler>;

pub const PAGE_LOADED_EVENT: &str = "impulse:page-loaded";

fn window() -> Result<Window, Error> {
	web_sys::window().ok_or_else(|| Error::Js("no global `window`".to_owned()))
}

/// Builds the runtime for the current page, hooks up cross-page storage changes, history traversal and the unload flush,
/// then starts it: initial forced storage sync, binding, and a [`PAGE_LOADED_EVENT`] on `window`.
///
/// # Errors
///
/// If the page has no window, document or local storage.
#[instrument(skip(config, binder))]
pub fn boot(config: Config, binder: Box<dyn Binder>) -> Result<Rc<WebRuntime>, Error> {
	let window = window()?;
	let document = WebDocument::new(window.clone(), &config)?;
	let errors = BannerErrorDisplay::new(
		window.document().ok_or_else(|| Error::Js("window has no document".to_owned()))?,
		Rc::new(WindowScheduler::new(window.clone())),
		config.error_display_ms,
	);
	let runtime = Runtime::new(
		config,
		Parts {
			document,
			transport: FetchTransport::new(window.clone()),
			storage: WebStorage::local(&window)?,
			scheduler: WindowScheduler::new(window.clone()),
			binder,
			errors: Box::new(errors),
		},
	);

	listen(&window, "storage", {
		let runtime = Rc::clone(&runtime);
		move |event: Event| {
			let event = match event.dyn_into::<StorageEvent>() {
				Ok(event) => event,
				Err(_) => return,
			};
			let local = event.storage_area().map_or(false, |area| runtime.storage().store().is(&area));
			if local {
				runtime.observe_storage_change(&ExternalChange {
					key: event.key(),
					new_value: event.new_value(),
				});
			}
		}
	})?;

	listen(&window, "beforeunload", {
		let runtime = Rc::clone(&runtime);
		move |_: Event| {
			if let Err(error) = runtime.flush_on_unload() {
				error!("Unload flush failed: {}", error);
			}
		}
	})?;

	listen(&window, "popstate", {
		let runtime = Rc::clone(&runtime);
		move |_: Event| {
			let navigating = Rc::clone(&runtime);
			runtime.scheduler().spawn(
				async move {
					let url = navigating.document().url();
					if let Err(error) = navigating.navigate(&url, false).await {
						error!(%url, "History navigation failed: {}", error);
					}
				}
				.boxed_local(),
			);
		}
	})?;

	let started = Rc::clone(&runtime);
	runtime.scheduler().spawn(
		async move {
			started.start().await;
			if let Err(error) = announce(&window) {
				error!("Failed to dispatch {}: {}", PAGE_LOADED_EVENT, error);
			}
		}
		.boxed_local(),
	);
	info!("Impulse runtime installed.");
	Ok(runtime)
}

fn listen(window: &Window, event: &str, handler: impl FnMut(Event) + 'static) -> Result<(), Error> {
	let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
	window.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
	// Page lifetime.
	closure.forget();
	Ok(())
}

fn announce(window: &Window) -> Result<(), Error> {
	let location = window.location();
	let detail = json!({
		"url": location.href()?,
		"route": location.pathname()?,
	});
	let mut init = CustomEventInit::new();
	init.detail(&js_sys::JSON::parse(&detail.to_string())?);
	let event = CustomEvent::new_with_event_init_dict(PAGE_LOADED_EVENT, &init)?;
	window.dispatch_event(&event)?;
	Ok(())
}
