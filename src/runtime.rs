//! The runtime context: every piece of formerly global state, plus the round-trip operations.

use crate::{
	collaborators::{Binder, ErrorDisplay},
	collect,
	config::Config,
	dispatch::{DispatchSettings, Dispatcher, ElementKey},
	document::{Document, Mutation},
	error::Error,
	events::EventBus,
	focus::{self, FocusInfo},
	names,
	patch::{self, PatchPlan},
	request::{self, ActionRequest, EventRequest, NavigationRequest},
	response::{self, Interpretation, PatchStrategy, SideChannel, UpdateResponse},
	router::{self, NavigationOutcome},
	scheduler::Scheduler,
	storage::{ExternalChange, StorageAdapter, StorageSync},
	styles,
	transport::{HttpResponse, Transport},
};
use core::cell::RefCell;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, instrument, warn};

/// The pluggable pieces a [`Runtime`] is assembled from.
pub struct Parts<D, T, S, C> {
	pub document: D,
	pub transport: T,
	pub storage: S,
	pub scheduler: C,
	pub binder: Box<dyn Binder>,
	pub errors: Box<dyn ErrorDisplay>,
}

/// Options of [`Runtime::emit`].
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
	/// Components to notify. Defaults to every component in the document.
	pub components: Option<Vec<String>>,
	pub headers: Vec<(String, String)>,
	/// Extra top-level fields of the request body.
	pub extra: Map<String, Value>,
}

pub struct Runtime<D: Document, T, S, C: Scheduler> {
	config: Config,
	document: Rc<D>,
	transport: T,
	storage: StorageSync<S>,
	scheduler: Rc<C>,
	dispatcher: Dispatcher<ElementKey, C>,
	events: EventBus,
	/// Annotates outgoing requests only; patching always looks components up in the document.
	components: RefCell<Vec<String>>,
	binder: Box<dyn Binder>,
	errors: Box<dyn ErrorDisplay>,
	/// For deferred work scheduled from `&self` methods.
	this: Weak<Self>,
}

impl<D, T, S, C> Runtime<D, T, S, C>
where
	D: Document + 'static,
	T: Transport + 'static,
	S: StorageAdapter + 'static,
	C: Scheduler + 'static,
{
	pub fn new(config: Config, parts: Parts<D, T, S, C>) -> Rc<Self> {
		let Parts {
			document,
			transport,
			storage,
			scheduler,
			binder,
			errors,
		} = parts;
		let scheduler = Rc::new(scheduler);
		let runtime = Rc::new_cyclic(|this| Self {
			config,
			document: Rc::new(document),
			transport,
			storage: StorageSync::new(storage, scheduler.now()),
			dispatcher: Dispatcher::new(Rc::clone(&scheduler)),
			scheduler,
			events: EventBus::new(),
			components: RefCell::new(Vec::new()),
			binder,
			errors,
			this: Weak::clone(this),
		});
		runtime.refresh_components();
		runtime
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn document(&self) -> &Rc<D> {
		&self.document
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn storage(&self) -> &StorageSync<S> {
		&self.storage
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn scheduler(&self) -> &Rc<C> {
		&self.scheduler
	}

	/// Component ids sent along with each action.
	pub fn known_components(&self) -> Vec<String> {
		self.components.borrow().clone()
	}

	/// Recomputes the known component ids by scanning the document.
	pub fn refresh_components(&self) {
		let mut ids = self.document.component_ids();
		let mut seen = hashbrown::HashSet::new();
		ids.retain(|id| seen.insert(id.clone()));
		debug!(count = ids.len(), "Component registry refreshed.");
		*self.components.borrow_mut() = ids;
	}

	/// Page-load initialisation: registry scan, forced storage flush, then binding.
	#[instrument(skip(self))]
	pub async fn start(&self) {
		self.refresh_components();
		if let Err(error) = self.flush_storage(true).await {
			warn!("Initial storage sync failed: {}", error);
		} else {
			info!("localStorage synchronised on initial load.");
		}
		self.binder.bind_all();
	}

	/// Gates `perform` by `element`'s debounce and throttle attributes.
	pub fn dispatch<F, Fut>(&self, element: &D::Node, perform: F)
	where
		F: FnOnce() -> Fut + 'static,
		Fut: core::future::Future<Output = Result<(), Error>> + 'static,
	{
		let settings = DispatchSettings::from_attributes(
			self.document.attribute(element, names::ACTION_DEBOUNCE).as_deref(),
			self.document.attribute(element, names::ACTION_THROTTLE).as_deref(),
		);
		self.dispatcher.dispatch(self.document.element_key(element), settings, perform);
	}

	/// [`Runtime::dispatch`]es an action round trip triggered on `element`.
	pub fn dispatch_action(self: &Rc<Self>, element: &D::Node, component_id: &str, action: &str, value: Option<String>, focus: FocusInfo) {
		let runtime = Rc::clone(self);
		let component_id = component_id.to_owned();
		let action = action.to_owned();
		self.dispatch(element, move || async move { runtime.update_component(&component_id, &action, value, focus).await });
	}

	/// Runs `action` on the component and merges the reply into the document.
	///
	/// # Errors
	///
	/// Transport failures, and errors declared by the server (after showing them).
	#[instrument(skip(self, value, focus))]
	pub async fn update_component(&self, component_id: &str, action: &str, value: Option<String>, focus: FocusInfo) -> Result<(), Error> {
		let component = self.document.find_component(component_id);
		let slot = component
			.as_ref()
			.and_then(|component| self.document.attribute(component, names::SLOT))
			.filter(|slot| !slot.is_empty())
			.map(|slot| request::decode_slot(&slot));

		let body = ActionRequest {
			id: component_id.to_owned(),
			action: action.to_owned(),
			states: collect::collect(&*self.document, component_id, &self.config.checkbox_group_class),
			value,
			update_target: focus.update_target.clone(),
			slot,
			local_storage: self.storage.snapshot(),
		};
		let headers = {
			let components = self.components.borrow();
			request::action_headers(components.iter().map(String::as_str), self.document.language().as_deref())
		};

		let response = self.post_json(&self.config.endpoint, headers, &body).await?;
		if !response.is_success() {
			return Err(Error::transport(Some(response.status), "action request rejected"));
		}
		let interpretation = response::interpret(&response, component_id, focus.update_target.as_deref());
		self.apply(interpretation, Some(&focus))
	}

	/// Publishes `event` locally, then to the server, and merges the reply. Returns the raw reply JSON.
	///
	/// # Errors
	///
	/// Transport failures.
	#[instrument(skip(self, payload, options))]
	pub async fn emit(&self, event: &str, payload: Value, options: EmitOptions) -> Result<Value, Error> {
		self.events.emit(event, &payload);

		let body = EventRequest {
			emit: event.to_owned(),
			payload,
			components: options.components.unwrap_or_else(|| self.document.component_ids()),
			local_storage: self.storage.snapshot(),
			extra: options.extra,
		};
		let headers = request::event_headers(self.document.language().as_deref(), &options.headers);
		let response = self.post_json(&self.config.endpoint, headers, &body).await?;

		let result: Value = match serde_json::from_str(&response.body) {
			Ok(result) => result,
			Err(error) => {
				warn!("Event reply is not JSON: {}", error);
				return Ok(Value::Object(Map::new()));
			}
		};
		match serde_json::from_value::<UpdateResponse>(result.clone()) {
			Ok(parsed) => {
				let mut interpretation = response::interpret_payload(&parsed, "", None);
				interpretation.patches.retain(|(component, _)| !component.is_empty());
				interpretation.side.events.clear();
				interpretation.side.error = None;
				let rebind = !interpretation.patches.is_empty();
				self.apply(interpretation, None)?;
				if rebind {
					self.binder.bind_all();
				}
			}
			Err(error) => warn!("Event reply has an unexpected shape: {}", error),
		}
		Ok(result)
	}

	/// Applies a classified reply. Missing patch targets are skipped; only a server-declared error fails.
	fn apply(&self, interpretation: Interpretation, focus: Option<&FocusInfo>) -> Result<(), Error> {
		let scroll = focus::capture_scroll(&*self.document);
		let Interpretation { patches, side } = interpretation;

		for (component_id, strategy) in patches {
			let plans = match strategy {
				PatchStrategy::FragmentMap { fragments, states } => vec![Ok(patch::plan_fragments(&*self.document, &component_id, &fragments, states.as_ref()))],
				PatchStrategy::TargetedPatch { html, states } => match focus.and_then(|focus| focus.update_target.as_deref()) {
					Some(target) => vec![patch::plan_targeted(&*self.document, &component_id, target, &html, states.as_ref())],
					None => vec![Err(Error::PatchTargetMissing("targeted reply without update target".to_owned()))],
				},
				PatchStrategy::FullReplace(updates) => updates
					.iter()
					.map(|update| patch::plan_full_replace(&*self.document, &update.component, &update.html))
					.collect(),
			};
			for plan in plans {
				match plan {
					Ok(plan) => self.execute(plan, focus),
					Err(error) => warn!(component = %component_id, "Skipping patch: {}", error),
				}
			}
		}

		focus::restore_scroll(&self.document, &self.scheduler, scroll, &self.config.scroll_retry);
		self.apply_side_channel(side)
	}

	fn execute(&self, plan: PatchPlan<D::Node>, focus: Option<&FocusInfo>) {
		let PatchPlan { mutations, rescan, rebind, restore_focus } = plan;
		let mut focus_root = None;
		for mutation in mutations {
			let structural = !matches!(mutation, Mutation::SetAttribute { .. });
			let result = self.document.apply(mutation);
			if structural {
				focus_root = result.or(focus_root);
			}
		}
		if rescan {
			self.refresh_components();
		}
		if rebind {
			self.binder.bind_all();
		}
		if let (true, Some(root), Some(focus)) = (restore_focus, focus_root, focus) {
			focus::restore_focus(&self.document, &self.scheduler, root, focus.clone());
		}
	}

	fn apply_side_channel(&self, side: SideChannel) -> Result<(), Error> {
		if let Some(styles) = &side.styles {
			styles::inject_styles(&*self.document, styles);
		}
		for (event, payload) in &side.events {
			self.events.emit(event, payload);
		}
		let mut stored = false;
		for (key, value) in &side.local_storage {
			match self.storage.apply_server_value(key, value.as_ref()) {
				Ok(()) => stored = true,
				Err(error) => warn!(%key, "Error storing value: {}", error),
			}
		}
		if stored {
			self.schedule_flush();
		}
		if let Some(declared) = side.error {
			self.errors.show(&declared.message);
			return Err(Error::ServerDeclared {
				error: declared.error,
				message: declared.message,
			});
		}
		Ok(())
	}

	/// Sets a storage item and schedules a flush.
	///
	/// # Errors
	///
	/// If the store refused the write.
	pub fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
		self.storage.set(key, value)?;
		self.schedule_flush();
		Ok(())
	}

	pub fn remove_item(&self, key: &str) {
		self.storage.remove(key);
		self.schedule_flush();
	}

	pub fn clear_storage(&self) {
		self.storage.clear();
		self.schedule_flush();
	}

	/// Feeds the native cross-page storage signal.
	pub fn observe_storage_change(&self, change: &ExternalChange) {
		self.storage.observe_external(change);
		self.schedule_flush();
	}

	/// Flushes on the next tick. Same-tick mutations coalesce through the content hash.
	pub fn schedule_flush(&self) {
		let runtime = match self.this.upgrade() {
			Some(runtime) => runtime,
			None => return,
		};
		let scheduler = Rc::clone(&self.scheduler);
		self.scheduler.set_timeout(
			0,
			Box::new(move || {
				scheduler.spawn(
					async move {
						if let Err(error) = runtime.flush_storage(false).await {
							error!("Error while synchronising localStorage: {}", error);
						}
					}
					.boxed_local(),
				)
			}),
		);
	}

	/// Posts the storage snapshot to the current page, unless unchanged and not `force`d.
	///
	/// # Errors
	///
	/// Transport failures and non-2xx replies. The next unforced flush is retried in that case.
	#[instrument(skip(self))]
	pub async fn flush_storage(&self, force: bool) -> Result<(), Error> {
		let payload = match self.storage.prepare_flush(force, self.scheduler.now()) {
			Some(payload) => payload,
			None => return Ok(()),
		};
		let headers = request::sync_headers(self.document.language().as_deref());
		let response = match self.post_json(&self.document.url(), headers, &payload).await {
			Ok(response) => response,
			Err(error) => {
				self.storage.invalidate();
				return Err(error);
			}
		};
		if !response.is_success() {
			self.storage.invalidate();
			return Err(Error::transport(Some(response.status), "synchronisation failed"));
		}
		self.storage.acknowledge(&payload);
		Ok(())
	}

	/// Blocking flush for page unload, always including the deleted keys.
	///
	/// # Errors
	///
	/// Transport failures.
	#[instrument(skip(self))]
	pub fn flush_on_unload(&self) -> Result<(), Error> {
		let payload = self.storage.prepare_unload(self.scheduler.now());
		let body = serde_json::to_string(&payload).map_err(|error| Error::Storage(error.to_string()))?;
		let response = self
			.transport
			.post_blocking(&self.document.url(), request::sync_headers(self.document.language().as_deref()), body)?;
		if response.is_success() {
			self.storage.acknowledge(&payload);
		}
		Ok(())
	}

	/// History push with an opportunistic flush ahead of it.
	pub fn push_state(self: &Rc<Self>, url: &str) {
		let runtime = Rc::clone(self);
		self.scheduler.spawn(
			async move {
				if let Err(error) = runtime.flush_storage(false).await {
					warn!("Flush before navigation failed: {}", error);
				}
			}
			.boxed_local(),
		);
		self.document.push_history(url);
	}

	/// Fetches `url` as the next page and installs it.
	///
	/// # Errors
	///
	/// Transport failures.
	#[instrument(skip(self))]
	pub async fn navigate(&self, url: &str, push: bool) -> Result<NavigationOutcome, Error> {
		if let Err(error) = self.flush_storage(false).await {
			warn!("Flush before navigation failed: {}", error);
		}

		let language = self.document.language();
		let body = NavigationRequest {
			local_storage: self.storage.snapshot(),
			locale: language.clone(),
			metadata: self.storage.navigation_metadata(self.scheduler.now()),
		};
		let response = self.post_json(url, request::navigation_headers(language.as_deref()), &body).await?;
		let outcome = router::classify_navigation(&response);
		match &outcome {
			NavigationOutcome::Redirect(location) => self.document.replace_location(location),
			NavigationOutcome::Page(html) => {
				if self.document.swap_page(html) {
					self.refresh_components();
					self.binder.bind_all();
					if push {
						self.document.push_history(url);
					}
				} else {
					warn!("Unable to find the app root; page not installed.");
				}
			}
			NavigationOutcome::Blocked | NavigationOutcome::HttpError(_) | NavigationOutcome::Unrecognized => debug!(?outcome, "Navigation aborted."),
		}
		Ok(outcome)
	}

	async fn post_json(&self, url: &str, headers: Vec<(String, String)>, body: &impl Serialize) -> Result<HttpResponse, Error> {
		let body = serde_json::to_string(body).map_err(|error| Error::MalformedResponse(format!("unserializable request: {}", error)))?;
		if cfg!(feature = "dangerous-logging") {
			tracing::trace!(%url, %body, "Posting.");
		}
		self.transport.post(url, headers, body).await.map_err(|error| {
			error!(%url, "Request failed: {}", error);
			error
		})
	}
}
