//! Per-element debounce and throttle gating for action dispatch.

use crate::{error::Error, scheduler::Scheduler};
use core::{cell::RefCell, future::Future, hash::Hash};
use futures::FutureExt;
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, trace};

/// Identifies the element an action was triggered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKey(pub u32);

/// Gating intervals read from an element's `data-action-debounce` / `data-action-throttle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSettings {
	pub debounce_ms: u32,
	pub throttle_ms: u32,
}

impl DispatchSettings {
	/// Missing, negative or non-numeric values mean "off". Like `parseInt`, trailing garbage after the digits is ignored.
	#[must_use]
	pub fn from_attributes(debounce: Option<&str>, throttle: Option<&str>) -> Self {
		Self {
			debounce_ms: debounce.map_or(0, parse_leading_int),
			throttle_ms: throttle.map_or(0, parse_leading_int),
		}
	}
}

fn parse_leading_int(text: &str) -> u32 {
	let text = text.trim_start();
	let digits = text.find(|c: char| !c.is_ascii_digit()).unwrap_or_else(|| text.len());
	text[..digits].parse().unwrap_or(0)
}

/// Debounce timers and last-execution timestamps, keyed by element identity.
///
/// Two actions bound to the same element share one slot. A throttled call is dropped outright, never deferred.
pub struct Dispatcher<K, S: Scheduler> {
	scheduler: Rc<S>,
	tables: Rc<RefCell<Tables<K, S::Handle>>>,
}

struct Tables<K, H> {
	debounce: HashMap<K, H>,
	last_run: HashMap<K, f64>,
}

impl<K, S> Dispatcher<K, S>
where
	K: Hash + Eq + Clone + 'static,
	S: Scheduler + 'static,
{
	pub fn new(scheduler: Rc<S>) -> Self {
		Self {
			scheduler,
			tables: Rc::new(RefCell::new(Tables {
				debounce: HashMap::new(),
				last_run: HashMap::new(),
			})),
		}
	}

	/// Runs `perform` once the element's debounce window settles and its throttle gate is open.
	///
	/// Failures of the returned future are logged, never propagated to the triggering event.
	pub fn dispatch<F, Fut>(&self, key: K, settings: DispatchSettings, perform: F)
	where
		F: FnOnce() -> Fut + 'static,
		Fut: Future<Output = Result<(), Error>> + 'static,
	{
		if settings.debounce_ms == 0 {
			return run(&self.scheduler, &self.tables, key, settings.throttle_ms, perform);
		}

		let mut tables = self.tables.borrow_mut();
		if let Some(pending) = tables.debounce.remove(&key) {
			trace!("Superseding pending debounced call.");
			self.scheduler.clear_timeout(pending);
		}

		let scheduler = Rc::clone(&self.scheduler);
		let task_tables = Rc::clone(&self.tables);
		let task_key = key.clone();
		let handle = self.scheduler.set_timeout(
			settings.debounce_ms,
			Box::new(move || {
				task_tables.borrow_mut().debounce.remove(&task_key);
				run(&scheduler, &task_tables, task_key, settings.throttle_ms, perform);
			}),
		);
		tables.debounce.insert(key, handle);
	}

	/// Whether a debounced call is waiting for `key`.
	pub fn is_pending(&self, key: &K) -> bool {
		self.tables.borrow().debounce.contains_key(key)
	}
}

fn run<K, S, F, Fut>(scheduler: &Rc<S>, tables: &Rc<RefCell<Tables<K, S::Handle>>>, key: K, throttle_ms: u32, perform: F)
where
	K: Hash + Eq,
	S: Scheduler,
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<(), Error>> + 'static,
{
	let now = scheduler.now();
	{
		let mut tables = tables.borrow_mut();
		let last = tables.last_run.get(&key).copied().unwrap_or(0.0);
		if throttle_ms > 0 && now - last < f64::from(throttle_ms) {
			trace!(elapsed = now - last, throttle_ms, "Throttled call dropped.");
			return;
		}
		tables.last_run.insert(key, now);
	}

	let pending = perform();
	scheduler.spawn(
		async move {
			if let Err(error) = pending.await {
				error!("Action failed: {}", error);
			}
		}
		.boxed_local(),
	);
}
