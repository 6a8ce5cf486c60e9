use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&Value)>;

/// Process-wide publish/subscribe keyed by event name.
#[derive(Default)]
pub struct EventBus {
	listeners: RefCell<HashMap<String, Vec<(ListenerId, Listener)>>>,
	next_id: Cell<u64>,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on(&self, event: &str, listener: impl Fn(&Value) + 'static) -> ListenerId {
		let id = ListenerId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		self.listeners.borrow_mut().entry(event.to_owned()).or_default().push((id, Rc::new(listener)));
		id
	}

	/// Returns whether the listener was registered.
	pub fn off(&self, event: &str, id: ListenerId) -> bool {
		let mut listeners = self.listeners.borrow_mut();
		let registered = match listeners.get_mut(event) {
			Some(registered) => registered,
			None => return false,
		};
		let before = registered.len();
		registered.retain(|(listener_id, _)| *listener_id != id);
		before != registered.len()
	}

	/// Calls listeners in registration order. Listeners may (un)subscribe while being called;
	/// such changes take effect from the next emission.
	pub fn emit(&self, event: &str, payload: &Value) {
		let listeners: Vec<Listener> = match self.listeners.borrow().get(event) {
			Some(registered) => registered.iter().map(|(_, listener)| Rc::clone(listener)).collect(),
			None => return,
		};
		trace!(event, count = listeners.len(), "Emitting.");
		for listener in listeners {
			listener(payload);
		}
	}
}
