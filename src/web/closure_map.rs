use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;
use wasm_bindgen::closure::Closure;

#[derive(Default)]
struct Bookkeeping {
	/// The handle whose callback is executing right now, if any.
	running: Cell<Option<i32>>,
	spent: RefCell<Vec<i32>>,
}

/// Keeps one-shot JavaScript callbacks alive until the browser has called or cancelled them.
///
/// A closure may not be dropped while it runs, so fired and cancelled entries are only
/// destroyed by the next [`ClosureMap::sweep`] that happens outside of them.
#[derive(Default)]
pub(crate) struct ClosureMap {
	closures: RefCell<HashMap<i32, Closure<dyn FnMut()>>>,
	bookkeeping: Rc<Bookkeeping>,
}

impl ClosureMap {
	/// Wraps `task` for a browser callback API. Store the resulting handle in the returned cell before the callback can fire.
	pub(crate) fn wrap(&self, task: Box<dyn FnOnce()>) -> (Closure<dyn FnMut()>, Rc<Cell<i32>>) {
		self.sweep();
		let handle = Rc::new(Cell::new(0));
		let bookkeeping = Rc::clone(&self.bookkeeping);
		let own_handle = Rc::clone(&handle);
		let mut task = Some(task);
		let closure = Closure::wrap(Box::new(move || {
			bookkeeping.running.set(Some(own_handle.get()));
			if let Some(task) = task.take() {
				task();
			}
			bookkeeping.running.set(None);
			bookkeeping.spent.borrow_mut().push(own_handle.get());
		}) as Box<dyn FnMut()>);
		(closure, handle)
	}

	pub(crate) fn publish(&self, handle: i32, closure: Closure<dyn FnMut()>) {
		self.closures.borrow_mut().insert(handle, closure);
		trace!(handle, "Published closure.");
	}

	/// Forgets a cancelled callback.
	pub(crate) fn retire(&self, handle: i32) {
		if self.bookkeeping.running.get() == Some(handle) {
			self.bookkeeping.spent.borrow_mut().push(handle);
		} else if self.closures.borrow_mut().remove(&handle).is_some() {
			trace!(handle, "Destroyed closure.");
		}
	}

	fn sweep(&self) {
		let running = self.bookkeeping.running.get();
		let mut spent = self.bookkeeping.spent.borrow_mut();
		let mut closures = self.closures.borrow_mut();
		spent.retain(|handle| {
			if Some(*handle) == running {
				return true;
			}
			closures.remove(handle);
			false
		});
	}
}
