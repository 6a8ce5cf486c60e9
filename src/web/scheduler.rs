use super::closure_map::ClosureMap;
use crate::scheduler::Scheduler;
use futures::future::LocalBoxFuture;
use wasm_bindgen::{JsCast, UnwrapThrowExt};
use web_sys::Window;

/// `setTimeout`, `requestAnimationFrame` and `spawn_local` on the page's window.
pub struct WindowScheduler {
	window: Window,
	timers: ClosureMap,
	frames: ClosureMap,
}

impl WindowScheduler {
	pub fn new(window: Window) -> Self {
		Self {
			window,
			timers: ClosureMap::default(),
			frames: ClosureMap::default(),
		}
	}
}

impl Scheduler for WindowScheduler {
	type Handle = i32;

	fn now(&self) -> f64 {
		js_sys::Date::now()
	}

	#[allow(clippy::cast_possible_wrap)]
	fn set_timeout(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> i32 {
		let (closure, slot) = self.timers.wrap(task);
		let handle = self
			.window
			.set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), delay_ms as i32)
			.expect_throw("impulse-dom: `setTimeout` failed.");
		slot.set(handle);
		self.timers.publish(handle, closure);
		handle
	}

	fn clear_timeout(&self, handle: i32) {
		self.window.clear_timeout_with_handle(handle);
		self.timers.retire(handle);
	}

	fn next_frame(&self, task: Box<dyn FnOnce()>) {
		let (closure, slot) = self.frames.wrap(task);
		let handle = self
			.window
			.request_animation_frame(closure.as_ref().unchecked_ref())
			.expect_throw("impulse-dom: `requestAnimationFrame` failed.");
		slot.set(handle);
		self.frames.publish(handle, closure);
	}

	fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
		wasm_bindgen_futures::spawn_local(future);
	}
}
