use core::fmt::Debug;
use futures::future::LocalBoxFuture;

/// The only points where the runtime suspends: timers, one animation frame, and spawned round trips.
///
/// Execution is single-threaded and cooperative, so tasks never interleave with each other.
pub trait Scheduler {
	type Handle: Copy + Debug;

	/// Milliseconds on a monotonic-enough clock.
	fn now(&self) -> f64;

	fn set_timeout(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> Self::Handle;

	/// Cancelling an already fired or unknown handle is a no-op.
	fn clear_timeout(&self, handle: Self::Handle);

	fn next_frame(&self, task: Box<dyn FnOnce()>);

	fn spawn(&self, future: LocalBoxFuture<'static, ()>);
}
