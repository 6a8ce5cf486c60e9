//! Interfaces of the layers the runtime calls into but doesn't implement.

/// The event-binding layer. Must be idempotent: already bound elements are skipped.
pub trait Binder {
	fn bind_all(&self);
}

/// For hosts that bind events some other way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBinder;

impl Binder for NoopBinder {
	fn bind_all(&self) {}
}

/// Shows server-declared errors to the user.
pub trait ErrorDisplay {
	/// Identical messages that are still visible are not shown twice.
	fn show(&self, message: &str);
}
