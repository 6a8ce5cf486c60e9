//! Browser console output for the crate's `tracing` records.

use core::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs `tracing-wasm` as the global subscriber. Later calls do nothing.
///
/// Without the `console-log` feature, records go to whatever subscriber the host installs.
pub fn init(max_level: Level) {
	if INITIALIZED.swap(true, Ordering::SeqCst) {
		return;
	}
	#[cfg(feature = "console-log")]
	tracing_wasm::set_as_global_default_with_config(tracing_wasm::WASMLayerConfigBuilder::new().set_max_level(max_level).build());
	#[cfg(not(feature = "console-log"))]
	let _ = max_level;
}
