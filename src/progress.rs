//! Progress-callback trait for per-pass compilation events.
//!
//! Inject an [`Arc<dyn CompileProgressCallback>`] via
//! [`crate::config::RelayConfigBuilder::progress_callback`] to receive events
//! as the driver walks through its pass plan.
//!
//! # Example
//!
//! ```rust
//! use texrelay::{CompileProgressCallback, RelayConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     passes: AtomicUsize,
//! }
//!
//! impl CompileProgressCallback for CountingCallback {
//!     fn on_pass_complete(&self, pass: usize, total: usize, _duration_ms: u64) {
//!         self.passes.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("pass {pass}/{total} done");
//!     }
//! }
//!
//! let config = RelayConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { passes: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the compilation driver as it runs each planned pass.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pass numbers are 1-based.
pub trait CompileProgressCallback: Send + Sync {
    /// Called once after the pass plan is computed, before any pass runs.
    fn on_compile_start(&self, total_passes: usize) {
        let _ = total_passes;
    }

    /// Called just before a pass is launched.
    ///
    /// # Arguments
    /// * `pass`   : 1-based pass number
    /// * `total`  : number of planned passes
    /// * `command`: the command line being run
    fn on_pass_start(&self, pass: usize, total: usize, command: &str) {
        let _ = (pass, total, command);
    }

    /// Called when a pass exits with status zero.
    fn on_pass_complete(&self, pass: usize, total: usize, duration_ms: u64) {
        let _ = (pass, total, duration_ms);
    }

    /// Called when a pass fails (non-zero exit, timeout, or launch failure).
    ///
    /// `tolerated` is `true` when a PDF already exists and the driver keeps
    /// going; `false` means the compilation is about to abort.
    fn on_pass_failed(&self, pass: usize, total: usize, detail: &str, tolerated: bool) {
        let _ = (pass, total, detail, tolerated);
    }

    /// Called once when the driver has a final answer.
    fn on_compile_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CompileProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RelayConfig`].
pub type ProgressCallback = Arc<dyn CompileProgressCallback>;
