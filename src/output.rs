//! Result types returned by the compilation pipeline.

use serde::{Deserialize, Serialize};

/// A successfully compiled document.
#[derive(Debug, Clone)]
pub struct CompiledPdf {
    /// Raw PDF bytes, ready to send as `application/pdf`.
    pub pdf: Vec<u8>,
    /// What the pipeline did to get there.
    pub stats: CompileStats,
}

/// Summary of one compilation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileStats {
    /// One entry per pass that actually ran, in plan order.
    pub passes: Vec<PassReport>,
    /// Distinct image assets copied into the workspace.
    pub images_staged: usize,
    /// `\includegraphics` targets replaced by a placeholder.
    pub images_missing: usize,
    /// Packages the normaliser had to add.
    pub injected_packages: Vec<String>,
    /// `true` when dangling `\cite{...}` calls were stripped.
    pub citations_removed: bool,
    /// Size of the returned PDF.
    pub pdf_bytes: usize,
    pub total_duration_ms: u64,
}

impl CompileStats {
    /// Passes that failed but were tolerated because a PDF already existed.
    pub fn tolerated_failures(&self) -> usize {
        self.passes.iter().filter(|p| p.tolerated_failure).count()
    }
}

/// Outcome of a single external pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    /// 1-based position in the pass plan.
    pub pass: usize,
    /// Command line as run inside the workspace.
    pub command: String,
    /// Exit code; `None` when the process was killed, timed out or never
    /// started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// The pass failed but a PDF already existed, so the driver kept going.
    pub tolerated_failure: bool,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}
