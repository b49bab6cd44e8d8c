//! Compilation driver: turn a normalised document into PDF bytes.
//!
//! The driver is a small state machine:
//!
//! ```text
//! Init ──▶ StageAssets ──▶ WriteSource ──▶ RunPass(0) ─▶ … ─▶ RunPass(n-1) ──▶ Finalize
//!  │                                          │                                   │
//!  └──────────────── Cleanup (always) ◀───────┴── Fatal ◀─────────────────────────┘
//! ```
//!
//! After each pass the outcome is judged by [`judge_pass`]. A failed pass is
//! only fatal when no PDF exists yet; if one does (typically bibtex
//! complaining about a style detail) the driver takes the
//! [`PassVerdict::ToleratedFailure`] transition and keeps going, so an
//! artifact that was already produced is never thrown away.
//!
//! The workspace is a [`TempDir`]: cleanup is explicit on every normal exit
//! path (errors are logged, never returned) and `Drop` covers panics.

use crate::error::RelayError;
use crate::output::{CompileStats, CompiledPdf, PassReport};
use crate::pipeline::assets::AssetResolver;
use crate::pipeline::normalize::NormalizedDocument;
use crate::pipeline::plan::{PassPlan, LOG_FILE, PDF_FILE, SOURCE_FILE};
use crate::pipeline::runner::{ProcessOutput, ProcessRunner};
use crate::progress::{CompileProgressCallback, NoopProgressCallback};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Everything the driver needs besides the document itself.
pub struct DriverEnv<'a> {
    pub plan: PassPlan,
    pub assets: &'a dyn AssetResolver,
    pub runner: &'a dyn ProcessRunner,
    /// Parent directory for the workspace; `None` uses the system temp dir.
    pub workspace_root: Option<&'a Path>,
    pub pass_timeout: Duration,
    pub progress: Option<&'a dyn CompileProgressCallback>,
}

/// States of the driver between `Init` and `Cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    StageAssets,
    WriteSource,
    RunPass(usize),
    Finalize,
}

/// How the driver reacts to a finished pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassVerdict {
    /// Exit status zero; move on.
    Clean,
    /// The pass failed but the PDF is already on disk; move on.
    ToleratedFailure,
    /// The pass failed and there is nothing to salvage; abort.
    Fatal,
}

/// Decide what a pass outcome means for the pipeline.
///
/// Only PDF existence matters, not which tool failed: a broken compile pass
/// after a good one is tolerated just like a grumpy bibtex run.
pub fn judge_pass(succeeded: bool, pdf_exists: bool) -> PassVerdict {
    match (succeeded, pdf_exists) {
        (true, _) => PassVerdict::Clean,
        (false, true) => PassVerdict::ToleratedFailure,
        (false, false) => PassVerdict::Fatal,
    }
}

/// Compile `doc` and return the PDF, or a failure with the compiler log.
///
/// The workspace is removed before this returns, whatever the outcome.
pub async fn compile(doc: &NormalizedDocument, env: &DriverEnv<'_>) -> Result<CompiledPdf, RelayError> {
    let noop = NoopProgressCallback;
    let progress: &dyn CompileProgressCallback = match env.progress {
        Some(cb) => cb,
        None => &noop,
    };

    // ── Init ─────────────────────────────────────────────────────────────
    let workspace = create_workspace(env.workspace_root)?;
    debug!("Workspace: {}", workspace.path().display());

    let mut run = Run {
        dir: workspace.path().to_path_buf(),
        doc,
        env,
        progress,
        stats: CompileStats {
            images_missing: doc.missing_images.len(),
            injected_packages: doc.injected_packages.clone(),
            citations_removed: doc.citations_removed,
            ..Default::default()
        },
        pdf: None,
    };
    let result = run.drive().await;
    progress.on_compile_complete(result.is_ok());

    // ── Cleanup ──────────────────────────────────────────────────────────
    cleanup(workspace);
    result
}

fn create_workspace(root: Option<&Path>) -> Result<TempDir, RelayError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("texrelay-");
    match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(|source| RelayError::WorkspaceInit { source })
}

/// Best-effort removal; failures are logged and swallowed.
fn cleanup(workspace: TempDir) {
    let path = workspace.path().to_path_buf();
    match workspace.close() {
        Ok(()) => debug!("Removed workspace {}", path.display()),
        Err(e) => warn!("Failed to clean up workspace {}: {}", path.display(), e),
    }
}

/// Mutable state of one pass through the state machine.
struct Run<'r, 'a> {
    dir: PathBuf,
    doc: &'r NormalizedDocument,
    env: &'r DriverEnv<'a>,
    progress: &'r dyn CompileProgressCallback,
    stats: CompileStats,
    pdf: Option<Vec<u8>>,
}

impl Run<'_, '_> {
    async fn drive(&mut self) -> Result<CompiledPdf, RelayError> {
        let start = Instant::now();
        self.progress.on_compile_start(self.env.plan.len());

        let mut stage = Stage::StageAssets;
        loop {
            stage = match stage {
                Stage::StageAssets => {
                    self.stage_assets().await?;
                    Stage::WriteSource
                }
                Stage::WriteSource => {
                    self.write_source().await?;
                    Stage::RunPass(0)
                }
                Stage::RunPass(i) if i < self.env.plan.len() => {
                    self.run_pass(i).await?;
                    Stage::RunPass(i + 1)
                }
                Stage::RunPass(_) => Stage::Finalize,
                Stage::Finalize => {
                    self.finalize().await?;
                    break;
                }
            };
        }

        let pdf = self.pdf.take().unwrap_or_default();
        self.stats.pdf_bytes = pdf.len();
        self.stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Compiled {} bytes in {} pass(es), {}ms",
            self.stats.pdf_bytes,
            self.stats.passes.len(),
            self.stats.total_duration_ms
        );
        Ok(CompiledPdf {
            pdf,
            stats: std::mem::take(&mut self.stats),
        })
    }

    // ── StageAssets ──────────────────────────────────────────────────────

    async fn stage_assets(&mut self) -> Result<(), RelayError> {
        let doc = self.doc;
        let mut staged: HashSet<&str> = HashSet::new();
        for name in &doc.image_files {
            if staged.contains(name.as_str()) || doc.missing_images.contains(name) {
                continue;
            }
            self.env
                .assets
                .stage_asset(name, &self.dir)
                .await
                .map_err(|source| RelayError::StageAsset {
                    name: name.clone(),
                    source,
                })?;
            staged.insert(name);
        }
        self.stats.images_staged = staged.len();
        Ok(())
    }

    // ── WriteSource ──────────────────────────────────────────────────────

    async fn write_source(&self) -> Result<(), RelayError> {
        let path = self.dir.join(SOURCE_FILE);
        tokio::fs::write(&path, self.doc.source.as_bytes())
            .await
            .map_err(|source| RelayError::WriteSource { path, source })
    }

    // ── RunPass(i) ───────────────────────────────────────────────────────

    async fn run_pass(&mut self, index: usize) -> Result<(), RelayError> {
        let total = self.env.plan.len();
        let pass = index + 1;
        let Some(invocation) = self.env.plan.get(index) else {
            return Err(RelayError::Internal(format!("pass {pass} is not in the plan")));
        };
        let command = invocation.command_line();
        info!("Running compilation pass {}/{}: {}", pass, total, command);
        self.progress.on_pass_start(pass, total, &command);

        let started = Instant::now();
        let (outcome, synthetic) = match self
            .env
            .runner
            .run(invocation, &self.dir, self.env.pass_timeout)
            .await
        {
            Ok(out) if out.timed_out => {
                let note = format!(
                    "[texrelay] pass {pass} ('{command}') timed out after {}s and was killed",
                    self.env.pass_timeout.as_secs()
                );
                (out, Some(note))
            }
            Ok(out) => (out, None),
            Err(e) => {
                let note = format!("[texrelay] pass {pass} ('{command}') could not be run: {e}");
                (ProcessOutput::default(), Some(note))
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let pdf_exists = self.pdf_on_disk().await;
        let verdict = judge_pass(outcome.success(), pdf_exists);
        self.stats.passes.push(PassReport {
            pass,
            command: command.clone(),
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            tolerated_failure: verdict == PassVerdict::ToleratedFailure,
            duration_ms,
        });

        match verdict {
            PassVerdict::Clean => {
                self.progress.on_pass_complete(pass, total, duration_ms);
                Ok(())
            }
            PassVerdict::ToleratedFailure => {
                warn!(
                    "Pass {}/{} ('{}') failed with {}; PDF already exists, continuing",
                    pass,
                    total,
                    command,
                    describe(&outcome, synthetic.as_deref())
                );
                self.progress
                    .on_pass_failed(pass, total, &describe(&outcome, synthetic.as_deref()), true);
                Ok(())
            }
            PassVerdict::Fatal => {
                let log = self.read_log(synthetic.as_deref()).await;
                error!(
                    "Pass {}/{} ('{}') failed with {}",
                    pass,
                    total,
                    command,
                    describe(&outcome, synthetic.as_deref())
                );
                if let Some(ref text) = log {
                    error!("Compilation log:\n{}", text);
                }
                self.progress
                    .on_pass_failed(pass, total, &describe(&outcome, synthetic.as_deref()), false);
                Err(RelayError::PassFailed {
                    pass,
                    command,
                    exit_code: outcome.exit_code,
                    log,
                })
            }
        }
    }

    // ── Finalize ─────────────────────────────────────────────────────────

    async fn finalize(&mut self) -> Result<(), RelayError> {
        let path = self.pdf_path();
        if !self.pdf_on_disk().await {
            let log = self.read_log(None).await;
            error!("PDF not found after {} pass(es)", self.stats.passes.len());
            return Err(RelayError::PdfNotFound { log });
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| RelayError::DeliveryFailed {
                detail: format!("could not read {}: {}", path.display(), e),
            })?;
        self.pdf = Some(bytes);
        Ok(())
    }

    fn pdf_path(&self) -> PathBuf {
        self.dir.join(PDF_FILE)
    }

    async fn pdf_on_disk(&self) -> bool {
        tokio::fs::metadata(self.pdf_path())
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    /// Compiler log (lossily decoded) followed by any synthetic note.
    async fn read_log(&self, synthetic: Option<&str>) -> Option<String> {
        let file_log = match tokio::fs::read(self.dir.join(LOG_FILE)).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => None,
        };
        match (file_log, synthetic) {
            (Some(log), Some(note)) => Some(format!("{log}\n{note}")),
            (Some(log), None) => Some(log),
            (None, Some(note)) => Some(note.to_string()),
            (None, None) => None,
        }
    }
}

fn describe(outcome: &ProcessOutput, synthetic: Option<&str>) -> String {
    if let Some(note) = synthetic {
        return note.to_string();
    }
    match outcome.exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
