//! LaTeX-to-PDF entry points.
//!
//! [`compile_latex`] is the one-call API: normalise, plan, drive, return the
//! bytes. [`compile_latex_with`] takes the asset and process capabilities
//! explicitly, which is what the server and the tests use.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::output::{CompileStats, CompiledPdf};
use crate::pipeline::assets::{AssetDir, AssetResolver};
use crate::pipeline::driver::{self, DriverEnv};
use crate::pipeline::normalize::{self, NormalizedDocument};
use crate::pipeline::plan::PassPlan;
use crate::pipeline::runner::{ProcessRunner, SystemRunner};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Compile a LaTeX source to PDF using the configured asset directory and
/// real subprocesses.
///
/// # Errors
/// - [`RelayError::MissingField`] when `latex` is empty
/// - [`RelayError::PassFailed`] / [`RelayError::PdfNotFound`] with the
///   compiler log when no PDF could be produced
/// - workspace and I/O errors otherwise
pub async fn compile_latex(latex: &str, config: &RelayConfig) -> Result<CompiledPdf, RelayError> {
    let assets = AssetDir::new(&config.assets_dir);
    compile_latex_with(latex, config, &assets, &SystemRunner).await
}

/// Compile with explicit capabilities.
pub async fn compile_latex_with(
    latex: &str,
    config: &RelayConfig,
    assets: &dyn AssetResolver,
    runner: &dyn ProcessRunner,
) -> Result<CompiledPdf, RelayError> {
    // ── Step 1: Validate ─────────────────────────────────────────────────
    if latex.trim().is_empty() {
        return Err(RelayError::missing("latex"));
    }

    // ── Step 2: Normalise ────────────────────────────────────────────────
    let doc = normalize::normalize(latex, &config.document_class, assets)?;
    info!(
        "Normalised source: {} image(s) ({} missing), {} citation(s){}",
        doc.image_files.len(),
        doc.missing_images.len(),
        doc.citation_count,
        if doc.citations_removed { " removed" } else { "" }
    );

    // ── Step 3: Plan ─────────────────────────────────────────────────────
    let plan = PassPlan::new(doc.has_citations(), doc.has_bibliography, config);

    // ── Step 4: Drive ────────────────────────────────────────────────────
    let env = DriverEnv {
        plan,
        assets,
        runner,
        workspace_root: config.workspace_root.as_deref(),
        pass_timeout: Duration::from_secs(config.pass_timeout_secs),
        progress: config.progress_callback.as_deref(),
    };
    driver::compile(&doc, &env).await
}

/// Run only the rewrite rules, without compiling.
pub fn normalize_latex(latex: &str, config: &RelayConfig) -> Result<NormalizedDocument, RelayError> {
    if latex.trim().is_empty() {
        return Err(RelayError::missing("latex"));
    }
    let assets = AssetDir::new(&config.assets_dir);
    normalize::normalize(latex, &config.document_class, &assets)
}

/// Compile and write the PDF directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn compile_to_file(
    latex: &str,
    output_path: impl AsRef<Path>,
    config: &RelayConfig,
) -> Result<CompileStats, RelayError> {
    let output = compile_latex(latex, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RelayError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf)
        .await
        .map_err(|e| RelayError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RelayError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`compile_latex`].
///
/// Creates a temporary tokio runtime internally.
pub fn compile_sync(latex: &str, config: &RelayConfig) -> Result<CompiledPdf, RelayError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RelayError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compile_latex(latex, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_source_is_missing_field() {
        let err = compile_latex("   \n", &RelayConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingField { ref field } if field == "latex"));
        assert!(err.is_client_error());
    }

    #[test]
    fn normalize_latex_reports_missing_images() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RelayConfig::builder()
            .assets_dir(dir.path())
            .build()
            .unwrap();
        let doc = normalize_latex(
            "\\documentclass{article}\n\\begin{document}\\includegraphics{fig.png}\\end{document}",
            &config,
        )
        .unwrap();
        assert_eq!(doc.missing_images, vec!["fig.png".to_string()]);
        assert!(doc.source.starts_with("\\documentclass{IEEEtran}"));
    }

    #[test]
    fn padded_class_yields_one_declaration() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RelayConfig::builder()
            .assets_dir(dir.path())
            .document_class("IEEEtran ")
            .build()
            .unwrap();
        let doc = normalize_latex(
            "\\documentclass{article}\n\\begin{document}x\\end{document}",
            &config,
        )
        .unwrap();
        assert_eq!(doc.source.matches("\\documentclass").count(), 1);
        assert!(doc.source.starts_with("\\documentclass{IEEEtran}\n"));
    }
}
