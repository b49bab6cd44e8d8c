//! # texrelay
//!
//! A LaTeX compilation relay for AI-assisted research writing.
//!
//! Sources written by people and by LLMs routinely fail to compile in a bare
//! TeX installation: the wrong document class, a forgotten `\usepackage`,
//! citations with no bibliography, figures that were never uploaded. This
//! crate rewrites such sources into something that compiles, runs the
//! compiler (and bibtex when needed) in a private per-request workspace, and
//! hands back the PDF bytes or the compiler log.
//!
//! ## Pipeline Overview
//!
//! ```text
//! LaTeX
//!  │
//!  ├─ 1. Normalize  class, packages, citations, missing images
//!  ├─ 2. Plan       1 pass, or compile → bibtex → compile → compile
//!  ├─ 3. Workspace  private temp dir, assets staged, preview.tex written
//!  ├─ 4. Passes     bounded subprocesses; failure tolerated once a PDF exists
//!  └─ 5. Output     PDF bytes + per-pass stats; workspace always removed
//! ```
//!
//! Around the compiler sit a handful of research-assistant operations
//! (paper generation, summaries, reviews, analyses, chat) that go through a
//! single [`TextGenerator`] capability.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use texrelay::{compile_latex, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::builder().assets_dir("figures").build()?;
//!     let latex = r"\documentclass{article}\begin{document}Hello\end{document}";
//!     let output = compile_latex(latex, &config).await?;
//!     std::fs::write("preview.pdf", &output.pdf)?;
//!     eprintln!("{} passes", output.stats.passes.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `texrelay` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The axum HTTP surface in [`server`] |
//!
//! Disable both when using only the library:
//! ```toml
//! texrelay = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compile;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod research;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compile::{compile_latex, compile_latex_with, compile_sync, compile_to_file, normalize_latex};
pub use config::{RelayConfig, RelayConfigBuilder, DEFAULT_DOCUMENT_CLASS};
pub use error::{GenerationError, RelayError};
pub use output::{CompileStats, CompiledPdf, PassReport};
pub use pipeline::assets::{AssetDir, AssetResolver};
pub use pipeline::llm::{LlmGenerator, TextGenerator, UnconfiguredGenerator};
pub use pipeline::normalize::NormalizedDocument;
pub use pipeline::runner::{ProcessOutput, ProcessRunner, SystemRunner};
pub use progress::{CompileProgressCallback, NoopProgressCallback, ProgressCallback};
pub use research::{AnalysisKind, PaperRequest, PaperSource};
