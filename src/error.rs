//! Error types for the texrelay library.
//!
//! Two error types reflect the two places a request can go wrong:
//!
//! * [`GenerationError`]: the upstream text-generation capability failed
//!   (no credentials, provider error, timeout). It is wrapped into
//!   [`RelayError::Generation`] when it crosses a request boundary.
//!
//! * [`RelayError`]: everything a caller of a relay operation can observe:
//!   bad input, preprocessing failures, compiler failures (with the compiler
//!   log attached), and delivery failures.
//!
//! Workspace cleanup failures are deliberately absent: they are logged and
//! never change the outcome of a request.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required request field was absent or empty.
    #[error("Missing '{field}' in request body")]
    MissingField { field: String },

    /// The request body could not be understood at all.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// `analyze` was asked for an analysis it does not know.
    #[error("Invalid analysis type '{0}' (expected plagiarism, novelty or citation)")]
    InvalidAnalysisType(String),

    // ── Upstream errors ───────────────────────────────────────────────────
    /// The text-generation capability failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    // ── Preprocessing errors ──────────────────────────────────────────────
    /// A LaTeX rewrite rule could not be applied.
    #[error("Rewrite rule '{rule}' failed: {detail}")]
    Rewrite { rule: &'static str, detail: String },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// The per-request working directory could not be created.
    #[error("Failed to allocate compilation workspace: {source}")]
    WorkspaceInit {
        #[source]
        source: std::io::Error,
    },

    /// An existing asset could not be copied into the workspace.
    #[error("Failed to stage asset '{name}': {source}")]
    StageAsset {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The normalised source could not be written into the workspace.
    #[error("Failed to write LaTeX source '{path}': {source}")]
    WriteSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Compilation errors ────────────────────────────────────────────────
    /// A pass failed and no PDF had been produced yet.
    #[error("LaTeX compilation failed: {command}")]
    PassFailed {
        /// 1-based position in the pass plan.
        pass: usize,
        command: String,
        exit_code: Option<i32>,
        log: Option<String>,
    },

    /// Every pass ran but the PDF is still missing.
    #[error("PDF file was not found after compilation.")]
    PdfNotFound { log: Option<String> },

    /// The PDF exists but could not be read back for delivery.
    #[error("PDF generated but failed to send: {detail}")]
    DeliveryFailed { detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write the PDF to the requested output path.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Shorthand for [`RelayError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Compiler log text attached to this error, if any.
    pub fn log(&self) -> Option<&str> {
        match self {
            Self::PassFailed { log, .. } | Self::PdfNotFound { log } => log.as_deref(),
            _ => None,
        }
    }

    /// `true` for errors caused by the caller's input rather than by the
    /// relay or its collaborators. No external call has been made when one
    /// of these is returned.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. } | Self::InvalidRequest(_) | Self::InvalidAnalysisType(_)
        )
    }
}

/// Failure of the text-generation capability.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// No usable provider or credential was found at startup.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    NotConfigured { provider: String, hint: String },

    /// The provider returned an error on every attempt.
    #[error("LLM call failed after {attempts} attempt(s): {detail}")]
    Failed { attempts: u32, detail: String },

    /// A single call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with nothing but whitespace.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_display() {
        let e = RelayError::missing("latex");
        assert_eq!(e.to_string(), "Missing 'latex' in request body");
        assert!(e.is_client_error());
    }

    #[test]
    fn pass_failed_carries_log() {
        let e = RelayError::PassFailed {
            pass: 1,
            command: "pdflatex -interaction=nonstopmode preview.tex".into(),
            exit_code: Some(1),
            log: Some("! Undefined control sequence.".into()),
        };
        assert!(e.to_string().contains("pdflatex"));
        assert_eq!(e.log(), Some("! Undefined control sequence."));
        assert!(!e.is_client_error());
    }

    #[test]
    fn pdf_not_found_display() {
        let e = RelayError::PdfNotFound { log: None };
        assert_eq!(e.to_string(), "PDF file was not found after compilation.");
        assert_eq!(e.log(), None);
    }

    #[test]
    fn generation_error_is_transparent() {
        let e: RelayError = GenerationError::Timeout { secs: 30 }.into();
        assert_eq!(e.to_string(), "LLM call timed out after 30s");
        assert!(!e.is_client_error());
    }

    #[test]
    fn not_configured_display() {
        let e = GenerationError::NotConfigured {
            provider: "auto".into(),
            hint: "Set GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("auto"));
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }
}
