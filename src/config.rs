//! Configuration types for the relay.
//!
//! Every knob lives in [`RelayConfig`], built via [`RelayConfigBuilder`].
//! The config is read-only once built: the server clones it into shared
//! state at startup and never re-reads the environment per request.

use crate::error::RelayError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Document class every normalised source is forced onto.
pub const DEFAULT_DOCUMENT_CLASS: &str = "IEEEtran";

/// Configuration for compilation and generation requests.
///
/// # Example
/// ```rust
/// use texrelay::RelayConfig;
///
/// let config = RelayConfig::builder()
///     .assets_dir("./assets")
///     .pass_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.document_class, "IEEEtran");
/// ```
#[derive(Clone)]
pub struct RelayConfig {
    /// Class written into every `\documentclass{...}`. Default: `IEEEtran`.
    pub document_class: String,

    /// Directory searched for `\includegraphics` targets. Default: `assets`.
    pub assets_dir: PathBuf,

    /// Parent directory for per-request workspaces. `None` uses the system
    /// temp directory.
    pub workspace_root: Option<PathBuf>,

    /// LaTeX compiler binary. Default: `pdflatex`.
    pub compiler: String,

    /// Arguments placed before the source file name on every compiler pass.
    /// Default: `["-interaction=nonstopmode"]`.
    ///
    /// Non-stop mode matters: without it the compiler waits on stdin at the
    /// first error and the pass only ends when the timeout fires.
    pub compiler_args: Vec<String>,

    /// Bibliography tool binary. Default: `bibtex`.
    pub bib_tool: String,

    /// Upper bound on a single external pass, in seconds. Default: 120.
    pub pass_timeout_secs: u64,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for generation. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 8192.
    ///
    /// A full IEEE-style paper in LaTeX runs to several thousand tokens;
    /// lower limits cut papers off before `\end{document}`.
    pub max_tokens: usize,

    /// Retry attempts on a failed LLM call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Optional progress callback for compilation passes.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            document_class: DEFAULT_DOCUMENT_CLASS.to_string(),
            assets_dir: PathBuf::from("assets"),
            workspace_root: None,
            compiler: "pdflatex".to_string(),
            compiler_args: vec!["-interaction=nonstopmode".to_string()],
            bib_tool: "bibtex".to_string(),
            pass_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.7,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("document_class", &self.document_class)
            .field("assets_dir", &self.assets_dir)
            .field("workspace_root", &self.workspace_root)
            .field("compiler", &self.compiler)
            .field("compiler_args", &self.compiler_args)
            .field("bib_tool", &self.bib_tool)
            .field("pass_timeout_secs", &self.pass_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn CompileProgressCallback>"),
            )
            .finish()
    }
}

impl RelayConfig {
    /// Create a new builder for `RelayConfig`.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RelayConfig`].
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl fmt::Debug for RelayConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl RelayConfigBuilder {
    pub fn document_class(mut self, class: impl Into<String>) -> Self {
        self.config.document_class = class.into();
        self
    }

    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.assets_dir = dir.into();
        self
    }

    pub fn workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(dir.into());
        self
    }

    pub fn compiler(mut self, program: impl Into<String>) -> Self {
        self.config.compiler = program.into();
        self
    }

    pub fn compiler_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.compiler_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn bib_tool(mut self, program: impl Into<String>) -> Self {
        self.config.bib_tool = program.into();
        self
    }

    pub fn pass_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pass_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<RelayConfig, RelayError> {
        let class = self.config.document_class.trim().to_string();
        self.config.document_class = class;
        let c = &self.config;
        let class = c.document_class.as_str();
        if class.is_empty() {
            return Err(RelayError::InvalidConfig(
                "Document class must not be empty".into(),
            ));
        }
        if class.contains(['{', '}', '[', ']', '\\']) {
            return Err(RelayError::InvalidConfig(format!(
                "Document class must be a bare class name, got '{}'",
                class
            )));
        }
        if c.compiler.trim().is_empty() {
            return Err(RelayError::InvalidConfig(
                "Compiler program must not be empty".into(),
            ));
        }
        if c.bib_tool.trim().is_empty() {
            return Err(RelayError::InvalidConfig(
                "Bibliography tool must not be empty".into(),
            ));
        }
        if c.pass_timeout_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "Pass timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.document_class, "IEEEtran");
        assert_eq!(config.compiler, "pdflatex");
        assert_eq!(config.compiler_args, vec!["-interaction=nonstopmode"]);
        assert_eq!(config.bib_tool, "bibtex");
        assert_eq!(config.pass_timeout_secs, 120);
        assert!(config.provider.is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = RelayConfig::builder()
            .document_class("article")
            .compiler("lualatex")
            .compiler_args(["-interaction=batchmode", "-halt-on-error"])
            .bib_tool("biber")
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(config.document_class, "article");
        assert_eq!(config.compiler, "lualatex");
        assert_eq!(config.compiler_args.len(), 2);
        assert_eq!(config.bib_tool, "biber");
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn padded_class_is_trimmed() {
        let config = RelayConfig::builder()
            .document_class("  IEEEtran \n")
            .build()
            .unwrap();
        assert_eq!(config.document_class, "IEEEtran");
    }

    #[test]
    fn rejects_braced_class() {
        let err = RelayConfig::builder()
            .document_class("{article}")
            .build()
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = RelayConfig::builder().pass_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn debug_hides_provider_object() {
        let dbg = format!("{:?}", RelayConfig::default());
        assert!(dbg.contains("RelayConfig"));
        assert!(dbg.contains("IEEEtran"));
    }
}
