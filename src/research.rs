//! Research-assistant operations built on [`TextGenerator`].
//!
//! Each operation validates its input, builds a prompt from
//! [`crate::prompts`], and makes exactly one `generate` call. Validation
//! failures return before any call reaches the provider.

use crate::error::RelayError;
use crate::pipeline::llm::TextGenerator;
use crate::pipeline::postprocess::clean_generated_latex;
use crate::prompts::{self, PaperPrompt};
use serde::Deserialize;
use tracing::{debug, info};

pub use crate::prompts::AnalysisKind;

/// Parameters for [`generate_paper`]. Only `topic` is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub research_question: Option<String>,
    #[serde(default)]
    pub methodology: Option<String>,
    /// Target length in pages; a number or free text.
    #[serde(default, deserialize_with = "string_or_number")]
    pub length: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

/// Paper to summarise or review: inline text, or an arXiv identifier.
///
/// Text wins when both are given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSource {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub arxiv_id: Option<String>,
}

impl PaperSource {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            arxiv_id: None,
        }
    }

    pub fn from_arxiv(id: impl Into<String>) -> Self {
        Self {
            text: None,
            arxiv_id: Some(id.into()),
        }
    }

    /// Text to embed in the prompt.
    ///
    /// arXiv fetching is not implemented; an identifier yields a marker line.
    pub fn paper_text(&self) -> Result<String, RelayError> {
        if let Some(text) = non_empty(&self.text) {
            return Ok(text.to_string());
        }
        if let Some(id) = non_empty(&self.arxiv_id) {
            return Ok(prompts::arxiv_placeholder(id));
        }
        Err(RelayError::missing("paper"))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Ask for a full paper and clean it up so it starts with `document_class`.
pub async fn generate_paper(
    generator: &dyn TextGenerator,
    request: &PaperRequest,
    document_class: &str,
) -> Result<String, RelayError> {
    let topic = non_empty(&request.topic).ok_or_else(|| RelayError::missing("topic"))?;
    let field = |v: &Option<String>| non_empty(v).unwrap_or("not specified").to_string();
    let (question, methodology, length, domain, style) = (
        field(&request.research_question),
        field(&request.methodology),
        field(&request.length),
        field(&request.domain),
        field(&request.style),
    );

    let prompt = prompts::paper_prompt(&PaperPrompt {
        document_class,
        topic,
        research_question: &question,
        methodology: &methodology,
        length: &length,
        domain: &domain,
        style: &style,
    });

    info!("Generating paper on '{}'", topic);
    let raw = generator.generate(&prompt).await?;
    debug!("Generated LaTeX (before post-processing):\n{}", raw);
    let paper = clean_generated_latex(&raw, document_class)?;
    debug!("Generated LaTeX (after post-processing):\n{}", paper);
    Ok(paper)
}

pub async fn summarize(
    generator: &dyn TextGenerator,
    source: &PaperSource,
) -> Result<String, RelayError> {
    let text = source.paper_text()?;
    Ok(generator.generate(&prompts::summary_prompt(&text)).await?)
}

pub async fn review(generator: &dyn TextGenerator, source: &PaperSource) -> Result<String, RelayError> {
    let text = source.paper_text()?;
    Ok(generator.generate(&prompts::review_prompt(&text)).await?)
}

/// Run one of the [`AnalysisKind`]s over `text`.
///
/// `kind` is taken as a string so an unknown value surfaces as
/// [`RelayError::InvalidAnalysisType`].
pub async fn analyze(
    generator: &dyn TextGenerator,
    text: Option<&str>,
    kind: Option<&str>,
) -> Result<String, RelayError> {
    let text = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RelayError::missing("inputText"))?;
    let kind = kind
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| RelayError::missing("type"))?;
    let kind: AnalysisKind = kind.parse().map_err(RelayError::InvalidAnalysisType)?;

    info!("Running {} analysis", kind);
    Ok(generator.generate(&prompts::analysis_prompt(kind, text)).await?)
}

pub async fn chat(generator: &dyn TextGenerator, message: &str) -> Result<String, RelayError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(RelayError::missing("message"));
    }
    Ok(generator.generate(&prompts::chat_prompt(message)).await?)
}
