//! Prompts for the text-generation operations.
//!
//! Every prompt the relay sends lives here so wording changes happen in one
//! place and tests can inspect them without a provider.

use std::fmt;
use std::str::FromStr;

/// System message sent with every generation request.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a meticulous research assistant for \
academics. You write and critique scientific papers and know LaTeX well. Answer with the \
requested content only, without preamble or closing remarks.";

/// Fields of a paper-generation request, already validated.
#[derive(Debug, Clone, Copy)]
pub struct PaperPrompt<'a> {
    pub document_class: &'a str,
    pub topic: &'a str,
    pub research_question: &'a str,
    pub methodology: &'a str,
    pub length: &'a str,
    pub domain: &'a str,
    pub style: &'a str,
}

/// Prompt asking for a complete, self-contained LaTeX paper.
pub fn paper_prompt(p: &PaperPrompt<'_>) -> String {
    format!(
        r#"Write a complete academic research paper as a single LaTeX document.

Requirements:
- The first line must be \documentclass{{{class}}}. Do not use any other document class.
- Load every package the body needs in the preamble (for example lipsum, graphicx, amsmath, tikz, pgfplots).
- Every \cite{{key}} must have a matching \bibitem{{key}} inside a \begin{{thebibliography}}{{99}} environment at the end. Do not reference external .bib files.
- The document must compile with pdflatex without undefined control sequences or missing references.
- Output only LaTeX source. Do not wrap it in code fences.

Topic: {topic}
Research Question: {question}
Methodology: {methodology}
Length: {length} pages
Domain: {domain}
Style: {style}"#,
        class = p.document_class,
        topic = p.topic,
        question = p.research_question,
        methodology = p.methodology,
        length = p.length,
        domain = p.domain,
        style = p.style,
    )
}

pub fn summary_prompt(paper: &str) -> String {
    format!(
        "Summarize the following research paper. Cover its problem, method, main results \
and limitations.\n\n{paper}"
    )
}

pub fn review_prompt(paper: &str) -> String {
    format!(
        "Write a thorough academic peer review of the following paper. Discuss its strengths, \
its weaknesses and concrete recommendations for the authors.\n\n{paper}"
    )
}

/// The analyses `/api/analyze` knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Plagiarism,
    Novelty,
    Citation,
}

impl AnalysisKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plagiarism => "plagiarism",
            Self::Novelty => "novelty",
            Self::Citation => "citation",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plagiarism" => Ok(Self::Plagiarism),
            "novelty" => Ok(Self::Novelty),
            "citation" => Ok(Self::Citation),
            other => Err(other.to_string()),
        }
    }
}

pub fn analysis_prompt(kind: AnalysisKind, text: &str) -> String {
    let task = match kind {
        AnalysisKind::Plagiarism => {
            "Assess the following text for possible plagiarism. Point out passages that read \
as copied or closely paraphrased and explain why."
        }
        AnalysisKind::Novelty => {
            "Assess the novelty of the following research. Relate it to existing work and say \
which contributions look genuinely new."
        }
        AnalysisKind::Citation => {
            "Analyze the citation network and likely impact of the following research content."
        }
    };
    format!("{task}\n\n{text}")
}

pub fn chat_prompt(message: &str) -> String {
    format!(
        "Answer the following question from a researcher. It may concern academic writing, \
research methods or LaTeX.\n\n{message}"
    )
}

/// Stand-in for paper text when only an arXiv identifier was supplied.
pub fn arxiv_placeholder(id: &str) -> String {
    format!("[arXiv paper fetch not implemented: {}]", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_prompt_names_class_and_fields() {
        let prompt = paper_prompt(&PaperPrompt {
            document_class: "IEEEtran",
            topic: "Graph sparsification",
            research_question: "How sparse can we go?",
            methodology: "Experiments",
            length: "6",
            domain: "CS",
            style: "formal",
        });
        assert!(prompt.contains("\\documentclass{IEEEtran}"));
        assert!(prompt.contains("Topic: Graph sparsification"));
        assert!(prompt.contains("Length: 6 pages"));
        assert!(prompt.contains("\\begin{thebibliography}{99}"));
    }

    #[test]
    fn analysis_kind_parses_case_insensitively() {
        assert_eq!("Novelty".parse::<AnalysisKind>(), Ok(AnalysisKind::Novelty));
        assert_eq!(" citation ".parse::<AnalysisKind>(), Ok(AnalysisKind::Citation));
        assert_eq!(
            "style".parse::<AnalysisKind>(),
            Err("style".to_string())
        );
    }

    #[test]
    fn analysis_prompt_embeds_text() {
        let p = analysis_prompt(AnalysisKind::Plagiarism, "BODY");
        assert!(p.contains("plagiarism"));
        assert!(p.ends_with("BODY"));
    }

    #[test]
    fn arxiv_marker() {
        assert_eq!(
            arxiv_placeholder("2401.00001"),
            "[arXiv paper fetch not implemented: 2401.00001]"
        );
    }
}
