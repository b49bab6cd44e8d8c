//! Pass plan: the ordered list of external invocations for one document.
//!
//! A single compiler pass is enough for a document without references. With
//! citations and a bibliography, the classic sequence is compile → bibtex →
//! compile → compile: the first pass writes `\citation` entries to the
//! `.aux` file, bibtex turns them into a `.bbl`, and two more passes let the
//! labels and page references settle.

use crate::config::RelayConfig;
use std::fmt;

/// Base name shared by every file in the workspace.
pub const JOB_NAME: &str = "preview";
/// Source file written into the workspace.
pub const SOURCE_FILE: &str = "preview.tex";
/// Log file the compiler leaves behind.
pub const LOG_FILE: &str = "preview.log";
/// Artifact the driver is waiting for.
pub const PDF_FILE: &str = "preview.pdf";

/// What a pass does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Compile,
    Bibliography,
}

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: PassKind,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn compile(config: &RelayConfig) -> Self {
        let mut args = config.compiler_args.clone();
        args.push(SOURCE_FILE.to_string());
        Self {
            kind: PassKind::Compile,
            program: config.compiler.clone(),
            args,
        }
    }

    fn bibliography(config: &RelayConfig) -> Self {
        Self {
            kind: PassKind::Bibliography,
            program: config.bib_tool.clone(),
            args: vec![JOB_NAME.to_string()],
        }
    }

    /// Space-joined command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Immutable, ordered sequence of passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassPlan {
    passes: Vec<Invocation>,
}

impl PassPlan {
    /// Build the plan. The bibliography round only happens when the source
    /// both cites something and declares where the references live.
    pub fn new(has_citations: bool, has_bibliography: bool, config: &RelayConfig) -> Self {
        let mut passes = vec![Invocation::compile(config)];
        if has_citations && has_bibliography {
            passes.push(Invocation::bibliography(config));
            passes.push(Invocation::compile(config));
            passes.push(Invocation::compile(config));
        }
        Self { passes }
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Invocation> {
        self.passes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Invocation> {
        self.passes.iter()
    }
}
