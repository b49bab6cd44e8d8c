//! Post-processing: deterministic cleanup of LLM-generated LaTeX.
//!
//! Even a well-prompted model occasionally wraps the paper in
//! ` ```latex ... ``` ` fences, emits Windows line endings, sprinkles
//! zero-width characters, or picks a different document class than the one
//! it was asked for. These rules fix those quirks without touching content.
//!
//! ## Rule Order
//!
//! Fences are stripped first so the class rule sees `\documentclass` at the
//! real start of the text; the final-newline pass runs last.

use crate::error::RelayError;
use crate::pipeline::normalize::{enforce_document_class, ensure_document_class};
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to a generated paper.
///
/// Rules (applied in order):
/// 1. Strip outer code fences (` ```latex `, ` ```tex ` or bare)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Enforce `class` on the first `\documentclass`, prepending one if absent
/// 5. Ensure the text ends with exactly one newline
pub fn clean_generated_latex(input: &str, class: &str) -> Result<String, RelayError> {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = enforce_document_class(&s, class)?;
    let s = ensure_document_class(&s, class)?;
    Ok(ensure_final_newline(&s))
}

// ── Rule 1: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:latex|tex|LaTeX)?[ \t]*\r?\n(.*?)\r?\n```\s*$"));

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match Lazy::force(&RE_OUTER_FENCES) {
        Ok(re) => match re.captures(trimmed) {
            Some(caps) => caps[1].to_string(),
            None => input.to_string(),
        },
        // The pattern is a literal; on the impossible compile failure the
        // text passes through unchanged.
        Err(_) => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 5: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
