//! Document normaliser: rewrite raw LaTeX so it compiles in a bare workspace.
//!
//! Sources arrive from users and from an LLM, and both routinely reference
//! things the relay cannot provide: exotic document classes, packages the
//! author forgot to load, citations without a bibliography, figures that were
//! never uploaded. Each rule below is a pure `&str → String` rewrite over the
//! whole buffer, so it can be tested in isolation with literal fixtures.
//!
//! ## Rule Order
//!
//! 1. Force the document class (first declaration only, prepend if absent)
//! 2. Inject packages required by macros the source uses
//! 3. Strip `\cite{...}` when no bibliography mechanism exists
//! 4. Replace `\includegraphics` calls whose asset is missing
//!
//! The class rule runs first because package injection anchors on the class
//! line. Citations are settled before images so the returned document knows
//! whether the bibliography pass is needed.

use crate::error::RelayError;
use crate::pipeline::assets::AssetResolver;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde::Serialize;
use tracing::{debug, warn};

/// Result of running every rule over a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedDocument {
    /// The rewritten LaTeX.
    pub source: String,
    /// Every `\includegraphics` target in order of appearance, duplicates
    /// kept. Missing ones are still listed; the driver skips them.
    pub image_files: Vec<String>,
    /// Distinct targets that were replaced by a placeholder.
    pub missing_images: Vec<String>,
    /// `\cite{...}` occurrences found before any removal.
    pub citation_count: usize,
    /// `true` when citations were stripped for lack of a bibliography.
    pub citations_removed: bool,
    pub has_bibliography: bool,
    /// Packages inserted after the class line, in insertion order.
    pub injected_packages: Vec<String>,
}

impl NormalizedDocument {
    /// `true` when the source still cites something.
    pub fn has_citations(&self) -> bool {
        self.citation_count > 0 && !self.citations_removed
    }

    /// Citations and a bibliography are both present, so the bibliography
    /// tool must run between compiler passes.
    pub fn needs_bibliography_pass(&self) -> bool {
        self.has_citations() && self.has_bibliography
    }
}

/// Run every rewrite rule over `source` in order.
///
/// `asset_resolver` is consulted only for existence; nothing is copied here.
pub fn normalize(
    source: &str,
    document_class: &str,
    asset_resolver: &dyn AssetResolver,
) -> Result<NormalizedDocument, RelayError> {
    // ── Rule 1: document class ──────────────────────────────────────────
    let s = enforce_document_class(source, document_class)?;
    let s = ensure_document_class(&s, document_class)?;

    // ── Rule 2: packages ────────────────────────────────────────────────
    let (s, injected_packages) = inject_packages(&s)?;
    for pkg in &injected_packages {
        debug!("Injected \\usepackage{{{}}}", pkg);
    }

    // ── Rule 3: citations ───────────────────────────────────────────────
    let citation_count = count_citations(&s)?;
    let has_bib = has_bibliography(&s);
    let (s, citations_removed) = if citation_count > 0 && !has_bib {
        warn!(
            "{} citation(s) found but no bibliography defined; removing them",
            citation_count
        );
        (strip_citations(&s)?, true)
    } else {
        (s, false)
    };

    // ── Rule 4: images ──────────────────────────────────────────────────
    let image_files = collect_image_refs(&s)?;
    let mut missing_images: Vec<String> = Vec::new();
    let mut s = s;
    for name in &image_files {
        if missing_images.contains(name) || asset_resolver.asset_exists(name) {
            continue;
        }
        warn!("Image '{}' not found; replacing with placeholder", name);
        s = replace_missing_image(&s, name)?;
        missing_images.push(name.clone());
    }

    Ok(NormalizedDocument {
        source: s,
        image_files,
        missing_images,
        citation_count,
        citations_removed,
        has_bibliography: has_bib,
        injected_packages,
    })
}

type Pattern = Lazy<Result<Regex, regex::Error>>;

/// Borrow a compiled rule pattern, turning a bad pattern into a rewrite error.
fn pattern(rule: &'static str, re: &'static Pattern) -> Result<&'static Regex, RelayError> {
    Lazy::force(re).as_ref().map_err(|e| RelayError::Rewrite {
        rule,
        detail: e.to_string(),
    })
}

// ── Rule 1: Document class ───────────────────────────────────────────────────

static RE_DOCUMENT_CLASS: Pattern =
    Lazy::new(|| Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{([^}]+)\}"));

/// Replace the first `\documentclass[...]{...}` with `\documentclass{class}`.
pub fn enforce_document_class(input: &str, class: &str) -> Result<String, RelayError> {
    let re = pattern("document-class", &RE_DOCUMENT_CLASS)?;
    let class = class.trim();
    let canonical = format!("\\documentclass{{{}}}", class);
    Ok(re.replacen(input, 1, NoExpand(&canonical)).into_owned())
}

/// Prepend `\documentclass{class}` when no declaration names `class`.
///
/// Leading whitespace is dropped so the declaration really is the first
/// thing in the file.
pub fn ensure_document_class(input: &str, class: &str) -> Result<String, RelayError> {
    let re = pattern("document-class", &RE_DOCUMENT_CLASS)?;
    let class = class.trim();
    let present = re
        .captures_iter(input)
        .any(|caps| caps[1].trim() == class);
    if present {
        return Ok(input.to_string());
    }
    warn!("\\documentclass{{{}}} not found; prepending it", class);
    Ok(format!(
        "\\documentclass{{{}}}\n{}",
        class,
        input.trim_start()
    ))
}

// ── Rule 2: Package injection ────────────────────────────────────────────────

/// Macros or environments that only work with an extra package, and that
/// package. Checked in order; insertion keeps this order.
const PACKAGE_TRIGGERS: &[(&str, &str)] = &[
    ("\\lipsum", "lipsum"),
    ("\\includegraphics", "graphicx"),
    ("\\url{", "url"),
    ("\\begin{align", "amsmath"),
    ("\\begin{tikzpicture}", "tikz"),
    ("\\begin{axis}", "pgfplots"),
];

static RE_USEPACKAGE: Pattern =
    Lazy::new(|| Regex::new(r"\\usepackage\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}"));

/// `true` when some `\usepackage[...]{a,b,...}` already loads `name`.
pub fn has_package(input: &str, name: &str) -> Result<bool, RelayError> {
    let re = pattern("usepackage", &RE_USEPACKAGE)?;
    Ok(re
        .captures_iter(input)
        .any(|caps| caps[1].split(',').any(|p| p.trim() == name)))
}

/// Add `\usepackage{...}` lines right after the first class declaration for
/// every triggered package that is not loaded yet.
///
/// Returns the rewritten text and the packages that were added.
pub fn inject_packages(input: &str) -> Result<(String, Vec<String>), RelayError> {
    let mut needed: Vec<String> = Vec::new();
    for (trigger, package) in PACKAGE_TRIGGERS {
        if input.contains(trigger)
            && !has_package(input, package)?
            && !needed.iter().any(|p| p == *package)
        {
            needed.push((*package).to_string());
        }
    }
    if needed.is_empty() {
        return Ok((input.to_string(), needed));
    }

    let re = pattern("document-class", &RE_DOCUMENT_CLASS)?;
    let Some(class_decl) = re.find(input) else {
        // Nothing to anchor on; leave the source alone.
        return Ok((input.to_string(), Vec::new()));
    };

    let mut out = String::with_capacity(input.len() + needed.len() * 24);
    out.push_str(&input[..class_decl.end()]);
    for pkg in &needed {
        out.push_str("\n\\usepackage{");
        out.push_str(pkg);
        out.push('}');
    }
    out.push_str(&input[class_decl.end()..]);
    Ok((out, needed))
}

// ── Rule 3: Citation consistency ─────────────────────────────────────────────

static RE_CITE: Pattern = Lazy::new(|| Regex::new(r"\\cite\{[^}]+\}"));

/// Number of `\cite{...}` occurrences.
pub fn count_citations(input: &str) -> Result<usize, RelayError> {
    let re = pattern("citation", &RE_CITE)?;
    Ok(re.find_iter(input).count())
}

/// `true` when the source defines its references, either inline or through
/// a `.bib` database.
pub fn has_bibliography(input: &str) -> bool {
    input.contains("\\begin{thebibliography}") || input.contains("\\bibliography{")
}

/// Remove every `\cite{...}`. Dangling citations make the compiler fail hard,
/// so losing the marker is the lesser evil.
pub fn strip_citations(input: &str) -> Result<String, RelayError> {
    let re = pattern("citation", &RE_CITE)?;
    Ok(re.replace_all(input, "").into_owned())
}

// ── Rule 4: Image resolution ─────────────────────────────────────────────────

static RE_INCLUDEGRAPHICS: Pattern =
    Lazy::new(|| Regex::new(r"\\includegraphics\s*(?:\[[^\]]*\])?\s*\{([^}]+)\}"));

/// Every `\includegraphics` target, in order, duplicates kept.
pub fn collect_image_refs(input: &str) -> Result<Vec<String>, RelayError> {
    let re = pattern("image", &RE_INCLUDEGRAPHICS)?;
    Ok(re
        .captures_iter(input)
        .map(|caps| caps[1].trim().to_string())
        .collect())
}

/// The visible box that stands in for a missing figure.
pub fn missing_image_placeholder(name: &str) -> String {
    format!("\\fbox{{Missing image: \\detokenize{{{}}}}}", name)
}

/// Replace every `\includegraphics[...]{name}` with the placeholder.
///
/// `name` is matched literally, never as a pattern.
pub fn replace_missing_image(input: &str, name: &str) -> Result<String, RelayError> {
    let pattern = format!(
        r"\\includegraphics\s*(?:\[[^\]]*\])?\s*\{{\s*{}\s*\}}",
        regex::escape(name)
    );
    let re = Regex::new(&pattern).map_err(|e| RelayError::Rewrite {
        rule: "image",
        detail: e.to_string(),
    })?;
    let placeholder = missing_image_placeholder(name);
    Ok(re.replace_all(input, NoExpand(&placeholder)).into_owned())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;

    struct FakeAssets(HashSet<&'static str>);

    impl FakeAssets {
        fn with(names: &[&'static str]) -> Self {
            Self(names.iter().copied().collect())
        }
    }

    impl AssetResolver for FakeAssets {
        fn asset_exists(&self, name: &str) -> bool {
            self.0.contains(name)
        }

        fn copy_asset(&self, _name: &str, _destination_dir: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    // ── Rule 1 ──

    #[test]
    fn test_enforce_class_with_options() {
        let input = "\\documentclass[11pt,a4paper]{article}\n\\begin{document}";
        assert_eq!(
            enforce_document_class(input, "IEEEtran").unwrap(),
            "\\documentclass{IEEEtran}\n\\begin{document}"
        );
    }

    #[test]
    fn test_enforce_class_only_first() {
        let input = "\\documentclass{article}\n\\documentclass{report}";
        assert_eq!(
            enforce_document_class(input, "IEEEtran").unwrap(),
            "\\documentclass{IEEEtran}\n\\documentclass{report}"
        );
    }

    #[test]
    fn test_enforce_class_spacing() {
        let input = "\\documentclass [conference] {svjour3}";
        assert_eq!(
            enforce_document_class(input, "IEEEtran").unwrap(),
            "\\documentclass{IEEEtran}"
        );
    }

    #[test]
    fn test_ensure_class_prepends() {
        let input = "\n  \\begin{document}hi\\end{document}";
        assert_eq!(
            ensure_document_class(input, "IEEEtran").unwrap(),
            "\\documentclass{IEEEtran}\n\\begin{document}hi\\end{document}"
        );
    }

    #[test]
    fn test_class_rules_ignore_padding() {
        let input = "\\documentclass{article}\n\\begin{document}";
        let enforced = enforce_document_class(input, " IEEEtran ").unwrap();
        let ensured = ensure_document_class(&enforced, " IEEEtran ").unwrap();
        assert_eq!(ensured, "\\documentclass{IEEEtran}\n\\begin{document}");
    }

    #[test]
    fn test_ensure_class_present_passthrough() {
        let input = "\\documentclass[journal]{IEEEtran}\nbody";
        assert_eq!(ensure_document_class(input, "IEEEtran").unwrap(), input);
    }

    // ── Rule 2 ──

    #[test]
    fn test_inject_lipsum() {
        let input = "\\documentclass{IEEEtran}\n\\begin{document}\\lipsum[1]\\end{document}";
        let (out, added) = inject_packages(input).unwrap();
        assert_eq!(added, vec!["lipsum"]);
        assert_eq!(
            out,
            "\\documentclass{IEEEtran}\n\\usepackage{lipsum}\n\\begin{document}\\lipsum[1]\\end{document}"
        );
    }

    #[test]
    fn test_inject_skips_loaded_package() {
        let input = "\\documentclass{IEEEtran}\n\\usepackage[final]{amsmath,lipsum}\n\\lipsum";
        let (out, added) = inject_packages(input).unwrap();
        assert!(added.is_empty());
        assert_eq!(out, input);
    }

    #[test]
    fn test_inject_multiple_in_table_order() {
        let input = "\\documentclass{IEEEtran}\n\\url{x}\\lipsum";
        let (out, added) = inject_packages(input).unwrap();
        assert_eq!(added, vec!["lipsum", "url"]);
        assert!(out.starts_with(
            "\\documentclass{IEEEtran}\n\\usepackage{lipsum}\n\\usepackage{url}\n"
        ));
    }

    #[test]
    fn test_inject_without_class_is_noop() {
        let input = "\\lipsum";
        let (out, added) = inject_packages(input).unwrap();
        assert!(added.is_empty());
        assert_eq!(out, input);
    }

    // ── Rule 3 ──

    #[test]
    fn test_strip_citations() {
        let input = "As shown \\cite{a} and \\cite{b,c}.";
        assert_eq!(strip_citations(input).unwrap(), "As shown  and .");
    }

    #[test]
    fn test_strip_citations_noop_without_cites() {
        let input = "No references here, only \\citep-like text.";
        assert_eq!(strip_citations(input).unwrap(), input);
        assert_eq!(count_citations(input).unwrap(), 0);
    }

    #[test]
    fn test_bibliography_markers() {
        assert!(has_bibliography("\\begin{thebibliography}{9}"));
        assert!(has_bibliography("\\bibliography{refs}"));
        assert!(!has_bibliography("\\bibliographystyle{plain}"));
        assert!(!has_bibliography("plain text"));
    }

    // ── Rule 4 ──

    #[test]
    fn test_collect_images_keeps_order_and_duplicates() {
        let input = "\\includegraphics[width=3in]{b.png} \\includegraphics{a.png} \\includegraphics{b.png}";
        assert_eq!(
            collect_image_refs(input).unwrap(),
            vec!["b.png", "a.png", "b.png"]
        );
    }

    #[test]
    fn test_replace_missing_image_literal_match() {
        let input = "\\includegraphics[scale=0.5]{fig(1).png} and \\includegraphics{fig11png}";
        let out = replace_missing_image(input, "fig(1).png").unwrap();
        assert_eq!(
            out,
            "\\fbox{Missing image: \\detokenize{fig(1).png}} and \\includegraphics{fig11png}"
        );
    }

    #[test]
    fn test_placeholder_with_dollar_is_not_expanded() {
        let out = replace_missing_image("\\includegraphics{$a.png}", "$a.png").unwrap();
        assert_eq!(out, "\\fbox{Missing image: \\detokenize{$a.png}}");
    }

    // ── Whole normaliser ──

    #[test]
    fn test_normalize_article_with_dangling_cite() {
        let assets = FakeAssets::with(&[]);
        let doc = normalize("\\documentclass{article}\n\\cite{a}", "IEEEtran", &assets).unwrap();
        assert_eq!(doc.source, "\\documentclass{IEEEtran}\n");
        assert!(doc.citations_removed);
        assert_eq!(doc.citation_count, 1);
        assert!(!doc.has_citations());
        assert!(!doc.needs_bibliography_pass());
    }

    #[test]
    fn test_normalize_keeps_cites_with_bibliography() {
        let assets = FakeAssets::with(&[]);
        let input = "\\documentclass{article}\n\\cite{a}\n\\begin{thebibliography}{1}\\bibitem{a} A.\\end{thebibliography}";
        let doc = normalize(input, "IEEEtran", &assets).unwrap();
        assert!(doc.source.contains("\\cite{a}"));
        assert!(doc.needs_bibliography_pass());
    }

    #[test]
    fn test_normalize_single_class_declaration() {
        let assets = FakeAssets::with(&[]);
        let doc = normalize("\\documentclass[12pt]{svjour3}\nx", "IEEEtran", &assets).unwrap();
        assert_eq!(doc.source.matches("\\documentclass").count(), 1);
        assert!(doc.source.contains("\\documentclass{IEEEtran}"));
        assert!(!doc.source.contains("svjour3"));
    }

    #[test]
    fn test_normalize_images() {
        let assets = FakeAssets::with(&["present.png"]);
        let input = "\\documentclass{IEEEtran}\n\\usepackage{graphicx}\n\
                     \\includegraphics{present.png}\n\\includegraphics[width=1in]{gone.png}\n\
                     \\includegraphics{gone.png}";
        let doc = normalize(input, "IEEEtran", &assets).unwrap();
        assert_eq!(
            doc.image_files,
            vec!["present.png", "gone.png", "gone.png"]
        );
        assert_eq!(doc.missing_images, vec!["gone.png"]);
        assert!(doc.source.contains("\\includegraphics{present.png}"));
        assert!(!doc.source.contains("\\includegraphics{gone.png}"));
        assert!(!doc.source.contains("[width=1in]"));
        assert_eq!(
            doc.source
                .matches("\\fbox{Missing image: \\detokenize{gone.png}}")
                .count(),
            2
        );
    }

    #[test]
    fn test_normalize_injects_graphicx_for_images() {
        let assets = FakeAssets::with(&["a.png"]);
        let doc = normalize("\\documentclass{IEEEtran}\n\\includegraphics{a.png}", "IEEEtran", &assets)
            .unwrap();
        assert_eq!(doc.injected_packages, vec!["graphicx"]);
        assert!(doc
            .source
            .starts_with("\\documentclass{IEEEtran}\n\\usepackage{graphicx}\n"));
    }
}
