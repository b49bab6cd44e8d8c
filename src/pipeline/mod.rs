//! Pipeline stages for LaTeX-to-PDF compilation and paper generation.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! latex ──▶ normalize ──▶ plan ──▶ driver ──▶ PDF bytes
//!           (rewrites)   (passes)  (workspace + runner)
//!
//! request ──▶ prompt ──▶ llm ──▶ postprocess ──▶ latex
//! ```
//!
//! 1. [`normalize`]: class, packages, citations and images rewritten so the
//!    source compiles in a bare workspace
//! 2. [`assets`]: where figures live; existence checks and staging copies
//! 3. [`plan`]: ordered compiler / bibliography invocations
//! 4. [`runner`]: bounded subprocess execution with captured output
//! 5. [`driver`]: the per-request workspace and pass state machine
//! 6. [`llm`]: `generate(prompt) -> text` with retry/backoff; the only
//!    stage with network I/O
//! 7. [`postprocess`]: deterministic cleanup of generated LaTeX

pub mod assets;
pub mod driver;
pub mod llm;
pub mod normalize;
pub mod plan;
pub mod postprocess;
pub mod runner;
