//! CLI binary for texrelay.
//!
//! A thin shim over the library crate: flags map onto `RelayConfig`, and
//! each subcommand calls one library entry point.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use texrelay::research::{self, PaperRequest};
use texrelay::server::{self, AppState, ServerConfig, DEFAULT_MAX_BODY_BYTES};
use texrelay::{
    compile_to_file, normalize_latex, CompileProgressCallback, LlmGenerator, ProgressCallback,
    RelayConfig, RelayError, TextGenerator, UnconfiguredGenerator,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per pass.
struct CliProgressCallback {
    bar: ProgressBar,
    tolerated: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos}/{len} passes  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Compiling");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            tolerated: AtomicUsize::new(0),
        })
    }
}

impl CompileProgressCallback for CliProgressCallback {
    fn on_compile_start(&self, total_passes: usize) {
        self.bar.set_length(total_passes as u64);
    }

    fn on_pass_start(&self, _pass: usize, _total: usize, command: &str) {
        self.bar.set_message(command.to_string());
    }

    fn on_pass_complete(&self, pass: usize, total: usize, duration_ms: u64) {
        self.bar.println(format!(
            "  {} Pass {}/{}  {}",
            green("✓"),
            pass,
            total,
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_pass_failed(&self, pass: usize, total: usize, detail: &str, tolerated: bool) {
        let mark = if tolerated {
            self.tolerated.fetch_add(1, Ordering::SeqCst);
            yellow("⚠")
        } else {
            red("✗")
        };
        let msg = if detail.chars().count() > 80 {
            format!("{}\u{2026}", detail.chars().take(79).collect::<String>())
        } else {
            detail.to_string()
        };
        self.bar
            .println(format!("  {} Pass {}/{}  {}", mark, pass, total, dim(&msg)));
        self.bar.inc(1);
    }

    fn on_compile_complete(&self, success: bool) {
        self.bar.finish_and_clear();
        let tolerated = self.tolerated.load(Ordering::SeqCst);
        if success && tolerated == 0 {
            eprintln!("{} PDF produced", green("✔"));
        } else if success {
            eprintln!(
                "{} PDF produced  ({} pass failure(s) tolerated)",
                yellow("⚠"),
                tolerated
            );
        } else {
            eprintln!("{} Compilation failed", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP relay on port 5000
  texrelay serve --port 5000 --assets-dir ./assets

  # Compile without generation routes (no API key needed)
  texrelay serve --no-llm

  # Compile a file to PDF
  texrelay compile paper.tex -o paper.pdf

  # Show what the normaliser would change
  texrelay normalize paper.tex

  # Generate a paper and compile it
  texrelay generate --topic "Sparse attention" -o paper.tex --compile

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides -v / -q)
"#;

#[derive(Parser, Debug)]
#[command(
    name = "texrelay",
    version,
    about = "LaTeX compilation relay for AI-assisted research writing",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    relay: RelayArgs,

    #[arg(short, long, global = true, env = "TEXRELAY_VERBOSE")]
    verbose: bool,

    #[arg(short, long, global = true, env = "TEXRELAY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP relay.
    Serve {
        #[arg(long, env = "TEXRELAY_HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, env = "TEXRELAY_PORT", default_value_t = 5000)]
        port: u16,

        #[arg(long, env = "TEXRELAY_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
        max_body_bytes: usize,

        /// Start without an LLM; generation routes answer with an error.
        #[arg(long, env = "TEXRELAY_NO_LLM")]
        no_llm: bool,
    },

    /// Compile a LaTeX file (or `-` for stdin) to PDF.
    Compile {
        input: String,

        /// Output path. Defaults to the input with a `.pdf` extension, or
        /// `preview.pdf` for stdin.
        #[arg(short, long, env = "TEXRELAY_OUTPUT")]
        output: Option<PathBuf>,

        #[arg(long, env = "TEXRELAY_NO_PROGRESS")]
        no_progress: bool,

        /// Print compile stats as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Print the normalised source without compiling.
    Normalize {
        input: String,

        /// Print the full normalisation report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate a paper with the LLM.
    Generate {
        #[arg(long)]
        topic: String,

        #[arg(long)]
        research_question: Option<String>,

        #[arg(long)]
        methodology: Option<String>,

        #[arg(long)]
        length: Option<String>,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        style: Option<String>,

        /// Where to write the LaTeX. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also compile the result next to the `.tex` output.
        #[arg(long, requires = "output")]
        compile: bool,
    },
}

/// Flags that map onto `RelayConfig`.
#[derive(Args, Debug)]
struct RelayArgs {
    #[arg(long, global = true, env = "TEXRELAY_DOCUMENT_CLASS")]
    class: Option<String>,

    #[arg(long, global = true, env = "TEXRELAY_ASSETS_DIR")]
    assets_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "TEXRELAY_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    #[arg(long, global = true, env = "TEXRELAY_COMPILER")]
    compiler: Option<String>,

    #[arg(long, global = true, env = "TEXRELAY_BIB_TOOL")]
    bib_tool: Option<String>,

    #[arg(long, global = true, env = "TEXRELAY_PASS_TIMEOUT")]
    pass_timeout: Option<u64>,

    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    #[arg(long, global = true, env = "TEXRELAY_TEMPERATURE")]
    temperature: Option<f32>,

    #[arg(long, global = true, env = "TEXRELAY_MAX_TOKENS")]
    max_tokens: Option<usize>,

    #[arg(long, global = true, env = "TEXRELAY_MAX_RETRIES")]
    max_retries: Option<u32>,

    #[arg(long, global = true, env = "TEXRELAY_API_TIMEOUT")]
    api_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `compile`.
    let show_progress = matches!(
        cli.command,
        Command::Compile { no_progress: false, json: false, .. }
    ) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn CompileProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli.relay, progress)?;

    match cli.command {
        Command::Serve {
            host,
            port,
            max_body_bytes,
            no_llm,
        } => {
            let generator: Arc<dyn TextGenerator> = if no_llm {
                Arc::new(UnconfiguredGenerator::new(
                    "The server was started with --no-llm.",
                ))
            } else {
                Arc::new(
                    LlmGenerator::from_config(&config)
                        .context("No LLM provider available (use --no-llm to serve compile routes only)")?,
                )
            };
            let state = AppState::new(config, generator);
            server::serve(
                state,
                ServerConfig {
                    host,
                    port,
                    max_body_bytes,
                },
            )
            .await
            .context("Server failed")?;
        }

        Command::Compile {
            input,
            output,
            json,
            ..
        } => {
            let latex = read_input(&input).await?;
            let output_path = output.unwrap_or_else(|| default_pdf_path(&input));
            match compile_to_file(&latex, &output_path, &config).await {
                Ok(stats) => {
                    if json {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&stats)
                                .context("Failed to serialise stats")?
                        );
                    } else if !cli.quiet {
                        eprintln!(
                            "{}  {} pass(es)  {} bytes  {}ms  →  {}",
                            green("✔"),
                            stats.passes.len(),
                            stats.pdf_bytes,
                            stats.total_duration_ms,
                            bold(&output_path.display().to_string()),
                        );
                        if stats.images_missing > 0 {
                            eprintln!(
                                "   {} missing image(s) replaced by placeholders",
                                yellow(&stats.images_missing.to_string())
                            );
                        }
                    }
                }
                Err(e) => {
                    if let Some(log) = e.log() {
                        eprintln!("{}", dim(log));
                    }
                    return Err(e).context("Compilation failed");
                }
            }
        }

        Command::Normalize { input, json } => {
            let latex = read_input(&input).await?;
            let doc = normalize_latex(&latex, &config).context("Normalisation failed")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&doc).context("Failed to serialise report")?
                );
            } else {
                let mut handle = io::stdout().lock();
                handle
                    .write_all(doc.source.as_bytes())
                    .context("Failed to write to stdout")?;
                if !doc.source.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
        }

        Command::Generate {
            topic,
            research_question,
            methodology,
            length,
            domain,
            style,
            output,
            compile,
        } => {
            let generator = LlmGenerator::from_config(&config).context("No LLM provider available")?;
            let request = PaperRequest {
                topic: Some(topic),
                research_question,
                methodology,
                length,
                domain,
                style,
            };
            let paper = research::generate_paper(&generator, &request, &config.document_class)
                .await
                .context("Paper generation failed")?;

            match output {
                Some(ref path) => {
                    tokio::fs::write(path, &paper)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !cli.quiet {
                        eprintln!("{} Wrote {}", green("✔"), bold(&path.display().to_string()));
                    }
                    if compile {
                        let pdf_path = path.with_extension("pdf");
                        compile_generated(&paper, &pdf_path, &config).await?;
                        if !cli.quiet {
                            eprintln!(
                                "{} Compiled {}",
                                green("✔"),
                                bold(&pdf_path.display().to_string())
                            );
                        }
                    }
                }
                None => {
                    io::stdout()
                        .lock()
                        .write_all(paper.as_bytes())
                        .context("Failed to write to stdout")?;
                }
            }
        }
    }

    Ok(())
}

fn build_config(args: &RelayArgs, progress: Option<ProgressCallback>) -> Result<RelayConfig> {
    let mut builder = RelayConfig::builder();

    if let Some(ref class) = args.class {
        builder = builder.document_class(class);
    }
    if let Some(ref dir) = args.assets_dir {
        builder = builder.assets_dir(dir);
    }
    if let Some(ref dir) = args.workspace_root {
        builder = builder.workspace_root(dir);
    }
    if let Some(ref compiler) = args.compiler {
        builder = builder.compiler(compiler);
    }
    if let Some(ref tool) = args.bib_tool {
        builder = builder.bib_tool(tool);
    }
    if let Some(secs) = args.pass_timeout {
        builder = builder.pass_timeout_secs(secs);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(n) = args.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read LaTeX from stdin")?;
        return Ok(buf);
    }
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn default_pdf_path(input: &str) -> PathBuf {
    if input == "-" {
        PathBuf::from("preview.pdf")
    } else {
        Path::new(input).with_extension("pdf")
    }
}

async fn compile_generated(paper: &str, pdf_path: &Path, config: &RelayConfig) -> Result<()> {
    match compile_to_file(paper, pdf_path, config).await {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Some(log) = e.log() {
                eprintln!("{}", dim(log));
            }
            if matches!(e, RelayError::PdfNotFound { .. } | RelayError::PassFailed { .. }) {
                bail!("Generated paper did not compile: {}", e);
            }
            Err(e).context("Compilation failed")
        }
    }
}
