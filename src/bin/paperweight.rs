//! CLI binary for paperweight.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! drives one batch (or a resume), and writes the archive.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paperweight::{
    BatchConfig, BatchOrchestrator, BatchOutcome, BatchProgressCallback, DirectoryStore, ItemError,
    LlmGlyphRecognizer, Margin, OutputLayout, PaperSize, PdfBackend, ProgressCallback,
    ProgressSnapshot, ResourceMode, SourceTask,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over all items plus a log line per
/// finished or failed item.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until the pre-scan reports the item total.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Counting items…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, snapshot: &ProgressSnapshot) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(snapshot.total_file_count as u64);
        self.bar.set_position(snapshot.processed_file_count as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, snapshot: &ProgressSnapshot) {
        self.activate_bar(snapshot);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Converting {} file(s)…",
                snapshot.total_file_count - snapshot.processed_file_count
            ))
        ));
    }

    fn on_item_start(&self, _task_index: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_page_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar
            .set_message(format!("{:>3.0}%", snapshot.current_page_percent));
    }

    fn on_item_complete(&self, path: &str, snapshot: &ProgressSnapshot) {
        self.bar.println(format!("  {} {}", green("✓"), path));
        self.bar.set_position(snapshot.processed_file_count as u64);
    }

    fn on_item_error(&self, error: &ItemError, snapshot: &ProgressSnapshot) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = error.to_string();
        let msg = if msg.chars().count() > 100 {
            format!("{}\u{2026}", msg.chars().take(99).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!("  {} {}", red("✗"), red(&msg)));
        self.bar.set_position(snapshot.processed_file_count as u64);
    }

    fn on_batch_complete(&self, completed: bool, snapshot: &ProgressSnapshot) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let ok = snapshot.processed_file_count.saturating_sub(failed);
        let mark = if !completed || failed > 0 {
            cyan("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{} {}/{} files converted{}",
            mark,
            bold(&ok.to_string()),
            snapshot.total_file_count,
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a source tree (Safe mode, resumable)
  paperweight ./my-project -o out/

  # Many small files, fast, no journal
  paperweight --mode fast notes/*.txt

  # Flatten the tree and use US Letter paper
  paperweight --layout flat --paper letter ./docs

  # Continue an interrupted run
  paperweight --resume

  # Learn bitmaps for characters the font could not draw, then resume
  paperweight --recover-glyphs --resume

DUMP FILES:
  A single text file can carry many files, each introduced by a line
      ### **path/to/file.ext** ###
  Every marked section becomes its own PDF.

ENVIRONMENT VARIABLES:
  PAPERWEIGHT_STORE_DIR   Where journals, artifacts and learned glyphs live
  OPENAI_API_KEY          Used by --recover-glyphs
  ANTHROPIC_API_KEY       Used by --recover-glyphs
  EDGEQUAKE_LLM_PROVIDER  Override provider for --recover-glyphs
  EDGEQUAKE_MODEL         Override model for --recover-glyphs
"#;

/// Batch-convert text and source files to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "paperweight",
    version,
    about = "Batch-convert text and source files to paginated PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files or directories to convert. Directories are walked recursively.
    inputs: Vec<PathBuf>,

    /// Directory the archive is written to.
    #[arg(short, long, env = "PAPERWEIGHT_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Archive base name. Default: Convert_<unix millis>.
    #[arg(long, env = "PAPERWEIGHT_NAME")]
    name: Option<String>,

    /// fast: in-memory, no journal; safe: every file persisted, resumable.
    #[arg(long, env = "PAPERWEIGHT_MODE", value_enum, default_value = "safe")]
    mode: ModeArg,

    /// mirror: keep the source tree; flat: one folder per input root.
    #[arg(long, env = "PAPERWEIGHT_LAYOUT", value_enum, default_value = "mirror")]
    layout: LayoutArg,

    /// Paper size: a3, a4, a5, a6, b4, b5, letter, legal, tabloid,
    /// executive, half-letter, hagaki, or WIDTHxHEIGHT in mm.
    #[arg(long, env = "PAPERWEIGHT_PAPER", default_value = "a4")]
    paper: PaperSize,

    /// Page margin: a percentage of the short edge ("3.7%") or millimetres ("12mm").
    #[arg(long, env = "PAPERWEIGHT_MARGIN", default_value = "3.7%")]
    margin: Margin,

    /// TrueType/OpenType font to draw text with instead of the built-in faces.
    #[arg(long, env = "PAPERWEIGHT_FONT")]
    font: Option<PathBuf>,

    /// Fast mode: fail the archive once it would hold more than this many MiB.
    #[arg(long, env = "PAPERWEIGHT_MEMORY_BUDGET_MB")]
    memory_budget_mb: Option<u64>,

    /// Durable store directory.
    #[arg(long, env = "PAPERWEIGHT_STORE_DIR", default_value = ".paperweight")]
    store_dir: PathBuf,

    /// Resume the interrupted Safe-mode session instead of starting a new one.
    #[arg(long, conflicts_with = "inputs")]
    resume: bool,

    /// Ask an LLM for bitmaps of characters the font could not draw in the
    /// last run, before converting.
    #[arg(long)]
    recover_glyphs: bool,

    /// LLM provider for --recover-glyphs: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model for --recover-glyphs.
    #[arg(long, env = "EDGEQUAKE_MODEL", default_value = "gpt-4.1-mini")]
    model: String,

    /// Disable progress bar.
    #[arg(long, env = "PAPERWEIGHT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPERWEIGHT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPERWEIGHT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Fast,
    Safe,
}

impl From<ModeArg> for ResourceMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Fast => ResourceMode::Fast,
            ModeArg::Safe => ResourceMode::Safe,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Mirror,
    Flat,
}

impl From<LayoutArg> for OutputLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::Mirror => OutputLayout::Mirror,
            LayoutArg::Flat => OutputLayout::Flat,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    if cli.inputs.is_empty() && !cli.resume && !cli.recover_glyphs {
        anyhow::bail!("Nothing to do: pass files or directories, --resume, or --recover-glyphs");
    }

    let store = DirectoryStore::open(&cli.store_dir)
        .with_context(|| format!("Failed to open store at {}", cli.store_dir.display()))?;
    let mut orchestrator = BatchOrchestrator::new(Arc::new(store), Arc::new(PdfBackend::new()));

    // ── Ctrl-C requests a stop at the next file boundary ─────────────────
    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} stopping after the current file…", cyan("◆"));
            stop.request_stop();
        }
    });

    // ── Glyph recovery ───────────────────────────────────────────────────
    if cli.recover_glyphs {
        let recognizer = match &cli.provider {
            Some(provider) => LlmGlyphRecognizer::from_name(provider, &cli.model),
            None => LlmGlyphRecognizer::from_env(),
        }
        .context("Failed to set up the glyph recognizer")?;

        let report = orchestrator
            .recover_missing(&recognizer)
            .await
            .context("Glyph recovery failed")?;
        if !cli.quiet {
            eprintln!(
                "{} learned {} glyph(s), {} still missing",
                if report.failed.is_empty() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                report.learned.len(),
                report.failed.len()
            );
        }
        if cli.inputs.is_empty() && !cli.resume {
            return Ok(());
        }
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let outcome = if cli.resume {
        orchestrator
            .resume_batch(progress_cb)
            .await
            .context("Resume failed")?
    } else {
        let queue = collect_tasks(&cli.inputs)?;
        let config = build_config(&cli, progress_cb)?;
        orchestrator
            .start_batch(queue, config)
            .await
            .context("Conversion failed")?
    };

    match outcome {
        BatchOutcome::Done {
            archive,
            completed,
            report,
        } => {
            let path = archive
                .save_in(&cli.output)
                .await
                .with_context(|| format!("Failed to write archive to {}", cli.output.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} file(s)  →  {}",
                    if report.error_count() == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    report.artifacts.len(),
                    bold(&path.display().to_string()),
                );
                if !completed {
                    eprintln!(
                        "   {} run `paperweight --resume` to convert the rest",
                        dim("stopped early;")
                    );
                }
                if !report.missing.is_empty() {
                    eprintln!(
                        "   {} character(s) could not be drawn: {}",
                        report.missing.len(),
                        dim(&report.missing.join(" "))
                    );
                    eprintln!("   {}", dim("try `paperweight --recover-glyphs`"));
                }
            }
        }
        BatchOutcome::Partial {
            session_id,
            remaining,
            report,
            ..
        } => {
            eprintln!(
                "{} stopped by a storage fault with {} file(s) left (session {})",
                red("✘"),
                remaining.len(),
                session_id
            );
            if let Some(entry) = report.log.last() {
                eprintln!("   {}", entry.message);
            }
            anyhow::bail!("Batch incomplete; free some space and run `paperweight --resume`");
        }
    }

    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .mode(cli.mode.into())
        .layout(cli.layout.into())
        .paper(cli.paper)
        .margin(cli.margin);

    if let Some(name) = &cli.name {
        builder = builder.archive_base_name(name.clone());
    }
    if let Some(font) = &cli.font {
        builder = builder.custom_font(font.clone());
    }
    if let Some(mb) = cli.memory_budget_mb {
        builder = builder.fast_memory_budget(mb.saturating_mul(1024 * 1024));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One task per file; directories are walked in sorted order so the queue
/// (and therefore path numbering) is deterministic.
fn collect_tasks(inputs: &[PathBuf]) -> Result<Vec<SourceTask>> {
    let mut tasks = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let root = input
                .canonicalize()
                .with_context(|| format!("Cannot resolve {}", input.display()))?;
            walk(&root, &root, &mut tasks)?;
        } else {
            tasks.push(
                SourceTask::from_file(input, None)
                    .with_context(|| format!("Cannot read {}", input.display()))?,
            );
        }
    }
    Ok(tasks)
}

fn walk(root: &Path, dir: &Path, tasks: &mut Vec<SourceTask>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk(root, &path, tasks)?;
        } else if path.is_file() {
            tasks.push(
                SourceTask::from_file(&path, Some(root))
                    .with_context(|| format!("Cannot read {}", path.display()))?,
            );
        }
    }
    Ok(())
}
