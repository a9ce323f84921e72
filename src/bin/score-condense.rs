//! CLI binary for score-condenser.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CondenseConfig`, writes the condensed pages and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use image::RgbaImage;
use score_condenser::{
    condense_to_dir, inspect, AbortSignal, CondenseConfig, CondenseProgressCallback,
    DecisionPolicy, MarginPlan, PageAnalysis, PageSelection, ProgressCallback, RenderMode,
    Thresholds,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    total: AtomicUsize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_document_start` tells us how many pages to expect.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            total: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.total.store(total, Ordering::SeqCst);
        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Condensing");
        self.bar.reset_eta();
    }
}

impl CondenseProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Condensing {total_pages} pages…"))
        ));
    }

    fn on_page_rendered(&self, page_num: usize, raster: &RgbaImage) {
        self.bar.set_message(format!(
            "page {page_num} ({}x{})",
            raster.width(),
            raster.height()
        ));
    }

    fn on_page_complete(&self, page_num: usize, raster: &RgbaImage, cached: bool) {
        let detail = if cached {
            "cached".to_string()
        } else {
            format!("{:>5} px", raster.height())
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            self.total.load(Ordering::SeqCst),
            dim(&detail),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            self.total.load(Ordering::SeqCst),
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, emitted: usize, footer: bool) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let footer_note = if footer { " + footer" } else { "" };
        if failed == 0 {
            eprintln!(
                "{} {} pages condensed{}",
                green("✔"),
                bold(&emitted.to_string()),
                footer_note
            );
        } else {
            eprintln!(
                "{} {} pages condensed{}  ({} failed)",
                cyan("⚠"),
                bold(&emitted.to_string()),
                footer_note,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Analysis dump ────────────────────────────────────────────────────────────

/// Writes each analysed page's detector results as JSON, then forwards every
/// event to the wrapped callback.
struct AnalysisDump {
    dir: PathBuf,
    inner: Option<ProgressCallback>,
}

impl AnalysisDump {
    fn write(&self, page_num: usize, analysis: &PageAnalysis, plan: &MarginPlan) -> Result<()> {
        let path = self.dir.join(analysis_file_name(page_num));
        let json = serde_json::to_vec_pretty(&serde_json::json!({
            "page": page_num,
            "analysis": analysis,
            "plan": plan,
            "sections": plan.sections(),
        }))?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))
    }
}

impl CondenseProgressCallback for AnalysisDump {
    fn on_document_start(&self, total_pages: usize) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!("Cannot create {:?}: {}", self.dir, e);
        }
        if let Some(cb) = &self.inner {
            cb.on_document_start(total_pages);
        }
    }

    fn on_page_rendered(&self, page_num: usize, raster: &RgbaImage) {
        if let Some(cb) = &self.inner {
            cb.on_page_rendered(page_num, raster);
        }
    }

    fn on_page_analyzed(&self, page_num: usize, analysis: &PageAnalysis, plan: &MarginPlan) {
        if let Err(e) = self.write(page_num, analysis, plan) {
            tracing::warn!("Analysis dump for page {} failed: {:#}", page_num, e);
        }
        if let Some(cb) = &self.inner {
            cb.on_page_analyzed(page_num, analysis, plan);
        }
    }

    fn on_page_complete(&self, page_num: usize, raster: &RgbaImage, cached: bool) {
        if let Some(cb) = &self.inner {
            cb.on_page_complete(page_num, raster, cached);
        }
    }

    fn on_page_error(&self, page_num: usize, error: &str) {
        if let Some(cb) = &self.inner {
            cb.on_page_error(page_num, error);
        }
    }

    fn on_progress(&self, percent: f32) {
        if let Some(cb) = &self.inner {
            cb.on_progress(percent);
        }
    }

    fn on_document_complete(&self, emitted: usize, footer: bool) {
        if let Some(cb) = &self.inner {
            cb.on_document_complete(emitted, footer);
        }
    }
}

/// `page-003.analysis.json` for page 3.
fn analysis_file_name(page_num: usize) -> String {
    format!("page-{page_num:03}.analysis.json")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Condense every page into ./song-condensed/
  score-condense song.pdf

  # Pick the output directory and a page range
  score-condense song.pdf -o out/ --pages 1-3

  # See what the detectors found
  score-condense song.pdf --mode debug -o debug/

  # Mark seams on the condensed pages and keep the detector results as JSON
  score-condense song.pdf --annotate --dump-analysis

  # Count stems as notes, with custom thresholds
  score-condense song.pdf --decision-policy digits-or-stems --thresholds tuned.json

  # Inspect PDF metadata only
  score-condense --inspect-only song.pdf

OUTPUT:
  page-001.png, page-002.png, ...   one image per selected page
  footer.png                         copyright strip from page 1 (normal mode)
  page-001.analysis.json, ...        detector results (--dump-analysis, computed pages only)

THRESHOLDS FILE:
  A JSON object with any subset of the detector thresholds, expressed at
  scale 1.5, e.g. {"min_staff_height_px": 30, "luminance_threshold": 190}.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory); defaults to the system library
  RUST_LOG          Override the log filter
"#;

/// Condense tablature PDFs by removing staves without notes.
#[derive(Parser, Debug)]
#[command(
    name = "score-condense",
    version,
    about = "Condense tablature PDFs by removing staves without notes",
    long_about = "Render each page of a guitar or bass tablature PDF, detect its staves, \
and drop the ones that carry no fret numbers. The remaining bands are stacked into shorter \
PNG pages, and the copyright footer of page 1 is written separately.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Output directory. Default: `<input stem>-condensed` next to the input.
    #[arg(short, long, env = "SCORE_CONDENSE_OUTPUT")]
    output: Option<PathBuf>,

    /// What to produce for each page.
    #[arg(long, env = "SCORE_CONDENSE_MODE", value_enum, default_value = "normal")]
    mode: ModeArg,

    /// Render scale (1.0 = 72 DPI, 0.25–6.0).
    #[arg(long, env = "SCORE_CONDENSE_SCALE", default_value_t = 1.5)]
    scale: f32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "SCORE_CONDENSE_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SCORE_CONDENSE_PASSWORD")]
    password: Option<String>,

    /// JSON file with threshold overrides (expressed at scale 1.5).
    #[arg(long, env = "SCORE_CONDENSE_THRESHOLDS")]
    thresholds: Option<PathBuf>,

    /// Which marks classify a staff as carrying notes.
    #[arg(long, env = "SCORE_CONDENSE_DECISION_POLICY", value_enum)]
    decision_policy: Option<PolicyArg>,

    /// Cap on either rendered dimension, in pixels.
    #[arg(long, env = "SCORE_CONDENSE_MAX_PIXELS", default_value_t = 8000)]
    max_pixels: u32,

    /// Mark section seams and redrawn lines on condensed pages.
    #[arg(long, env = "SCORE_CONDENSE_ANNOTATE")]
    annotate: bool,

    /// Write each computed page's detector results as JSON next to its PNG.
    #[arg(long, env = "SCORE_CONDENSE_DUMP_ANALYSIS")]
    dump_analysis: bool,

    /// Print run statistics as JSON on stdout.
    #[arg(long, env = "SCORE_CONDENSE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCORE_CONDENSE_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no condensing.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCORE_CONDENSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCORE_CONDENSE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Normal,
    Debug,
    Original,
}

impl From<ModeArg> for RenderMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Normal => RenderMode::Normal,
            ModeArg::Debug => RenderMode::Debug,
            ModeArg::Original => RenderMode::Original,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    DigitsOnly,
    DigitsOrStems,
}

impl From<PolicyArg> for DecisionPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::DigitsOnly => DecisionPolicy::DigitsOnly,
            PolicyArg::DigitsOrStems => DecisionPolicy::DigitsOrStems,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn CondenseProgressCallback>)
    } else {
        None
    };

    let out_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_dir(&cli.input));
    let progress_cb = if cli.dump_analysis {
        let dump = AnalysisDump {
            dir: out_dir.clone(),
            inner: progress_cb,
        };
        Some(Arc::new(dump) as ProgressCallback)
    } else {
        progress_cb
    };

    let abort = AbortSignal::new();
    let config = build_config(&cli, progress_cb, abort.clone()).await?;

    // Ctrl-C finishes the current page, then stops.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let doc = condense_to_dir(&cli.input, &out_dir, &config)
        .await
        .context("Condensing failed")?;
    let stats = &doc.stats;

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "output_dir": out_dir,
            "aborted": doc.aborted,
            "errors": doc.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            "stats": stats,
        }))
        .context("Failed to serialise stats")?;
        println!("{json}");
    } else if !cli.quiet {
        if doc.aborted {
            eprintln!(
                "{} aborted after {}/{} pages",
                red("✘"),
                stats.emitted_pages,
                stats.selected_pages
            );
        }
        if !show_progress {
            for e in &doc.errors {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
        eprintln!(
            "{}  {}/{} pages  {} cached  {}ms  →  {}",
            if stats.failed_pages == 0 && !doc.aborted {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.emitted_pages,
            stats.selected_pages,
            stats.cached_pages,
            stats.total_duration_ms,
            bold(&out_dir.display().to_string()),
        );
        if stats.source_height_px > 0 {
            eprintln!(
                "   {} px  →  {} px  ({:.0}% of rows removed)",
                dim(&stats.source_height_px.to_string()),
                dim(&stats.output_height_px.to_string()),
                stats.reduction() * 100.0,
            );
        }
    }

    Ok(())
}

/// Map CLI args to `CondenseConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    abort: AbortSignal,
) -> Result<CondenseConfig> {
    let thresholds = match cli.thresholds {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read thresholds from {:?}", path))?;
            serde_json::from_str::<Thresholds>(&text)
                .with_context(|| format!("Invalid thresholds in {:?}", path))?
        }
        None => Thresholds::default(),
    };

    let mut builder = CondenseConfig::builder()
        .scale(cli.scale)
        .mode(cli.mode.into())
        .thresholds(thresholds)
        .max_rendered_pixels(cli.max_pixels)
        .annotate_condensed(cli.annotate)
        .pages(parse_pages(&cli.pages)?)
        .abort_signal(abort);

    if let Some(policy) = cli.decision_policy {
        builder = builder.decision_policy(policy.into());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `song.pdf` → `song-condensed/` in the same directory.
fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "score".to_string());
    input.with_file_name(format!("{stem}-condensed"))
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
