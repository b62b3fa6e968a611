//! CLI binary for docx2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, drives a progress bar and reports the result.

use anyhow::{Context, Result};
use clap::Parser;
use docx2pdf::{
    convert_to_file, extract_html, inspect, ConversionConfig, ConversionProgressCallback,
    ProgressCallback, SliceMode, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Percentage bar fed by the conversion's progress checkpoints.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:<11} [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_progress(&self, percent: f32) {
        self.bar.set_position(percent.round() as u64);
    }

    fn on_stage(&self, stage: Stage) {
        let prefix = match stage {
            Stage::Extract => "Extracting",
            Stage::Render => "Rendering",
            Stage::Assemble => "Assembling",
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message("");
    }

    fn on_page_placed(&self, page_num: usize, total_pages: usize) {
        self.bar.set_message(format!("page {page_num}/{total_pages}"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes report.pdf next to the input)
  docx2pdf report.docx

  # Explicit output path
  docx2pdf report.docx -o out/report.pdf

  # Sharper raster, one embedded band per page
  docx2pdf --scale 3 --slice-mode crop report.docx

  # Map a custom paragraph style
  docx2pdf --style-rule "p[style-name='Callout'] => blockquote:fresh" report.docx

  # Look at the intermediate HTML
  docx2pdf --html report.docx > report.html

  # Document properties only
  docx2pdf --inspect-only --json report.docx

ENVIRONMENT VARIABLES:
  RUST_LOG              Log filter (overrides -v / -q)
  DOCX2PDF_FONT_DIR     Extra font directory
  DOCX2PDF_SCALE        Supersampling factor
  DOCX2PDF_SLICE_MODE   shift | crop

FONTS:
  Text is drawn with an installed sans-serif face: Arial, Helvetica,
  Liberation Sans, Arimo or DejaVu Sans. Use --font-dir when none of them
  is installed system-wide.
"#;

/// Convert DOCX documents to paginated, image-based PDF.
#[derive(Parser, Debug)]
#[command(
    name = "docx2pdf",
    version,
    about = "Convert DOCX documents to paginated, image-based PDF",
    long_about = "Convert a DOCX document to PDF by rendering it as a styled page image and \
slicing that image across US-Letter pages. The output PDF has no selectable text.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// DOCX file to convert.
    input: PathBuf,

    /// Write the PDF here. Default: the input path with a `.pdf` extension.
    #[arg(short, long, env = "DOCX2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Supersampling factor applied to the 96 DPI layout (0.5–4.0).
    #[arg(long, env = "DOCX2PDF_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// How the raster is spread over pages.
    #[arg(long, env = "DOCX2PDF_SLICE_MODE", value_enum, default_value = "shift")]
    slice_mode: SliceModeArg,

    /// Extra directory scanned for font files (repeatable).
    #[arg(long, env = "DOCX2PDF_FONT_DIR")]
    font_dir: Vec<PathBuf>,

    /// Extra style-mapping rule, e.g. "p[style-name='Quote'] => blockquote:fresh" (repeatable).
    #[arg(long = "style-rule", env = "DOCX2PDF_STYLE_RULE")]
    style_rules: Vec<String>,

    /// Do not append the built-in default style-mapping rules.
    #[arg(long, env = "DOCX2PDF_NO_DEFAULT_STYLE_MAP")]
    no_default_style_map: bool,

    /// Fail on undecodable images instead of drawing a placeholder.
    #[arg(long, env = "DOCX2PDF_STRICT_IMAGES")]
    strict_images: bool,

    /// Print the intermediate HTML fragment to stdout instead of converting.
    #[arg(long)]
    html: bool,

    /// Print document properties only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "DOCX2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SliceModeArg {
    Shift,
    Crop,
}

impl From<SliceModeArg> for SliceMode {
    fn from(v: SliceModeArg) -> Self {
        match v {
            SliceModeArg::Shift => SliceMode::Shift,
            SliceModeArg::Crop => SliceMode::Crop,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.html && !cli.inspect_only;
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

    let progress = show_progress.then(CliProgressCallback::new);

    match run(&cli, progress.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(p) = &progress {
                p.bar.abandon();
            }
            tracing::error!("{:#}", e);
            eprintln!("{} {}", red("✘"), bold("Conversion failed"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, progress: Option<Arc<CliProgressCallback>>) -> Result<()> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            let fields = [
                ("Title", &meta.title),
                ("Subject", &meta.subject),
                ("Creator", &meta.creator),
                ("Description", &meta.description),
                ("Keywords", &meta.keywords),
                ("Modified by", &meta.last_modified_by),
                ("Created", &meta.created),
                ("Modified", &meta.modified),
            ];
            for (label, value) in fields {
                if let Some(v) = value {
                    println!("{:<13} {}", format!("{label}:"), v);
                }
            }
            println!("Paragraphs:   {}", meta.paragraph_count);
            println!("Headings:     {}", meta.heading_count);
            println!("Tables:       {}", meta.table_count);
            println!("Images:       {}", meta.image_count);
            println!("Charts:       {}", meta.chart_count);
        }
        return Ok(());
    }

    // ── HTML dump mode ───────────────────────────────────────────────────
    if cli.html {
        let bytes = tokio::fs::read(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input.display()))?;
        let config = build_config(cli, None)?;
        let fragment = extract_html(&bytes, &config).context("Failed to extract markup")?;
        for w in &fragment.warnings {
            tracing::warn!("{}", w);
        }
        let mut out = io::stdout().lock();
        out.write_all(fragment.html.as_bytes())
            .and_then(|_| out.write_all(b"\n"))
            .context("Failed to write to stdout")?;
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let callback = progress
        .clone()
        .map(|cb| cb as Arc<dyn ConversionProgressCallback>);
    let config = build_config(cli, callback)?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    // ── Run conversion ───────────────────────────────────────────────────
    let stats = convert_to_file(&cli.input, &output_path, &config)
        .await
        .context("Conversion failed")?;

    if let Some(p) = &progress {
        p.bar.finish_and_clear();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}  {}ms  →  {}",
            green("✔"),
            stats.page_count,
            dim(&format!("{}x{} px", stats.raster_width, stats.raster_height)),
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .scale(cli.scale)
        .slice_mode(cli.slice_mode.into())
        .include_default_style_map(!cli.no_default_style_map)
        .allow_taint(!cli.strict_images);
    for dir in &cli.font_dir {
        builder = builder.font_dir(dir.clone());
    }
    for rule in &cli.style_rules {
        builder = builder.style_rule(rule.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// `report.docx` → `report.pdf`; names without an extension get `.pdf` appended.
fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_defaults_to_input_stem() {
        assert_eq!(
            default_output_path(Path::new("dir/report.docx")),
            PathBuf::from("dir/report.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("legacy.doc")),
            PathBuf::from("legacy.pdf")
        );
        assert_eq!(default_output_path(Path::new("notes")), PathBuf::from("notes.pdf"));
    }

    #[test]
    fn flags_map_to_config() {
        let cli = Cli::parse_from([
            "docx2pdf",
            "in.docx",
            "--scale",
            "1.5",
            "--slice-mode",
            "crop",
            "--strict-images",
            "--no-default-style-map",
            "--style-rule",
            "p[style-name='Quote'] => blockquote:fresh",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.scale, 1.5);
        assert_eq!(config.slice_mode, SliceMode::Crop);
        assert!(!config.allow_taint);
        assert!(!config.include_default_style_map);
        assert_eq!(config.style_map.len(), 1);
    }

    #[test]
    fn invalid_scale_is_rejected() {
        let cli = Cli::parse_from(["docx2pdf", "in.docx", "--scale", "9"]);
        assert!(build_config(&cli, None).is_err());
    }
}
