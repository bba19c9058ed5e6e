use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use ffmpeg_next::util::log::Level;
use indicatif::{ProgressBar, ProgressStyle};
use markscan::{
    DedupStrategy, FrameSource, InMemoryMarkerStore, MarkerSink, OperationType, ProcessingMode,
    ProgressCallback, ProgressInfo, RecognizerFactory, ScanOptions, Scanner, VideoFile, import_csv,
    save_csv, write_json_summary,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CLI_AFTER_HELP: &str = "Examples:\n  markscan probe reel_03.mov --json\n  markscan scan reel_03.mov --engine ocr-json --progress\n  markscan scan reel_03.mov --start 00:10:00 --end 00:12:30 --dedup window --json events.json\n  markscan markers reel_03_detected_frames.csv\n  markscan completions zsh > _markscan";

#[derive(Debug, Parser)]
#[command(
    name = "markscan",
    version,
    about = "Find burned-in VFX and DI review captions in video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while scanning.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    ffmpeg_log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan a video for marker captions and write the event log.
    #[command(about = "Scan a video for VFX/DI captions")]
    Scan {
        input: String,
        /// 3D LUT (.cube) applied to caption regions before recognition.
        #[arg(long)]
        lut: Option<PathBuf>,
        /// Start time (HH:MM:SS:FF, HH:MM:SS, MM:SS or seconds).
        #[arg(long)]
        start: Option<String>,
        /// End time, same layouts as --start.
        #[arg(long)]
        end: Option<String>,
        /// Recognise every batch on the calling thread.
        #[arg(long, conflicts_with = "parallel")]
        sequential: bool,
        /// Always recognise on the worker pool.
        #[arg(long)]
        parallel: bool,
        /// CSV output path. Defaults to <input-stem>_detected_frames.csv.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write a JSON summary to this path.
        #[arg(long)]
        json: Option<PathBuf>,
        /// Recognition program; reads a PNG path, prints a JSON array.
        #[arg(long)]
        engine: Option<String>,
        /// Worker threads for recognition.
        #[arg(long)]
        workers: Option<usize>,
        /// Tasks per recognition batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Deduplication strategy (run, window).
        #[arg(long, default_value = "run")]
        dedup: String,
        /// Drop reads below this confidence.
        #[arg(long)]
        min_confidence: Option<f64>,
    },

    /// Print video stream information.
    #[command(about = "Show frame rate, size and length of a video")]
    Probe {
        input: String,
        #[arg(long)]
        json: bool,
    },

    /// Replay a CSV event log as timeline markers.
    #[command(about = "Preview the markers a CSV event log produces")]
    Markers {
        csv: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_dedup_strategy(value: &str) -> Option<DedupStrategy> {
    match value.to_ascii_lowercase().as_str() {
        "run" | "runs" | "continuous" => Some(DedupStrategy::continuous_run()),
        "window" | "time" | "time-window" => Some(DedupStrategy::time_window()),
        _ => None,
    }
}

fn parse_ffmpeg_log_level(value: &str) -> Option<Level> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(Level::Quiet),
        "panic" => Some(Level::Panic),
        "fatal" => Some(Level::Fatal),
        "error" => Some(Level::Error),
        "warning" | "warn" => Some(Level::Warning),
        "info" => Some(Level::Info),
        "verbose" => Some(Level::Verbose),
        "debug" => Some(Level::Debug),
        "trace" => Some(Level::Trace),
        _ => None,
    }
}

fn default_csv_path(input: &str) -> PathBuf {
    let input = Path::new(input);
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "markscan".to_string());
    input.with_file_name(format!("{stem}_detected_frames.csv"))
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to install logger: {error}"))?;

    let level = match &global.ffmpeg_log_level {
        Some(value) => parse_ffmpeg_log_level(value)
            .ok_or(format!("unsupported --ffmpeg-log-level: {value}"))?,
        None => Level::Error,
    };
    ffmpeg_next::util::log::set_level(level);

    Ok(())
}

/// Renders scan progress on one terminal bar, restarted for each phase.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let phase = match info.operation {
            OperationType::Recognition => "recognising batches",
            _ => "classifying frames",
        };
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        self.bar.set_message(phase);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Scan {
            input,
            lut,
            start,
            end,
            sequential,
            parallel,
            out,
            json,
            engine,
            workers,
            batch_size,
            dedup,
            min_confidence,
        } => {
            let csv_path = out.unwrap_or_else(|| default_csv_path(&input));
            ensure_writable_path(&csv_path, cli.global.overwrite)?;
            if let Some(json_path) = &json {
                ensure_writable_path(json_path, cli.global.overwrite)?;
            }

            let strategy =
                parse_dedup_strategy(&dedup).ok_or(format!("unsupported --dedup: {dedup}"))?;
            let mode = if sequential {
                ProcessingMode::Sequential
            } else if parallel {
                ProcessingMode::Parallel
            } else {
                ProcessingMode::Auto
            };

            let mut options = ScanOptions::new()
                .with_dedup(strategy)
                .with_processing_mode(mode)
                .with_recognizer(RecognizerFactory::from_engine(engine.as_deref()));
            if let Some(path) = lut {
                options = options.with_lut(path);
            }
            if let Some(workers) = workers {
                options = options.with_max_workers(workers);
            }
            if let Some(size) = batch_size {
                options = options.with_batch_size(size);
            }
            if let Some(confidence) = min_confidence {
                options = options.with_min_confidence(confidence);
            }

            let progress = if cli.global.progress {
                let progress = Arc::new(TerminalProgress::new()?);
                options = options.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };

            let report = Scanner::new(options).scan_file(&input, start.as_deref(), end.as_deref())?;
            if let Some(progress) = progress {
                progress.finish();
            }

            save_csv(&csv_path, &report.events)?;
            println!("{} {}", "saved".green().bold(), csv_path.display());
            if let Some(json_path) = json {
                write_json_summary(&json_path, &report.summary(Some(input.clone())))?;
                println!("{} {}", "saved".green().bold(), json_path.display());
            }

            let statistics = &report.statistics;
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "{} event(s) ({} VFX, {} DI) from {} frame(s), {} region(s) recognised",
                    statistics.total,
                    statistics.vfx_count,
                    statistics.di_count,
                    report.frames_processed,
                    report.tasks_staged
                )
                .green()
            );
            if cli.global.verbose {
                for event in &report.events {
                    eprintln!(
                        "{} {:>4} {} ({:.2})",
                        event.timecode, event.class, event.text, event.confidence
                    );
                }
            }
        }
        Commands::Probe { input, json } => {
            let video = VideoFile::open(&input)?;
            let info = video.info();
            if json {
                let payload = json!({
                    "path": input,
                    "width": info.width,
                    "height": info.height,
                    "fps": info.frames_per_second,
                    "frame_count": info.frame_count,
                    "duration_seconds": info.duration.as_secs_f64(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Video: {}x{} @ {:.3} fps", info.width, info.height, info.frames_per_second);
                println!("Frames: {}", info.frame_count);
                println!("Duration: {:.3}s", info.duration.as_secs_f64());
            }
        }
        Commands::Markers { csv, json } => {
            let text = fs::read_to_string(&csv)?;
            let mut timeline = InMemoryMarkerStore::new();
            let imported = import_csv(&mut timeline, &text)?;
            let markers = timeline.markers()?;
            let summary = timeline.summary()?;

            if json {
                let payload = json!({
                    "import": imported,
                    "summary": summary,
                    "markers": markers,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for marker in &markers {
                    println!("{:>8}  {:<8} {:<4} {}", marker.frame, marker.color, marker.name, marker.note);
                }
                let status = format!(
                    "{} of {} marker(s) planned, {} failed",
                    imported.success, imported.total, imported.failed
                );
                if imported.failed > 0 {
                    println!("{} {}", "warning:".yellow().bold(), status.yellow());
                } else {
                    println!("{} {}", "success:".green().bold(), status.green());
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "markscan", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
