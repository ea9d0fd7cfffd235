use anyhow::{bail, Context, Result};
use clap::Parser;
use pipeline::{
    config::PipelineConfig,
    logs, preferences, scan, tools,
    Job, JobStatus, Pipeline, PipelineEvent,
};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use log::{info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Convert video files to AV1 (SVT-AV1), one at a time
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video files, or directories to search for mp4/avi/mov/mkv files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Destination folder (defaults to the last one used, then the Desktop)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print pipeline events as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(app_log: File, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(app_log)))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let cfg = PipelineConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Logs directory and app.log
    let app_dir = tools::app_dir()?;
    let logs_dir = cfg.resolved_logs_dir(&app_dir);
    logs::prepare_logs_dir(&logs_dir)?;
    init_logging(logs::open_app_log(&logs_dir)?, args.verbose);
    logs::cleanup_old_logs(&logs_dir, logs::MAX_LOG_AGE);

    info!("av1q starting");
    info!("Application directory: {}", app_dir.display());

    let tool_paths = tools::locate_tools(&cfg, &app_dir)
        .context("FFmpeg or FFprobe not found; install both or set ffmpeg_bin/ffprobe_bin")?;
    info!("Using FFmpeg: {}", tool_paths.ffmpeg.display());
    info!("Using FFprobe: {}", tool_paths.ffprobe.display());

    // Destination folder
    let prefs_path = app_dir.join(preferences::PREFERENCES_FILE);
    let mut prefs = preferences::Preferences::load(&prefs_path);
    let destination = preferences::confirm_destination(args.dest.as_deref(), &mut prefs, &prefs_path)?;

    let sources = scan::collect_sources(&args.inputs);
    if sources.is_empty() {
        bail!("No video files found in the given inputs");
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Pipeline::new(&tool_paths, &logs_dir, &cfg, Arc::new(tx));
    let queue = pipeline.queue();

    // Probe everything up front; unreadable files are reported and skipped
    let report = pipeline.submit(&sources, &destination).await;
    for (path, err) in &report.failures {
        warn!("Skipping {}: {}", path.display(), err);
        if !args.json {
            eprintln!("⚠️  Skipping {}: {}", path.display(), err);
        }
    }
    if report.descriptors.is_empty() {
        bail!("None of the {} input file(s) could be probed", sources.len());
    }

    if !args.json {
        println!("Destination: {}", destination.display());
        println!("Queued {} file(s):", report.descriptors.len());
        for media in &report.descriptors {
            println!(
                "  {}  [{} | {} frames | {} | {}]",
                media.full_path.display(),
                media.duration,
                media.frame_count,
                media.codec,
                media.size
            );
        }
    }

    // Ctrl-C lets the current encode finish and starts nothing new
    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        let json = args.json;
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current job");
                if !json {
                    eprintln!("\n⏹️  Stopping after the current job...");
                }
                stop.cancel();
            }
        }
    });

    let printer = tokio::spawn(print_events(rx, Arc::clone(&queue), args.json));

    let summary = pipeline.run_until_drained(&stop).await;

    // Dropping the pipeline closes the event channel and ends the printer
    drop(pipeline);
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }

    let snapshot = queue.snapshot();
    if !args.json {
        print_summary(&snapshot.finished, snapshot.pending.len());
    }
    info!(
        "Done: {} completed, {} failed, {} not started",
        summary.completed,
        summary.failed,
        snapshot.pending.len()
    );

    Ok(())
}

async fn print_events(mut rx: UnboundedReceiver<PipelineEvent>, queue: Arc<pipeline::JobQueue>, json: bool) {
    let mut stdout = std::io::stdout();

    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
            continue;
        }

        match event {
            PipelineEvent::Progress(sample) => {
                let name = queue
                    .snapshot()
                    .running
                    .map(|job| job.file_name())
                    .unwrap_or_default();
                if sample.speed_factor.is_empty() {
                    print!("\r🎬 {}  {:>6.2}%          ", name, sample.percentage);
                } else {
                    print!("\r🎬 {}  {:>6.2}%  speed {}   ", name, sample.percentage, sample.speed_factor);
                }
                let _ = stdout.flush();
            }
            PipelineEvent::Completion { output_path } => {
                println!("\n✅ Converted: {}", output_path.display());
            }
            PipelineEvent::Error { message } => {
                println!("\n❌ Failed: {}", message);
            }
            PipelineEvent::Next => {}
        }
    }
}

fn print_summary(finished: &[Job], not_started: usize) {
    let completed: Vec<&Job> = finished.iter().filter(|j| j.status == JobStatus::Completed).collect();
    let failed: Vec<&Job> = finished.iter().filter(|j| j.status == JobStatus::Failed).collect();

    println!();
    println!("Summary: {} completed, {} failed, {} not started", completed.len(), failed.len(), not_started);
    for job in completed {
        println!("  ✅ {} -> {}{}", job.file_name(), job.output_path.display(), elapsed(job));
    }
    for job in failed {
        println!(
            "  ❌ {}: {}",
            job.file_name(),
            job.reason.as_deref().unwrap_or("unknown error")
        );
    }
}

fn elapsed(job: &Job) -> String {
    match (job.started_at, job.finished_at) {
        (Some(started), Some(finished)) => format!(" ({}s)", (finished - started).num_seconds()),
        _ => String::new(),
    }
}

