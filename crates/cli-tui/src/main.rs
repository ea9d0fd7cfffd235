use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use humansize::{format_size, DECIMAL};
use log::{info, warn};
use pipeline::{
    config::PipelineConfig,
    logs, preferences, scan, tools,
    JobQueue, JobStatus, Pipeline, PipelineEvent, ProgressSample, QueueSnapshot, RunSummary,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Interactive AV1 conversion queue
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

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

struct App {
    system: System,
    queue: Arc<JobQueue>,
    snapshot: QueueSnapshot,
    table_state: TableState,
    progress: Option<ProgressSample>,
    last_message: Option<String>,
    /// Output file sizes of finished jobs, read once
    output_sizes: HashMap<Uuid, Option<u64>>,
    destination: PathBuf,
    stopping: bool,
}

impl App {
    fn new(queue: Arc<JobQueue>, destination: PathBuf) -> Self {
        Self {
            system: System::new(),
            queue,
            snapshot: QueueSnapshot::default(),
            table_state: TableState::default(),
            progress: None,
            last_message: None,
            output_sizes: HashMap::new(),
            destination,
            stopping: false,
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        self.snapshot = self.queue.snapshot();
        for job in &self.snapshot.finished {
            self.output_sizes.entry(job.id).or_insert_with(|| {
                if job.status == JobStatus::Completed {
                    std::fs::metadata(&job.output_path).map(|m| m.len()).ok()
                } else {
                    None
                }
            });
        }

        // Keep the selection inside the pending list
        let len = self.snapshot.pending.len();
        match self.table_state.selected() {
            _ if len == 0 => self.table_state.select(None),
            Some(i) if i >= len => self.table_state.select(Some(len - 1)),
            None => self.table_state.select(Some(0)),
            _ => {}
        }
    }

    fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Progress(sample) => self.progress = Some(sample),
            PipelineEvent::Completion { output_path } => {
                self.last_message = Some(format!("✅ Converted: {}", output_path.display()));
            }
            PipelineEvent::Error { message } => {
                self.last_message = Some(format!("❌ {}", message));
            }
            PipelineEvent::Next => self.progress = None,
        }
    }

    fn select_offset(&mut self, delta: isize) {
        if let Some(next) = self
            .table_state
            .selected()
            .and_then(|i| offset_index(i, delta, self.snapshot.pending.len()))
        {
            self.table_state.select(Some(next));
        }
    }

    /// Move the selected queued job up (`-1`) or down (`+1`)
    fn move_selected(&mut self, delta: isize) {
        let Some(from) = self.table_state.selected() else {
            return;
        };
        let Some(to) = offset_index(from, delta, self.snapshot.pending.len()) else {
            return;
        };
        match self.queue.move_job(from, to) {
            Ok(()) => self.table_state.select(Some(to)),
            // The driver may have started the head job since the last refresh
            Err(e) => self.last_message = Some(format!("⚠️  {}", e)),
        }
        self.refresh();
    }

    fn remove_selected(&mut self) {
        let Some(index) = self.table_state.selected() else {
            return;
        };
        match self.queue.remove(index) {
            Ok(job) => {
                info!("Job {}: removed from the queue", job.id);
                self.last_message = Some(format!("Removed {}", job.file_name()));
            }
            Err(e) => self.last_message = Some(format!("⚠️  {}", e)),
        }
        self.refresh();
    }
}

/// `index + delta` if it stays within `0..len`
fn offset_index(index: usize, delta: isize, len: usize) -> Option<usize> {
    let target = index.checked_add_signed(delta)?;
    (target < len).then_some(target)
}

fn init_logging(app_log: std::fs::File, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(app_log)))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = PipelineConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Logging goes to app.log only; the terminal belongs to the UI
    let app_dir = tools::app_dir()?;
    let logs_dir = cfg.resolved_logs_dir(&app_dir);
    logs::prepare_logs_dir(&logs_dir)?;
    init_logging(logs::open_app_log(&logs_dir)?, args.verbose);
    logs::cleanup_old_logs(&logs_dir, logs::MAX_LOG_AGE);

    info!("av1q-top starting");
    info!("Application directory: {}", app_dir.display());

    let tool_paths = tools::locate_tools(&cfg, &app_dir)
        .context("FFmpeg or FFprobe not found; install both or set ffmpeg_bin/ffprobe_bin")?;
    info!("Using FFmpeg: {}", tool_paths.ffmpeg.display());
    info!("Using FFprobe: {}", tool_paths.ffprobe.display());

    let prefs_path = app_dir.join(preferences::PREFERENCES_FILE);
    let mut prefs = preferences::Preferences::load(&prefs_path);
    let destination = preferences::confirm_destination(args.dest.as_deref(), &mut prefs, &prefs_path)?;

    let sources = scan::collect_sources(&args.inputs);
    if sources.is_empty() {
        bail!("No video files found in the given inputs");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Arc::new(Pipeline::new(&tool_paths, &logs_dir, &cfg, Arc::new(tx)));

    // Probe before taking over the terminal so failures stay visible
    eprintln!("Probing {} file(s)...", sources.len());
    let report = pipeline.submit(&sources, &destination).await;
    for (path, err) in &report.failures {
        warn!("Skipping {}: {}", path.display(), err);
        eprintln!("⚠️  Skipping {}: {}", path.display(), err);
    }
    info!("Queued {} file(s) for {}", report.descriptors.len(), destination.display());
    if report.descriptors.is_empty() {
        bail!("None of the {} input file(s) could be probed", sources.len());
    }

    let shutdown = CancellationToken::new();
    let server = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let shutdown = shutdown.clone();
        async move { pipeline.serve(shutdown).await }
    });

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(pipeline.queue(), destination);
    let ui_result = run_ui(&mut terminal, &mut app, &mut rx, &shutdown);

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;
    ui_result?;

    // Quitting early still lets the running encode finish
    shutdown.cancel();
    if !server.is_finished() {
        eprintln!("Waiting for the current conversion to finish...");
    }
    let summary: RunSummary = server.await.context("Queue driver failed")?;
    let remaining = pipeline.queue().pending_len();
    info!(
        "Done: {} completed, {} failed, {} not started",
        summary.completed, summary.failed, remaining
    );
    println!(
        "Summary: {} completed, {} failed, {} not started",
        summary.completed, summary.failed, remaining
    );

    Ok(())
}

fn run_ui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: &mut UnboundedReceiver<PipelineEvent>,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        while let Ok(event) = rx.try_recv() {
            app.handle_event(event);
        }
        app.refresh();

        terminal.draw(|f| ui(f, app))?;

        // Handle input
        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        if !app.stopping {
                            info!("Quit requested, stopping after the current job");
                        }
                        app.stopping = true;
                        shutdown.cancel();
                    }
                    KeyCode::Up => app.select_offset(-1),
                    KeyCode::Down => app.select_offset(1),
                    KeyCode::Char('K') => app.move_selected(-1),
                    KeyCode::Char('J') => app.move_selected(1),
                    KeyCode::Char('x') | KeyCode::Delete => app.remove_selected(),
                    _ => {}
                }
            }
        }

        // After a quit request, leave once the running encode has finished
        if app.stopping && !app.queue.is_running() {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.size();

    if size.height < 20 || size.width < 80 {
        let error_msg = Paragraph::new("Terminal too small! Please resize to at least 80x20.")
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red));
        f.render_widget(error_msg, size);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // CPU / Memory
            Constraint::Length(3), // Current job
            Constraint::Min(5),    // Queue
            Constraint::Length(8), // Finished
            Constraint::Length(3), // Status bar
        ])
        .split(size);

    render_top_bar(f, app, chunks[0]);
    render_current_job(f, app, chunks[1]);
    render_queue_table(f, app, chunks[2]);
    render_finished_table(f, app, chunks[3]);
    render_status_bar(f, app, chunks[4]);
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() || value.is_infinite() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn render_top_bar(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let cpu_usage = clamp_percent(app.system.global_cpu_usage() as f64);

    let total_memory = app.system.total_memory();
    let memory_percent = if total_memory == 0 {
        0.0
    } else {
        clamp_percent(app.system.used_memory() as f64 / total_memory as f64 * 100.0)
    };

    let cpu_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("CPU"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(cpu_usage as u16)
        .label(format!("{:.1}%", cpu_usage));
    f.render_widget(cpu_gauge, chunks[0]);

    let memory_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(memory_percent as u16)
        .label(format!("{:.1}%", memory_percent));
    f.render_widget(memory_gauge, chunks[1]);
}

fn render_current_job(f: &mut Frame, app: &App, area: Rect) {
    let Some(job) = &app.snapshot.running else {
        let idle = Paragraph::new(if app.stopping { "Stopped" } else { "Idle" })
            .block(Block::default().borders(Borders::ALL).title("Converting"));
        f.render_widget(idle, area);
        return;
    };

    let (percent, speed) = match &app.progress {
        Some(sample) => (clamp_percent(sample.percentage), sample.speed_factor.as_str()),
        None => (0.0, ""),
    };
    let label = if speed.is_empty() {
        format!("{:.1}%", percent)
    } else {
        format!("{:.1}%  speed {}", percent, speed)
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Converting {}", truncate_string(&job.file_name(), 60))),
        )
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(percent / 100.0)
        .label(label);
    f.render_widget(gauge, area);
}

fn render_queue_table(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["#", "FILE", "DURATION", "FRAMES", "CODEC", "SIZE", "ST"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    let rows: Vec<Row> = if app.snapshot.pending.is_empty() {
        vec![Row::new(vec![
            "-".to_string(),
            "Queue is empty".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
        ])]
    } else {
        app.snapshot
            .pending
            .iter()
            .enumerate()
            .map(|(i, job)| {
                Row::new(vec![
                    (i + 1).to_string(),
                    truncate_string(&job.file_name(), 50),
                    job.media.duration.clone(),
                    job.media.frame_count.to_string(),
                    job.media.codec.clone(),
                    job.media.size.clone(),
                    status_label(job.status).to_string(),
                ])
                .height(1)
            })
            .collect()
    };

    let widths = [
        Constraint::Length(4),
        Constraint::Percentage(40),
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(11),
        Constraint::Length(5),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Queue ({})", app.snapshot.pending.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .column_spacing(1);

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_finished_table(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["ST", "FILE", "OUTPUT", "TIME", "REASON"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    // Newest first
    let visible = area.height.saturating_sub(3) as usize;
    let rows: Vec<Row> = app
        .snapshot
        .finished
        .iter()
        .rev()
        .take(visible)
        .map(|job| {
            let output_size = app
                .output_sizes
                .get(&job.id)
                .copied()
                .flatten()
                .map(|b| format_size(b, DECIMAL))
                .unwrap_or_else(|| "-".to_string());

            let duration = match (job.started_at, job.finished_at) {
                (Some(started), Some(finished)) => format!("{}s", (finished - started).num_seconds()),
                _ => "-".to_string(),
            };

            Row::new(vec![
                status_label(job.status).to_string(),
                truncate_string(&job.file_name(), 40),
                output_size,
                duration,
                truncate_string(job.reason.as_deref().unwrap_or("-"), 40),
            ])
            .height(1)
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Percentage(35),
        Constraint::Length(10),
        Constraint::Length(7),
        Constraint::Percentage(40),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Finished ({})", app.snapshot.finished.len())),
        )
        .column_spacing(1);

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let dest_display = app.destination.display().to_string();
    let message = app.last_message.as_deref().unwrap_or("");
    let keys = if app.stopping {
        "stopping after current job"
    } else {
        "q=quit ↑/↓=select K/J=move x=remove"
    };

    let status_text = format!(
        "Dest: {} | {} | {}",
        truncate_string(&dest_display, 35),
        keys,
        truncate_string(message, 60)
    );

    let paragraph = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(ratatui::widgets::Wrap { trim: true });

    f.render_widget(paragraph, area);
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "WAIT",
        JobStatus::Running => "RUN",
        JobStatus::Completed => "OK",
        JobStatus::Failed => "FAIL",
    }
}

/// Shorten `s` to at most `max_len` characters, marking the cut with `...`
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
