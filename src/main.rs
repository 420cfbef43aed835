use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use video_edit_assistant::analysis::{AnalysisResult, HttpAnalysisService, fetch_greeting};
use video_edit_assistant::batch::BatchEvent;
use video_edit_assistant::capture::{CaptureEvent, ProcessCaptureSource};
use video_edit_assistant::chat::{GUIDE_GREETING, HttpChatService};
use video_edit_assistant::config::{
    AppConfig, KNOWN_EDITING_APPS, ensure_sample_config, parse_duration,
};
use video_edit_assistant::error::OrchestratorError;
use video_edit_assistant::media::VideoFile;
use video_edit_assistant::paths::default_config_path;
use video_edit_assistant::permissions::open_screen_recording_settings;
use video_edit_assistant::report::ResultReport;
use video_edit_assistant::screen::Screen;
use video_edit_assistant::session::{Session, SessionEvent, SessionServices};

#[derive(Debug, Parser)]
#[command(name = "video-edit-assistant")]
#[command(about = "Analyze videos for editing suggestions and get guided through the edits")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyze one or more MP4 files, newest results first.
    Analyze(AnalyzeArgs),
    /// Check that the analysis service is reachable.
    Ping(CommonArgs),
    /// Write a sample config file if none exists.
    InitConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Args, Clone)]
struct CommonArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    server_url: Option<String>,

    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,
}

#[derive(Debug, Args, Clone)]
struct AnalyzeArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,

    /// Editing app to mention in guidance (CapCut, Canva, InShot, DaVinci Resolve, Other).
    #[arg(long)]
    app: Option<String>,

    /// Open the guidance chat after the results.
    #[arg(long, action = ArgAction::SetTrue)]
    chat: bool,
}

struct Settings {
    config: AppConfig,
    request_timeout: Duration,
}

fn load_settings(common: &CommonArgs) -> Result<Settings> {
    let path = common.config.clone().unwrap_or_else(default_config_path);
    let mut config = AppConfig::load(&path)?;
    if let Some(server_url) = &common.server_url {
        config.server_url = server_url.clone();
    }
    let request_timeout = match common.timeout {
        Some(timeout) => timeout,
        None => config.request_timeout()?,
    };
    Ok(Settings {
        config,
        request_timeout,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args).await,
        Commands::Ping(common) => {
            let settings = load_settings(&common)?;
            let message =
                fetch_greeting(&settings.config.server_url, settings.request_timeout).await?;
            println!("{}: {message}", settings.config.server_url);
            Ok(())
        }
        Commands::InitConfig { config } => {
            let path = config.unwrap_or_else(default_config_path);
            if ensure_sample_config(&path)? {
                println!("wrote sample config to {}", path.display());
            } else {
                println!("config already exists at {}", path.display());
            }
            Ok(())
        }
    }
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let settings = load_settings(&args.common)?;
    let config = &settings.config;

    let services = SessionServices {
        analysis: Arc::new(HttpAnalysisService::new(
            config.server_url.clone(),
            settings.request_timeout,
        )?),
        chat: Arc::new(HttpChatService::new(
            config.server_url.clone(),
            settings.request_timeout,
        )?),
        capture: Arc::new(ProcessCaptureSource::new(
            config.capture.command.clone(),
            config.capture.args.clone(),
        )),
        request_timeout: settings.request_timeout,
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let event_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let mut session = Session::new(services, Some(event_tx));
    session.set_selected_app(args.app.clone().unwrap_or_else(|| config.selected_app.clone()));

    let outcome = submit_paths(&mut session, &args.files).await;
    if outcome.is_ok() && args.chat && session.screen() == Screen::Results {
        print_selected(&session);
        run_guide(&mut session).await;
    } else if outcome.is_ok() {
        for result in session.history().latest_batch() {
            print_result(result);
        }
    }

    session.shutdown().await;
    drop(session);
    event_handle.await.context("event task failed")?;

    outcome
}

async fn submit_paths(session: &mut Session, paths: &[PathBuf]) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match VideoFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(err) => eprintln!("skipping {}: {err:#}", path.display()),
        }
    }

    let report = session.submit(files).await?;
    if report.succeeded() == 0 {
        bail!("no videos were analyzed");
    }
    if !report.rejected.is_empty() || !report.failures.is_empty() {
        eprintln!(
            "analyzed {} of {} files ({} rejected, {} failed)",
            report.succeeded(),
            report.succeeded() + report.rejected.len() + report.failures.len(),
            report.rejected.len(),
            report.failures.len()
        );
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::ScreenChanged(screen) => log::debug!("screen: {screen}"),
        SessionEvent::Batch(BatchEvent::Rejected { name, reason }) => {
            eprintln!("{name}: {reason}")
        }
        SessionEvent::Batch(BatchEvent::Analyzing {
            position,
            total,
            name,
            size_mb,
        }) => println!("analyzing {name}, {size_mb:.1} MB ({position}/{total})..."),
        SessionEvent::Batch(BatchEvent::Failed { name, message, .. }) => {
            eprintln!("error during analysis of {name}: {message}")
        }
        SessionEvent::Batch(_) => {}
        SessionEvent::Capture(CaptureEvent::Started) => println!("screen sharing on"),
        SessionEvent::Capture(CaptureEvent::Stopped) => println!("screen sharing off"),
        SessionEvent::Capture(CaptureEvent::EndedExternally) => {
            println!("screen sharing ended by the system")
        }
        SessionEvent::Capture(CaptureEvent::Denied { message }) => eprintln!("{message}"),
        SessionEvent::SelectionChanged { index, analysis_id } => {
            log::debug!("selected #{index} ({analysis_id})")
        }
        SessionEvent::ChatReply(_) => {}
    }
}

fn print_selected(session: &Session) {
    if let Some(result) = session.history().selected() {
        print_result(result);
    }
}

fn print_result(result: &AnalysisResult) {
    println!();
    println!("Analysis Results: {} [{}]", result.source_name, result.id);
    println!(
        "Language: {}  Duration: {}  Highlights: {}  Silences: {}",
        result.detected_language,
        result.duration_label(),
        result.summary.total_highlights,
        result.summary.total_silences
    );
    println!("Editing Suggestions:");
    if result.suggestions.is_empty() {
        println!("  (none)");
    }
    for suggestion in &result.suggestions {
        println!(
            "  {:<10} {:>15}  {:>3}%  {}",
            suggestion.kind().label(),
            suggestion.span_label(),
            suggestion.confidence_percent(),
            suggestion.reason()
        );
    }
    println!();
}

fn print_history(session: &Session) {
    let selected = session.history().selected_index();
    for (index, result) in session.history().items().iter().enumerate() {
        let marker = if Some(index) == selected { '*' } else { ' ' };
        println!(
            "{marker} {index}: {} [{}] {}",
            result.source_name, result.id, result.created_at
        );
    }
}

fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    // Plain thread so a pending read never holds up runtime shutdown.
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_guide(session: &mut Session) {
    if let Err(err) = session.open_guide() {
        eprintln!("{err}");
        return;
    }
    if session.selected_app().is_empty() {
        println!("Which editing app are you using? /app <{}>", KNOWN_EDITING_APPS.join(" | "));
    }
    println!("commands: /results /history /select N /app NAME /share /guide /back /reset /analyze FILE... /export PATH | exit");
    println!("assistant: {GUIDE_GREETING}");

    let mut lines = spawn_stdin_lines();
    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if matches!(line, "exit" | "quit" | "q") {
            break;
        }
        if let Some(command) = line.strip_prefix('/') {
            handle_command(session, command).await;
            continue;
        }
        if let Some(reply) = session.send_chat(line).await {
            println!("assistant: {}", reply.text);
        }
    }
}

async fn handle_command(session: &mut Session, command: &str) {
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));

    match name {
        "results" => print_selected(session),
        "history" => print_history(session),
        "select" => match rest.parse::<usize>() {
            Ok(index) => match session.select(index) {
                Ok(_) => print_selected(session),
                Err(err) => eprintln!("{err}"),
            },
            Err(_) => eprintln!("usage: /select N"),
        },
        "app" => {
            session.set_selected_app(rest);
            if !rest.is_empty() && !KNOWN_EDITING_APPS.contains(&rest) {
                println!("using {rest:?} (not one of: {})", KNOWN_EDITING_APPS.join(", "));
            }
        }
        "share" => {
            if let Err(OrchestratorError::CaptureDenied { .. }) = session.toggle_capture().await {
                if let Err(err) = open_screen_recording_settings() {
                    log::debug!("unable to open System Settings: {err}");
                }
            }
        }
        "guide" => report_screen(session.open_guide()),
        "back" => report_screen(session.back_to_results()),
        "reset" => report_screen(Ok(session.reset())),
        "analyze" => {
            if session.screen() != Screen::Upload {
                session.reset();
            }
            let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
            match submit_paths(session, &paths).await {
                Ok(()) => print_selected(session),
                Err(err) => eprintln!("{err:#}"),
            }
        }
        "export" => export_selected(session, rest),
        _ => eprintln!("unknown command /{name}"),
    }
}

fn report_screen(outcome: Result<Screen, OrchestratorError>) {
    match outcome {
        Ok(screen) => println!("now on {screen}"),
        Err(err) => eprintln!("{err}"),
    }
}

fn export_selected(session: &Session, path: &str) {
    let Some(result) = session.history().selected() else {
        eprintln!("nothing to export yet");
        return;
    };
    if path.is_empty() {
        eprintln!("usage: /export PATH");
        return;
    }
    let report = ResultReport::new(path);
    match report.write(result, Utc::now()) {
        Ok(()) => println!("report saved: {}", report.path().display()),
        Err(err) => eprintln!("{err:#}"),
    }
}
