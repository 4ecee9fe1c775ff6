use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use grids_core::{
    CellContent, GridSession, GridStore, MalformedCell, RemoteSettings, Settings, SourceClass,
    ThumbnailMirror, ThumbnailRenderer,
};
use grids_remote::{HttpTransport, RemoteCache};
use grids_render::MosaicRenderer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "grids",
    version,
    about = "pannable grid layouts with content-addressed persistence"
)]
struct Args {
    /// Override the per-user data directory
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Remote blob store endpoint, e.g. http://localhost:8077
    #[arg(long = "remote")]
    remote: Option<String>,

    /// Seconds between autosaves
    #[arg(long = "autosave")]
    autosave_secs: Option<u64>,

    /// Save once and exit instead of entering the command loop
    #[arg(long)]
    once: bool,

    /// Files, images, and grid records to open
    #[arg(required = true)]
    sources: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let project_dirs = grids_core::project_dirs()?;
    let _log_guard = init_logging(&project_dirs)?;

    let settings = Settings::load(&project_dirs.config_dir().join("config.toml"))?;
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| settings.data_dir.clone())
        .unwrap_or_else(|| project_dirs.data_local_dir().join("grids"));
    let autosave_secs = args
        .autosave_secs
        .unwrap_or(settings.autosave_interval_secs)
        .max(1);

    let store = GridStore::new(data_dir)?;
    let renderer: Arc<dyn ThumbnailRenderer> = Arc::new(MosaicRenderer::new());
    let mirror = build_mirror(&args, &settings)?;
    let mut session = GridSession::new(store, renderer, mirror);

    let warnings = session
        .open(&args.sources)
        .context("failed to open sources")?;
    report_warnings(&warnings);
    println!("opened {} cells", session.grid().len());

    if args.once {
        let record = session.exit()?;
        println!("saved {}", record.display());
        return Ok(());
    }

    run_loop(&mut session, Duration::from_secs(autosave_secs))
}

enum LoopAction {
    Continue,
    Quit,
}

fn run_loop(session: &mut GridSession, autosave: Duration) -> Result<()> {
    // Stdin is read on its own thread; the main loop wakes for either a
    // command line or an autosave deadline.
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("commands: save | in <record> | out | pan <cell> <x> <y> | cells | quit");
    let mut next_save = Instant::now() + autosave;
    loop {
        let timeout = next_save.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(line) => {
                if matches!(handle_command(session, line.trim()), LoopAction::Quit) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                match session.autosave_tick() {
                    Ok(Some(path)) => info!(path = %path.display(), "autosaved"),
                    Ok(None) => {}
                    Err(err) => warn!(err = %format!("{err:#}"), "autosave failed"),
                }
                next_save = Instant::now() + autosave;
            }
            // Stdin closed: treat it as an exit request.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let record = session.exit()?;
    println!("saved {}", record.display());
    Ok(())
}

fn handle_command(session: &mut GridSession, input: &str) -> LoopAction {
    let mut parts = input.split_whitespace();
    match parts.next() {
        None => LoopAction::Continue,
        Some("quit") | Some("exit") => LoopAction::Quit,
        Some("save") => {
            match session.save() {
                Ok(path) => println!("saved {}", path.display()),
                Err(err) => println!("error: {err:#}"),
            }
            LoopAction::Continue
        }
        Some("in") => {
            match parts.next() {
                Some(target) => match session.punch_in(Path::new(target)) {
                    Ok(warnings) => {
                        report_warnings(&warnings);
                        println!("punched in ({} cells)", session.grid().len());
                    }
                    Err(err) => println!("error: {err:#}"),
                },
                None => println!("usage: in <record.grid>"),
            }
            LoopAction::Continue
        }
        Some("out") => {
            match session.punch_out() {
                Ok(Some(warnings)) => {
                    report_warnings(&warnings);
                    println!("punched out ({} cells)", session.grid().len());
                }
                Ok(None) => println!("nothing to return to"),
                Err(err) => println!("error: {err:#}"),
            }
            LoopAction::Continue
        }
        Some("pan") => {
            let parsed = (
                parts.next().and_then(|s| s.parse::<usize>().ok()),
                parts.next().and_then(|s| s.parse::<f32>().ok()),
                parts.next().and_then(|s| s.parse::<f32>().ok()),
            );
            match parsed {
                (Some(cell), Some(x), Some(y)) => match session.pan(cell, x, y) {
                    Ok(()) => println!("cell {cell} panned to {x:.2},{y:.2}"),
                    Err(err) => println!("error: {err:#}"),
                },
                _ => println!("usage: pan <cell> <x> <y>"),
            }
            LoopAction::Continue
        }
        Some("cells") => {
            for cell in session.grid().cells() {
                let kind = match &cell.content {
                    CellContent::GridLink { .. } => "grid",
                    CellContent::InlineBytes { .. } => "bytes",
                    CellContent::File(path) => match SourceClass::of(path) {
                        SourceClass::Image => "image",
                        _ => "text",
                    },
                };
                println!(
                    "{:>3}  [{kind:>5}]  {:<32}  x={:.2} y={:.2}",
                    cell.position,
                    cell.content.label(),
                    cell.viewport.x,
                    cell.viewport.y
                );
            }
            LoopAction::Continue
        }
        Some(other) => {
            println!("unknown command: {other}");
            println!("commands: save | in <record> | out | pan <cell> <x> <y> | cells | quit");
            LoopAction::Continue
        }
    }
}

fn report_warnings(warnings: &[MalformedCell]) {
    for warning in warnings {
        warn!(%warning, "cell dropped");
        println!("warning: {warning}");
    }
}

fn build_mirror(args: &Args, settings: &Settings) -> Result<Option<Arc<dyn ThumbnailMirror>>> {
    let configured = settings.remote.clone();
    let (endpoint, remote) = match (&args.remote, configured) {
        (Some(endpoint), Some(remote)) => (endpoint.clone(), remote),
        (Some(endpoint), None) => (endpoint.clone(), RemoteSettings::default()),
        (None, Some(remote)) if !remote.endpoint.is_empty() => (remote.endpoint.clone(), remote),
        _ => return Ok(None),
    };
    if endpoint.is_empty() {
        return Err(anyhow!("remote endpoint must not be empty"));
    }
    let transport = HttpTransport::new(endpoint, Duration::from_millis(remote.timeout_ms))?;
    let cache = RemoteCache::new(Box::new(transport), remote.slurp_method);
    Ok(Some(Arc::new(cache)))
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "grids.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
