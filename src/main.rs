#![forbid(unsafe_code)]

mod companion;
mod config;
mod constants;
mod event_handler;
mod hook;
mod ipc;
mod monitor;
mod physics;
mod roi;
mod satellite;
mod selection;
mod surface;
mod types;
mod x11_utils;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;
use x11rb::connection::Connection;
use x11rb::protocol::randr::{ConnectionExt as RandrExt, NotifyMask};

use companion::{Companion, CompanionEvent};
use config::Settings;
use constants::timing::{MAINTENANCE_TICK_MS, MAX_IDLE_SLEEP_MS, PHYSICS_TICK_MS};
use event_handler::{handle_event, EventTargets, Handled};
use ipc::{ClientRegistry, CompanionClient, CompanionRequest, CompanionResponse, CompanionServer, ListenerMessage};
use monitor::MonitorLayout;
use selection::SelectionOverlay;
use surface::Renderer;
use types::{Logical, Point};
use x11_utils::{escape_keycode, query_monitors, AppContext, CachedAtoms};

#[derive(Parser, Debug)]
#[command(
    name = "edgehook",
    version,
    about = "Floating capture widget that hooks onto window edges"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// IPC socket path (default: $XDG_RUNTIME_DIR/edgehook/companion.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// trace, debug, info, warn or error (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the companion (default)
    Run(RunArgs),
    /// Ask a running companion to re-capture its area, or start a selection
    Reprocess,
    /// Print companion events as JSON lines and answer captures
    Watch,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Settings file (default: $XDG_CONFIG_HOME/edgehook/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None => run(RunArgs::default(), cli.socket, cli.log_level.as_deref()),
        Some(Command::Run(args)) => run(args, cli.socket, cli.log_level.as_deref()),
        Some(Command::Reprocess) => {
            init_tracing(resolve_log_level(cli.log_level.as_deref(), env_log_level().as_deref(), None))?;
            reprocess(&socket_path(cli.socket)?)
        }
        Some(Command::Watch) => {
            init_tracing(resolve_log_level(cli.log_level.as_deref(), env_log_level().as_deref(), None))?;
            watch(&socket_path(cli.socket)?)
        }
    }
}

fn env_log_level() -> Option<String> {
    std::env::var("LOG_LEVEL").ok()
}

/// `--log-level`, then `LOG_LEVEL`, then the settings file, then info
fn resolve_log_level(cli: Option<&str>, env: Option<&str>, settings: Option<&str>) -> TraceLevel {
    match cli
        .or(env)
        .or(settings)
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn init_tracing(level: TraceLevel) -> Result<()> {
    // stdout is reserved for `watch` output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install tracing subscriber")
}

fn socket_path(cli: Option<PathBuf>) -> Result<PathBuf> {
    match cli {
        Some(path) => Ok(path),
        None => ipc::default_socket_path(),
    }
}

fn reprocess(socket: &Path) -> Result<()> {
    let mut client = CompanionClient::connect_to(socket)?;
    client.send_request(&CompanionRequest::Reprocess)?;
    loop {
        // Broadcast events may arrive ahead of the acknowledgment
        match client.recv_response()? {
            CompanionResponse::Ready => return Ok(()),
            CompanionResponse::Error(message) => anyhow::bail!("Companion refused reprocess: {}", message),
            _ => continue,
        }
    }
}

/// Stand-in capture collaborator: logs every event and acknowledges captures
fn watch(socket: &Path) -> Result<()> {
    let mut client = CompanionClient::connect_to(socket)?;
    client.send_request(&CompanionRequest::GetHookState)?;
    loop {
        let response = client.recv_response()?;
        println!("{}", serde_json::to_string(&response).context("Failed to serialize event")?);
        if let CompanionResponse::AreaSelected { rect } = response {
            client.send_request(&CompanionRequest::ShowResult {
                text: format!("Captured {}x{} at ({}, {})", rect.width, rect.height, rect.x, rect.y),
            })?;
            client.send_request(&CompanionRequest::ProcessingComplete)?;
        }
    }
}

/// Center of the primary monitor
fn default_position(layout: &MonitorLayout, settings: &Settings) -> Point<Logical> {
    let primary = layout.primary().rect;
    Point::new(
        primary.x + (primary.width - settings.widget.width) / 2.0,
        primary.y + (primary.height - settings.widget.height) / 2.0,
    )
}

/// Apply one IPC request to the companion and build the direct reply
fn handle_request(
    request: CompanionRequest,
    companion: &mut Companion,
    settings: &mut Settings,
    shutdown: &AtomicBool,
) -> CompanionResponse {
    match request {
        CompanionRequest::Reprocess => companion.request_reprocess(),
        CompanionRequest::ShowStatus { text, duration_ms } => companion.show_status(&text, duration_ms),
        CompanionRequest::ShowResult { text } => companion.show_result(&text),
        CompanionRequest::HideResult => companion.hide_result(),
        CompanionRequest::ProcessingComplete => companion.processing_complete(),
        CompanionRequest::SetPhysicsParams(params) => {
            settings.physics = params;
            settings.validate_and_clamp();
            companion.set_physics_params(settings.physics);
        }
        CompanionRequest::GetHookState => return CompanionResponse::HookState(companion.summary()),
        CompanionRequest::Ping => return CompanionResponse::Pong,
        CompanionRequest::Shutdown => {
            info!("Shutdown requested over IPC");
            shutdown.store(true, Ordering::Relaxed);
        }
    }
    CompanionResponse::Ready
}

fn remember_position(settings: &mut Settings, settings_path: &Path, layout: &MonitorLayout, position: Point<Logical>) {
    settings.remember_position(&layout.config_hash(), position);
    if let Err(e) = settings.save_to(settings_path) {
        warn!(error = %e, "Failed to save widget position");
    }
}

fn run(args: RunArgs, socket: Option<PathBuf>, cli_level: Option<&str>) -> Result<()> {
    let settings_path = args.config.unwrap_or_else(Settings::default_path);
    let loaded = Settings::load_from(&settings_path);
    let settings_level = loaded.as_ref().ok().and_then(|s| s.log_level.clone());
    init_tracing(resolve_log_level(cli_level, env_log_level().as_deref(), settings_level.as_deref()))?;
    let mut settings = loaded?;
    info!(path = %settings_path.display(), "Using settings");

    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
    let screen = &conn.setup().roots[screen_num];
    info!(screen = screen_num, width = screen.width_in_pixels, height = screen.height_in_pixels, "Connected to X11");

    // Pre-cache atoms once at startup (eliminates roundtrip overhead)
    let atoms = CachedAtoms::new(&conn)?;
    let ctx = AppContext {
        conn: &conn,
        screen,
        atoms: &atoms,
    };
    let windows = ctx.window_system();

    if let Err(e) = conn.randr_select_input(screen.root, NotifyMask::SCREEN_CHANGE) {
        warn!(error = %e, "Failed to subscribe to screen changes");
    }
    let mut layout = query_monitors(&conn, screen, &settings.monitors);
    let escape = escape_keycode(&conn).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to look up the Escape keycode");
        None
    });

    let start = settings
        .saved_position(&layout.config_hash())
        .unwrap_or_else(|| default_position(&layout, &settings));
    let mut companion = Companion::new(&settings, start, std::process::id());
    let mut renderer = Renderer::new(&ctx)?;
    let mut overlay = SelectionOverlay::new(&ctx, escape)?;

    let server = CompanionServer::bind_to(socket_path(socket)?)?;
    let (ipc_tx, ipc_rx) = mpsc::channel();
    let _listener = server.spawn_listener(ipc_tx)?;
    let mut clients = ClientRegistry::new();

    let reprocess_flag = Arc::new(AtomicBool::new(false));
    let reload_flag = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&reprocess_flag))
        .context("Failed to register SIGUSR1 handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGHUP, Arc::clone(&reload_flag))
        .context("Failed to register SIGHUP handler")?;
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context(format!("Failed to register handler for signal {}", signal))?;
    }

    renderer.sync(&companion, &layout)?;
    conn.flush().context("Failed to flush X11 connection")?;
    info!(socket = %server.path().display(), x = start.x, y = start.y, "edgehook running");

    let started = Instant::now();
    let mut next_physics = 0u64;
    let mut next_maintenance = 0u64;

    while !shutdown.load(Ordering::Relaxed) {
        while let Some(event) = conn.poll_for_event().context("X11 connection lost")? {
            let mut targets = EventTargets {
                companion: &mut companion,
                renderer: &renderer,
                overlay: &mut overlay,
                windows: &windows,
                layout: &layout,
            };
            match handle_event(event, &mut targets) {
                Ok(Handled::Done) => {}
                Ok(Handled::MonitorsChanged) => {
                    layout = query_monitors(&conn, screen, &settings.monitors);
                    info!(monitors = layout.monitors().len(), "Monitor layout refreshed");
                }
                Err(e) => error!(error = %e, "Failed to handle X11 event"),
            }
        }

        while let Ok(message) = ipc_rx.try_recv() {
            match message {
                ListenerMessage::Connected(id, stream) => {
                    clients.insert(id, stream);
                    info!(client = id, clients = clients.len(), "IPC client connected");
                }
                ListenerMessage::Request(id, request) => {
                    let reply = handle_request(request, &mut companion, &mut settings, &shutdown);
                    clients.send_to(id, &reply);
                }
                ListenerMessage::Disconnected(id) => clients.remove(id),
            }
        }

        if reprocess_flag.swap(false, Ordering::Relaxed) {
            info!("Reprocess requested by signal");
            companion.request_reprocess();
        }
        if reload_flag.swap(false, Ordering::Relaxed) {
            match Settings::load_from(&settings_path) {
                Ok(reloaded) => {
                    settings = reloaded;
                    layout = query_monitors(&conn, screen, &settings.monitors);
                    companion.apply_settings(&settings);
                    info!(path = %settings_path.display(), "Settings reloaded");
                }
                Err(e) => warn!(error = %e, "Failed to reload settings, keeping current ones"),
            }
        }

        let now = started.elapsed().as_millis() as u64;
        if now >= next_physics {
            companion.physics_tick(&layout);
            next_physics = now + PHYSICS_TICK_MS;
        }
        if now >= next_maintenance {
            companion.maintenance_tick(&windows, &layout);
            next_maintenance = now + MAINTENANCE_TICK_MS;
        }
        companion.run_deferred(now);

        for event in companion.drain_events() {
            match event {
                CompanionEvent::AreaSelected(rect) => {
                    clients.broadcast(&CompanionResponse::AreaSelected { rect: rect.into() });
                }
                CompanionEvent::HookChanged(summary) => {
                    info!(hooked = summary.hooked, edge = ?summary.edge, window = ?summary.window, "Hook state changed");
                    clients.broadcast(&CompanionResponse::HookChanged(summary));
                }
                CompanionEvent::SelectionRequested => {
                    if let Err(e) = overlay.open() {
                        error!(error = %e, "Failed to open selection overlay");
                        companion.cancel_selection();
                    }
                }
                CompanionEvent::SelectionClosed => {
                    if let Err(e) = overlay.close() {
                        error!(error = %e, "Failed to close selection overlay");
                    }
                }
                CompanionEvent::PositionSettled(position) => {
                    if !companion.hook().is_hooked() {
                        remember_position(&mut settings, &settings_path, &layout, position);
                    }
                }
            }
        }

        if let Err(e) = renderer.sync(&companion, &layout) {
            error!(error = %e, "Failed to update surfaces");
        }
        conn.flush().context("Failed to flush X11 connection")?;

        let now = started.elapsed().as_millis() as u64;
        let idle = next_physics.min(next_maintenance).saturating_sub(now).min(MAX_IDLE_SLEEP_MS);
        std::thread::sleep(Duration::from_millis(idle));
    }

    info!("Shutting down");
    if !companion.hook().is_hooked() {
        remember_position(&mut settings, &settings_path, &layout, companion.main().target());
    }
    Ok(())
}
