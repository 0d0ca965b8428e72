use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use homewatch_client::backend::{CameraBackend, FaceImage, SystemBackend};
use homewatch_client::monitor::LiveMonitor;
use homewatch_client::pages::{EventsPage, FacesPage, ZonesPage};
use homewatch_client::{scope, ApiClient, ClientConfig, Notifier, RealtimeChannel, Store};
use homewatch_core::geometry::Point;
use homewatch_core::overlay::Layers;
use homewatch_core::types::{EventFilter, EventStatus, FaceUpdate, Severity};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "homewatch", about = "HomeWatch surveillance console")]
struct Cli {
    /// TOML config file (HOMEWATCH_* variables still override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend origin, e.g. http://localhost:8000
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in as an administrator and print the bearer token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Check the configured token
    Whoami,
    /// Show backend and camera health
    Status,
    /// Manage registered faces
    #[command(subcommand)]
    Faces(FaceCommand),
    /// List and triage events
    #[command(subcommand)]
    Events(EventCommand),
    /// Manage danger zones
    #[command(subcommand)]
    Zones(ZoneCommand),
    /// Start or stop the camera
    #[command(subcommand)]
    Camera(CameraCommand),
    /// Follow the live feed: log pushes and write composited snapshots
    Watch {
        /// Directory for PNG snapshots
        #[arg(long)]
        snapshots: Option<PathBuf>,
        /// Seconds between snapshots
        #[arg(long, default_value_t = 5)]
        every: u64,
        /// Start the camera if it is stopped
        #[arg(long)]
        start: bool,
        /// Draw the face trajectory layer
        #[arg(long)]
        trajectory: bool,
    },
}

#[derive(Subcommand)]
enum FaceCommand {
    /// List registered faces
    List,
    /// Show recognition counters
    Stats,
    /// Register a face from a local image file
    Register { name: String, file: PathBuf },
    /// Register a face from an image already on the backend
    RegisterPath { name: String, path: String },
    /// Rename a face
    Rename { id: i64, name: String },
    /// Enable or disable a face
    Toggle { id: i64 },
    /// Delete a face
    Delete { id: i64 },
    /// Show a face's recognition log
    History {
        id: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
}

#[derive(Subcommand)]
enum EventCommand {
    /// List events
    List {
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        processed: Option<bool>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Most recent events and the unread count
    Recent,
    /// Show one event
    Show { id: i64 },
    /// Mark an event read
    Read { id: i64 },
    /// Mark every event read
    ReadAll,
    /// Set status: pending, processing or resolved
    Status { id: i64, status: EventStatus },
    /// Delete an event
    Delete { id: i64 },
    /// Counts by type and severity
    Stats {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum ZoneCommand {
    /// List zones
    List,
    /// Show one zone
    Show { id: i64 },
    /// Create a zone from frame-pixel points, e.g. -p 10,10 -p 50,10 -p 50,50
    Create {
        name: String,
        #[arg(short, long = "point", value_parser = parse_point, required = true)]
        points: Vec<Point>,
        /// Dwell seconds before a stay alert
        #[arg(short, long, default_value_t = homewatch_core::authoring::DEFAULT_STAY_THRESHOLD)]
        threshold: u32,
    },
    /// Change a zone's name, outline or threshold
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long = "point", value_parser = parse_point)]
        points: Vec<Point>,
        #[arg(short, long)]
        threshold: Option<u32>,
    },
    /// Enable or disable a zone
    Toggle { id: i64 },
    /// Delete a zone
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum CameraCommand {
    Start,
    Stop,
    Status,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected x,y, got {s:?}"))?;
    let x: f32 = x.trim().parse().map_err(|e| format!("bad x in {s:?}: {e}"))?;
    let y: f32 = y.trim().parse().map_err(|e| format!("bad y in {s:?}: {e}"))?;
    Ok(Point::new(x, y))
}

fn print_notices(rx: &mut UnboundedReceiver<homewatch_client::Notice>) {
    while let Ok(n) = rx.try_recv() {
        eprintln!("[{}] {}", n.level, n.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(base) = cli.base_url {
        config.base_url = base.trim_end_matches('/').to_string();
    }
    let api = ApiClient::new(&config).context("building HTTP client")?;
    let (notifier, mut notices) = Notifier::channel();

    let outcome = run(cli.command, &config, api, notifier).await;
    print_notices(&mut notices);
    outcome
}

async fn run(command: Commands, config: &ClientConfig, api: ApiClient, notifier: Notifier) -> Result<()> {
    match command {
        Commands::Login { username, password } => {
            let session = api.login(&username, &password).await?;
            println!("logged in as {}", session.admin.username);
            println!("export HOMEWATCH_TOKEN={}", session.token.access_token);
        }
        Commands::Whoami => {
            let admin = api.verify_token().await?;
            println!("{} (#{})", admin.username, admin.id);
        }
        Commands::Status => {
            let status = api.system_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            match api.camera_status().await {
                Ok(cam) => println!("camera: {} (video {}, analysis {})", cam.status, cam.video_stream, cam.ai_analysis),
                Err(err) => println!("camera: unknown ({err})"),
            }
        }
        Commands::Faces(cmd) => run_faces(cmd, api, notifier).await?,
        Commands::Events(cmd) => run_events(cmd, config, api, notifier).await?,
        Commands::Zones(cmd) => run_zones(cmd, api, notifier).await?,
        Commands::Camera(cmd) => {
            let store = Store::new(config.recent_capacity);
            let mut monitor = LiveMonitor::new(api, store, config.rtmp_url.clone(), config.render_interval);
            match cmd {
                CameraCommand::Start => monitor.start_camera().await?,
                CameraCommand::Stop => monitor.stop_camera().await?,
                CameraCommand::Status => {}
            }
            let status = monitor.sync_status().await?;
            println!("camera: {}", status.status);
        }
        Commands::Watch {
            snapshots,
            every,
            start,
            trajectory,
        } => watch(config, api, snapshots, Duration::from_secs(every.max(1)), start, trajectory).await?,
    }
    Ok(())
}

async fn run_faces(cmd: FaceCommand, api: ApiClient, notifier: Notifier) -> Result<()> {
    let mut page = FacesPage::new(api, notifier);
    match cmd {
        FaceCommand::List => {
            page.refresh().await?;
            for f in page.faces() {
                let last = f
                    .last_recognized_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>4}  {:<20} {:<8} seen {:>4}x  last {}",
                    f.id,
                    f.name,
                    if f.is_active { "active" } else { "disabled" },
                    f.recognition_count,
                    last
                );
            }
        }
        FaceCommand::Stats => {
            page.load().await?;
            if let Some(s) = page.statistics() {
                println!("{}", serde_json::to_string_pretty(s)?);
            }
        }
        FaceCommand::Register { name, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "face.jpg".to_string());
            let reg = page.register_upload(&name, FaceImage::from_file(file_name, bytes)).await?;
            println!("registered {} as #{}", reg.name, reg.user_id);
        }
        FaceCommand::RegisterPath { name, path } => {
            let reg = page.register_by_path(&name, &path).await?;
            println!("registered {} as #{}", reg.name, reg.user_id);
        }
        FaceCommand::Rename { id, name } => {
            page.update(
                id,
                FaceUpdate {
                    name: Some(name),
                    ..Default::default()
                },
            )
            .await?;
        }
        FaceCommand::Toggle { id } => {
            page.refresh().await?;
            let active = page.toggle_active(id).await?;
            println!("face #{id} {}", if active { "enabled" } else { "disabled" });
        }
        FaceCommand::Delete { id } => page.delete(id).await?,
        FaceCommand::History { id, page: p, size } => {
            page.load_history(id, p, size).await?;
            if let Some(h) = page.history() {
                println!("{} (#{}) page {}/{} of {} records", h.user_name, h.user_id, h.page, h.pages, h.total);
                for r in &h.records {
                    println!(
                        "  {}  {:.0}%",
                        r.recognition_time.format("%Y-%m-%d %H:%M:%S"),
                        r.confidence * 100.0
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_events(cmd: EventCommand, config: &ClientConfig, api: ApiClient, notifier: Notifier) -> Result<()> {
    let store = Store::new(config.recent_capacity);
    let mut page = EventsPage::new(api, notifier, store.clone());
    let print_row = |e: &homewatch_core::types::EventRecord| {
        println!(
            "{:>5} {} {:<7} {:<10} {:<22} {}",
            e.id,
            if e.is_read { ' ' } else { '*' },
            e.severity.as_str(),
            e.status.as_str(),
            e.event_type,
            e.title
        );
    };
    match cmd {
        EventCommand::List {
            kind,
            severity,
            processed,
            page: p,
            size,
        } => {
            page.apply_filter(EventFilter {
                page: 1,
                size,
                event_type: kind,
                severity,
                is_processed: processed,
                ..Default::default()
            })
            .await?;
            if p > 1 {
                page.goto_page(p).await?;
            }
            if let Some(pg) = page.page() {
                pg.items.iter().for_each(print_row);
                println!("page {}/{} ({} events)", pg.page, pg.pages, pg.total);
            }
        }
        EventCommand::Recent => {
            page.load_recent().await?;
            let s = store.snapshot();
            s.recent_events.iter().for_each(print_row);
            println!("{} unread", s.unread);
        }
        EventCommand::Show { id } => {
            page.load_detail(id).await?;
            if let Some(e) = page.detail() {
                println!("{}", serde_json::to_string_pretty(e)?);
            }
        }
        EventCommand::Read { id } => page.mark_read(id).await?,
        EventCommand::ReadAll => page.mark_all_read().await?,
        EventCommand::Status { id, status } => page.set_status(id, status).await?,
        EventCommand::Delete { id } => page.delete(id).await?,
        EventCommand::Stats { days } => {
            page.load_statistics(days).await?;
            if let Some(s) = page.statistics() {
                println!("{}", serde_json::to_string_pretty(s)?);
            }
        }
    }
    Ok(())
}

async fn run_zones(cmd: ZoneCommand, api: ApiClient, notifier: Notifier) -> Result<()> {
    let mut page = ZonesPage::new(api, notifier);
    match cmd {
        ZoneCommand::List => {
            page.refresh().await?;
            for z in page.zones() {
                println!(
                    "{:>4}  {:<20} {:<8} {:>2} pts  stay {}s",
                    z.id,
                    z.name,
                    if z.is_active { "active" } else { "off" },
                    z.coordinates.len(),
                    z.stay_threshold
                );
            }
        }
        ZoneCommand::Show { id } => {
            page.load_detail(id).await?;
            if let Some(z) = page.detail() {
                println!("{}", serde_json::to_string_pretty(z)?);
            }
        }
        ZoneCommand::Create {
            name,
            points,
            threshold,
        } => {
            let editor = page.editor_mut();
            editor.start();
            for p in points {
                editor.click(p)?;
            }
            page.finish_drawing()?;
            let zone = page.submit(&name, threshold).await?;
            println!("created zone #{} {}", zone.id, zone.name);
        }
        ZoneCommand::Update {
            id,
            name,
            points,
            threshold,
        } => {
            page.refresh().await?;
            let Some(current) = page.zones().iter().find(|z| z.id == id).cloned() else {
                bail!("no zone #{id}");
            };
            page.begin_edit(id)?;
            if !points.is_empty() {
                let editor = page.editor_mut();
                editor.redraw();
                for p in points {
                    editor.click(p)?;
                }
                page.finish_drawing()?;
            }
            let name = name.unwrap_or(current.name);
            let zone = page.submit(&name, threshold.unwrap_or(current.stay_threshold)).await?;
            println!("updated zone #{} {}", zone.id, zone.name);
        }
        ZoneCommand::Toggle { id } => {
            page.refresh().await?;
            let active = page.toggle_active(id).await?;
            println!("zone #{id} {}", if active { "enabled" } else { "disabled" });
        }
        ZoneCommand::Delete { id } => page.delete(id).await?,
    }
    Ok(())
}

async fn watch(
    config: &ClientConfig,
    api: ApiClient,
    snapshots: Option<PathBuf>,
    every: Duration,
    start: bool,
    trajectory: bool,
) -> Result<()> {
    if let Some(dir) = &snapshots {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let store = Store::new(config.recent_capacity);
    let mut monitor = LiveMonitor::new(api.clone(), store.clone(), config.rtmp_url.clone(), config.render_interval);

    let channel = RealtimeChannel::new(config.websocket_url(), config.reconnect.clone(), config.heartbeat, store.clone());
    monitor.scope_mut().spawn("realtime", channel.run());
    monitor
        .scope_mut()
        .spawn("status", scope::poll_status(api, store.clone(), config.status_poll));

    match monitor.refresh_zones().await {
        Ok(n) => tracing::info!(zones = n, "zones loaded"),
        Err(err) => tracing::warn!(error = %err, "could not load zones"),
    }
    let running = monitor.sync_status().await?.is_running();
    if !running && start {
        monitor.start_camera().await?;
    } else if running {
        monitor.spawn_frame_reader()?;
    } else {
        println!("camera is stopped; pass --start to start it");
    }

    let layers = Layers {
        trajectory,
        ..Layers::default()
    };
    let mut last_saved: Option<Instant> = None;
    let saved = Arc::new(AtomicU64::new(0));
    let counter = saved.clone();
    monitor.spawn_render_loop(layers, move |surface| {
        let Some(dir) = &snapshots else { return };
        if last_saved.is_some_and(|t| t.elapsed() < every) {
            return;
        }
        last_saved = Some(Instant::now());
        let n = counter.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("frame-{n:05}.png"));
        let image = surface.image().clone();
        let labels: Vec<String> = surface.texts().iter().map(|t| t.text.clone()).collect();
        tokio::task::spawn_blocking(move || match image.save(&path) {
            Ok(()) => tracing::info!(path = %path.display(), ?labels, "snapshot written"),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "snapshot failed"),
        });
    });

    let mut rx = store.subscribe();
    let mut last_seen = store.snapshot();
    println!("watching; Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = rx.borrow_and_update().clone();
                if now.connected != last_seen.connected {
                    println!("push channel {}", if now.connected { "connected" } else { "disconnected" });
                }
                if let Some(e) = now.recent_events.first() {
                    if last_seen.recent_events.first().map(|l| l.id) != Some(e.id) {
                        println!("[{}] {} ({} unread)", e.severity.as_str(), e.title, now.unread);
                    }
                }
                if now.detection_seq != last_seen.detection_seq && now.faces.len() != last_seen.faces.len() {
                    let strangers = now.faces.iter().filter(|f| f.is_stranger).count();
                    println!("{} face(s) in view, {} stranger(s)", now.faces.len(), strangers);
                }
                last_seen = now;
            }
        }
    }

    println!("stopping; {} snapshot(s) written", saved.load(Ordering::Relaxed));
    monitor.shutdown().await;
    Ok(())
}
