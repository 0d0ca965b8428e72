//! Live monitor: camera control, frame source and the overlay render loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use homewatch_core::geometry::Point;
use homewatch_core::overlay::{Layers, OverlayRenderer, Scene, Surface, Tick, TrajectoryTrail};
use homewatch_core::types::{CameraStatus, DangerZone};
use homewatch_core::RasterSurface;
use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::api::{ApiClient, ApiError};
use crate::backend::{CameraBackend, ZoneBackend};
use crate::mjpeg::{self, FrameRx, FrameTx};
use crate::scope::TaskScope;
use crate::store::{Action, DashboardState, Store};

/// Renderer plus surface plus the trajectory it accumulates.
pub struct Compositor<S: Surface> {
    renderer: OverlayRenderer,
    surface: S,
    trail: TrajectoryTrail,
    seen_seq: u64,
}

impl<S: Surface> Compositor<S> {
    pub fn new(surface: S, layers: Layers) -> Self {
        Self {
            renderer: OverlayRenderer::new(layers),
            surface,
            trail: TrajectoryTrail::default(),
            seen_seq: 0,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    pub fn layers_mut(&mut self) -> &mut Layers {
        &mut self.renderer.layers
    }

    /// Draw one tick from the current state.
    pub fn render(
        &mut self,
        frame: Option<&RgbaImage>,
        state: &DashboardState,
        zones: &[DangerZone],
        draft: &[Point],
        now: Instant,
    ) -> Tick {
        if state.detection_seq != self.seen_seq {
            self.seen_seq = state.detection_seq;
            self.trail.record(&state.faces);
        }
        let violated = state.violated_zones(now);
        let scene = Scene {
            faces: &state.faces,
            zones,
            draft,
            trajectory: self.trail.points(),
            violated_zones: &violated,
        };
        self.renderer.tick(&mut self.surface, frame, &scene)
    }
}

/// Owns the camera session. Dropping it stops its background tasks.
pub struct LiveMonitor {
    api: ApiClient,
    store: Store,
    rtmp_url: String,
    render_interval: Duration,
    frames_tx: FrameTx,
    frames_rx: FrameRx,
    zones_tx: watch::Sender<Vec<DangerZone>>,
    reader: Option<AbortHandle>,
    scope: TaskScope,
}

impl LiveMonitor {
    pub fn new(api: ApiClient, store: Store, rtmp_url: impl Into<String>, render_interval: Duration) -> Self {
        let (frames_tx, frames_rx) = mjpeg::frame_channel();
        let (zones_tx, _) = watch::channel(Vec::new());
        Self {
            api,
            store,
            rtmp_url: rtmp_url.into(),
            render_interval,
            frames_tx,
            frames_rx,
            zones_tx,
            reader: None,
            scope: TaskScope::new(),
        }
    }

    pub fn frames(&self) -> FrameRx {
        self.frames_rx.clone()
    }

    /// Ask the backend whether the camera runs and mirror it into the store.
    pub async fn sync_status(&self) -> Result<CameraStatus, ApiError> {
        let status = self.api.camera_status().await?;
        self.store.dispatch(Action::CameraRunning(status.is_running()));
        Ok(status)
    }

    /// Reload the zones drawn by the render loop.
    pub async fn refresh_zones(&self) -> Result<usize, ApiError> {
        let zones = self.api.list_zones().await?;
        let n = zones.len();
        self.zones_tx.send_replace(zones);
        Ok(n)
    }

    pub async fn start_camera(&mut self) -> Result<(), ApiError> {
        self.api.start_camera().await?;
        self.store.dispatch(Action::CameraRunning(true));
        self.spawn_frame_reader()?;
        Ok(())
    }

    pub async fn stop_camera(&mut self) -> Result<(), ApiError> {
        self.api.stop_camera().await?;
        self.store.dispatch(Action::CameraRunning(false));
        self.stop_frame_reader();
        Ok(())
    }

    /// Start pulling MJPEG frames, replacing any reader already running.
    /// The reader ends with the stream; frames are only rendered while the
    /// camera flag is set.
    pub fn spawn_frame_reader(&mut self) -> Result<(), ApiError> {
        let url = self.api.mjpeg_url(&self.rtmp_url)?;
        if let Some(old) = self.reader.take() {
            old.abort();
        }
        let http = self.api.http().clone();
        let tx = self.frames_tx.clone();
        let handle = self.scope.spawn("mjpeg", async move {
            if let Err(err) = mjpeg::read_stream(http, url, tx).await {
                tracing::warn!(error = %err, "mjpeg stream failed");
            }
        });
        self.reader = Some(handle);
        Ok(())
    }

    /// Abort the frame reader, if any, and drop the last frame.
    pub fn stop_frame_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            tracing::debug!("mjpeg reader stopped");
        }
        self.frames_tx.send_replace(None);
    }

    pub fn reader_active(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Spawn the fixed-interval render loop. `on_frame` sees the surface
    /// after every drawn tick.
    pub fn spawn_render_loop<F>(&mut self, layers: Layers, mut on_frame: F)
    where
        F: FnMut(&RasterSurface) + Send + 'static,
    {
        let store = self.store.clone();
        let frames = self.frames_rx.clone();
        let zones = self.zones_tx.subscribe();
        let every = self.render_interval;
        self.scope.spawn("render", async move {
            let mut compositor = Compositor::new(RasterSurface::new(), layers);
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let state = store.snapshot();
                if !state.camera_running {
                    continue;
                }
                let frame = frames.borrow().clone();
                let tick = {
                    let zones = zones.borrow();
                    compositor.render(frame.as_deref(), &state, &zones, &[], Instant::now())
                };
                if tick == Tick::Drawn {
                    on_frame(compositor.surface());
                }
            }
        });
    }

    /// Track externally started tasks (push channel, poller) with this view.
    pub fn scope_mut(&mut self) -> &mut TaskScope {
        &mut self.scope
    }

    pub async fn shutdown(self) {
        self.scope.shutdown().await;
    }
}
