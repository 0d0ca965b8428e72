//! Process-wide dashboard state.
//!
//! One `watch` channel holds the state; every write is an [`Action`] applied
//! by [`DashboardState::reduce`] inside `send_modify`, so concurrent writers
//! (realtime pushes, the status poller, page controllers) are serialised
//! instead of overwriting each other's snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use homewatch_core::types::{DetectedFace, EventRecord, SystemStatus, ZoneViolation};
use tokio::sync::watch;

/// How long a zone stays emphasised after its last violation push.
pub const VIOLATION_HOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum Action {
    Connected,
    Disconnected,
    /// Full replacement of the detected-face list.
    FacesDetected(Vec<DetectedFace>),
    EventArrived(EventRecord),
    ZoneViolated { violation: ZoneViolation, at: Instant },
    SystemStatus(SystemStatus),
    RecentLoaded(Vec<EventRecord>),
    EventRead(i64),
    AllRead,
    EventRemoved(i64),
    CameraRunning(bool),
}

#[derive(Debug, Clone)]
pub struct LiveViolation {
    pub violation: ZoneViolation,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub connected: bool,
    pub camera_running: bool,
    pub faces: Vec<DetectedFace>,
    /// Bumped on every detection push, empty ones included.
    pub detection_seq: u64,
    /// Newest first, at most `capacity` entries.
    pub recent_events: Vec<EventRecord>,
    pub unread: u32,
    pub system: Option<SystemStatus>,
    pub violations: Vec<LiveViolation>,
    capacity: usize,
}

impl DashboardState {
    pub fn new(capacity: usize) -> Self {
        Self {
            connected: false,
            camera_running: false,
            faces: Vec::new(),
            detection_seq: 0,
            recent_events: Vec::new(),
            unread: 0,
            system: None,
            violations: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::Connected => self.connected = true,
            Action::Disconnected => self.connected = false,
            Action::FacesDetected(faces) => {
                self.faces = faces;
                self.detection_seq += 1;
            }
            Action::EventArrived(event) => {
                if let Some(pos) = self.recent_events.iter().position(|e| e.id == event.id) {
                    let old = self.recent_events.remove(pos);
                    if !old.is_read {
                        self.unread = self.unread.saturating_sub(1);
                    }
                }
                if !event.is_read {
                    self.unread += 1;
                }
                self.recent_events.insert(0, event);
                self.recent_events.truncate(self.capacity);
            }
            Action::ZoneViolated { violation, at } => {
                self.violations.retain(|v| {
                    v.violation.zone_id != violation.zone_id && at.saturating_duration_since(v.at) < VIOLATION_HOLD
                });
                self.violations.push(LiveViolation { violation, at });
            }
            Action::SystemStatus(status) => self.system = Some(status),
            Action::RecentLoaded(mut events) => {
                events.truncate(self.capacity);
                self.unread = events.iter().filter(|e| !e.is_read).count() as u32;
                self.recent_events = events;
            }
            Action::EventRead(id) => {
                self.unread = self.unread.saturating_sub(1);
                if let Some(e) = self.recent_events.iter_mut().find(|e| e.id == id) {
                    e.is_read = true;
                }
            }
            Action::AllRead => {
                self.unread = 0;
                for e in &mut self.recent_events {
                    e.is_read = true;
                }
            }
            Action::EventRemoved(id) => {
                if let Some(pos) = self.recent_events.iter().position(|e| e.id == id) {
                    let old = self.recent_events.remove(pos);
                    if !old.is_read {
                        self.unread = self.unread.saturating_sub(1);
                    }
                }
            }
            Action::CameraRunning(running) => {
                self.camera_running = running;
                if !running {
                    self.faces.clear();
                    self.violations.clear();
                }
            }
        }
    }

    /// Zone ids with a violation newer than [`VIOLATION_HOLD`].
    pub fn violated_zones(&self, now: Instant) -> Vec<i64> {
        self.violations
            .iter()
            .filter(|v| now.saturating_duration_since(v.at) < VIOLATION_HOLD)
            .map(|v| v.violation.zone_id)
            .collect()
    }
}

/// Cheap-to-clone handle to the shared state.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<DashboardState>>,
}

impl Store {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = watch::channel(DashboardState::new(capacity));
        Self { tx: Arc::new(tx) }
    }

    pub fn dispatch(&self, action: Action) {
        tracing::trace!(?action, "dispatch");
        self.tx.send_modify(|state| state.reduce(action));
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.tx.borrow().clone()
    }

    /// Read without cloning the whole state.
    pub fn with<R>(&self, f: impl FnOnce(&DashboardState) -> R) -> R {
        f(&self.tx.borrow())
    }
}
