//! WebSocket push channel.
//!
//! One socket per session. Text frames carry `{type, data, timestamp?}`;
//! the known types are turned into store [`Action`]s and everything else is
//! dropped. When the socket closes exactly one reconnect is scheduled, with
//! the delay taken from a [`ReconnectPolicy`].

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use homewatch_core::types::{EventAlert, FaceDetection, SystemStatus, ZoneViolation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

use crate::store::{Action, Store};

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed push message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Reconnect delay schedule. A multiplier of 1.0 gives a fixed delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Give up after this many consecutive failed attempts.
    pub max_attempts: Option<u32>,
    /// Random spread as a fraction of the delay, e.g. 0.1 for ±10%.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: None,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay before attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// What to do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    After(Duration),
    /// An attempt is already waiting; the extra close is ignored.
    AlreadyPending,
    GiveUp,
}

/// Tracks the single outstanding reconnect attempt and the backoff position.
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    attempt: u32,
    pending: bool,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            pending: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The socket opened; start the schedule over.
    pub fn opened(&mut self) {
        self.attempt = 0;
        self.pending = false;
    }

    /// The scheduled attempt is being made now.
    pub fn attempt_started(&mut self) {
        self.pending = false;
    }

    pub fn closed(&mut self) -> Reconnect {
        if self.pending {
            return Reconnect::AlreadyPending;
        }
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return Reconnect::GiveUp;
            }
        }
        let mut delay = self.policy.delay_for(self.attempt);
        if self.policy.jitter > 0.0 {
            let j = self.policy.jitter.min(1.0);
            delay = delay.mul_f64(1.0 + rand::thread_rng().gen_range(-j..=j));
        }
        self.attempt += 1;
        self.pending = true;
        Reconnect::After(delay)
    }
}

/// A decoded push message.
#[derive(Debug, Clone)]
pub enum Push {
    FaceDetection(FaceDetection),
    EventAlert(EventAlert),
    ZoneViolation(ZoneViolation),
    SystemStatus(SystemStatus),
    /// Known-harmless or unknown type, kept for logging.
    Ignored(String),
}

#[derive(Deserialize)]
struct RawPush {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

pub fn parse_push(text: &str) -> Result<Push, RealtimeError> {
    let raw: RawPush = serde_json::from_str(text)?;
    Ok(match raw.kind.as_str() {
        "face_detection" => Push::FaceDetection(serde_json::from_value(raw.data)?),
        "event_alert" | "realtime_alert" => Push::EventAlert(serde_json::from_value(raw.data)?),
        "zone_violation" => Push::ZoneViolation(serde_json::from_value(raw.data)?),
        "system_status" => Push::SystemStatus(serde_json::from_value(raw.data)?),
        _ => Push::Ignored(raw.kind),
    })
}

impl Push {
    pub fn into_action(self, now: Instant) -> Option<Action> {
        match self {
            Push::FaceDetection(d) => Some(Action::FacesDetected(d.faces)),
            Push::EventAlert(a) => Some(Action::EventArrived(a.into())),
            Push::ZoneViolation(violation) => Some(Action::ZoneViolated { violation, at: now }),
            Push::SystemStatus(s) => Some(Action::SystemStatus(s)),
            Push::Ignored(_) => None,
        }
    }
}

/// Parse one text frame and apply it. Bad frames are logged and skipped.
pub fn dispatch_text(store: &Store, text: &str) {
    match parse_push(text) {
        Ok(Push::Ignored(kind)) => tracing::trace!(%kind, "push ignored"),
        Ok(push) => {
            if let Some(action) = push.into_action(Instant::now()) {
                store.dispatch(action);
            }
        }
        Err(err) => tracing::debug!(error = %err, "dropping push frame"),
    }
}

/// Owns the socket loop for one session. Run it inside a task scope; the
/// loop only ends when the attempt cap is hit or the task is aborted.
pub struct RealtimeChannel {
    url: String,
    heartbeat: Option<Duration>,
    policy: ReconnectPolicy,
    store: Store,
}

impl RealtimeChannel {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, heartbeat: Option<Duration>, store: Store) -> Self {
        Self {
            url: url.into(),
            heartbeat,
            policy,
            store,
        }
    }

    pub async fn run(self) {
        let mut reconnector = Reconnector::new(self.policy.clone());
        loop {
            reconnector.attempt_started();
            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((ws, _)) => {
                    reconnector.opened();
                    tracing::info!(url = %self.url, "realtime channel open");
                    self.store.dispatch(Action::Connected);
                    if let Err(err) = self.session(ws).await {
                        tracing::warn!(error = %err, "realtime channel error");
                    }
                    tracing::info!("realtime channel closed");
                }
                Err(err) => tracing::warn!(url = %self.url, error = %err, "realtime connect failed"),
            }
            self.store.dispatch(Action::Disconnected);

            let delay = match reconnector.closed() {
                Reconnect::After(delay) => delay,
                // attempt_started() clears the pending flag on every pass, so
                // this only waits out the current step rather than spinning.
                Reconnect::AlreadyPending => self.policy.delay_for(reconnector.attempts()),
                Reconnect::GiveUp => {
                    tracing::warn!(attempts = reconnector.attempts(), "realtime reconnect attempts exhausted");
                    return;
                }
            };
            tracing::info!(
                attempt = reconnector.attempts(),
                delay_ms = delay.as_millis() as u64,
                "realtime reconnect scheduled"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn session<S>(&self, ws: tokio_tungstenite::WebSocketStream<S>) -> Result<(), RealtimeError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();
        // A disabled heartbeat still needs a timer for select!; park it far out.
        let period = self.heartbeat.unwrap_or(Duration::from_secs(24 * 3600));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let Some(msg) = msg else { return Ok(()) };
                    match msg? {
                        Message::Text(text) => dispatch_text(&self.store, &text),
                        Message::Close(frame) => {
                            tracing::debug!(?frame, "close frame received");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                _ = ticker.tick(), if self.heartbeat.is_some() => {
                    sink.send(Message::Text(heartbeat_frame())).await?;
                }
            }
        }
    }
}

pub fn heartbeat_frame() -> String {
    serde_json::json!({ "type": "heartbeat" }).to_string()
}
