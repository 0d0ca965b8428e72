use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::realtime::ReconnectPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid base URL: {0}")]
    BaseUrl(String),
}

/// Client configuration: defaults, then an optional TOML file, then
/// `HOMEWATCH_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Push channel URL; derived from `base_url` when unset.
    pub ws_url: Option<String>,
    /// Bearer token attached to REST calls.
    pub token: Option<String>,
    /// Stream the backend relays as MJPEG.
    pub rtmp_url: String,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Client heartbeat period; `None` disables it.
    pub heartbeat: Option<Duration>,
    pub status_poll: Duration,
    /// Overlay tick period.
    pub render_interval: Duration,
    /// Recent events kept in the store.
    pub recent_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            token: None,
            rtmp_url: "rtmp://localhost:1935/live/stream".to_string(),
            request_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            heartbeat: Some(Duration::from_secs(30)),
            status_poll: Duration::from_secs(5),
            render_interval: Duration::from_millis(33),
            recent_capacity: 50,
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    ws_url: Option<String>,
    token: Option<String>,
    rtmp_url: Option<String>,
    request_timeout_secs: Option<u64>,
    reconnect: Option<ReconnectPolicy>,
    heartbeat_secs: Option<u64>,
    status_poll_secs: Option<u64>,
    render_interval_ms: Option<u64>,
    recent_capacity: Option<usize>,
}

impl ClientConfig {
    /// Load configuration from `HOMEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_vars(|k| std::env::var(k).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then let the environment override it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        config.apply_vars(|k| std::env::var(k).ok());
        config.validate()?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        let mut config = Self::default();
        if let Some(v) = file.base_url {
            config.base_url = v;
        }
        if file.ws_url.is_some() {
            config.ws_url = file.ws_url;
        }
        if file.token.is_some() {
            config.token = file.token;
        }
        if let Some(v) = file.rtmp_url {
            config.rtmp_url = v;
        }
        if let Some(v) = file.request_timeout_secs {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.reconnect {
            config.reconnect = v;
        }
        if let Some(v) = file.heartbeat_secs {
            config.heartbeat = (v > 0).then(|| Duration::from_secs(v));
        }
        if let Some(v) = file.status_poll_secs {
            config.status_poll = Duration::from_secs(v.max(1));
        }
        if let Some(v) = file.render_interval_ms {
            config.render_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = file.recent_capacity {
            config.recent_capacity = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a variable lookup (the process environment in
    /// production).
    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("HOMEWATCH_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = var("HOMEWATCH_WS_URL") {
            self.ws_url = Some(v);
        }
        if let Some(v) = var("HOMEWATCH_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = var("HOMEWATCH_RTMP_URL") {
            self.rtmp_url = v;
        }
        self.request_timeout = Duration::from_secs(env_u64(&var, "HOMEWATCH_TIMEOUT_SECS", self.request_timeout.as_secs()));

        let r = &mut self.reconnect;
        r.initial_delay = Duration::from_millis(env_u64(
            &var,
            "HOMEWATCH_RECONNECT_INITIAL_MS",
            r.initial_delay.as_millis() as u64,
        ));
        r.max_delay = Duration::from_millis(env_u64(&var, "HOMEWATCH_RECONNECT_MAX_MS", r.max_delay.as_millis() as u64));
        r.multiplier = env_f64(&var, "HOMEWATCH_RECONNECT_MULTIPLIER", r.multiplier);
        r.jitter = env_f64(&var, "HOMEWATCH_RECONNECT_JITTER", r.jitter);
        if let Some(v) = var("HOMEWATCH_RECONNECT_MAX_ATTEMPTS") {
            // 0 means retry forever.
            r.max_attempts = v.parse::<u32>().ok().filter(|n| *n > 0);
        }

        let heartbeat = env_u64(&var, "HOMEWATCH_HEARTBEAT_SECS", self.heartbeat.map_or(0, |d| d.as_secs()));
        self.heartbeat = (heartbeat > 0).then(|| Duration::from_secs(heartbeat));
        self.status_poll = Duration::from_secs(env_u64(&var, "HOMEWATCH_STATUS_POLL_SECS", self.status_poll.as_secs()).max(1));
        self.render_interval = Duration::from_millis(
            env_u64(&var, "HOMEWATCH_RENDER_INTERVAL_MS", self.render_interval.as_millis() as u64).max(1),
        );
        self.recent_capacity = env_usize(&var, "HOMEWATCH_RECENT_CAPACITY", self.recent_capacity);
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        let trimmed = self.base_url.trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::BaseUrl(self.base_url.clone()));
        }
        self.base_url = trimmed.to_string();
        self.recent_capacity = self.recent_capacity.max(1);
        Ok(())
    }

    /// The push channel URL: explicit, or `ws(s)://<host>/ws`.
    pub fn websocket_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let rest = self
            .base_url
            .strip_prefix("https://")
            .map(|r| format!("wss://{r}"))
            .or_else(|| self.base_url.strip_prefix("http://").map(|r| format!("ws://{r}")))
            .unwrap_or_else(|| self.base_url.clone());
        format!("{rest}/ws")
    }
}

fn env_u64(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(var: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(var: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    var(key)
        .and_then(|v| v.parse().ok())
        .filter(|v: &f64| v.is_finite())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.websocket_url(), "ws://localhost:8000/ws");
        assert_eq!(c.recent_capacity, 50);
        assert_eq!(c.reconnect.max_attempts, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut c = ClientConfig::default();
        c.apply_vars(vars(&[
            ("HOMEWATCH_BASE_URL", "https://cam.example.org/"),
            ("HOMEWATCH_RECONNECT_MULTIPLIER", "1.0"),
            ("HOMEWATCH_RECONNECT_MAX_ATTEMPTS", "5"),
            ("HOMEWATCH_HEARTBEAT_SECS", "0"),
            ("HOMEWATCH_RENDER_INTERVAL_MS", "not a number"),
        ]));
        c.validate().unwrap();
        assert_eq!(c.base_url, "https://cam.example.org");
        assert_eq!(c.websocket_url(), "wss://cam.example.org/ws");
        assert_eq!(c.reconnect.multiplier, 1.0);
        assert_eq!(c.reconnect.max_attempts, Some(5));
        assert_eq!(c.heartbeat, None);
        assert_eq!(c.render_interval, Duration::from_millis(33));
    }

    #[test]
    fn test_toml_file() {
        let c = ClientConfig::from_toml(
            r#"
            base_url = "http://10.0.0.2:8000"
            ws_url = "ws://10.0.0.2:9000/ws"
            recent_capacity = 20

            [reconnect]
            initial_delay = 500
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(c.websocket_url(), "ws://10.0.0.2:9000/ws");
        assert_eq!(c.recent_capacity, 20);
        assert_eq!(c.reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(c.reconnect.max_attempts, Some(3));
        // Unset policy keys keep their defaults.
        assert_eq!(c.reconnect.multiplier, 2.0);
    }

    #[test]
    fn test_bad_base_url_rejected() {
        assert!(matches!(
            ClientConfig::from_toml(r#"base_url = "localhost:8000""#),
            Err(ConfigError::BaseUrl(_))
        ));
        assert!(matches!(ClientConfig::from_toml("nonsense = 1"), Err(ConfigError::Parse(_))));
    }
}
