//! homewatch-client — Talks to the HomeWatch backend.
//!
//! REST calls go through [`api::ApiClient`], pushes arrive on the
//! [`realtime::RealtimeChannel`], and both feed the shared [`store::Store`]
//! that the page controllers and the live monitor read from.

pub mod api;
pub mod backend;
pub mod config;
pub mod mjpeg;
pub mod monitor;
pub mod notice;
pub mod pages;
pub mod realtime;
pub mod scope;
pub mod store;

pub use api::{ApiClient, ApiError};
pub use config::{ClientConfig, ConfigError};
pub use notice::{Notice, Notifier};
pub use realtime::{RealtimeChannel, ReconnectPolicy};
pub use scope::TaskScope;
pub use store::{Action, DashboardState, Store};
