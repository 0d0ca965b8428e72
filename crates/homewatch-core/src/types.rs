//! Transport types exchanged with the HomeWatch backend.
//!
//! These mirror the backend's JSON shapes. They are never authoritative on
//! the client: every record is owned by the backend and only mirrored here.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geometry::{Point, Rect};

/// Uniform `{success, message, data}` wrapper used by every REST endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Paged list as returned by `/api/events/` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u32,
}

fn default_true() -> bool {
    true
}

/// Clamp a decoded score into [0, 1].
fn unit_interval<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    let v = f32::deserialize(d)?;
    Ok(if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
}

fn unit_interval_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f32>, D::Error> {
    let v = Option::<f32>::deserialize(d)?;
    Ok(v.map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }))
}

// --- Faces ---

/// A registered face (a "user" in backend terms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub face_image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub recognition_count: u64,
    #[serde(default)]
    pub last_recognized_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Partial edit of a face record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FaceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Register a face from an image already stored on the backend.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterByPath {
    pub name: String,
    pub image_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub face_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceFileStatus {
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub valid_files: u64,
    #[serde(default)]
    pub invalid_files_count: u64,
}

/// Dashboard counters from `/api/face/statistics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceStatistics {
    #[serde(default)]
    pub known_faces_count: u64,
    #[serde(default)]
    pub service_status: String,
    #[serde(default)]
    pub today_recognitions: u64,
    #[serde(default)]
    pub total_recognitions: u64,
    #[serde(default)]
    pub file_status: FaceFileStatus,
}

/// One row of a user's recognition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionRecord {
    pub id: i64,
    pub recognition_time: NaiveDateTime,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default, deserialize_with = "unit_interval")]
    pub confidence: f32,
    #[serde(default)]
    pub distance: f32,
    #[serde(default)]
    pub location: Option<FaceLocation>,
    #[serde(default)]
    pub faces_detected_total: u32,
    #[serde(default)]
    pub strangers_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionHistory {
    pub user_id: i64,
    pub user_name: String,
    pub records: Vec<RecognitionRecord>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u32,
}

// --- Events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Pending,
    Processing,
    Resolved,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "processing" => Ok(EventStatus::Processing),
            "resolved" => Ok(EventStatus::Resolved),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// An alert record as listed by `/api/events/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default)]
    pub video_clip_url: Option<String>,
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub video_size: Option<u64>,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default, deserialize_with = "unit_interval_opt")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub event_data: Option<Value>,
    #[serde(default)]
    pub is_processed: bool,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub processed_at: Option<NaiveDateTime>,
}

/// Alert payload pushed over the realtime channel. Uses `type` where the
/// REST listing uses `event_type`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventAlert {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default, deserialize_with = "unit_interval_opt")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub event_data: Option<Value>,
}

impl From<EventAlert> for EventRecord {
    fn from(a: EventAlert) -> Self {
        EventRecord {
            id: a.id,
            event_type: a.event_type,
            title: a.title,
            description: a.description,
            screenshot_url: a.screenshot_url,
            video_clip_url: None,
            video_duration: None,
            video_size: None,
            has_video: false,
            confidence: a.confidence,
            location: a.location,
            event_data: a.event_data,
            is_processed: false,
            is_read: false,
            status: EventStatus::Pending,
            severity: a.severity,
            created_at: a.created_at,
            processed_at: None,
        }
    }
}

/// `/api/events/recent` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentEvents {
    pub items: Vec<EventRecord>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub limit: u32,
}

/// Query filter for the paged event listing.
#[derive(Debug, Clone, Serialize)]
pub struct EventFilter {
    pub page: u32,
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_processed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDateTime>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            page: 1,
            size: 20,
            event_type: None,
            severity: None,
            is_processed: None,
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: i64,
    pub status: EventStatus,
    #[serde(default)]
    pub is_processed: bool,
    #[serde(default)]
    pub processed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStatistics {
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub unprocessed_events: u64,
    #[serde(default)]
    pub processed_events: u64,
    #[serde(default)]
    pub last_24h_events: u64,
    #[serde(default)]
    pub type_statistics: std::collections::BTreeMap<String, u64>,
    #[serde(default)]
    pub severity_statistics: std::collections::BTreeMap<String, u64>,
}

// --- Zones ---

/// A user-authored polygon with a dwell-time alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DangerZone {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_zone_type")]
    pub zone_type: String,
    pub coordinates: Vec<Point>,
    pub stay_threshold: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

pub fn default_zone_type() -> String {
    "polygon".to_string()
}

/// Body of `POST /api/zone/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneDraft {
    pub name: String,
    pub zone_type: String,
    pub coordinates: Vec<Point>,
    pub stay_threshold: u32,
}

/// Body of `PUT /api/zone/{id}`; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZonePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stay_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

// --- Realtime payloads ---

/// Face box edges in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl FaceLocation {
    pub fn rect(&self) -> Rect {
        Rect::from_edges(self.left, self.top, self.right, self.bottom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub name: String,
    #[serde(deserialize_with = "unit_interval")]
    pub confidence: f32,
    #[serde(default)]
    pub distance: Option<f32>,
}

/// One face from the latest `face_detection` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub location: FaceLocation,
    #[serde(default)]
    pub is_stranger: bool,
    #[serde(default, rename = "match")]
    pub matched: Option<FaceMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaceDetection {
    pub faces: Vec<DetectedFace>,
    #[serde(default)]
    pub total_faces: u32,
    #[serde(default)]
    pub strangers_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ZoneEntry,
    ZoneStayTimeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneViolation {
    pub zone_id: i64,
    #[serde(default)]
    pub zone_name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<ViolationKind>,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub location: Option<Point>,
    #[serde(default)]
    pub stay_duration: Option<f32>,
    #[serde(default)]
    pub message: Option<String>,
}

// --- System / camera / auth ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoService {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub camera_connected: bool,
    #[serde(default)]
    pub fps: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisService {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub analysis_queue_size: u32,
    #[serde(default)]
    pub last_analysis: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseService {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Services {
    #[serde(default)]
    pub video: VideoService,
    #[serde(default)]
    pub ai_analysis: AnalysisService,
    #[serde(default)]
    pub database: DatabaseService,
}

/// Host resources; every field is absent when the backend cannot probe them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    pub cpu_usage: Option<f32>,
    pub memory_usage: Option<f32>,
    pub memory_total: Option<u64>,
    pub memory_available: Option<u64>,
    pub disk_usage: Option<f32>,
    pub disk_total: Option<u64>,
    pub disk_free: Option<u64>,
    pub error: Option<String>,
}

/// Health snapshot from `/api/system/status` or a `system_status` push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub services: Services,
    #[serde(default)]
    pub system: HostResources,
    #[serde(default)]
    pub uptime: Option<String>,
}

/// `/api/video/camera/status`, which is not enveloped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraStatus {
    #[serde(default)]
    pub video_stream: bool,
    #[serde(default)]
    pub ai_analysis: bool,
    #[serde(default)]
    pub status: String,
}

impl CameraStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Login result: bearer token plus the admin it was issued to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub token: AccessToken,
    pub admin: AdminAccount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detected_face_stranger() {
        let face: DetectedFace = serde_json::from_value(json!({
            "location": {"left": 5, "top": 5, "right": 50, "bottom": 50},
            "is_stranger": true
        }))
        .unwrap();
        assert!(face.is_stranger);
        assert!(face.matched.is_none());
        assert_eq!(face.location.rect(), Rect::new(5.0, 5.0, 45.0, 45.0));
    }

    #[test]
    fn test_match_confidence_clamped() {
        let face: DetectedFace = serde_json::from_value(json!({
            "location": {"left": 0, "top": 0, "right": 1, "bottom": 1},
            "match": {"user_id": 3, "name": "alice", "confidence": 1.7, "distance": -0.7},
            "is_stranger": false
        }))
        .unwrap();
        assert_eq!(face.matched.unwrap().confidence, 1.0);
    }

    #[test]
    fn test_event_record_from_listing() {
        let ev: EventRecord = serde_json::from_value(json!({
            "id": 7,
            "event_type": "stranger",
            "type": "stranger",
            "title": "陌生人告警",
            "description": null,
            "screenshot_url": "/static/screenshots/a.jpg",
            "image_url": "/static/screenshots/a.jpg",
            "video_clip_url": null,
            "has_video": false,
            "confidence": 0.8,
            "location": {"top": 1, "left": 2, "right": 3, "bottom": 4},
            "event_data": null,
            "is_processed": false,
            "is_read": false,
            "status": "pending",
            "severity": "high",
            "created_at": "2025-06-01T12:30:45.123456",
            "processed_at": null
        }))
        .unwrap();
        assert_eq!(ev.severity, Severity::High);
        assert_eq!(ev.status, EventStatus::Pending);
        assert!(ev.created_at.is_some());
    }

    #[test]
    fn test_event_alert_converts_unread() {
        let alert: EventAlert = serde_json::from_value(json!({
            "id": 9,
            "type": "zone_violation",
            "title": "危险区域告警 - Pool",
            "severity": "medium",
            "created_at": "2025-06-01T12:30:45"
        }))
        .unwrap();
        let rec = EventRecord::from(alert);
        assert_eq!(rec.event_type, "zone_violation");
        assert!(!rec.is_read);
        assert_eq!(rec.status, EventStatus::Pending);
    }

    #[test]
    fn test_zone_patch_skips_absent_fields() {
        let patch = ZonePatch {
            is_active: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"is_active": false}));
    }

    #[test]
    fn test_envelope_without_data() {
        let env: Envelope<FaceRecord> =
            serde_json::from_value(json!({"success": false, "message": "用户不存在"})).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
    }

    #[test]
    fn test_event_filter_query_skips_none() {
        let filter = EventFilter {
            severity: Some(Severity::Low),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"page": 1, "size": 20, "severity": "low"})
        );
    }
}
