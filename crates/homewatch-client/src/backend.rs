//! Backend seams used by the page controllers and the live monitor.
//!
//! [`ApiClient`](crate::api::ApiClient) is the production implementation;
//! tests substitute in-memory fakes.
#![allow(async_fn_in_trait)]

use bytes::Bytes;
use homewatch_core::types::{
    CameraStatus, DangerZone, EventFilter, EventRecord, EventStatistics, EventStatus, FaceRecord, FaceStatistics,
    FaceUpdate, Page, RecentEvents, RecognitionHistory, RegisterByPath, Registration, StatusChange, SystemStatus,
    ZoneDraft, ZonePatch,
};

use crate::api::ApiError;

/// An image file to register as a face.
#[derive(Debug, Clone)]
pub struct FaceImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl FaceImage {
    /// Guess the content type from the file extension.
    pub fn from_file(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let ext = file_name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
        let content_type = match ext.as_str() {
            "png" => "image/png",
            "bmp" => "image/bmp",
            "webp" => "image/webp",
            _ => "image/jpeg",
        };
        Self {
            file_name,
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        }
    }
}

pub trait FaceBackend {
    async fn list_faces(&self) -> Result<Vec<FaceRecord>, ApiError>;
    async fn face_statistics(&self) -> Result<FaceStatistics, ApiError>;
    async fn upload_face(&self, name: &str, image: FaceImage) -> Result<Registration, ApiError>;
    async fn register_by_path(&self, req: &RegisterByPath) -> Result<Registration, ApiError>;
    async fn update_face(&self, id: i64, update: &FaceUpdate) -> Result<(), ApiError>;
    async fn set_face_active(&self, id: i64, active: bool) -> Result<(), ApiError>;
    async fn delete_face(&self, id: i64) -> Result<(), ApiError>;
    async fn recognition_history(&self, id: i64, page: u32, size: u32) -> Result<RecognitionHistory, ApiError>;
}

pub trait EventBackend {
    async fn list_events(&self, filter: &EventFilter) -> Result<Page<EventRecord>, ApiError>;
    async fn recent_events(&self, limit: u32) -> Result<RecentEvents, ApiError>;
    async fn event(&self, id: i64) -> Result<EventRecord, ApiError>;
    async fn mark_read(&self, id: i64) -> Result<(), ApiError>;
    async fn mark_all_read(&self) -> Result<(), ApiError>;
    async fn set_status(&self, id: i64, status: EventStatus) -> Result<StatusChange, ApiError>;
    async fn delete_event(&self, id: i64) -> Result<(), ApiError>;
    async fn event_statistics(&self, days: u32) -> Result<EventStatistics, ApiError>;
}

pub trait ZoneBackend {
    async fn list_zones(&self) -> Result<Vec<DangerZone>, ApiError>;
    async fn zone(&self, id: i64) -> Result<DangerZone, ApiError>;
    async fn create_zone(&self, draft: &ZoneDraft) -> Result<DangerZone, ApiError>;
    async fn update_zone(&self, id: i64, patch: &ZonePatch) -> Result<DangerZone, ApiError>;
    async fn delete_zone(&self, id: i64) -> Result<(), ApiError>;
}

pub trait CameraBackend {
    async fn start_camera(&self) -> Result<(), ApiError>;
    async fn stop_camera(&self) -> Result<(), ApiError>;
    async fn camera_status(&self) -> Result<CameraStatus, ApiError>;
}

pub trait SystemBackend {
    async fn system_status(&self) -> Result<SystemStatus, ApiError>;
}
