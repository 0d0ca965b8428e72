//! REST client for the HomeWatch backend.
//!
//! Every endpoint answers with a `{success, message, data}` envelope except
//! camera status. A `success: false` envelope becomes [`ApiError::Business`]
//! carrying the backend's message; non-2xx responses carry FastAPI's
//! `detail` when present. No retries: each failure is reported once.

use homewatch_core::types::{
    AdminAccount, AdminSession, CameraStatus, Credentials, DangerZone, Envelope, EventFilter, EventRecord,
    EventStatistics, EventStatus, FaceRecord, FaceStatistics, FaceUpdate, Page, RecentEvents, RecognitionHistory,
    RegisterByPath, Registration, StatusChange, SystemStatus, ZoneDraft, ZonePatch,
};
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::backend::{CameraBackend, EventBackend, FaceBackend, FaceImage, SystemBackend, ZoneBackend};
use crate::config::ClientConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Business(String),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response carried no data")]
    MissingData,
}

impl ApiError {
    /// Text for a one-shot notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Business(msg) => msg.clone(),
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(err) if err.is_timeout() => "request timed out".to_string(),
            ApiError::Transport(_) => "network error, check the backend connection".to_string(),
            other => other.to_string(),
        }
    }
}

/// Unwrap an enveloped body that must carry data.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let env: Envelope<T> = serde_json::from_slice(body)?;
    if !env.success {
        return Err(ApiError::Business(env.message.unwrap_or_else(|| "request failed".to_string())));
    }
    env.data.ok_or(ApiError::MissingData)
}

/// Unwrap an enveloped body where only `success` matters.
pub fn decode_ack(body: &[u8]) -> Result<Option<String>, ApiError> {
    let env: Envelope<Value> = serde_json::from_slice(body)?;
    if !env.success {
        return Err(ApiError::Business(env.message.unwrap_or_else(|| "request failed".to_string())));
    }
    Ok(env.message)
}

/// Error text for a non-2xx response body.
pub fn status_message(status: u16, body: &[u8]) -> String {
    let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        v.get("detail")
            .or_else(|| v.get("message"))
            .and_then(|d| d.as_str().map(str::to_string))
    });
    from_json.unwrap_or_else(|| {
        let text = String::from_utf8_lossy(body).trim().to_string();
        if text.is_empty() {
            format!("HTTP {status}")
        } else {
            text
        }
    })
}

/// Clone-safe REST handle; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Live MJPEG endpoint for the given RTMP source.
    pub fn mjpeg_url(&self, rtmp_url: &str) -> Result<reqwest::Url, ApiError> {
        let url = reqwest::Url::parse_with_params(&self.url("/api/stream/mjpeg"), &[("rtmp_url", rtmp_url)])
            .map_err(|e| ApiError::Business(format!("bad stream URL: {e}")))?;
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, self.url(path));
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<bytes::Bytes, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            let message = status_message(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), %message, "request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send(self.request(reqwest::Method::GET, path)).await?;
        decode_envelope(&body)
    }

    async fn get_query<T: DeserializeOwned, Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<T, ApiError> {
        let body = self.send(self.request(reqwest::Method::GET, path).query(query)).await?;
        decode_envelope(&body)
    }

    async fn write<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        json: &B,
    ) -> Result<T, ApiError> {
        let body = self.send(self.request(method, path).json(json)).await?;
        decode_envelope(&body)
    }

    async fn ack(&self, method: reqwest::Method, path: &str, json: Option<&Value>) -> Result<(), ApiError> {
        let mut req = self.request(method, path);
        if let Some(json) = json {
            req = req.json(json);
        }
        let body = self.send(req).await?;
        decode_ack(&body)?;
        Ok(())
    }

    // --- Auth ---

    pub async fn login(&self, username: &str, password: &str) -> Result<AdminSession, ApiError> {
        let creds = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let session: AdminSession = self.write(reqwest::Method::POST, "/api/auth/admin/login", &creds).await?;
        tracing::info!(admin = %session.admin.username, "logged in");
        Ok(session)
    }

    /// Check the configured token and return the admin it belongs to.
    pub async fn verify_token(&self) -> Result<AdminAccount, ApiError> {
        let token = self.token.clone().unwrap_or_default();
        self.write(
            reqwest::Method::POST,
            "/api/auth/admin/verify-token",
            &serde_json::json!({ "token": token }),
        )
        .await
    }
}

impl SystemBackend for ApiClient {
    async fn system_status(&self) -> Result<SystemStatus, ApiError> {
        self.get("/api/system/status").await
    }
}

impl CameraBackend for ApiClient {
    async fn start_camera(&self) -> Result<(), ApiError> {
        self.ack(reqwest::Method::POST, "/api/video/camera/start", None).await?;
        tracing::info!("camera started");
        Ok(())
    }

    async fn stop_camera(&self) -> Result<(), ApiError> {
        self.ack(reqwest::Method::POST, "/api/video/camera/stop", None).await?;
        tracing::info!("camera stopped");
        Ok(())
    }

    async fn camera_status(&self) -> Result<CameraStatus, ApiError> {
        let body = self
            .send(self.request(reqwest::Method::GET, "/api/video/camera/status"))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl FaceBackend for ApiClient {
    async fn list_faces(&self) -> Result<Vec<FaceRecord>, ApiError> {
        self.get("/api/face/users").await
    }

    async fn face_statistics(&self) -> Result<FaceStatistics, ApiError> {
        self.get("/api/face/statistics").await
    }

    async fn upload_face(&self, name: &str, image: FaceImage) -> Result<Registration, ApiError> {
        let part = multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;
        let form = multipart::Form::new().text("name", name.to_string()).part("file", part);
        let body = self
            .send(self.request(reqwest::Method::POST, "/api/face/upload").multipart(form))
            .await?;
        decode_envelope(&body)
    }

    async fn register_by_path(&self, req: &RegisterByPath) -> Result<Registration, ApiError> {
        self.write(reqwest::Method::POST, "/api/face/register-by-path", req).await
    }

    async fn update_face(&self, id: i64, update: &FaceUpdate) -> Result<(), ApiError> {
        let json = serde_json::to_value(update)?;
        self.ack(reqwest::Method::PUT, &format!("/api/face/{id}"), Some(&json)).await
    }

    async fn set_face_active(&self, id: i64, active: bool) -> Result<(), ApiError> {
        let json = serde_json::json!({ "is_active": active });
        self.ack(reqwest::Method::PUT, &format!("/api/face/{id}/status"), Some(&json))
            .await
    }

    async fn delete_face(&self, id: i64) -> Result<(), ApiError> {
        self.ack(reqwest::Method::DELETE, &format!("/api/face/{id}"), None).await
    }

    async fn recognition_history(&self, id: i64, page: u32, size: u32) -> Result<RecognitionHistory, ApiError> {
        self.get_query(
            &format!("/api/face/{id}/recognition-history"),
            &[("page", page), ("size", size)],
        )
        .await
    }
}

impl EventBackend for ApiClient {
    async fn list_events(&self, filter: &EventFilter) -> Result<Page<EventRecord>, ApiError> {
        self.get_query("/api/events/", filter).await
    }

    async fn recent_events(&self, limit: u32) -> Result<RecentEvents, ApiError> {
        self.get_query("/api/events/recent", &[("limit", limit)]).await
    }

    async fn event(&self, id: i64) -> Result<EventRecord, ApiError> {
        self.get(&format!("/api/events/{id}")).await
    }

    async fn mark_read(&self, id: i64) -> Result<(), ApiError> {
        self.ack(reqwest::Method::PUT, &format!("/api/events/{id}/read"), None).await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.ack(reqwest::Method::PUT, "/api/events/mark-all-read", None).await
    }

    async fn set_status(&self, id: i64, status: EventStatus) -> Result<StatusChange, ApiError> {
        self.write(
            reqwest::Method::PUT,
            &format!("/api/events/{id}/status"),
            &serde_json::json!({ "status": status }),
        )
        .await
    }

    async fn delete_event(&self, id: i64) -> Result<(), ApiError> {
        self.ack(reqwest::Method::DELETE, &format!("/api/events/{id}"), None).await
    }

    async fn event_statistics(&self, days: u32) -> Result<EventStatistics, ApiError> {
        self.get_query("/api/events/statistics", &[("days", days)]).await
    }
}

impl ZoneBackend for ApiClient {
    async fn list_zones(&self) -> Result<Vec<DangerZone>, ApiError> {
        self.get("/api/zone/").await
    }

    async fn zone(&self, id: i64) -> Result<DangerZone, ApiError> {
        self.get(&format!("/api/zone/{id}")).await
    }

    async fn create_zone(&self, draft: &ZoneDraft) -> Result<DangerZone, ApiError> {
        let zone: DangerZone = self.write(reqwest::Method::POST, "/api/zone/", draft).await?;
        tracing::info!(zone = %zone.name, id = zone.id, "zone created");
        Ok(zone)
    }

    async fn update_zone(&self, id: i64, patch: &ZonePatch) -> Result<DangerZone, ApiError> {
        self.write(reqwest::Method::PUT, &format!("/api/zone/{id}"), patch).await
    }

    async fn delete_zone(&self, id: i64) -> Result<(), ApiError> {
        self.ack(reqwest::Method::DELETE, &format!("/api/zone/{id}"), None).await
    }
}
