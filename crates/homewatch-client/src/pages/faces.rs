use homewatch_core::types::{FaceRecord, FaceStatistics, FaceUpdate, RecognitionHistory, RegisterByPath, Registration};

use crate::backend::{FaceBackend, FaceImage};
use crate::notice::Notifier;
use crate::pages::PageError;

/// Registered faces plus dashboard counters.
pub struct FacesPage<B: FaceBackend> {
    backend: B,
    notifier: Notifier,
    faces: Vec<FaceRecord>,
    statistics: Option<FaceStatistics>,
    history: Option<RecognitionHistory>,
}

impl<B: FaceBackend> FacesPage<B> {
    pub fn new(backend: B, notifier: Notifier) -> Self {
        Self {
            backend,
            notifier,
            faces: Vec::new(),
            statistics: None,
            history: None,
        }
    }

    pub fn faces(&self) -> &[FaceRecord] {
        &self.faces
    }

    pub fn statistics(&self) -> Option<&FaceStatistics> {
        self.statistics.as_ref()
    }

    pub fn history(&self) -> Option<&RecognitionHistory> {
        self.history.as_ref()
    }

    fn report<T>(&self, result: Result<T, PageError>) -> Result<T, PageError> {
        if let Err(err) = &result {
            self.notifier.error(err.user_message());
        }
        result
    }

    /// Fetch the list and the counters.
    pub async fn load(&mut self) -> Result<(), PageError> {
        self.refresh().await?;
        let stats = self.backend.face_statistics().await.map_err(PageError::from);
        self.statistics = Some(self.report(stats)?);
        Ok(())
    }

    pub async fn refresh(&mut self) -> Result<(), PageError> {
        let faces = self.backend.list_faces().await.map_err(PageError::from);
        self.faces = self.report(faces)?;
        tracing::debug!(count = self.faces.len(), "faces loaded");
        Ok(())
    }

    pub async fn register_upload(&mut self, name: &str, image: FaceImage) -> Result<Registration, PageError> {
        let name = name.trim();
        if name.is_empty() {
            return self.report(Err(PageError::Invalid("name is required".into())));
        }
        if image.bytes.is_empty() {
            return self.report(Err(PageError::Invalid("image file is empty".into())));
        }
        let reg = self.backend.upload_face(name, image).await.map_err(PageError::from);
        let reg = self.report(reg)?;
        tracing::info!(user_id = reg.user_id, name = %reg.name, "face registered");
        self.notifier.success(format!("registered {}", reg.name));
        self.refresh().await?;
        Ok(reg)
    }

    pub async fn register_by_path(&mut self, name: &str, image_path: &str) -> Result<Registration, PageError> {
        let (name, image_path) = (name.trim(), image_path.trim());
        if name.is_empty() || image_path.is_empty() {
            return self.report(Err(PageError::Invalid("name and image path are required".into())));
        }
        let req = RegisterByPath {
            name: name.to_string(),
            image_path: image_path.to_string(),
            description: None,
        };
        let reg = self.backend.register_by_path(&req).await.map_err(PageError::from);
        let reg = self.report(reg)?;
        tracing::info!(user_id = reg.user_id, name = %reg.name, "face registered from path");
        self.notifier.success(format!("registered {}", reg.name));
        self.refresh().await?;
        Ok(reg)
    }

    pub async fn update(&mut self, id: i64, update: FaceUpdate) -> Result<(), PageError> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return self.report(Err(PageError::Invalid("name must not be empty".into())));
        }
        let res = self.backend.update_face(id, &update).await.map_err(PageError::from);
        self.report(res)?;
        self.notifier.success("face updated");
        self.refresh().await
    }

    /// Flip the active flag locally first; restore it if the backend refuses.
    pub async fn toggle_active(&mut self, id: i64) -> Result<bool, PageError> {
        let Some(pos) = self.faces.iter().position(|f| f.id == id) else {
            return self.report(Err(PageError::NotFound(id)));
        };
        let previous = self.faces[pos].is_active;
        self.faces[pos].is_active = !previous;

        if let Err(err) = self.backend.set_face_active(id, !previous).await {
            if let Some(face) = self.faces.iter_mut().find(|f| f.id == id) {
                face.is_active = previous;
            }
            tracing::warn!(id, error = %err, "face status change rolled back");
            return self.report(Err(err.into()));
        }
        self.notifier
            .success(if previous { "face disabled" } else { "face enabled" });
        self.refresh().await?;
        Ok(!previous)
    }

    pub async fn delete(&mut self, id: i64) -> Result<(), PageError> {
        let res = self.backend.delete_face(id).await.map_err(PageError::from);
        self.report(res)?;
        tracing::info!(id, "face deleted");
        self.notifier.success("face deleted");
        self.refresh().await
    }

    pub async fn load_history(&mut self, id: i64, page: u32, size: u32) -> Result<(), PageError> {
        let page = page.max(1);
        let size = size.clamp(1, 100);
        let history = self
            .backend
            .recognition_history(id, page, size)
            .await
            .map_err(PageError::from);
        self.history = Some(self.report(history)?);
        Ok(())
    }
}
