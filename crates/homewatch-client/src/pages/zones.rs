use homewatch_core::authoring::{PolygonEditor, Submission};
use homewatch_core::types::{DangerZone, ZonePatch};

use crate::backend::ZoneBackend;
use crate::notice::Notifier;
use crate::pages::PageError;

/// Danger-zone list plus the polygon editor that feeds create/update.
pub struct ZonesPage<B: ZoneBackend> {
    backend: B,
    notifier: Notifier,
    zones: Vec<DangerZone>,
    detail: Option<DangerZone>,
    editor: PolygonEditor,
}

impl<B: ZoneBackend> ZonesPage<B> {
    pub fn new(backend: B, notifier: Notifier) -> Self {
        Self {
            backend,
            notifier,
            zones: Vec::new(),
            detail: None,
            editor: PolygonEditor::new(),
        }
    }

    pub fn zones(&self) -> &[DangerZone] {
        &self.zones
    }

    pub fn detail(&self) -> Option<&DangerZone> {
        self.detail.as_ref()
    }

    pub fn editor(&self) -> &PolygonEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut PolygonEditor {
        &mut self.editor
    }

    fn report<T>(&self, result: Result<T, PageError>) -> Result<T, PageError> {
        if let Err(err) = &result {
            match err {
                PageError::Authoring(_) | PageError::Invalid(_) => self.notifier.warning(err.user_message()),
                _ => self.notifier.error(err.user_message()),
            }
        }
        result
    }

    pub async fn refresh(&mut self) -> Result<(), PageError> {
        let zones = self.backend.list_zones().await.map_err(PageError::from);
        self.zones = self.report(zones)?;
        tracing::debug!(count = self.zones.len(), "zones loaded");
        Ok(())
    }

    pub async fn load_detail(&mut self, id: i64) -> Result<(), PageError> {
        let zone = self.backend.zone(id).await.map_err(PageError::from);
        self.detail = Some(self.report(zone)?);
        Ok(())
    }

    /// Close the polygon being drawn.
    pub fn finish_drawing(&mut self) -> Result<(), PageError> {
        let res = self.editor.finish().map_err(PageError::from);
        self.report(res)
    }

    /// Load a listed zone into the editor for an update.
    pub fn begin_edit(&mut self, id: i64) -> Result<(), PageError> {
        let Some(zone) = self.zones.iter().find(|z| z.id == id) else {
            return self.report(Err(PageError::NotFound(id)));
        };
        self.editor.begin_edit(zone);
        Ok(())
    }

    /// Create or update from the finished polygon. Validation failures never
    /// reach the backend.
    pub async fn submit(&mut self, name: &str, stay_threshold: u32) -> Result<DangerZone, PageError> {
        let submission = self.editor.submission(name, stay_threshold).map_err(PageError::from);
        let saved = match self.report(submission)? {
            Submission::Create(draft) => {
                let res = self.backend.create_zone(&draft).await.map_err(PageError::from);
                let zone = self.report(res)?;
                self.notifier.success(format!("zone {} created", zone.name));
                zone
            }
            Submission::Update { id, patch } => {
                let res = self.backend.update_zone(id, &patch).await.map_err(PageError::from);
                let zone = self.report(res)?;
                tracing::info!(zone = %zone.name, id, "zone updated");
                self.notifier.success(format!("zone {} updated", zone.name));
                zone
            }
        };
        self.editor.cancel();
        self.refresh().await?;
        Ok(saved)
    }

    /// Optimistic active toggle; reverted when the backend refuses.
    pub async fn toggle_active(&mut self, id: i64) -> Result<bool, PageError> {
        let Some(pos) = self.zones.iter().position(|z| z.id == id) else {
            return self.report(Err(PageError::NotFound(id)));
        };
        let previous = self.zones[pos].is_active;
        self.zones[pos].is_active = !previous;

        let patch = ZonePatch {
            is_active: Some(!previous),
            ..Default::default()
        };
        if let Err(err) = self.backend.update_zone(id, &patch).await {
            if let Some(zone) = self.zones.iter_mut().find(|z| z.id == id) {
                zone.is_active = previous;
            }
            tracing::warn!(id, error = %err, "zone status change rolled back");
            return self.report(Err(err.into()));
        }
        self.refresh().await?;
        Ok(!previous)
    }

    pub async fn delete(&mut self, id: i64) -> Result<(), PageError> {
        let res = self.backend.delete_zone(id).await.map_err(PageError::from);
        self.report(res)?;
        if self.editor.editing_id() == Some(id) {
            self.editor.cancel();
        }
        tracing::info!(id, "zone deleted");
        self.notifier.success("zone deleted");
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::notice::Level;
    use crate::pages::fakes::CallLog;
    use crate::store::DashboardState;
    use homewatch_core::authoring::AuthoringState;
    use homewatch_core::geometry::Point;
    use homewatch_core::overlay::{Layers, OverlayRenderer, Scene, Tick};
    use homewatch_core::recording::{DrawOp, RecordingSurface};
    use homewatch_core::types::ZoneDraft;
    use image::RgbaImage;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeZones {
        log: CallLog,
        zones: RefCell<Vec<DangerZone>>,
    }

    impl ZoneBackend for &FakeZones {
        async fn list_zones(&self) -> Result<Vec<DangerZone>, ApiError> {
            self.log.hit("list")?;
            Ok(self.zones.borrow().clone())
        }

        async fn zone(&self, id: i64) -> Result<DangerZone, ApiError> {
            self.log.hit("detail")?;
            self.zones
                .borrow()
                .iter()
                .find(|z| z.id == id)
                .cloned()
                .ok_or_else(|| ApiError::Business("zone not found".into()))
        }

        async fn create_zone(&self, draft: &ZoneDraft) -> Result<DangerZone, ApiError> {
            self.log.hit("create")?;
            let zone = DangerZone {
                id: self.zones.borrow().len() as i64 + 1,
                name: draft.name.clone(),
                zone_type: draft.zone_type.clone(),
                coordinates: draft.coordinates.clone(),
                stay_threshold: draft.stay_threshold,
                is_active: true,
                created_at: None,
                updated_at: None,
            };
            self.zones.borrow_mut().push(zone.clone());
            Ok(zone)
        }

        async fn update_zone(&self, id: i64, patch: &ZonePatch) -> Result<DangerZone, ApiError> {
            self.log.hit("update")?;
            let mut zones = self.zones.borrow_mut();
            let zone = zones
                .iter_mut()
                .find(|z| z.id == id)
                .ok_or_else(|| ApiError::Business("zone not found".into()))?;
            if let Some(n) = &patch.name {
                zone.name = n.clone();
            }
            if let Some(c) = &patch.coordinates {
                zone.coordinates = c.clone();
            }
            if let Some(t) = patch.stay_threshold {
                zone.stay_threshold = t;
            }
            if let Some(a) = patch.is_active {
                zone.is_active = a;
            }
            Ok(zone.clone())
        }

        async fn delete_zone(&self, id: i64) -> Result<(), ApiError> {
            self.log.hit("delete")?;
            self.zones.borrow_mut().retain(|z| z.id != id);
            Ok(())
        }
    }

    fn draw_triangle<B: ZoneBackend>(page: &mut ZonesPage<B>) {
        let ed = page.editor_mut();
        ed.start();
        ed.click(Point::new(10.0, 10.0)).unwrap();
        ed.click(Point::new(50.0, 10.0)).unwrap();
        ed.click(Point::new(50.0, 50.0)).unwrap();
    }

    #[tokio::test]
    async fn test_pool_zone_end_to_end() {
        let fake = FakeZones::default();
        let (n, _rx) = Notifier::channel();
        let mut page = ZonesPage::new(&fake, n);
        draw_triangle(&mut page);
        page.finish_drawing().unwrap();
        let created = page.submit("Pool", 5).await.unwrap();
        assert_eq!(created.name, "Pool");
        assert_eq!(fake.log.count("create"), 1);
        assert_eq!(fake.log.count("list"), 1);
        assert_eq!(page.editor().state(), AuthoringState::Idle);
        assert_eq!(page.zones().len(), 1);

        let frame = RgbaImage::new(100, 100);
        let mut surface = RecordingSurface::default();
        let mut renderer = OverlayRenderer::new(Layers::default());
        let state = DashboardState::new(10);
        let scene = Scene {
            faces: &state.faces,
            zones: page.zones(),
            ..Default::default()
        };
        assert_eq!(renderer.tick(&mut surface, Some(&frame), &scene), Tick::Drawn);

        let fills: Vec<&Vec<Point>> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::FillPolygon { points, .. } => Some(points),
                _ => None,
            })
            .collect();
        assert_eq!(fills.len(), 1);
        assert_eq!(
            fills[0],
            &vec![Point::new(10.0, 10.0), Point::new(50.0, 10.0), Point::new(50.0, 50.0)]
        );
        assert!(surface.texts().contains(&"Pool".to_string()));
    }

    #[tokio::test]
    async fn test_two_points_never_submitted() {
        let fake = FakeZones::default();
        let (n, mut rx) = Notifier::channel();
        let mut page = ZonesPage::new(&fake, n);
        let ed = page.editor_mut();
        ed.start();
        ed.click(Point::new(1.0, 1.0)).unwrap();
        ed.click(Point::new(2.0, 2.0)).unwrap();
        assert!(page.finish_drawing().is_err());
        assert_eq!(page.editor().state(), AuthoringState::Collecting);
        assert!(page.submit("Gate", 5).await.is_err());
        assert_eq!(fake.log.total(), 0);
        assert_eq!(rx.try_recv().unwrap().level, Level::Warning);
    }

    #[tokio::test]
    async fn test_edit_submits_update() {
        let fake = FakeZones::default();
        let (n, _rx) = Notifier::channel();
        let mut page = ZonesPage::new(&fake, n);
        draw_triangle(&mut page);
        page.finish_drawing().unwrap();
        page.submit("Pool", 5).await.unwrap();

        page.begin_edit(1).unwrap();
        page.submit("Deep end", 8).await.unwrap();
        assert_eq!(fake.log.count("update"), 1);
        assert_eq!(fake.log.count("create"), 1);
        assert_eq!(page.zones()[0].name, "Deep end");
        assert_eq!(page.zones()[0].stay_threshold, 8);
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts() {
        let fake = FakeZones::default();
        let (n, _rx) = Notifier::channel();
        let mut page = ZonesPage::new(&fake, n);
        draw_triangle(&mut page);
        page.finish_drawing().unwrap();
        page.submit("Pool", 5).await.unwrap();

        fake.log.fail_next.set(true);
        assert!(page.toggle_active(1).await.is_err());
        assert!(page.zones()[0].is_active);

        assert!(!page.toggle_active(1).await.unwrap());
        assert!(!page.zones()[0].is_active);
    }

    #[tokio::test]
    async fn test_delete_refetches() {
        let fake = FakeZones::default();
        let (n, _rx) = Notifier::channel();
        let mut page = ZonesPage::new(&fake, n);
        draw_triangle(&mut page);
        page.finish_drawing().unwrap();
        page.submit("Pool", 5).await.unwrap();
        page.load_detail(1).await.unwrap();
        assert_eq!(page.detail().unwrap().name, "Pool");
        page.delete(1).await.unwrap();
        assert!(page.zones().is_empty());
    }
}
