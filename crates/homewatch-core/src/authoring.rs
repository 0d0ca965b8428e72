//! Polygon authoring for danger zones.
//!
//! `Idle → Drawing → Collecting → ReadyToSubmit → Idle`. Points are kept in
//! canvas space; nothing here talks to the network, so a rejected finish or
//! submission never costs a request.

use thiserror::Error;

use crate::geometry::{ensure_polygon, to_canvas_space, Extent, GeometryError, Point, Size, MIN_POLYGON_POINTS};
use crate::types::{default_zone_type, DangerZone, ZoneDraft, ZonePatch};

/// Dwell threshold offered for new zones, in seconds.
pub const DEFAULT_STAY_THRESHOLD: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthoringError {
    #[error("polygon needs at least {MIN_POLYGON_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("not drawing")]
    NotDrawing,
    #[error("polygon not finished")]
    NotReady,
    #[error("zone name is empty")]
    EmptyName,
    #[error("stay threshold must be at least 1 second")]
    InvalidThreshold,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthoringState {
    #[default]
    Idle,
    /// Drawing mode is on but no point has been placed yet.
    Drawing,
    Collecting,
    ReadyToSubmit,
}

/// A validated zone write: create when no zone is being edited.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Create(ZoneDraft),
    Update { id: i64, patch: ZonePatch },
}

#[derive(Debug, Clone, Default)]
pub struct PolygonEditor {
    state: AuthoringState,
    points: Vec<Point>,
    editing_id: Option<i64>,
}

impl PolygonEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AuthoringState {
        self.state
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn editing_id(&self) -> Option<i64> {
        self.editing_id
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, AuthoringState::Drawing | AuthoringState::Collecting)
    }

    /// Enter drawing mode with an empty buffer.
    pub fn start(&mut self) {
        self.points.clear();
        self.editing_id = None;
        self.state = AuthoringState::Drawing;
    }

    /// The draw button: starts from idle, cancels from any other state.
    pub fn toggle(&mut self) {
        if self.state == AuthoringState::Idle {
            self.start();
        } else {
            self.cancel();
        }
    }

    /// Append a point already in canvas space.
    pub fn click(&mut self, point: Point) -> Result<(), AuthoringError> {
        if !self.is_drawing() {
            return Err(AuthoringError::NotDrawing);
        }
        self.points.push(point);
        self.state = AuthoringState::Collecting;
        Ok(())
    }

    /// Append an on-screen click, mapping it into the backing store first.
    pub fn click_display(&mut self, click: Point, display: Extent, backing: Size) -> Result<Point, AuthoringError> {
        if !self.is_drawing() {
            return Err(AuthoringError::NotDrawing);
        }
        let p = to_canvas_space(click, display, backing)?;
        self.click(p)?;
        Ok(p)
    }

    /// Drop the last collected point.
    pub fn undo(&mut self) -> Option<Point> {
        if !self.is_drawing() {
            return None;
        }
        let p = self.points.pop();
        if self.points.is_empty() {
            self.state = AuthoringState::Drawing;
        }
        p
    }

    /// Close the polygon. Leaves the state untouched when it is too small.
    pub fn finish(&mut self) -> Result<(), AuthoringError> {
        if !self.is_drawing() {
            return Err(AuthoringError::NotDrawing);
        }
        if ensure_polygon(&self.points).is_err() {
            tracing::warn!(points = self.points.len(), "zone needs at least {MIN_POLYGON_POINTS} points");
            return Err(AuthoringError::TooFewPoints(self.points.len()));
        }
        self.state = AuthoringState::ReadyToSubmit;
        Ok(())
    }

    /// Load a stored zone for editing; goes straight to the submission step.
    pub fn begin_edit(&mut self, zone: &DangerZone) {
        self.points = zone.coordinates.clone();
        self.editing_id = Some(zone.id);
        self.state = AuthoringState::ReadyToSubmit;
    }

    /// Throw away the collected shape but keep the zone being edited, so a
    /// new outline replaces the stored one on submit.
    pub fn redraw(&mut self) {
        self.points.clear();
        self.state = AuthoringState::Drawing;
    }

    /// Build the request body for the finished polygon.
    pub fn submission(&self, name: &str, stay_threshold: u32) -> Result<Submission, AuthoringError> {
        if self.state != AuthoringState::ReadyToSubmit {
            return Err(AuthoringError::NotReady);
        }
        if self.points.len() < MIN_POLYGON_POINTS {
            return Err(AuthoringError::TooFewPoints(self.points.len()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthoringError::EmptyName);
        }
        if stay_threshold < 1 {
            return Err(AuthoringError::InvalidThreshold);
        }
        Ok(match self.editing_id {
            None => Submission::Create(ZoneDraft {
                name: name.to_string(),
                zone_type: default_zone_type(),
                coordinates: self.points.clone(),
                stay_threshold,
            }),
            Some(id) => Submission::Update {
                id,
                patch: ZonePatch {
                    name: Some(name.to_string()),
                    coordinates: Some(self.points.clone()),
                    stay_threshold: Some(stay_threshold),
                    is_active: None,
                },
            },
        })
    }

    /// Discard the buffer and go back to idle.
    pub fn cancel(&mut self) {
        self.points.clear();
        self.editing_id = None;
        self.state = AuthoringState::Idle;
    }

    /// The clear button: same reset as [`cancel`](Self::cancel), including
    /// the zone being edited. Use [`redraw`](Self::redraw) to keep it.
    pub fn clear(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(ed: &mut PolygonEditor) {
        ed.click(Point::new(10.0, 10.0)).unwrap();
        ed.click(Point::new(50.0, 10.0)).unwrap();
        ed.click(Point::new(50.0, 50.0)).unwrap();
    }

    #[test]
    fn test_start_click_finish() {
        let mut ed = PolygonEditor::new();
        assert_eq!(ed.state(), AuthoringState::Idle);
        ed.start();
        assert_eq!(ed.state(), AuthoringState::Drawing);
        tri(&mut ed);
        assert_eq!(ed.state(), AuthoringState::Collecting);
        ed.finish().unwrap();
        assert_eq!(ed.state(), AuthoringState::ReadyToSubmit);
    }

    #[test]
    fn test_finish_with_two_points_rejected() {
        let mut ed = PolygonEditor::new();
        ed.start();
        ed.click(Point::new(1.0, 1.0)).unwrap();
        ed.click(Point::new(2.0, 2.0)).unwrap();
        assert_eq!(ed.finish(), Err(AuthoringError::TooFewPoints(2)));
        assert_eq!(ed.state(), AuthoringState::Collecting);
        assert_eq!(ed.points().len(), 2);
    }

    #[test]
    fn test_click_when_idle_rejected() {
        let mut ed = PolygonEditor::new();
        assert_eq!(ed.click(Point::new(1.0, 1.0)), Err(AuthoringError::NotDrawing));
        assert!(ed.points().is_empty());
    }

    #[test]
    fn test_click_display_maps_to_canvas() {
        let mut ed = PolygonEditor::new();
        ed.start();
        let p = ed
            .click_display(Point::new(100.0, 60.0), Extent::new(320.0, 240.0), Size::new(640, 480))
            .unwrap();
        assert_eq!(p, Point::new(200.0, 120.0));
        assert_eq!(ed.points(), &[Point::new(200.0, 120.0)]);
    }

    #[test]
    fn test_toggle_cancels() {
        let mut ed = PolygonEditor::new();
        ed.toggle();
        tri(&mut ed);
        ed.toggle();
        assert_eq!(ed.state(), AuthoringState::Idle);
        assert!(ed.points().is_empty());
    }

    #[test]
    fn test_undo_back_to_drawing() {
        let mut ed = PolygonEditor::new();
        ed.start();
        ed.click(Point::new(1.0, 1.0)).unwrap();
        assert_eq!(ed.undo(), Some(Point::new(1.0, 1.0)));
        assert_eq!(ed.state(), AuthoringState::Drawing);
        assert_eq!(ed.undo(), None);
    }

    #[test]
    fn test_create_submission() {
        let mut ed = PolygonEditor::new();
        ed.start();
        tri(&mut ed);
        ed.finish().unwrap();
        match ed.submission(" Pool ", 5).unwrap() {
            Submission::Create(draft) => {
                assert_eq!(draft.name, "Pool");
                assert_eq!(draft.zone_type, "polygon");
                assert_eq!(draft.coordinates.len(), 3);
                assert_eq!(draft.stay_threshold, 5);
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn test_submission_validation() {
        let mut ed = PolygonEditor::new();
        assert_eq!(ed.submission("x", 5), Err(AuthoringError::NotReady));
        ed.start();
        tri(&mut ed);
        ed.finish().unwrap();
        assert_eq!(ed.submission("  ", 5), Err(AuthoringError::EmptyName));
        assert_eq!(ed.submission("x", 0), Err(AuthoringError::InvalidThreshold));
    }

    #[test]
    fn test_edit_switches_to_update() {
        let zone = DangerZone {
            id: 7,
            name: "Stairs".into(),
            zone_type: "polygon".into(),
            coordinates: vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(5.0, 5.0)],
            stay_threshold: 10,
            is_active: true,
            created_at: None,
            updated_at: None,
        };
        let mut ed = PolygonEditor::new();
        ed.begin_edit(&zone);
        assert_eq!(ed.state(), AuthoringState::ReadyToSubmit);
        assert_eq!(ed.editing_id(), Some(7));
        match ed.submission("Stairs", 20).unwrap() {
            Submission::Update { id, patch } => {
                assert_eq!(id, 7);
                assert_eq!(patch.stay_threshold, Some(20));
                assert_eq!(patch.coordinates.map(|c| c.len()), Some(3));
            }
            other => panic!("expected update, got {other:?}"),
        }
        ed.cancel();
        assert_eq!(ed.editing_id(), None);
        assert_eq!(ed.state(), AuthoringState::Idle);
    }

    #[test]
    fn test_redraw_keeps_editing_id() {
        let zone = DangerZone {
            id: 3,
            name: "Gate".into(),
            zone_type: "polygon".into(),
            coordinates: vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(5.0, 5.0)],
            stay_threshold: 10,
            is_active: true,
            created_at: None,
            updated_at: None,
        };
        let mut ed = PolygonEditor::new();
        ed.begin_edit(&zone);
        ed.redraw();
        assert_eq!(ed.state(), AuthoringState::Drawing);
        tri(&mut ed);
        tri(&mut ed);
        ed.finish().unwrap();
        match ed.submission("Gate", 10).unwrap() {
            Submission::Update { id, patch } => {
                assert_eq!(id, 3);
                assert_eq!(patch.coordinates.map(|c| c.len()), Some(6));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_clear_resets_to_idle() {
        let mut ed = PolygonEditor::new();
        ed.start();
        ed.click(Point::new(1.0, 1.0)).unwrap();
        ed.click(Point::new(2.0, 2.0)).unwrap();
        ed.clear();
        assert_eq!(ed.state(), AuthoringState::Idle);
        assert!(ed.points().is_empty());
        assert_eq!(ed.click(Point::new(3.0, 3.0)), Err(AuthoringError::NotDrawing));
    }

    #[test]
    fn test_clear_drops_edit_target() {
        let zone = DangerZone {
            id: 5,
            name: "Shed".into(),
            zone_type: "polygon".into(),
            coordinates: vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(5.0, 5.0)],
            stay_threshold: 10,
            is_active: true,
            created_at: None,
            updated_at: None,
        };
        let mut ed = PolygonEditor::new();
        ed.begin_edit(&zone);
        ed.clear();
        assert_eq!(ed.state(), AuthoringState::Idle);
        assert_eq!(ed.editing_id(), None);
        assert_eq!(ed.submission("Shed", 10), Err(AuthoringError::NotReady));
    }
}
