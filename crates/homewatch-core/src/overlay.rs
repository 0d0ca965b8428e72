//! Overlay compositor: the live frame plus zones, face boxes, trajectory and
//! the polygon being authored, drawn in that order on every tick.

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::geometry::{vertex_centroid, Point, Rect, Size};
use crate::types::{DangerZone, DetectedFace};

// --- Named styling constants ---
/// Label shown on faces with no registered match.
pub const STRANGER_LABEL: &str = "陌生人";
const STRANGER_COLOR: Rgba<u8> = Rgba([255, 77, 79, 255]);
const KNOWN_COLOR: Rgba<u8> = Rgba([82, 196, 26, 255]);
const ZONE_ACTIVE_COLOR: Rgba<u8> = Rgba([250, 140, 22, 255]);
const ZONE_INACTIVE_COLOR: Rgba<u8> = Rgba([140, 140, 140, 255]);
const ZONE_VIOLATION_COLOR: Rgba<u8> = Rgba([245, 34, 45, 255]);
const DRAFT_COLOR: Rgba<u8> = Rgba([24, 144, 255, 255]);
const TRAJECTORY_COLOR: Rgba<u8> = Rgba([250, 219, 20, 255]);
const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FILL_ALPHA: u8 = 0x40;
const LABEL_FONT_PX: f32 = 14.0;
const LABEL_PAD: f32 = 4.0;
const BOX_STROKE_WIDTH: f32 = 2.0;
const VERTEX_RADIUS: f32 = 4.0;
const ZONE_DASH: (f32, f32) = (8.0, 6.0);
/// Centres kept by [`TrajectoryTrail`].
pub const TRAJECTORY_CAPACITY: usize = 50;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("frame is {frame:?} but surface is {surface:?}")]
    FrameSizeMismatch { frame: Size, surface: Size },
    #[error("non-finite coordinate")]
    NonFinite,
}

/// Reject NaN/infinite coordinates before they reach a rasteriser.
pub fn check_finite(points: &[Point]) -> Result<(), SurfaceError> {
    if points.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
        Ok(())
    } else {
        Err(SurfaceError::NonFinite)
    }
}

/// Line style for outlines and paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Rgba<u8>,
    pub width: f32,
    /// `(on, off)` dash lengths in pixels; `None` draws solid.
    pub dash: Option<(f32, f32)>,
}

impl Stroke {
    pub const fn solid(color: Rgba<u8>, width: f32) -> Self {
        Self { color, width, dash: None }
    }
}

/// A piece of text placed on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub origin: Point,
    pub color: Rgba<u8>,
}

/// 2-D drawing target, in backing-store pixels.
pub trait Surface {
    fn size(&self) -> Size;
    /// Reallocate the backing store. Implicitly clears it.
    fn resize(&mut self, size: Size);
    fn clear(&mut self);
    fn draw_frame(&mut self, frame: &RgbaImage) -> Result<(), SurfaceError>;
    fn fill_polygon(&mut self, points: &[Point], color: Rgba<u8>) -> Result<(), SurfaceError>;
    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: Stroke) -> Result<(), SurfaceError>;
    fn stroke_rect(&mut self, rect: Rect, stroke: Stroke) -> Result<(), SurfaceError>;
    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) -> Result<(), SurfaceError>;
    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba<u8>) -> Result<(), SurfaceError>;
    fn fill_text(&mut self, text: &str, origin: Point, color: Rgba<u8>) -> Result<(), SurfaceError>;
}

/// Per-layer visibility toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
    pub faces: bool,
    pub zones: bool,
    pub trajectory: bool,
}

impl Default for Layers {
    fn default() -> Self {
        Self {
            faces: true,
            zones: true,
            trajectory: false,
        }
    }
}

/// Everything drawn over the frame on one tick. Borrowed from current state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scene<'a> {
    pub faces: &'a [DetectedFace],
    pub zones: &'a [DangerZone],
    /// Points of the polygon being authored, in canvas space.
    pub draft: &'a [Point],
    pub trajectory: &'a [Point],
    /// Zones with a live violation; drawn emphasised.
    pub violated_zones: &'a [i64],
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Drawn,
    /// No frame yet, or the frame reports zero size.
    NotReady,
    /// Drawing failed part-way; the next tick starts over.
    Dropped,
}

/// Bounded history of face centres for the trajectory layer.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryTrail {
    points: Vec<Point>,
}

impl TrajectoryTrail {
    pub fn record(&mut self, faces: &[DetectedFace]) {
        let centres: Vec<Point> = faces.iter().map(|f| f.location.rect().center()).collect();
        if let Some(c) = vertex_centroid(&centres) {
            self.points.push(c);
            if self.points.len() > TRAJECTORY_CAPACITY {
                let excess = self.points.len() - TRAJECTORY_CAPACITY;
                self.points.drain(..excess);
            }
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Rough advance width: CJK glyphs are square, Latin ones about 0.6 em.
fn text_width(text: &str, font_px: f32) -> f32 {
    text.chars()
        .map(|c| if c.is_ascii() { font_px * 0.6 } else { font_px })
        .sum()
}

fn with_alpha(mut c: Rgba<u8>, a: u8) -> Rgba<u8> {
    c[3] = a;
    c
}

/// Text shown above a face box.
pub fn face_label(face: &DetectedFace) -> String {
    match (&face.matched, face.is_stranger) {
        (Some(m), false) => format!("{} {:.0}%", m.name, m.confidence * 100.0),
        _ => STRANGER_LABEL.to_string(),
    }
}

/// Draws the composite; keeps per-renderer counters.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    pub layers: Layers,
    drawn: u64,
    dropped: u64,
}

impl OverlayRenderer {
    pub fn new(layers: Layers) -> Self {
        Self {
            layers,
            drawn: 0,
            dropped: 0,
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.drawn
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    /// Run one animation tick. Never fails: a bad frame is dropped and logged.
    pub fn tick<S: Surface>(&mut self, surface: &mut S, frame: Option<&RgbaImage>, scene: &Scene<'_>) -> Tick {
        let Some(frame) = frame else {
            return Tick::NotReady;
        };
        let native = Size::new(frame.width(), frame.height());
        if native.is_empty() {
            return Tick::NotReady;
        }
        match self.draw(surface, frame, native, scene) {
            Ok(()) => {
                self.drawn += 1;
                Tick::Drawn
            }
            Err(err) => {
                self.dropped += 1;
                tracing::debug!(error = %err, "overlay frame dropped");
                Tick::Dropped
            }
        }
    }

    fn draw<S: Surface>(
        &self,
        surface: &mut S,
        frame: &RgbaImage,
        native: Size,
        scene: &Scene<'_>,
    ) -> Result<(), SurfaceError> {
        // Reallocating clears the store, so only do it when the size changes.
        if surface.size() != native {
            surface.resize(native);
        }
        surface.clear();
        surface.draw_frame(frame)?;

        if self.layers.zones {
            for zone in scene.zones {
                let violated = scene.violated_zones.contains(&zone.id);
                draw_zone(surface, zone, violated)?;
            }
        }
        if self.layers.faces {
            for face in scene.faces {
                draw_face(surface, face)?;
            }
        }
        if self.layers.trajectory && scene.trajectory.len() >= 2 {
            surface.stroke_path(scene.trajectory, false, Stroke::solid(TRAJECTORY_COLOR, BOX_STROKE_WIDTH))?;
            for p in scene.trajectory {
                surface.fill_circle(*p, VERTEX_RADIUS / 2.0, TRAJECTORY_COLOR)?;
            }
        }
        draw_draft(surface, scene.draft)?;
        Ok(())
    }
}

fn draw_label<S: Surface>(surface: &mut S, text: &str, at: Point, background: Rgba<u8>) -> Result<(), SurfaceError> {
    let w = text_width(text, LABEL_FONT_PX) + LABEL_PAD * 2.0;
    let h = LABEL_FONT_PX + LABEL_PAD * 2.0;
    surface.fill_rect(Rect::new(at.x, at.y, w, h), background)?;
    surface.fill_text(text, Point::new(at.x + LABEL_PAD, at.y + LABEL_PAD), LABEL_TEXT_COLOR)
}

fn draw_zone<S: Surface>(surface: &mut S, zone: &DangerZone, violated: bool) -> Result<(), SurfaceError> {
    let pts = &zone.coordinates;
    if pts.len() < 2 {
        return Ok(());
    }
    let base = match (violated, zone.is_active) {
        (true, _) => ZONE_VIOLATION_COLOR,
        (false, true) => ZONE_ACTIVE_COLOR,
        (false, false) => ZONE_INACTIVE_COLOR,
    };
    let fill_alpha = if violated { FILL_ALPHA * 2 } else { FILL_ALPHA };
    surface.fill_polygon(pts, with_alpha(base, fill_alpha))?;
    let stroke = Stroke {
        color: base,
        width: if violated { BOX_STROKE_WIDTH * 2.0 } else { BOX_STROKE_WIDTH },
        dash: if zone.is_active { None } else { Some(ZONE_DASH) },
    };
    surface.stroke_path(pts, true, stroke)?;

    if let Some(c) = vertex_centroid(pts) {
        let w = text_width(&zone.name, LABEL_FONT_PX) + LABEL_PAD * 2.0;
        let h = LABEL_FONT_PX + LABEL_PAD * 2.0;
        draw_label(surface, &zone.name, Point::new(c.x - w / 2.0, c.y - h / 2.0), base)?;
    }
    Ok(())
}

fn draw_face<S: Surface>(surface: &mut S, face: &DetectedFace) -> Result<(), SurfaceError> {
    let rect = face.location.rect();
    let color = if face.is_stranger || face.matched.is_none() {
        STRANGER_COLOR
    } else {
        KNOWN_COLOR
    };
    surface.stroke_rect(rect, Stroke::solid(color, BOX_STROKE_WIDTH))?;

    let label_h = LABEL_FONT_PX + LABEL_PAD * 2.0;
    // Above the box, or inside it when the box touches the top edge.
    let y = if rect.y >= label_h { rect.y - label_h } else { rect.y };
    draw_label(surface, &face_label(face), Point::new(rect.x, y), color)
}

fn draw_draft<S: Surface>(surface: &mut S, draft: &[Point]) -> Result<(), SurfaceError> {
    if draft.is_empty() {
        return Ok(());
    }
    if draft.len() >= 3 {
        surface.fill_polygon(draft, with_alpha(DRAFT_COLOR, FILL_ALPHA))?;
    }
    if draft.len() >= 2 {
        surface.stroke_path(draft, false, Stroke::solid(DRAFT_COLOR, BOX_STROKE_WIDTH))?;
    }
    for p in draft {
        surface.fill_circle(*p, VERTEX_RADIUS, DRAFT_COLOR)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DrawOp, RecordingSurface};
    use crate::types::{FaceLocation, FaceMatch};

    fn frame(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([10, 10, 10, 255]))
    }

    fn zone(id: i64, name: &str, active: bool) -> DangerZone {
        DangerZone {
            id,
            name: name.into(),
            zone_type: "polygon".into(),
            coordinates: vec![Point::new(10.0, 10.0), Point::new(50.0, 10.0), Point::new(50.0, 50.0)],
            stay_threshold: 10,
            is_active: active,
            created_at: None,
            updated_at: None,
        }
    }

    fn stranger() -> DetectedFace {
        DetectedFace {
            location: FaceLocation {
                left: 5.0,
                top: 5.0,
                right: 50.0,
                bottom: 50.0,
            },
            is_stranger: true,
            matched: None,
        }
    }

    #[test]
    fn test_no_frame_is_not_ready() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        assert_eq!(r.tick(&mut s, None, &Scene::default()), Tick::NotReady);
        assert!(s.ops().is_empty());
    }

    #[test]
    fn test_zero_sized_frame_is_skipped() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let empty = RgbaImage::new(0, 0);
        assert_eq!(r.tick(&mut s, Some(&empty), &Scene::default()), Tick::NotReady);
        assert_eq!(s.resizes(), 0);
    }

    #[test]
    fn test_backing_store_matches_native_size_and_resizes_once() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let f = frame(640, 480);
        for _ in 0..3 {
            assert_eq!(r.tick(&mut s, Some(&f), &Scene::default()), Tick::Drawn);
        }
        assert_eq!(s.size(), Size::new(640, 480));
        assert_eq!(s.resizes(), 1);

        let bigger = frame(1280, 720);
        r.tick(&mut s, Some(&bigger), &Scene::default());
        assert_eq!(s.size(), Size::new(1280, 720));
        assert_eq!(s.resizes(), 2);
        assert_eq!(r.frames_drawn(), 4);
    }

    #[test]
    fn test_draw_order_zones_faces_draft() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let zones = [zone(1, "Pool", true)];
        let faces = [stranger()];
        let draft = [Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        let scene = Scene {
            faces: &faces,
            zones: &zones,
            draft: &draft,
            ..Default::default()
        };
        r.tick(&mut s, Some(&frame(100, 100)), &scene);

        let kinds: Vec<&'static str> = s.ops().iter().map(DrawOp::kind).collect();
        let frame_at = kinds.iter().position(|k| *k == "frame").unwrap();
        let zone_at = kinds.iter().position(|k| *k == "fill_polygon").unwrap();
        let face_at = kinds.iter().position(|k| *k == "stroke_rect").unwrap();
        let draft_at = kinds.iter().rposition(|k| *k == "stroke_path").unwrap();
        assert!(frame_at < zone_at && zone_at < face_at && face_at < draft_at);
    }

    #[test]
    fn test_inactive_zone_is_dashed() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let zones = [zone(1, "Active", true), zone(2, "Off", false)];
        r.tick(&mut s, Some(&frame(100, 100)), &Scene { zones: &zones, ..Default::default() });
        let strokes: Vec<&Stroke> = s
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::StrokePath { closed: true, stroke, .. } => Some(stroke),
                _ => None,
            })
            .collect();
        assert_eq!(strokes.len(), 2);
        assert!(strokes[0].dash.is_none());
        assert!(strokes[1].dash.is_some());
    }

    #[test]
    fn test_violated_zone_emphasised() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let zones = [zone(4, "Pool", true)];
        r.tick(
            &mut s,
            Some(&frame(100, 100)),
            &Scene {
                zones: &zones,
                violated_zones: &[4],
                ..Default::default()
            },
        );
        let stroke = s
            .ops()
            .iter()
            .find_map(|op| match op {
                DrawOp::StrokePath { stroke, .. } => Some(*stroke),
                _ => None,
            })
            .unwrap();
        assert_eq!(stroke.color, ZONE_VIOLATION_COLOR);
        assert_eq!(stroke.width, BOX_STROKE_WIDTH * 2.0);
    }

    #[test]
    fn test_stranger_box_and_label() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let faces = [stranger()];
        r.tick(&mut s, Some(&frame(100, 100)), &Scene { faces: &faces, ..Default::default() });
        assert!(s.ops().iter().any(|op| matches!(
            op,
            DrawOp::StrokeRect { rect, stroke } if *rect == Rect::new(5.0, 5.0, 45.0, 45.0) && stroke.color == STRANGER_COLOR
        )));
        assert!(s.texts().contains(&STRANGER_LABEL.to_string()));
    }

    #[test]
    fn test_known_face_label_has_confidence() {
        let face = DetectedFace {
            matched: Some(FaceMatch {
                user_id: Some(1),
                name: "alice".into(),
                confidence: 0.873,
                distance: Some(0.127),
            }),
            is_stranger: false,
            ..stranger()
        };
        assert_eq!(face_label(&face), "alice 87%");
    }

    #[test]
    fn test_draft_fill_preview_only_from_three_points() {
        let mut r = OverlayRenderer::default();
        let f = frame(100, 100);
        let two = [Point::new(1.0, 1.0), Point::new(20.0, 1.0)];
        let mut s = RecordingSurface::default();
        r.tick(&mut s, Some(&f), &Scene { draft: &two, ..Default::default() });
        assert!(!s.ops().iter().any(|op| op.kind() == "fill_polygon"));
        assert_eq!(s.ops().iter().filter(|op| op.kind() == "fill_circle").count(), 2);

        let three = [two[0], two[1], Point::new(20.0, 20.0)];
        let mut s = RecordingSurface::default();
        r.tick(&mut s, Some(&f), &Scene { draft: &three, ..Default::default() });
        assert!(s.ops().iter().any(|op| op.kind() == "fill_polygon"));
    }

    #[test]
    fn test_hidden_layers_not_drawn() {
        let mut r = OverlayRenderer::new(Layers {
            faces: false,
            zones: false,
            trajectory: false,
        });
        let mut s = RecordingSurface::default();
        let zones = [zone(1, "Pool", true)];
        let faces = [stranger()];
        r.tick(
            &mut s,
            Some(&frame(100, 100)),
            &Scene {
                zones: &zones,
                faces: &faces,
                ..Default::default()
            },
        );
        assert_eq!(s.ops().len(), 1);
    }

    #[test]
    fn test_failed_draw_drops_frame_and_recovers() {
        let mut r = OverlayRenderer::default();
        let mut s = RecordingSurface::default();
        let bad = [Point::new(f32::NAN, 1.0), Point::new(1.0, 1.0), Point::new(2.0, 3.0)];
        assert_eq!(
            r.tick(&mut s, Some(&frame(10, 10)), &Scene { draft: &bad, ..Default::default() }),
            Tick::Dropped
        );
        assert_eq!(r.tick(&mut s, Some(&frame(10, 10)), &Scene::default()), Tick::Drawn);
        assert_eq!(r.frames_dropped(), 1);
    }

    #[test]
    fn test_trajectory_trail_is_bounded() {
        let mut trail = TrajectoryTrail::default();
        for _ in 0..(TRAJECTORY_CAPACITY + 10) {
            trail.record(&[stranger()]);
        }
        trail.record(&[]);
        assert_eq!(trail.points().len(), TRAJECTORY_CAPACITY);
        assert_eq!(trail.points()[0], Point::new(27.5, 27.5));
    }
}
