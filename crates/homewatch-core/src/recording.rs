//! A [`Surface`] that records draw calls instead of rasterising them.

use image::{Rgba, RgbaImage};

use crate::geometry::{Point, Rect, Size};
use crate::overlay::{check_finite, Stroke, Surface, SurfaceError};

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Frame(Size),
    FillPolygon { points: Vec<Point>, color: Rgba<u8> },
    StrokePath { points: Vec<Point>, closed: bool, stroke: Stroke },
    StrokeRect { rect: Rect, stroke: Stroke },
    FillRect { rect: Rect, color: Rgba<u8> },
    FillCircle { center: Point, radius: f32, color: Rgba<u8> },
    Text { text: String, origin: Point, color: Rgba<u8> },
}

impl DrawOp {
    pub fn kind(&self) -> &'static str {
        match self {
            DrawOp::Frame(_) => "frame",
            DrawOp::FillPolygon { .. } => "fill_polygon",
            DrawOp::StrokePath { .. } => "stroke_path",
            DrawOp::StrokeRect { .. } => "stroke_rect",
            DrawOp::FillRect { .. } => "fill_rect",
            DrawOp::FillCircle { .. } => "fill_circle",
            DrawOp::Text { .. } => "text",
        }
    }
}

/// Keeps the calls of the current tick; `clear` starts a new list.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    size: Size,
    ops: Vec<DrawOp>,
    resizes: usize,
}

impl RecordingSurface {
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Number of backing-store reallocations so far.
    pub fn resizes(&self) -> usize {
        self.resizes
    }

    pub fn texts(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn resize(&mut self, size: Size) {
        self.size = size;
        self.resizes += 1;
        self.ops.clear();
    }

    fn clear(&mut self) {
        self.ops.clear();
    }

    fn draw_frame(&mut self, frame: &RgbaImage) -> Result<(), SurfaceError> {
        let frame_size = Size::new(frame.width(), frame.height());
        if frame_size != self.size {
            return Err(SurfaceError::FrameSizeMismatch {
                frame: frame_size,
                surface: self.size,
            });
        }
        self.ops.push(DrawOp::Frame(frame_size));
        Ok(())
    }

    fn fill_polygon(&mut self, points: &[Point], color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(points)?;
        self.ops.push(DrawOp::FillPolygon {
            points: points.to_vec(),
            color,
        });
        Ok(())
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: Stroke) -> Result<(), SurfaceError> {
        check_finite(points)?;
        self.ops.push(DrawOp::StrokePath {
            points: points.to_vec(),
            closed,
            stroke,
        });
        Ok(())
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: Stroke) -> Result<(), SurfaceError> {
        check_finite(&[Point::new(rect.x, rect.y), Point::new(rect.right(), rect.bottom())])?;
        self.ops.push(DrawOp::StrokeRect { rect, stroke });
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(&[Point::new(rect.x, rect.y), Point::new(rect.right(), rect.bottom())])?;
        self.ops.push(DrawOp::FillRect { rect, color });
        Ok(())
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(&[center])?;
        self.ops.push(DrawOp::FillCircle { center, radius, color });
        Ok(())
    }

    fn fill_text(&mut self, text: &str, origin: Point, color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(&[origin])?;
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            origin,
            color,
        });
        Ok(())
    }
}
