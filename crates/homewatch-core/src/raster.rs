//! Software raster surface over an RGBA frame buffer.
//!
//! Alpha-blended fills, scan-line polygon filling and dashed strokes.
//! Text is not rasterised here: glyph rendering needs a font, so text runs
//! are recorded with their placement and left to whoever presents the frame.

use image::{Rgba, RgbaImage};

use crate::geometry::{Point, Rect, Size};
use crate::overlay::{check_finite, Stroke, Surface, SurfaceError, TextRun};

/// Composites overlay primitives into an owned [`RgbaImage`].
pub struct RasterSurface {
    image: RgbaImage,
    texts: Vec<TextRun>,
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterSurface {
    /// An empty 0x0 surface; the first drawn frame sizes it.
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            texts: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Text runs placed since the last clear, in draw order.
    pub fn texts(&self) -> &[TextRun] {
        &self.texts
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Source-over blend of one pixel. Out-of-bounds writes are dropped.
    fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let sa = color[3] as u32;
        if sa == 255 {
            *dst = color;
            return;
        }
        if sa == 0 {
            return;
        }
        let da = dst[3] as u32;
        let inv = 255 - sa;
        for c in 0..3 {
            dst[c] = ((color[c] as u32 * sa + dst[c] as u32 * inv) / 255) as u8;
        }
        dst[3] = (sa + da * inv / 255).min(255) as u8;
    }

    /// Clamp a half-open pixel span to `[0, limit)`.
    fn span(lo: f32, hi: f32, limit: u32) -> std::ops::Range<i64> {
        let limit = limit as f32;
        lo.clamp(0.0, limit) as i64..hi.clamp(0.0, limit) as i64
    }

    /// Square brush stamp centred on `p`.
    fn stamp(&mut self, p: Point, width: f32, color: Rgba<u8>) {
        let half = (width / 2.0).max(0.5);
        let xs = Self::span((p.x - half).floor(), (p.x + half).ceil(), self.image.width());
        let ys = Self::span((p.y - half).floor(), (p.y + half).ceil(), self.image.height());
        for y in ys {
            for x in xs.clone() {
                self.blend(x, y, color);
            }
        }
    }

    /// Walk one segment at half-pixel steps. `travelled` carries the dash
    /// phase across segments so patterns stay continuous around corners.
    /// Only the part that can touch the surface is walked.
    fn segment(&mut self, a: Point, b: Point, stroke: Stroke, travelled: &mut f32) {
        let len = a.distance(&b);
        let pad = stroke.width / 2.0 + 1.0;
        let min = Point::new(-pad, -pad);
        let max = Point::new(self.image.width() as f32 + pad, self.image.height() as f32 + pad);
        if let Some((t0, t1)) = clip_segment(a, b, min, max) {
            let steps = (len * (t1 - t0) * 2.0).ceil().max(1.0) as usize;
            for i in 0..=steps {
                let t = t0 + (t1 - t0) * (i as f32 / steps as f32);
                let d = *travelled + len * t;
                let on = match stroke.dash {
                    Some((on, off)) if on + off > 0.0 => d % (on + off) < on,
                    _ => true,
                };
                if on {
                    let p = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
                    self.stamp(p, stroke.width, stroke.color);
                }
            }
        }
        *travelled += len;
    }
}

/// Liang-Barsky: the parameter range of `a→b` inside the box, if any.
fn clip_segment(a: Point, b: Point, min: Point, max: Point) -> Option<(f32, f32)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for (p, q) in [(-dx, a.x - min.x), (dx, max.x - a.x), (-dy, a.y - min.y), (dy, max.y - a.y)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if (p < 0.0 && r > t1) || (p > 0.0 && r < t0) {
            return None;
        }
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
    }
    Some((t0, t1))
}

impl Surface for RasterSurface {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    fn resize(&mut self, size: Size) {
        self.image = RgbaImage::new(size.width, size.height);
        self.texts.clear();
    }

    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        self.texts.clear();
    }

    fn draw_frame(&mut self, frame: &RgbaImage) -> Result<(), SurfaceError> {
        let frame_size = Size::new(frame.width(), frame.height());
        if frame_size != self.size() {
            return Err(SurfaceError::FrameSizeMismatch {
                frame: frame_size,
                surface: self.size(),
            });
        }
        self.image.copy_from_slice(frame.as_raw());
        Ok(())
    }

    fn fill_polygon(&mut self, points: &[Point], color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(points)?;
        if points.len() < 3 {
            return Ok(());
        }
        let min_y = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let max_y = points
            .iter()
            .map(|p| p.y)
            .fold(f32::NEG_INFINITY, f32::max)
            .ceil()
            .min(self.image.height() as f32) as i64;

        let mut crossings: Vec<f32> = Vec::with_capacity(points.len());
        for y in min_y..max_y {
            // Sample at the pixel centre row.
            let sy = y as f32 + 0.5;
            crossings.clear();
            let n = points.len();
            let mut j = n - 1;
            for i in 0..n {
                let (a, b) = (points[i], points[j]);
                if (a.y > sy) != (b.y > sy) {
                    crossings.push(a.x + (sy - a.y) * (b.x - a.x) / (b.y - a.y));
                }
                j = i;
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                let xs = Self::span((pair[0] - 0.5).ceil(), (pair[1] - 0.5).ceil(), self.image.width());
                for x in xs {
                    self.blend(x, y, color);
                }
            }
        }
        Ok(())
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: Stroke) -> Result<(), SurfaceError> {
        check_finite(points)?;
        let mut travelled = 0.0f32;
        for w in points.windows(2) {
            self.segment(w[0], w[1], stroke, &mut travelled);
        }
        if closed && points.len() > 2 {
            self.segment(points[points.len() - 1], points[0], stroke, &mut travelled);
        }
        Ok(())
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: Stroke) -> Result<(), SurfaceError> {
        let corners = [
            Point::new(rect.x, rect.y),
            Point::new(rect.right(), rect.y),
            Point::new(rect.right(), rect.bottom()),
            Point::new(rect.x, rect.bottom()),
        ];
        self.stroke_path(&corners, true, stroke)
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(&[Point::new(rect.x, rect.y), Point::new(rect.right(), rect.bottom())])?;
        let xs = Self::span(rect.x.round(), rect.right().round(), self.image.width());
        let ys = Self::span(rect.y.round(), rect.bottom().round(), self.image.height());
        for y in ys {
            for x in xs.clone() {
                self.blend(x, y, color);
            }
        }
        Ok(())
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(&[center])?;
        let r2 = radius * radius;
        let xs = Self::span((center.x - radius).floor(), (center.x + radius).ceil() + 1.0, self.image.width());
        let ys = Self::span((center.y - radius).floor(), (center.y + radius).ceil() + 1.0, self.image.height());
        for y in ys {
            for x in xs.clone() {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                if dx * dx + dy * dy <= r2 {
                    self.blend(x, y, color);
                }
            }
        }
        Ok(())
    }

    fn fill_text(&mut self, text: &str, origin: Point, color: Rgba<u8>) -> Result<(), SurfaceError> {
        check_finite(&[origin])?;
        self.texts.push(TextRun {
            text: text.to_string(),
            origin,
            color,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn surface(w: u32, h: u32) -> RasterSurface {
        let mut s = RasterSurface::new();
        s.resize(Size::new(w, h));
        s
    }

    #[test]
    fn test_frame_size_mismatch_is_error() {
        let mut s = surface(4, 4);
        let frame = RgbaImage::new(8, 8);
        assert!(matches!(
            s.draw_frame(&frame),
            Err(SurfaceError::FrameSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_draw_frame_copies_pixels() {
        let mut s = surface(2, 1);
        let frame = RgbaImage::from_raw(2, 1, vec![1, 2, 3, 255, 4, 5, 6, 255]).unwrap();
        s.draw_frame(&frame).unwrap();
        assert_eq!(s.image().as_raw(), frame.as_raw());
    }

    #[test]
    fn test_fill_triangle_covers_interior_only() {
        let mut s = surface(60, 60);
        let tri = [Point::new(10.0, 10.0), Point::new(50.0, 10.0), Point::new(50.0, 50.0)];
        s.fill_polygon(&tri, RED).unwrap();
        assert_eq!(*s.image().get_pixel(45, 20), RED);
        assert_eq!(s.image().get_pixel(15, 45)[3], 0);
        assert_eq!(s.image().get_pixel(5, 5)[3], 0);
    }

    #[test]
    fn test_translucent_fill_blends() {
        let mut s = surface(2, 2);
        let frame = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        s.draw_frame(&frame).unwrap();
        s.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Rgba([255, 0, 0, 128])).unwrap();
        let px = s.image().get_pixel(0, 0);
        assert!(px[0] > 100 && px[2] > 100);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_dashed_stroke_leaves_gaps() {
        let mut s = surface(40, 3);
        let stroke = Stroke {
            color: RED,
            width: 1.0,
            dash: Some((4.0, 4.0)),
        };
        s.stroke_path(&[Point::new(0.0, 1.5), Point::new(39.0, 1.5)], false, stroke)
            .unwrap();
        let painted = (0..40).filter(|&x| s.image().get_pixel(x, 1)[3] > 0).count();
        assert!(painted > 10 && painted < 35, "painted {painted}");
    }

    #[test]
    fn test_non_finite_points_rejected() {
        let mut s = surface(10, 10);
        let err = s.fill_polygon(
            &[Point::new(f32::NAN, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 0.0)],
            RED,
        );
        assert_eq!(err, Err(SurfaceError::NonFinite));
    }

    #[test]
    fn test_oversized_shapes_clipped_to_surface() {
        let mut s = surface(64, 48);
        let far = Rect::from_edges(5.0, 5.0, 1.0e7, 1.0e7);
        let stroke = Stroke {
            color: RED,
            width: 2.0,
            dash: None,
        };
        let started = std::time::Instant::now();
        s.fill_rect(far, Rgba([0, 255, 0, 64])).unwrap();
        s.fill_polygon(
            &[Point::new(-1.0e7, -1.0e7), Point::new(1.0e7, 0.0), Point::new(0.0, 1.0e7)],
            Rgba([0, 0, 255, 64]),
        )
        .unwrap();
        s.fill_circle(Point::new(32.0, 24.0), 1.0e7, Rgba([9, 9, 9, 64])).unwrap();
        s.stroke_rect(far, stroke).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        // The visible left and top edges of the box are still drawn.
        assert_eq!(s.image().get_pixel(5, 30)[0], 255);
        assert_eq!(s.image().get_pixel(30, 5)[0], 255);
    }

    #[test]
    fn test_segment_clipping() {
        let min = Point::new(0.0, 0.0);
        let max = Point::new(10.0, 10.0);
        let (t0, t1) = clip_segment(Point::new(-10.0, 5.0), Point::new(30.0, 5.0), min, max).unwrap();
        assert!((t0 - 0.25).abs() < 1e-6 && (t1 - 0.5).abs() < 1e-6);
        assert_eq!(clip_segment(Point::new(-5.0, 20.0), Point::new(50.0, 20.0), min, max), None);
    }

    #[test]
    fn test_text_recorded_and_cleared() {
        let mut s = surface(10, 10);
        s.fill_text("Pool", Point::new(1.0, 2.0), RED).unwrap();
        assert_eq!(s.texts().len(), 1);
        s.clear();
        assert!(s.texts().is_empty());
    }
}
