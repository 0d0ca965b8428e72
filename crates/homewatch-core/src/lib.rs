//! homewatch-core — Data model, geometry and overlay compositing for the
//! HomeWatch surveillance dashboard.
//!
//! No I/O lives here: the client crate feeds frames and backend state in,
//! this crate decides what gets drawn and which zone edits are valid.

pub mod authoring;
pub mod geometry;
pub mod overlay;
pub mod raster;
pub mod recording;
pub mod types;

pub use authoring::{AuthoringError, AuthoringState, PolygonEditor, Submission};
pub use geometry::{Extent, Point, Polygon, Rect, Size};
pub use overlay::{Layers, OverlayRenderer, Scene, Surface, SurfaceError, Tick, TrajectoryTrail};
pub use raster::RasterSurface;
