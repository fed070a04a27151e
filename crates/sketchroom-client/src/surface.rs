//! The rendering capability the reconciler depends on.

use sketchroom_core::{Snapshot, StrokeParams};

/// An opaque drawing surface.
///
/// The reconciler drives it with stroke segments and snapshot save/restore;
/// how pixels are produced (raster canvas, GPU, test recorder) is the
/// implementer's business. Snapshots round-trip through [`Snapshot`] blobs
/// and are never inspected.
pub trait CanvasSurface {
    /// Start a stroke at the given canvas coordinates.
    fn begin_stroke(&mut self, x: f64, y: f64, params: &StrokeParams);

    /// Extend the current stroke to the given point.
    fn stroke_to(&mut self, x: f64, y: f64, params: &StrokeParams);

    /// Finish the current stroke.
    fn end_stroke(&mut self);

    /// Reset to a blank canvas.
    fn clear(&mut self);

    /// Encode the full current canvas state.
    fn snapshot(&self) -> Snapshot;

    /// Replace the canvas contents with a previously captured snapshot.
    fn restore(&mut self, snapshot: &Snapshot);
}
