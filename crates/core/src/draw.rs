//! Caller-supplied drawing surface for debug overlays.
//!
//! The core never rasterizes anything. Hosts that want to see the field
//! vectors, packed circles or movement path implement [`DrawSurface`] over
//! whatever canvas they own and pass their own color type through.

/// Minimal stroke-only drawing API used by the `visualize`/`show` overlays.
pub trait DrawSurface {
    /// Host color representation. Overlays pass it through untouched.
    type Color;

    /// Strokes a straight segment from `(x0, y0)` to `(x1, y1)`.
    fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: &Self::Color);

    /// Strokes a circle outline centred on `(x, y)` with radius `r`.
    fn circle(&mut self, x: f64, y: f64, r: f64, color: &Self::Color);
}

/// A surface that records every call, for tests and headless inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    pub lines: Vec<[f64; 4]>,
    pub circles: Vec<[f64; 3]>,
}

impl DrawSurface for RecordingSurface {
    type Color = ();

    fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, _color: &()) {
        self.lines.push([x0, y0, x1, y1]);
    }

    fn circle(&mut self, x: f64, y: f64, r: f64, _color: &()) {
        self.circles.push([x, y, r]);
    }
}
