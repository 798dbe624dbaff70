//! Discretized force field over an oversampled canvas region.
//!
//! A [`VectorField`] covers more than the visible canvas (by default
//! −0.25..1.25 of each axis) so traced lines can enter and leave the frame
//! smoothly. The region is cut into square cells of `resolution` world units
//! and every cell holds one [`DVec2`] produced by a [`Generator`].
//!
//! Two variants make the recompute contract visible at the type level:
//! [`StaticField`] computes its grid once and keeps returning the cached
//! snapshot, [`DynamicField`] recomputes on every `populate` call.

use crate::draw::DrawSurface;
use crate::error::FlowError;
use crate::field_source::Generator;
use crate::params::{param_f64, param_pair};
use crate::prng::SeededRandom;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::marker::PhantomData;

/// Default canvas-width divisor used to derive the cell size.
pub const DEFAULT_DENSITY: f64 = 120.0;
/// Default oversampling bounds, as fractions of each canvas axis.
pub const DEFAULT_BOUNDS: [f64; 2] = [-0.25, 1.25];

/// Construction settings for a [`VectorField`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Cell size is `floor(width / density)` world units.
    pub density: f64,
    /// Oversampled extent as `[min, max]` fractions of each canvas axis.
    pub bounds: [f64; 2],
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            density: DEFAULT_DENSITY,
            bounds: DEFAULT_BOUNDS,
        }
    }
}

impl FieldConfig {
    /// Reads `density` and `bounds` from a JSON object, falling back to defaults.
    pub fn from_json(params: &Value) -> Self {
        Self {
            density: param_f64(params, "density", DEFAULT_DENSITY),
            bounds: param_pair(params, "bounds", DEFAULT_BOUNDS),
        }
    }

    /// Current values as a JSON object.
    pub fn to_json(&self) -> Value {
        json!({ "density": self.density, "bounds": self.bounds })
    }

    /// Schema describing the field settings.
    pub fn param_schema() -> Value {
        json!({
            "density": {
                "type": "number",
                "default": DEFAULT_DENSITY,
                "min": 1.0,
                "description": "Canvas width divided by density gives the cell size"
            },
            "bounds": {
                "type": "array",
                "default": DEFAULT_BOUNDS,
                "description": "Oversampled extent as [min, max] fractions of each axis"
            }
        })
    }

    /// Rejects non-positive density and empty or non-finite bounds.
    pub fn validate(&self) -> Result<(), FlowError> {
        if !self.density.is_finite() || self.density <= 0.0 {
            return Err(FlowError::invalid("density", "must be a positive number"));
        }
        let [lo, hi] = self.bounds;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(FlowError::invalid("bounds", "must satisfy min < max"));
        }
        Ok(())
    }
}

/// World-to-grid mapping of a field: extent, cell size and grid shape.
///
/// Generators receive a reference to this so they can reason about cell
/// indices without borrowing the grid being written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    width: usize,
    height: usize,
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    resolution: f64,
    cols: usize,
    rows: usize,
}

impl FieldGeometry {
    /// Derives the oversampled extent and grid shape for a canvas.
    pub fn new(width: usize, height: usize, config: &FieldConfig) -> Result<Self, FlowError> {
        if width == 0 || height == 0 {
            return Err(FlowError::InvalidDimensions);
        }
        config.validate()?;
        let [lo, hi] = config.bounds;
        let (w, h) = (width as f64, height as f64);
        let left = (w * lo).floor();
        let right = (w * hi).floor();
        let top = (h * lo).floor();
        let bottom = (h * hi).floor();
        let resolution = (w / config.density).floor().max(1.0);
        let cols = (((right - left) / resolution).floor() as usize).max(1);
        let rows = (((bottom - top) / resolution).floor() as usize).max(1);
        cols.checked_mul(rows).ok_or(FlowError::InvalidDimensions)?;
        Ok(Self {
            width,
            height,
            left,
            right,
            top,
            bottom,
            resolution,
            cols,
            rows,
        })
    }

    /// Canvas width in world units.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Canvas height in world units.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell edge length in world units.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of grid columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Top-left corner of the oversampled extent.
    pub fn min(&self) -> DVec2 {
        DVec2::new(self.left, self.top)
    }

    /// Bottom-right corner of the oversampled extent.
    pub fn max(&self) -> DVec2 {
        DVec2::new(self.right, self.bottom)
    }

    /// Whether `(x, y)` lies inside the oversampled extent.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.left..self.right).contains(&x) && (self.top..self.bottom).contains(&y)
    }

    /// Maps a world coordinate to its grid cell, clamping into range.
    ///
    /// Every input, including NaN and infinities, yields a valid
    /// `(col, row)` pair.
    pub fn index_for(&self, x: f64, y: f64) -> (usize, usize) {
        let col = clamp_axis(x - self.left, self.right - self.left, self.resolution);
        let row = clamp_axis(y - self.top, self.bottom - self.top, self.resolution);
        (col.min(self.cols - 1), row.min(self.rows - 1))
    }

    /// World position of a cell's top-left corner.
    pub fn cell_origin(&self, col: usize, row: usize) -> DVec2 {
        DVec2::new(
            self.left + col as f64 * self.resolution,
            self.top + row as f64 * self.resolution,
        )
    }

    fn flat(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }
}

/// Clamps an offset into `[0, span - resolution]` and converts it to a cell.
fn clamp_axis(offset: f64, span: f64, resolution: f64) -> usize {
    // f64::max maps NaN to 0; the saturating cast maps negatives to 0.
    (offset.max(0.0).min(span - resolution) / resolution).floor() as usize
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Static {}
    impl Sealed for super::Dynamic {}
}

/// Recompute policy of a [`VectorField`].
pub trait Refresh: sealed::Sealed {
    /// Human-readable policy name.
    const NAME: &'static str;
}

/// Marker: the grid is computed once at time 0 and cached.
#[derive(Debug, Clone, Copy)]
pub struct Static;

/// Marker: the grid is recomputed on every populate call.
#[derive(Debug, Clone, Copy)]
pub struct Dynamic;

impl Refresh for Static {
    const NAME: &'static str = "static";
}

impl Refresh for Dynamic {
    const NAME: &'static str = "dynamic";
}

/// A field whose grid is computed once and then served from cache.
pub type StaticField = VectorField<Static>;
/// A field whose grid is recomputed for every animation tick.
pub type DynamicField = VectorField<Dynamic>;

/// A grid of force vectors over an oversampled canvas region.
#[derive(Debug, Clone)]
pub struct VectorField<M: Refresh = Static> {
    geometry: FieldGeometry,
    rng: SeededRandom,
    grid: Vec<DVec2>,
    populated: bool,
    _mode: PhantomData<M>,
}

impl<M: Refresh> VectorField<M> {
    /// Creates a zero-filled field for a `width` x `height` canvas.
    ///
    /// Returns `FlowError::InvalidDimensions` for a zero dimension and
    /// `FlowError::InvalidParameter` for bad density or bounds.
    pub fn new(
        width: usize,
        height: usize,
        seed: u64,
        config: &FieldConfig,
    ) -> Result<Self, FlowError> {
        let geometry = FieldGeometry::new(width, height, config)?;
        tracing::debug!(
            width,
            height,
            seed,
            cols = geometry.cols,
            rows = geometry.rows,
            resolution = geometry.resolution,
            mode = M::NAME,
            "vector field allocated"
        );
        Ok(Self {
            grid: vec![DVec2::ZERO; geometry.cols * geometry.rows],
            geometry,
            rng: SeededRandom::new(seed),
            populated: false,
            _mode: PhantomData,
        })
    }

    /// Grid shape and world mapping.
    pub fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    /// Cell edge length in world units.
    pub fn resolution(&self) -> f64 {
        self.geometry.resolution
    }

    /// Number of grid columns.
    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    /// The seed the field's generator was built from.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Whether the grid holds generator output (as opposed to zeros or nothing).
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// See [`FieldGeometry::index_for`].
    pub fn index_for(&self, x: f64, y: f64) -> (usize, usize) {
        self.geometry.index_for(x, y)
    }

    /// Vector stored at a grid cell, if the cell exists.
    pub fn vector_at(&self, col: usize, row: usize) -> Option<DVec2> {
        if col >= self.geometry.cols || row >= self.geometry.rows {
            return None;
        }
        self.grid.get(self.geometry.flat(col, row)).copied()
    }

    /// Force at world position `(x, y)`.
    ///
    /// Returns `None` when the point lies outside the oversampled extent, is
    /// not finite, or the field has been cleared. Tracers treat `None` as the
    /// end of a line.
    pub fn sample(&self, x: f64, y: f64) -> Option<DVec2> {
        if !self.geometry.contains(x, y) {
            return None;
        }
        let (col, row) = self.geometry.index_for(x, y);
        self.grid.get(self.geometry.flat(col, row)).copied()
    }

    /// [`sample`](Self::sample) taking a point.
    pub fn sample_vector(&self, point: DVec2) -> Option<DVec2> {
        self.sample(point.x, point.y)
    }

    /// Row-major view of the grid (`row * cols + col`).
    pub fn vectors(&self) -> &[DVec2] {
        &self.grid
    }

    /// Iterates `(col, row, vector)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, DVec2)> + '_ {
        let cols = self.geometry.cols;
        self.grid
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % cols, i / cols, v))
    }

    /// Random on-canvas coordinate along an axis of length `m`.
    pub fn visible_point(&mut self, m: f64, margin: f64) -> f64 {
        m * self.rng.range(margin, 1.0 - margin)
    }

    /// Random coordinate in the oversampled margin on either side of an axis.
    pub fn invisible_point(&mut self, m: f64, margin: f64) -> f64 {
        let [lo, hi] = self.bounds_fractions();
        let before = self.rng.range(lo + margin, -margin);
        let after = self.rng.range(1.0 + margin, hi - margin);
        m * if self.rng.random() > 0.5 { before } else { after }
    }

    /// Drops the grid. Later samples return `None` until repopulated.
    pub fn clear(&mut self) {
        self.grid = Vec::new();
        self.populated = false;
    }

    /// Draws each cell's vector as a segment from the cell corner plus a dot
    /// at its tip.
    ///
    /// With `complete`, the whole oversampled extent is squeezed onto the
    /// canvas so the off-screen margin is visible too.
    pub fn visualize<S: DrawSurface>(&self, surface: &mut S, color: &S::Color, complete: bool) {
        let g = &self.geometry;
        let (w, h) = (g.width as f64, g.height as f64);
        for (col, row, vector) in self.iter() {
            let mut base = g.cell_origin(col, row);
            if complete {
                base = DVec2::new(
                    (base.x - g.left) / (g.right - g.left) * w,
                    (base.y - g.top) / (g.bottom - g.top) * h,
                );
            }
            let tip = base + vector;
            surface.circle(tip.x, tip.y, 0.5, color);
            surface.line(base.x, base.y, tip.x, tip.y, color);
        }
    }

    fn bounds_fractions(&self) -> [f64; 2] {
        let g = &self.geometry;
        [g.left / g.width as f64, g.right / g.width as f64]
    }

    /// Writes `generator(geometry, col, row, time) * resolution` into every cell.
    fn fill<G: Generator + ?Sized>(&mut self, generator: &mut G, time: f64) {
        let _span = tracing::debug_span!("populate", mode = M::NAME, time).entered();
        let geometry = self.geometry;
        let len = geometry.cols * geometry.rows;
        if self.grid.len() != len {
            self.grid = vec![DVec2::ZERO; len];
        }
        for row in 0..geometry.rows {
            for col in 0..geometry.cols {
                let v = generator.vector(&geometry, col, row, time);
                self.grid[geometry.flat(col, row)] = v * geometry.resolution;
            }
        }
        self.populated = true;
    }
}

impl VectorField<Static> {
    /// Computes the grid at time 0 unless a cached snapshot already exists.
    ///
    /// Returns `true` when the grid was (re)computed.
    pub fn populate<G: Generator + ?Sized>(&mut self, generator: &mut G) -> bool {
        if self.populated {
            return false;
        }
        self.fill(generator, 0.0);
        true
    }

    /// Forgets the cached snapshot so the next `populate` recomputes.
    pub fn invalidate(&mut self) {
        self.populated = false;
    }

    /// Converts into a field that recomputes on every call.
    pub fn into_dynamic(self) -> DynamicField {
        VectorField {
            geometry: self.geometry,
            rng: self.rng,
            grid: self.grid,
            populated: self.populated,
            _mode: PhantomData,
        }
    }
}

impl VectorField<Dynamic> {
    /// Recomputes the grid at `time`. Always runs to completion.
    pub fn populate<G: Generator + ?Sized>(&mut self, generator: &mut G, time: f64) {
        self.fill(generator, time);
    }

    /// Converts into a field that keeps its current grid as the cached snapshot.
    pub fn into_static(self) -> StaticField {
        VectorField {
            geometry: self.geometry,
            rng: self.rng,
            grid: self.grid,
            populated: self.populated,
            _mode: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::RecordingSurface;
    use crate::field_source::{compose, GradientField, RandomField};

    /// Counts calls and returns the unit x vector, or `time` along y.
    struct Counting {
        calls: usize,
    }

    impl Generator for Counting {
        fn vector(&mut self, _grid: &FieldGeometry, _col: usize, _row: usize, time: f64) -> DVec2 {
            self.calls += 1;
            DVec2::new(1.0, time)
        }
    }

    fn field_800x600() -> StaticField {
        StaticField::new(800, 600, 42, &FieldConfig::default()).unwrap()
    }

    // -- Construction --

    #[test]
    fn geometry_for_reference_canvas() {
        let field = field_800x600();
        assert_eq!(field.resolution(), 6.0);
        // x: -200..1000, y: -150..750
        assert_eq!(field.cols(), 200);
        assert_eq!(field.rows(), 150);
        assert_eq!(field.geometry().min(), DVec2::new(-200.0, -150.0));
        assert_eq!(field.geometry().max(), DVec2::new(1000.0, 750.0));
        assert!(field.vectors().iter().all(|v| *v == DVec2::ZERO));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let cfg = FieldConfig::default();
        assert!(matches!(
            StaticField::new(0, 10, 1, &cfg),
            Err(FlowError::InvalidDimensions)
        ));
        assert!(matches!(
            StaticField::new(10, 0, 1, &cfg),
            Err(FlowError::InvalidDimensions)
        ));
    }

    #[test]
    fn bad_density_is_rejected() {
        let cfg = FieldConfig {
            density: 0.0,
            ..FieldConfig::default()
        };
        assert!(matches!(
            StaticField::new(100, 100, 1, &cfg),
            Err(FlowError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let cfg = FieldConfig {
            bounds: [1.0, 0.0],
            ..FieldConfig::default()
        };
        assert!(StaticField::new(100, 100, 1, &cfg).is_err());
    }

    #[test]
    fn tiny_canvas_gets_unit_resolution_and_one_cell() {
        let field = StaticField::new(1, 1, 1, &FieldConfig::default()).unwrap();
        assert_eq!(field.resolution(), 1.0);
        assert!(field.cols() >= 1 && field.rows() >= 1);
    }

    #[test]
    fn config_from_json_falls_back_to_defaults() {
        let cfg = FieldConfig::from_json(&json!({"density": 60}));
        assert_eq!(cfg.density, 60.0);
        assert_eq!(cfg.bounds, DEFAULT_BOUNDS);
    }

    // -- Indexing and sampling --

    #[test]
    fn index_for_clamps_far_outside_points() {
        let field = field_800x600();
        assert_eq!(field.index_for(-1e9, -1e9), (0, 0));
        assert_eq!(field.index_for(1e9, 1e9), (199, 149));
        assert_eq!(field.index_for(f64::NAN, f64::INFINITY), (0, 149));
    }

    #[test]
    fn index_for_maps_canvas_origin() {
        let field = field_800x600();
        // (0 - -200) / 6 = 33.3, (0 - -150) / 6 = 25
        assert_eq!(field.index_for(0.0, 0.0), (33, 25));
    }

    #[test]
    fn sample_outside_extent_is_none() {
        let mut field = field_800x600();
        field.populate(&mut GradientField::new(0.0, 1.0));
        assert!(field.sample(-500.0, 10.0).is_none());
        assert!(field.sample(10.0, 2000.0).is_none());
        assert!(field.sample(f64::NAN, 0.0).is_none());
        assert!(field.sample(1000.0, 0.0).is_none());
        assert!(field.sample(999.0, 749.0).is_some());
    }

    #[test]
    fn sample_after_clear_is_none() {
        let mut field = field_800x600();
        field.populate(&mut GradientField::new(0.0, 1.0));
        field.clear();
        assert!(field.sample(100.0, 100.0).is_none());
        assert!(!field.is_populated());
    }

    #[test]
    fn gradient_fills_every_cell_with_resolution_length_vector() {
        let mut field = field_800x600();
        field.populate(&mut GradientField::new(0.0, 1.0));
        let res = field.resolution();
        for (col, row, v) in field.iter() {
            assert!(
                (v - DVec2::new(res, 0.0)).length() < 1e-9,
                "cell ({col}, {row}) = {v}"
            );
        }
    }

    #[test]
    fn sample_returns_vector_of_containing_cell() {
        let mut field = StaticField::new(100, 100, 1, &FieldConfig::default()).unwrap();
        let mut gradient = GradientField::new(90.0, 2.0);
        field.populate(&mut gradient);
        let v = field.sample_vector(DVec2::new(50.0, 50.0)).unwrap();
        let expected = DVec2::new(0.0, 2.0) * field.resolution();
        assert!((v - expected).length() < 1e-9, "got {v}");
    }

    // -- Static vs dynamic --

    #[test]
    fn static_field_computes_once() {
        let mut field = StaticField::new(60, 60, 1, &FieldConfig::default()).unwrap();
        let mut gen = Counting { calls: 0 };
        assert!(field.populate(&mut gen));
        let cells = field.cols() * field.rows();
        assert_eq!(gen.calls, cells);
        assert!(!field.populate(&mut gen));
        assert_eq!(gen.calls, cells, "cached field must not call the generator again");
    }

    #[test]
    fn static_field_recomputes_after_invalidate() {
        let mut field = StaticField::new(60, 60, 1, &FieldConfig::default()).unwrap();
        let mut gen = Counting { calls: 0 };
        field.populate(&mut gen);
        field.invalidate();
        assert!(field.populate(&mut gen));
        assert_eq!(gen.calls, 2 * field.cols() * field.rows());
    }

    #[test]
    fn dynamic_field_recomputes_every_tick() {
        let mut field = DynamicField::new(60, 60, 1, &FieldConfig::default()).unwrap();
        let mut gen = Counting { calls: 0 };
        field.populate(&mut gen, 0.0);
        field.populate(&mut gen, 0.0);
        field.populate(&mut gen, 2.0);
        assert_eq!(gen.calls, 3 * field.cols() * field.rows());
        let res = field.resolution();
        assert_eq!(field.vector_at(0, 0), Some(DVec2::new(res, 2.0 * res)));
    }

    #[test]
    fn clear_then_populate_reallocates() {
        let mut field = DynamicField::new(60, 60, 1, &FieldConfig::default()).unwrap();
        field.clear();
        field.populate(&mut GradientField::new(0.0, 1.0), 1.0);
        assert_eq!(field.vectors().len(), field.cols() * field.rows());
        assert!(field.sample(30.0, 30.0).is_some());
    }

    #[test]
    fn conversion_between_variants_keeps_grid() {
        let mut field = field_800x600();
        field.populate(&mut GradientField::new(0.0, 1.0));
        let before = field.vector_at(3, 4);
        let mut dynamic = field.into_dynamic();
        assert_eq!(dynamic.vector_at(3, 4), before);
        dynamic.populate(&mut GradientField::new(180.0, 1.0), 1.0);
        let back = dynamic.into_static();
        assert!(back.is_populated());
        assert!(back.vector_at(3, 4).unwrap().x < 0.0);
    }

    // -- Composition through a field --

    #[test]
    fn empty_composition_leaves_zero_grid() {
        let mut field = field_800x600();
        field.populate(&mut compose(Vec::new()));
        assert!(field.vectors().iter().all(|v| *v == DVec2::ZERO));
    }

    #[test]
    fn random_field_populates_unit_vectors_times_resolution() {
        let mut field = StaticField::new(120, 120, 1, &FieldConfig::default()).unwrap();
        field.populate(&mut RandomField::new(1.0, 9));
        let res = field.resolution();
        assert!(field
            .vectors()
            .iter()
            .all(|v| (v.length() - res).abs() < 1e-9));
    }

    // -- Helpers --

    #[test]
    fn visible_point_stays_on_canvas() {
        let mut field = field_800x600();
        for _ in 0..200 {
            let x = field.visible_point(800.0, 0.2);
            assert!((160.0..640.0).contains(&x), "x = {x}");
        }
    }

    #[test]
    fn invisible_point_lands_in_margin() {
        let mut field = field_800x600();
        for _ in 0..200 {
            let x = field.invisible_point(800.0, 0.0);
            assert!(
                (-200.0..=0.0).contains(&x) || (800.0..=1000.0).contains(&x),
                "x = {x}"
            );
        }
    }

    #[test]
    fn visualize_draws_one_segment_and_dot_per_cell() {
        let mut field = StaticField::new(120, 120, 1, &FieldConfig::default()).unwrap();
        field.populate(&mut GradientField::new(0.0, 1.0));
        let mut surface = RecordingSurface::default();
        field.visualize(&mut surface, &(), true);
        let cells = field.cols() * field.rows();
        assert_eq!(surface.lines.len(), cells);
        assert_eq!(surface.circles.len(), cells);
        // complete mode maps every base point onto the canvas
        assert!(surface
            .lines
            .iter()
            .all(|l| (0.0..=120.0).contains(&l[0]) && (0.0..=120.0).contains(&l[1])));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn index_for_always_in_range(
                w in 1_usize..2000,
                h in 1_usize..2000,
                density in 1.0_f64..300.0,
                x in prop::num::f64::ANY,
                y in prop::num::f64::ANY,
            ) {
                let cfg = FieldConfig { density, ..FieldConfig::default() };
                let geometry = FieldGeometry::new(w, h, &cfg).unwrap();
                let (col, row) = geometry.index_for(x, y);
                prop_assert!(col < geometry.cols());
                prop_assert!(row < geometry.rows());
            }

            #[test]
            fn sample_outside_extent_never_panics(
                x in prop::num::f64::ANY,
                y in prop::num::f64::ANY,
            ) {
                let mut field = StaticField::new(200, 150, 3, &FieldConfig::default()).unwrap();
                field.populate(&mut GradientField::new(45.0, 1.0));
                let inside = field.geometry().contains(x, y);
                prop_assert_eq!(field.sample(x, y).is_some(), inside);
            }
        }
    }
}
