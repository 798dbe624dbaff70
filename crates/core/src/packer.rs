//! Circle packing used to seed line origins.
//!
//! A [`CirclePacker`] scatters zero-radius circles over a packing region,
//! grows them in lock-step until they touch each other, the region edge or
//! the radius cap, and then serves random points on their outlines. The
//! points double as line origins: queries can be restricted to a rectangle,
//! inverted, limited to circles fully on the canvas, or tied to a window
//! that slides along the packer's movement path as a session progresses.

use crate::draw::DrawSurface;
use crate::error::FlowError;
use crate::params::{param_f64, param_pair, param_usize};
use crate::prng::SeededRandom;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::f64::consts::TAU;

/// Default number of circles to place.
pub const DEFAULT_COUNT: usize = 1000;
/// Default placement attempts before giving up.
pub const DEFAULT_ATTEMPTS: usize = 5000;
/// Default radius cap.
pub const DEFAULT_MAX_RADIUS: f64 = 32.0;
/// Default minimum gap kept between grown circles.
pub const DEFAULT_TOLERANCE: f64 = 2.0;

// ---------------------------------------------------------------------------
// Circle
// ---------------------------------------------------------------------------

/// One packed circle. `r == 0` means placed but never grown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub growing: bool,
}

impl Circle {
    /// A fresh circle: zero radius, still growing.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            r: 0.0,
            growing: true,
        }
    }

    /// Centre as a vector.
    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    /// Uniformly random point on the outline.
    pub fn random_point(&self, rng: &mut SeededRandom) -> DVec2 {
        let angle = rng.range(0.0, TAU);
        self.center() + DVec2::from_angle(angle) * self.r
    }

    /// Whether any part of the circle lies outside the region
    /// `[w * b0, w * b1] x [h * b0, h * b1]`.
    pub fn edges(&self, w: f64, h: f64, bounds: [f64; 2]) -> bool {
        let [lo, hi] = bounds;
        self.x + self.r > w * hi
            || self.x - self.r < w * lo
            || self.y + self.r > h * hi
            || self.y - self.r < h * lo
    }

    /// Whether any part of the circle lies off the visible canvas.
    pub fn outside_viewport(&self, w: f64, h: f64) -> bool {
        self.edges(w, h, [0.0, 1.0])
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Placement and growth settings for a [`CirclePacker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Target number of circles.
    pub count: usize,
    /// Placement attempts, accepted or not.
    pub attempts: usize,
    /// Packing region as `[min, max]` fractions of each canvas axis.
    pub bounds: [f64; 2],
    /// Circles stop growing at this radius.
    pub max_radius: f64,
    /// Radius added per growth pass.
    pub growth_step: f64,
    /// Circles freeze once `d - tolerance <= r1 + r2`.
    pub tolerance: f64,
    /// Moving-window margin beyond each canvas edge, as a fraction of the axis.
    pub overscan: f64,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            attempts: DEFAULT_ATTEMPTS,
            bounds: [0.0, 1.0],
            max_radius: DEFAULT_MAX_RADIUS,
            growth_step: 1.0,
            tolerance: DEFAULT_TOLERANCE,
            overscan: 0.25,
        }
    }
}

impl PackerConfig {
    /// Reads settings from a JSON object; missing or mistyped keys keep defaults.
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            count: param_usize(params, "count", d.count),
            attempts: param_usize(params, "attempts", d.attempts),
            bounds: param_pair(params, "packing_bounds", d.bounds),
            max_radius: param_f64(params, "max_radius", d.max_radius),
            growth_step: param_f64(params, "growth_step", d.growth_step),
            tolerance: param_f64(params, "tolerance", d.tolerance),
            overscan: param_f64(params, "overscan", d.overscan),
        }
    }

    /// Current values as a JSON object, keyed like [`from_json`](Self::from_json).
    pub fn to_json(&self) -> Value {
        json!({
            "count": self.count,
            "attempts": self.attempts,
            "packing_bounds": self.bounds,
            "max_radius": self.max_radius,
            "growth_step": self.growth_step,
            "tolerance": self.tolerance,
            "overscan": self.overscan,
        })
    }

    pub fn param_schema() -> Value {
        json!({
            "count": {
                "type": "integer",
                "default": DEFAULT_COUNT,
                "min": 0,
                "description": "Target number of circles"
            },
            "attempts": {
                "type": "integer",
                "default": DEFAULT_ATTEMPTS,
                "min": 0,
                "description": "Placement attempts before giving up"
            },
            "packing_bounds": {
                "type": "array",
                "default": [0.0, 1.0],
                "description": "Packing region as [min, max] fractions of each axis"
            },
            "max_radius": {
                "type": "number",
                "default": DEFAULT_MAX_RADIUS,
                "min": 0.0,
                "description": "Radius at which circles stop growing"
            },
            "growth_step": {
                "type": "number",
                "default": 1.0,
                "min": 0.0,
                "description": "Radius added per growth pass"
            },
            "tolerance": {
                "type": "number",
                "default": DEFAULT_TOLERANCE,
                "description": "Gap kept between neighbouring circles"
            },
            "overscan": {
                "type": "number",
                "default": 0.25,
                "min": 0.0,
                "description": "Moving-window margin beyond each canvas edge"
            }
        })
    }

    /// Growth must make progress and stop: a positive step and finite cap.
    pub fn validate(&self) -> Result<(), FlowError> {
        let [lo, hi] = self.bounds;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(FlowError::invalid("packing_bounds", "must satisfy min < max"));
        }
        if !self.growth_step.is_finite() || self.growth_step <= 0.0 {
            return Err(FlowError::invalid("growth_step", "must be a positive number"));
        }
        if !self.max_radius.is_finite() || self.max_radius < 0.0 {
            return Err(FlowError::invalid("max_radius", "must be a non-negative number"));
        }
        if !self.tolerance.is_finite() {
            return Err(FlowError::invalid("tolerance", "must be finite"));
        }
        if !self.overscan.is_finite() || self.overscan < 0.0 {
            return Err(FlowError::invalid("overscan", "must be a non-negative number"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Movement and windows
// ---------------------------------------------------------------------------

/// Straight path between opposite canvas edges that the sampling window follows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub start: DVec2,
    pub end: DVec2,
    /// Backward movement translates the window by `start - end` instead.
    pub forward: bool,
}

impl Movement {
    /// Full translation applied at progress 1.
    pub fn delta(&self) -> DVec2 {
        let d = self.end - self.start;
        if self.forward {
            d
        } else {
            -d
        }
    }
}

/// Axis-aligned rectangle as `[min, max]` ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

/// Restricts which circles a point query may draw from.
///
/// A circle matches when it intersects both given ranges (absent ranges match
/// everything). `invert` flips the range test; `visible` first drops circles
/// that are not fully on the canvas. If nothing matches, every circle is
/// eligible again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointQuery {
    pub x: Option<[f64; 2]>,
    pub y: Option<[f64; 2]>,
    pub invert: bool,
    pub visible: bool,
}

impl PointQuery {
    /// Circles intersecting `window`.
    pub fn within(window: Window) -> Self {
        Self {
            x: Some(window.x),
            y: Some(window.y),
            ..Self::default()
        }
    }

    /// Visible circles outside `window`.
    pub fn outside(window: Window) -> Self {
        Self {
            invert: true,
            visible: true,
            ..Self::within(window)
        }
    }

    fn matches(&self, c: &Circle, w: f64, h: f64) -> bool {
        if self.visible && c.outside_viewport(w, h) {
            return false;
        }
        let in_range = |range: Option<[f64; 2]>, v: f64| {
            range.map_or(true, |[lo, hi]| v + c.r >= lo && v - c.r <= hi)
        };
        let hit = in_range(self.x, c.x) && in_range(self.y, c.y);
        hit != self.invert
    }
}

// ---------------------------------------------------------------------------
// Packer
// ---------------------------------------------------------------------------

/// Seeded circle packer with a moving sampling window.
#[derive(Debug, Clone)]
pub struct CirclePacker {
    width: f64,
    height: f64,
    config: PackerConfig,
    rng: SeededRandom,
    circles: Vec<Circle>,
    movement: Movement,
    windows: [Window; 2],
}

impl CirclePacker {
    /// Creates an empty packer and draws its movement path.
    ///
    /// The path is the first thing drawn from the seeded generator, so it
    /// depends only on the seed and canvas size.
    pub fn new(
        seed: u64,
        width: usize,
        height: usize,
        config: PackerConfig,
    ) -> Result<Self, FlowError> {
        if width == 0 || height == 0 {
            return Err(FlowError::InvalidDimensions);
        }
        config.validate()?;
        let (w, h) = (width as f64, height as f64);
        let mut rng = SeededRandom::new(seed);

        let vertical = rng.random() > 0.5;
        let start = if vertical {
            DVec2::new(rng.range(0.0, w), 0.0)
        } else {
            DVec2::new(0.0, rng.range(0.0, h))
        };
        let end = if vertical {
            DVec2::new(rng.range(0.0, w), h)
        } else {
            DVec2::new(w, rng.range(0.0, h))
        };
        let movement = Movement {
            start,
            end,
            forward: rng.random() > 0.5,
        };

        let mut packer = Self {
            width: w,
            height: h,
            config,
            rng,
            circles: Vec::new(),
            movement,
            windows: [Window { x: [0.0; 2], y: [0.0; 2] }; 2],
        };
        packer.windows = [packer.window_at(0.0), packer.window_at(1.0)];
        tracing::debug!(
            seed,
            width,
            height,
            vertical,
            forward = movement.forward,
            "circle packer created"
        );
        Ok(packer)
    }

    /// Seed the packer's generator was created with.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Validated settings in use.
    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    /// Circles in placement order, empty before [`setup`](Self::setup).
    pub fn circles(&self) -> &[Circle] {
        &self.circles
    }

    /// Path the sampling window follows, drawn at construction.
    pub fn movement(&self) -> &Movement {
        &self.movement
    }

    /// Places up to `count` zero-radius circles using at most `attempts`
    /// draws. A candidate is rejected when it falls within the current
    /// radius of an accepted circle.
    pub fn setup(&mut self) -> &mut Self {
        let PackerConfig {
            count,
            attempts,
            bounds: [lo, hi],
            ..
        } = self.config;
        let _span = tracing::debug_span!("packer_setup", count, attempts).entered();
        let (w, h) = (self.width, self.height);
        let mut used = 0;
        while self.circles.len() < count && used < attempts {
            used += 1;
            let p = DVec2::new(self.rng.range(lo * w, hi * w), self.rng.range(lo * h, hi * h));
            if self.circles.iter().all(|c| c.center().distance(p) > c.r) {
                self.circles.push(Circle::new(p.x, p.y));
            }
        }
        tracing::debug!(placed = self.circles.len(), attempts = used, "circles placed");
        self
    }

    /// Runs one growth pass over the circles in order.
    ///
    /// A growing circle freezes when it is within `tolerance` of another
    /// circle or its next step would overlap one, when it leaves the packing
    /// region, or once it has reached `max_radius`. Otherwise it grows by
    /// `growth_step`. Returns whether any circle grew.
    ///
    /// Neighbours are checked against their current radii, so a pass never
    /// introduces an overlap whatever the tolerance.
    pub fn grow_circles(&mut self) -> bool {
        let PackerConfig {
            bounds,
            max_radius,
            growth_step,
            tolerance,
            ..
        } = self.config;
        let (w, h) = (self.width, self.height);
        let mut grew = false;
        for i in 0..self.circles.len() {
            let c = self.circles[i];
            if !c.growing {
                continue;
            }
            let next = (c.r + growth_step).min(max_radius);
            let touching = self.circles.iter().enumerate().any(|(j, other)| {
                let d = c.center().distance(other.center());
                j != i && (d - tolerance <= c.r + other.r || d < next + other.r)
            });
            let circle = &mut self.circles[i];
            if touching || c.edges(w, h, bounds) || c.r >= max_radius {
                circle.growing = false;
            } else {
                circle.r = next;
                grew = true;
            }
        }
        grew
    }

    /// Grows until every circle is frozen.
    ///
    /// Terminates because each pass grows every still-growing circle by a
    /// positive step toward a finite cap.
    pub fn grow_circles_indefinitely(&mut self) -> &mut Self {
        let _span = tracing::debug_span!("packer_grow", circles = self.circles.len()).entered();
        let mut passes = 0_usize;
        while self.grow_circles() {
            passes += 1;
        }
        let grown = self.circles.iter().filter(|c| c.r > 0.0).count();
        tracing::debug!(passes, grown, "circle growth converged");
        self
    }

    /// Point on a uniformly chosen circle. `None` when there are no circles.
    pub fn random_point(&mut self) -> Option<DVec2> {
        self.random_point_in_bounds(&PointQuery::default())
    }

    /// `n` independent [`random_point`](Self::random_point) draws.
    pub fn random_points(&mut self, n: usize) -> Vec<DVec2> {
        self.random_points_in_bounds(n, &PointQuery::default())
    }

    /// Point on a circle chosen from those matching `query`, or from all
    /// circles when none match.
    pub fn random_point_in_bounds(&mut self, query: &PointQuery) -> Option<DVec2> {
        let (w, h) = (self.width, self.height);
        let matching: Vec<&Circle> = self
            .circles
            .iter()
            .filter(|c| query.matches(c, w, h))
            .collect();
        let circle = if matching.is_empty() {
            *self.rng.choose(&self.circles)?
        } else {
            **self.rng.choose(&matching)?
        };
        Some(circle.random_point(&mut self.rng))
    }

    /// `n` draws of [`random_point_in_bounds`](Self::random_point_in_bounds).
    pub fn random_points_in_bounds(&mut self, n: usize, query: &PointQuery) -> Vec<DVec2> {
        (0..n)
            .map_while(|_| self.random_point_in_bounds(query))
            .collect()
    }

    /// Sampling window at `progress`, clamped to [0, 1] (NaN counts as 0).
    ///
    /// The canvas plus `overscan` on each side, translated along the
    /// movement delta.
    pub fn current_window(&self, progress: f64) -> Window {
        match progress {
            p if p.is_nan() || p <= 0.0 => self.windows[0],
            p if p >= 1.0 => self.windows[1],
            p => self.window_at(p),
        }
    }

    /// Windows at progress 0 and 1.
    pub fn window_endpoints(&self) -> [Window; 2] {
        self.windows
    }

    /// Point from a circle intersecting the window at `progress`.
    pub fn random_point_in_moving_window(&mut self, progress: f64) -> Option<DVec2> {
        let query = PointQuery::within(self.current_window(progress));
        self.random_point_in_bounds(&query)
    }

    pub fn random_points_in_moving_window(&mut self, progress: f64, n: usize) -> Vec<DVec2> {
        let query = PointQuery::within(self.current_window(progress));
        self.random_points_in_bounds(n, &query)
    }

    /// Point from a fully visible circle outside the window at `progress`.
    pub fn random_point_free_form(&mut self, progress: f64) -> Option<DVec2> {
        let query = PointQuery::outside(self.current_window(progress));
        self.random_point_in_bounds(&query)
    }

    /// Outlines every circle.
    pub fn show<S: DrawSurface>(&self, surface: &mut S, color: &S::Color) {
        for c in &self.circles {
            surface.circle(c.x, c.y, c.r, color);
        }
    }

    /// Draws the movement path.
    pub fn show_movement<S: DrawSurface>(&self, surface: &mut S, color: &S::Color) {
        let Movement { start, end, .. } = self.movement;
        surface.line(start.x, start.y, end.x, end.y, color);
    }

    /// Drops all circles. The movement path is kept.
    pub fn clear(&mut self) {
        self.circles.clear();
    }

    fn window_at(&self, progress: f64) -> Window {
        let offset = self.movement.delta() * progress;
        let (w, h) = (self.width, self.height);
        let o = self.config.overscan;
        Window {
            x: [-w * o + offset.x, w * (1.0 + o) + offset.x],
            y: [-h * o + offset.y, h * (1.0 + o) + offset.y],
        }
    }
}
