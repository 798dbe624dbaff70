//! Streamline tracing through a vector field.
//!
//! Tracers only emit points. Turning polylines into strokes, alpha ramps or
//! colors is left to the host.

use crate::error::FlowError;
use crate::field::{FieldGeometry, Refresh, VectorField};
use crate::params::{param_f64, param_pair, param_usize};
use crate::prng::SeededRandom;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A traced line, origin first.
pub type Polyline = Vec<DVec2>;

/// Smallest world-space step a tracer takes.
pub const MIN_WORLD_STEP: f64 = 0.5;

/// Most steps any single line takes.
pub const MAX_STEPS: usize = 10_000;

/// Anything a tracer can sample forces from.
pub trait SampleField {
    fn geometry(&self) -> &FieldGeometry;

    /// Force at `point`, or `None` where the field ends.
    fn sample_at(&self, point: DVec2) -> Option<DVec2>;
}

impl<M: Refresh> SampleField for VectorField<M> {
    fn geometry(&self) -> &FieldGeometry {
        VectorField::geometry(self)
    }

    fn sample_at(&self, point: DVec2) -> Option<DVec2> {
        self.sample_vector(point)
    }
}

/// Settings for line clusters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Clusters traced per tick, each from its own origin.
    pub clusters: usize,
    /// Groups per cluster. Each group draws its own step variation.
    pub groups: usize,
    /// Lines per group.
    pub lines: usize,
    /// Per-tick base step count is drawn from this range.
    pub steps: [f64; 2],
    /// Per-tick base step length, as a fraction of the larger canvas side.
    pub step_length: [f64; 2],
    /// Upper bound of the per-tick relative jitter applied to steps and length.
    pub cluster_jitter: f64,
    /// Origins wander by up to this many world units per line.
    pub jitter: f64,
    /// Upper bound of the per-group relative step variation.
    pub step_variation: f64,
    /// Chance per tick of an extra cluster seeded outside the moving window.
    pub free_form_chance: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            clusters: 3,
            groups: 5,
            lines: 2,
            steps: [4.0, 10.0],
            step_length: [0.001, 0.002],
            cluster_jitter: 0.1,
            jitter: 10.0,
            step_variation: 0.2,
            free_form_chance: 0.005,
        }
    }
}

impl TraceConfig {
    /// Reads settings from a JSON object; missing or mistyped keys keep defaults.
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            clusters: param_usize(params, "clusters", d.clusters),
            groups: param_usize(params, "groups", d.groups),
            lines: param_usize(params, "lines", d.lines),
            steps: param_pair(params, "steps", d.steps),
            step_length: param_pair(params, "step_length", d.step_length),
            cluster_jitter: param_f64(params, "cluster_jitter", d.cluster_jitter),
            jitter: param_f64(params, "jitter", d.jitter),
            step_variation: param_f64(params, "step_variation", d.step_variation),
            free_form_chance: param_f64(params, "free_form_chance", d.free_form_chance),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "clusters": self.clusters,
            "groups": self.groups,
            "lines": self.lines,
            "steps": self.steps,
            "step_length": self.step_length,
            "cluster_jitter": self.cluster_jitter,
            "jitter": self.jitter,
            "step_variation": self.step_variation,
            "free_form_chance": self.free_form_chance,
        })
    }

    /// Step ranges must be finite, ordered and non-negative, with at most
    /// [`MAX_STEPS`] steps; relative jitters must lie in [0, 1].
    pub fn validate(&self) -> Result<(), FlowError> {
        let [lo, hi] = self.steps;
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi || hi > MAX_STEPS as f64 {
            return Err(FlowError::invalid(
                "steps",
                format!("must satisfy 0 <= min <= max <= {MAX_STEPS}"),
            ));
        }
        let [lo, hi] = self.step_length;
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
            return Err(FlowError::invalid("step_length", "must satisfy 0 <= min <= max"));
        }
        for (name, value) in [
            ("cluster_jitter", self.cluster_jitter),
            ("step_variation", self.step_variation),
            ("free_form_chance", self.free_form_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FlowError::invalid(name, "must lie in [0, 1]"));
            }
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(FlowError::invalid("jitter", "must be a non-negative number"));
        }
        Ok(())
    }

    pub fn param_schema() -> Value {
        let d = Self::default();
        json!({
            "clusters": {"type": "integer", "default": d.clusters, "min": 0, "description": "Line clusters per tick"},
            "groups": {"type": "integer", "default": d.groups, "min": 0, "description": "Groups per cluster"},
            "lines": {"type": "integer", "default": d.lines, "min": 0, "description": "Lines per group"},
            "steps": {"type": "array", "default": d.steps, "max": MAX_STEPS, "description": "Range of the per-tick base step count"},
            "step_length": {"type": "array", "default": d.step_length, "description": "Range of the per-tick step length, as a fraction of the larger side"},
            "cluster_jitter": {"type": "number", "default": d.cluster_jitter, "min": 0.0, "max": 1.0, "description": "Relative jitter of steps and length per cluster"},
            "jitter": {"type": "number", "default": d.jitter, "min": 0.0, "description": "Origin wander per line, in world units"},
            "step_variation": {"type": "number", "default": d.step_variation, "min": 0.0, "max": 1.0, "description": "Relative step variation per group"},
            "free_form_chance": {"type": "number", "default": d.free_form_chance, "min": 0.0, "max": 1.0, "description": "Chance of an extra cluster outside the moving window"}
        })
    }
}

/// World-space step for a relative `step_length`.
pub fn world_step<F: SampleField + ?Sized>(field: &F, step_length: f64) -> f64 {
    let g = field.geometry();
    let max_dim = g.width().max(g.height()) as f64;
    (max_dim * step_length).max(MIN_WORLD_STEP)
}

/// Follows the field from `origin` for up to `steps` steps.
///
/// Each step moves by the sampled force times the world step. The line ends
/// early when a sample comes back empty, so the result holds between 1 and
/// `steps + 1` points. `steps` is capped at [`MAX_STEPS`].
pub fn trace_line<F: SampleField + ?Sized>(
    field: &F,
    origin: DVec2,
    steps: usize,
    step_length: f64,
) -> Polyline {
    let step = world_step(field, step_length);
    let mut pos = origin;
    let steps = steps.min(MAX_STEPS);
    let mut line = Vec::with_capacity(steps + 1);
    line.push(pos);
    for _ in 0..steps {
        let Some(force) = field.sample_at(pos) else {
            break;
        };
        pos += force * step;
        line.push(pos);
    }
    line
}

/// Shape of one cluster: where it starts and how far its lines run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub origin: DVec2,
    pub groups: usize,
    pub lines: usize,
    pub steps: f64,
    pub step_length: f64,
}

/// Traces `groups * lines` jittered lines around a cluster origin.
///
/// Each group draws a step-count and step-length variation; each line then
/// wanders the origin by up to `jitter` on both axes (the wander
/// accumulates) and scales steps and length within that variation.
pub fn trace_group<F: SampleField + ?Sized>(
    field: &F,
    rng: &mut SeededRandom,
    cluster: &Cluster,
    config: &TraceConfig,
) -> Vec<Polyline> {
    let mut pos = cluster.origin;
    let mut out = Vec::with_capacity(cluster.groups * cluster.lines);
    let jitter = config.jitter;
    for _ in 0..cluster.groups {
        let vary_steps = rng.range(0.0, config.step_variation);
        let vary_length = rng.range(0.0, config.step_variation);
        for _ in 0..cluster.lines {
            pos.x += rng.random() * jitter * 2.0 - jitter;
            pos.y += rng.random() * jitter * 2.0 - jitter;
            let steps = cluster.steps * (1.0 - vary_steps / 2.0 + rng.random() * vary_steps);
            let length = cluster.step_length * (1.0 - vary_length + rng.random() * vary_length);
            out.push(trace_line(field, pos, step_count(steps), length));
        }
    }
    out
}

/// Fractional step counts round up; negatives and NaN give zero, and
/// counts past [`MAX_STEPS`] saturate there.
fn step_count(steps: f64) -> usize {
    if steps.is_nan() {
        return 0;
    }
    steps.clamp(0.0, MAX_STEPS as f64).ceil() as usize
}
