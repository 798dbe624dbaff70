//! A complete flow-line session: field, packer and tracer wired together.
//!
//! [`FlowSketch`] is built from a [`Seed`]. Construction packs the circles
//! and populates the field; every [`tick`](FlowSketch::tick) then traces a
//! few clusters of lines from origins inside the packer's moving window.
//! The session owns everything it uses, so two sessions built from equal
//! seeds produce identical lines tick for tick.

use crate::draw::DrawSurface;
use crate::error::FlowError;
use crate::field::{DynamicField, FieldConfig, FieldGeometry, StaticField, DEFAULT_BOUNDS};
use crate::field_source::{
    compose_specs, CompositeGenerator, FractalNoiseSpec, GeneratorSpec, GradientSpec,
    NoiseWaveSpec, RandomSpec,
};
use crate::packer::{CirclePacker, PackerConfig};
use crate::params::{param_bool, param_pair};
use crate::prng::SeededRandom;
use crate::seed::Seed;
use crate::trace::{trace_group, Cluster, Polyline, SampleField, TraceConfig};
use glam::DVec2;
use serde_json::{json, Map, Value};

/// Extra clusters traced when a free-form burst fires.
const FREE_FORM_CLUSTERS: usize = 5;
/// Free-form clusters are short, fine strokes.
const FREE_FORM_STEPS: f64 = 3.0;
const FREE_FORM_STEP_LENGTH: f64 = 0.0001;
/// Chance of each optional layer in the default composition.
const OPTIONAL_LAYER_CHANCE: f64 = 0.1;

/// The session's field, in whichever recompute mode it was built with.
#[derive(Debug, Clone)]
pub enum SessionField {
    Static(StaticField),
    Dynamic(DynamicField),
}

impl SessionField {
    fn new(
        width: usize,
        height: usize,
        seed: u64,
        config: &FieldConfig,
        dynamic: bool,
    ) -> Result<Self, FlowError> {
        Ok(if dynamic {
            SessionField::Dynamic(DynamicField::new(width, height, seed, config)?)
        } else {
            SessionField::Static(StaticField::new(width, height, seed, config)?)
        })
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, SessionField::Dynamic(_))
    }

    /// Static fields fill once; dynamic fields recompute at `time`.
    fn refresh(&mut self, generator: &mut CompositeGenerator, time: f64) {
        match self {
            SessionField::Static(f) => {
                f.populate(generator);
            }
            SessionField::Dynamic(f) => f.populate(generator, time),
        }
    }

    fn clear(&mut self) {
        match self {
            SessionField::Static(f) => f.clear(),
            SessionField::Dynamic(f) => f.clear(),
        }
    }

    /// Draws the field vectors onto `surface`.
    pub fn visualize<S: DrawSurface>(&self, surface: &mut S, color: &S::Color, complete: bool) {
        match self {
            SessionField::Static(f) => f.visualize(surface, color, complete),
            SessionField::Dynamic(f) => f.visualize(surface, color, complete),
        }
    }
}

impl SampleField for SessionField {
    fn geometry(&self) -> &FieldGeometry {
        match self {
            SessionField::Static(f) => f.geometry(),
            SessionField::Dynamic(f) => f.geometry(),
        }
    }

    fn sample_at(&self, point: DVec2) -> Option<DVec2> {
        match self {
            SessionField::Static(f) => f.sample_vector(point),
            SessionField::Dynamic(f) => f.sample_vector(point),
        }
    }
}

/// Seeded flow-line session.
///
/// Recognised `params` keys are those of [`FieldConfig`], [`PackerConfig`]
/// and [`TraceConfig`], plus `dynamic` (bool) and `generators` (an array of
/// [`GeneratorSpec`]). Without `generators` the session draws a layered
/// fractal-noise composition from its seed.
pub struct FlowSketch {
    seed: Seed,
    field_config: FieldConfig,
    packer_config: PackerConfig,
    trace_config: TraceConfig,
    specs: Vec<GeneratorSpec>,
    field: SessionField,
    generator: CompositeGenerator,
    packer: CirclePacker,
    rng: SeededRandom,
    ticks: usize,
    torn_down: bool,
}

impl FlowSketch {
    /// Validates `seed`, packs the circles and populates the field.
    pub fn new(seed: &Seed) -> Result<Self, FlowError> {
        seed.validate()?;
        let params = &seed.params;
        let field_config = FieldConfig::from_json(params);
        let mut packer_config = PackerConfig::from_json(params);
        packer_config.bounds = param_pair(params, "packing_bounds", field_config.bounds);
        let trace_config = TraceConfig::from_json(params);
        trace_config.validate()?;
        let dynamic = param_bool(params, "dynamic", false);

        let mut rng = SeededRandom::new(seed.seed);
        let specs = match params.get("generators") {
            Some(list) => GeneratorSpec::parse_list(list)?,
            None => default_specs(&mut rng),
        };

        let _span = tracing::debug_span!("sketch_new", seed = seed.seed, dynamic).entered();
        if !dynamic && specs.iter().any(GeneratorSpec::is_animated) {
            tracing::debug!("animated layers are frozen at time 0 in a static field");
        }
        let mut field =
            SessionField::new(seed.width, seed.height, seed.seed, &field_config, dynamic)?;
        let mut generator = compose_specs(&specs, field.geometry(), seed.seed);
        let mut packer = CirclePacker::new(seed.seed, seed.width, seed.height, packer_config)?;
        packer.setup().grow_circles_indefinitely();
        field.refresh(&mut generator, 0.0);
        tracing::debug!(
            layers = specs.len(),
            circles = packer.circles().len(),
            "sketch ready"
        );

        Ok(Self {
            seed: seed.clone(),
            field_config,
            packer_config,
            trace_config,
            specs,
            field,
            generator,
            packer,
            rng,
            ticks: 0,
            torn_down: false,
        })
    }

    pub fn field(&self) -> &SessionField {
        &self.field
    }

    pub fn packer(&self) -> &CirclePacker {
        &self.packer
    }

    pub fn generator_specs(&self) -> &[GeneratorSpec] {
        &self.specs
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// The seed this session was built from, with its tick count updated.
    pub fn to_seed(&self) -> Seed {
        Seed {
            ticks: self.ticks,
            ..self.seed.clone()
        }
    }

    /// Traces one tick's worth of lines at `progress` (clamped to [0, 1]).
    ///
    /// Dynamic fields are recomputed first with `progress` as the time.
    /// Base step count and length are drawn once per tick; step length
    /// shrinks as progress grows. With probability `free_form_chance` a
    /// burst of short clusters is traced from visible circles outside the
    /// moving window.
    pub fn tick(&mut self, progress: f64) -> Vec<Polyline> {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        let _span = tracing::trace_span!("tick", tick = self.ticks, progress).entered();
        if self.field.is_dynamic() && !self.torn_down {
            self.field.refresh(&mut self.generator, progress);
        }

        let cfg = self.trace_config;
        let shrink = (1.0 + progress * 6.0).floor().sqrt();
        let base_steps = self.rng.range(cfg.steps[0], cfg.steps[1]).floor();
        let base_length = self.rng.range(cfg.step_length[0], cfg.step_length[1]) / shrink;
        let spread = self.rng.range(0.0, cfg.cluster_jitter);

        let mut lines = Vec::new();
        for _ in 0..cfg.clusters {
            let Some(origin) = self.packer.random_point_in_moving_window(progress) else {
                break;
            };
            let cluster = Cluster {
                origin,
                groups: cfg.groups,
                lines: cfg.lines,
                steps: base_steps * self.rng.range(1.0 - spread, 1.0 + spread),
                step_length: base_length * self.rng.range(1.0 - spread, 1.0 + spread),
            };
            lines.extend(trace_group(&self.field, &mut self.rng, &cluster, &cfg));
        }

        if self.rng.random() < cfg.free_form_chance {
            for _ in 0..FREE_FORM_CLUSTERS {
                let Some(origin) = self.packer.random_point_free_form(progress) else {
                    break;
                };
                let cluster = Cluster {
                    origin,
                    groups: 1,
                    lines: 1,
                    steps: FREE_FORM_STEPS,
                    step_length: FREE_FORM_STEP_LENGTH,
                };
                lines.extend(trace_group(&self.field, &mut self.rng, &cluster, &cfg));
            }
            tracing::trace!("free-form burst");
        }

        self.ticks += 1;
        tracing::trace!(lines = lines.len(), "tick traced");
        lines
    }

    /// Runs `ticks` ticks with progress spread evenly over [0, 1].
    pub fn run(&mut self, ticks: usize) -> Vec<Polyline> {
        let last = ticks.saturating_sub(1).max(1) as f64;
        (0..ticks).flat_map(|i| self.tick(i as f64 / last)).collect()
    }

    /// Effective settings as a flat JSON object.
    pub fn params(&self) -> Value {
        let mut out = Map::new();
        merge(&mut out, self.field_config.to_json());
        merge(&mut out, self.packer_config.to_json());
        merge(&mut out, self.trace_config.to_json());
        out.insert("dynamic".into(), Value::Bool(self.field.is_dynamic()));
        out.insert(
            "generators".into(),
            Value::Array(
                self.specs
                    .iter()
                    .filter_map(|s| serde_json::to_value(s).ok())
                    .collect(),
            ),
        );
        Value::Object(out)
    }

    /// Schema for every key [`params`](Self::params) reports.
    pub fn param_schema() -> Value {
        let mut out = Map::new();
        merge(&mut out, FieldConfig::param_schema());
        merge(&mut out, PackerConfig::param_schema());
        merge(&mut out, TraceConfig::param_schema());
        if let Some(Value::Object(bounds)) = out.get_mut("packing_bounds") {
            bounds.insert("default".into(), json!(DEFAULT_BOUNDS));
        }
        out.insert(
            "dynamic".into(),
            json!({
                "type": "boolean",
                "default": false,
                "description": "Recompute the field on every tick"
            }),
        );
        out.insert(
            "generators".into(),
            json!({
                "type": "array",
                "kinds": GeneratorSpec::list_kinds(),
                "description": "Field layers; omitted means a seeded fractal-noise stack"
            }),
        );
        Value::Object(out)
    }

    /// Draws the field, circles and movement path onto `surface`.
    pub fn show_debug<S: DrawSurface>(&self, surface: &mut S, color: &S::Color) {
        self.packer.show_movement(surface, color);
        self.packer.show(surface, color);
        self.field.visualize(surface, color, false);
    }

    /// Releases the grid and circles. Later ticks trace nothing and leave
    /// a dynamic field unpopulated.
    pub fn teardown(&mut self) {
        self.field.clear();
        self.packer.clear();
        self.torn_down = true;
        tracing::debug!(ticks = self.ticks, "sketch torn down");
    }
}

/// Three fractal-noise layers of halving strength, plus optional gradient,
/// random and noise-wave layers at low strength.
fn default_specs(rng: &mut SeededRandom) -> Vec<GeneratorSpec> {
    let mut specs: Vec<GeneratorSpec> = [0.5, 0.25, 0.125]
        .into_iter()
        .map(|strength| {
            GeneratorSpec::FractalNoise(FractalNoiseSpec {
                strength,
                ..FractalNoiseSpec::default()
            })
        })
        .collect();

    let angle = rng.range(0.0, 360.0);
    let strength = rng.range(-0.125, 0.125);
    if rng.random() < OPTIONAL_LAYER_CHANCE {
        specs.push(GeneratorSpec::Gradient(GradientSpec {
            angle,
            strength,
            ..GradientSpec::default()
        }));
    }
    let strength = rng.range(-0.125, 0.125);
    if rng.random() < OPTIONAL_LAYER_CHANCE {
        specs.push(GeneratorSpec::Random(RandomSpec { strength }));
    }
    let strength = rng.range(-0.125, 0.125);
    if rng.random() < OPTIONAL_LAYER_CHANCE {
        specs.push(GeneratorSpec::NoiseWave(NoiseWaveSpec {
            strength,
            scale: 0.02,
            ..NoiseWaveSpec::default()
        }));
    }
    specs
}

fn merge(into: &mut Map<String, Value>, value: Value) {
    if let Value::Object(map) = value {
        into.extend(map);
    }
}
