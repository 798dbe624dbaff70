//! Field generators: composable per-cell force producers.
//!
//! A [`Generator`] turns a grid cell (and a time) into a force vector. The
//! library covers coherent and fractal noise, radial point sources (repulsors
//! and attractors), radial waves, constant gradients, uniform random
//! directions, axis-wise interference, dipoles and noise-steered waves.
//! [`CompositeGenerator`] sums any of them with a magnitude floor so the
//! composed field never stalls a tracer.
//!
//! Generators that depend on a world position resolve it to a cell once, at
//! construction, through [`FieldGeometry::index_for`].
//!
//! Outputs are in "cells": the field multiplies them by its resolution.

use crate::error::FlowError;
use crate::field::FieldGeometry;
use crate::prng::SeededRandom;
use glam::DVec2;
use noise::{NoiseFn, OpenSimplex, Perlin};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::{PI, TAU};

/// Produces the force for one grid cell at a given time.
///
/// Implementations other than [`RandomField`] are pure: same inputs, same
/// output. `&mut self` lets stateful generators draw from their own PRNG.
pub trait Generator: Send {
    /// Force at cell `(col, row)` of `grid` at `time`, before resolution scaling.
    fn vector(&mut self, grid: &FieldGeometry, col: usize, row: usize, time: f64) -> DVec2;
}

/// Minimum composed magnitude, in cells. Populated vectors never drop below
/// 0.5% of the field resolution when a composite has a usable heading.
pub const MIN_MAGNITUDE: f64 = 0.005;

/// Seed offset between successive noise layers built from one seed.
const LAYER_SEED_STRIDE: u32 = 7919;

/// Distances below this are treated as coincident.
const SINGULARITY_EPS: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Noise-based generators
// ---------------------------------------------------------------------------

/// Coherent Perlin noise steering: noise value picks the heading.
pub struct NoiseField {
    noise: Perlin,
    scale: f64,
    strength: f64,
    offset: f64,
    speed: f64,
}

/// Octave-summed OpenSimplex noise steering.
///
/// Each octave doubles the frequency and halves the amplitude; the sum is
/// normalized by the total amplitude before choosing the heading.
pub struct FractalNoiseField {
    noise: OpenSimplex,
    scale: f64,
    strength: f64,
    octaves: u32,
    offset: f64,
    speed: f64,
}

/// Noise-chosen heading whose magnitude oscillates along that heading.
pub struct NoiseWaveField {
    noise: Perlin,
    strength: f64,
    frequency: f64,
    scale: f64,
    phase: f64,
}

/// Maps a noise sample in roughly [-1, 1] to a heading in [0, 2π].
fn noise_heading(n: f64) -> f64 {
    ((n + 1.0) * 0.5).clamp(0.0, 1.0) * TAU
}

impl NoiseField {
    /// Creates a Perlin-steered field. `scale` multiplies cell indices.
    pub fn new(scale: f64, strength: f64, seed: u32) -> Self {
        Self {
            noise: Perlin::new(seed),
            scale,
            strength,
            offset: 0.0,
            speed: 0.0,
        }
    }

    /// Animates the field: the noise z-coordinate advances by `speed` per
    /// unit of time.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Shifts the noise z-coordinate, giving an unrelated slice of the same noise.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

impl FractalNoiseField {
    /// Creates a fractal field; `octaves` is raised to at least 1.
    pub fn new(scale: f64, strength: f64, seed: u32, octaves: u32) -> Self {
        Self {
            noise: OpenSimplex::new(seed),
            scale,
            strength,
            octaves: octaves.max(1),
            offset: 0.0,
            speed: 0.0,
        }
    }

    /// Animates the field along the noise z-axis.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Shifts the noise z-coordinate.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Amplitude-weighted mean of all octaves, in roughly [-1, 1].
    fn octave_mean(&self, x: f64, y: f64, z: f64) -> f64 {
        let (sum, total, _, _) = (0..self.octaves).fold(
            (0.0, 0.0, 1.0, 1.0),
            |(sum, total, amp, freq), _| {
                let n = self.noise.get([x * freq, y * freq, z]);
                (sum + n * amp, total + amp, amp * 0.5, freq * 2.0)
            },
        );
        if total < SINGULARITY_EPS {
            0.0
        } else {
            sum / total
        }
    }
}

impl NoiseWaveField {
    /// Creates a noise-steered wave field.
    pub fn new(strength: f64, frequency: f64, scale: f64, phase: f64, seed: u32) -> Self {
        Self {
            noise: Perlin::new(seed),
            strength,
            frequency,
            scale,
            phase,
        }
    }
}

impl Generator for NoiseField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, time: f64) -> DVec2 {
        let x = col as f64 * self.scale;
        let y = row as f64 * self.scale;
        let n = self.noise.get([x, y, self.offset + time * self.speed]);
        DVec2::from_angle(noise_heading(n)) * self.strength
    }
}

impl Generator for FractalNoiseField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, time: f64) -> DVec2 {
        let x = col as f64 * self.scale;
        let y = row as f64 * self.scale;
        let n = self.octave_mean(x, y, self.offset + time * self.speed);
        DVec2::from_angle(noise_heading(n)) * self.strength
    }
}

impl Generator for NoiseWaveField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, _time: f64) -> DVec2 {
        let (i, j) = (col as f64, row as f64);
        let heading = noise_heading(self.noise.get([i * self.scale, j * self.scale]));
        let effect = i * heading.cos() + j * heading.sin();
        let wave = (0.5 + (effect * self.frequency + self.phase).sin()) * self.strength;
        DVec2::from_angle(heading) * wave
    }
}

// ---------------------------------------------------------------------------
// Point-source generators
// ---------------------------------------------------------------------------

/// Radial point source: repels for positive strength, attracts for negative.
///
/// Magnitude decays as `strength / max(d, 1)^(1/3)` where `d` is the cell
/// distance to the source. With a growth rate the strength scales by
/// `1 + growth * time`.
pub struct RadialField {
    source: (usize, usize),
    strength: f64,
    growth: f64,
}

/// Radial wave: `sin(d * frequency) * strength` along the radial direction.
pub struct RadialWaveField {
    source: (usize, usize),
    strength: f64,
    frequency: f64,
}

/// Two inverse-square sources of opposite sign: `north` pushes, `south` pulls.
pub struct DipoleField {
    north: (usize, usize),
    south: (usize, usize),
    strength: f64,
}

/// Offset from a source cell to `(col, row)` and its length.
fn offset_from(source: (usize, usize), col: usize, row: usize) -> (DVec2, f64) {
    let d = DVec2::new(
        col as f64 - source.0 as f64,
        row as f64 - source.1 as f64,
    );
    (d, d.length())
}

/// Unit direction of `d`, taking the +x axis for a zero offset.
fn heading_of(d: DVec2) -> DVec2 {
    DVec2::from_angle(d.y.atan2(d.x))
}

impl RadialField {
    /// Repulsor at world position `(x, y)`.
    pub fn repulsor(grid: &FieldGeometry, x: f64, y: f64, strength: f64) -> Self {
        Self {
            source: grid.index_for(x, y),
            strength,
            growth: 0.0,
        }
    }

    /// Attractor at world position `(x, y)`: a repulsor with negated strength.
    pub fn attractor(grid: &FieldGeometry, x: f64, y: f64, strength: f64) -> Self {
        Self::repulsor(grid, x, y, -strength)
    }

    /// Strength grows linearly: `strength * (1 + growth * time)`.
    pub fn with_growth(mut self, growth: f64) -> Self {
        self.growth = growth;
        self
    }

    /// Source cell.
    pub fn source(&self) -> (usize, usize) {
        self.source
    }
}

impl RadialWaveField {
    /// Wave centred on world position `(x, y)`.
    pub fn new(grid: &FieldGeometry, x: f64, y: f64, strength: f64, frequency: f64) -> Self {
        Self {
            source: grid.index_for(x, y),
            strength,
            frequency,
        }
    }
}

impl DipoleField {
    /// Dipole between two world positions.
    pub fn new(grid: &FieldGeometry, north: DVec2, south: DVec2, strength: f64) -> Self {
        Self {
            north: grid.index_for(north.x, north.y),
            south: grid.index_for(south.x, south.y),
            strength,
        }
    }
}

impl Generator for RadialField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, time: f64) -> DVec2 {
        let (d, distance) = offset_from(self.source, col, row);
        let strength = self.strength * (1.0 + self.growth * time);
        let decay = strength / distance.max(1.0).cbrt();
        heading_of(d) * decay
    }
}

impl Generator for RadialWaveField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, _time: f64) -> DVec2 {
        let (d, distance) = offset_from(self.source, col, row);
        heading_of(d) * (distance * self.frequency).sin() * self.strength
    }
}

impl Generator for DipoleField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, _time: f64) -> DVec2 {
        let (dn, distance_n) = offset_from(self.north, col, row);
        let (ds, distance_s) = offset_from(self.south, col, row);
        let push = heading_of(dn) * (self.strength / distance_n.powi(2).max(1.0));
        let pull = heading_of(ds) * (-self.strength / distance_s.powi(2).max(1.0));
        push + pull
    }
}

// ---------------------------------------------------------------------------
// Uniform generators
// ---------------------------------------------------------------------------

/// Constant direction everywhere; optionally pulsing magnitude.
pub struct GradientField {
    direction: DVec2,
    strength: f64,
    pulse: f64,
}

/// Fresh random heading on every call, from its own seeded PRNG.
pub struct RandomField {
    rng: SeededRandom,
    strength: f64,
}

/// Independent sinusoids on each axis.
pub struct InterferenceField {
    strength: f64,
    frequency_x: f64,
    frequency_y: f64,
    phase: f64,
    speed: f64,
}

impl GradientField {
    /// Gradient pointing at `angle` degrees (0 = +x, 90 = +y).
    pub fn new(angle: f64, strength: f64) -> Self {
        Self {
            direction: DVec2::from_angle(angle.to_radians()),
            strength,
            pulse: 0.0,
        }
    }

    /// Magnitude follows `strength * cos(pulse * time)`.
    pub fn with_pulse(mut self, pulse: f64) -> Self {
        self.pulse = pulse;
        self
    }
}

impl RandomField {
    /// Creates a random-direction field drawing from `SeededRandom::new(seed)`.
    pub fn new(strength: f64, seed: u64) -> Self {
        Self {
            rng: SeededRandom::new(seed),
            strength,
        }
    }
}

impl InterferenceField {
    /// Creates an interference field; `speed` advances the phase with time.
    pub fn new(strength: f64, frequency_x: f64, frequency_y: f64, phase: f64) -> Self {
        Self {
            strength,
            frequency_x,
            frequency_y,
            phase,
            speed: 0.0,
        }
    }

    /// Phase advances by `speed` per unit of time.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }
}

impl Generator for GradientField {
    fn vector(&mut self, _grid: &FieldGeometry, _col: usize, _row: usize, time: f64) -> DVec2 {
        self.direction * self.strength * (self.pulse * time).cos()
    }
}

impl Generator for RandomField {
    fn vector(&mut self, _grid: &FieldGeometry, _col: usize, _row: usize, _time: f64) -> DVec2 {
        DVec2::from_angle(self.rng.random() * TAU) * self.strength
    }
}

impl Generator for InterferenceField {
    fn vector(&mut self, _grid: &FieldGeometry, col: usize, row: usize, time: f64) -> DVec2 {
        let phase = self.phase + self.speed * time;
        DVec2::new(
            (col as f64 * self.frequency_x + phase).sin(),
            (row as f64 * self.frequency_y + phase).sin(),
        ) * self.strength
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// Sums the outputs of several generators.
///
/// With two or more inputs, a sum shorter than [`MIN_MAGNITUDE`] is replaced
/// by a vector of that length along the mean heading of the non-zero inputs.
/// No inputs yields zero; a single input passes through untouched.
#[derive(Default)]
pub struct CompositeGenerator {
    sources: Vec<Box<dyn Generator>>,
}

impl CompositeGenerator {
    /// Creates an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a generator (builder pattern).
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, source: Box<dyn Generator>) -> Self {
        self.sources.push(source);
        self
    }

    /// Adds a generator in place.
    pub fn push(&mut self, source: Box<dyn Generator>) {
        self.sources.push(source);
    }

    /// Number of composed generators.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when nothing has been composed.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Composes `sources` into one generator.
pub fn compose(sources: Vec<Box<dyn Generator>>) -> CompositeGenerator {
    CompositeGenerator { sources }
}

impl Generator for CompositeGenerator {
    fn vector(&mut self, grid: &FieldGeometry, col: usize, row: usize, time: f64) -> DVec2 {
        match self.sources.as_mut_slice() {
            [] => DVec2::ZERO,
            [only] => only.vector(grid, col, row, time),
            sources => {
                let (sum, headings, count) = sources.iter_mut().fold(
                    (DVec2::ZERO, DVec2::ZERO, 0_u32),
                    |(sum, headings, count), source| {
                        let v = source.vector(grid, col, row, time);
                        let len = v.length();
                        if len > SINGULARITY_EPS {
                            (sum + v, headings + v / len, count + 1)
                        } else {
                            (sum + v, headings, count)
                        }
                    },
                );
                floor_magnitude(sum, headings, count)
            }
        }
    }
}

/// Lifts a near-zero sum onto the mean input heading at [`MIN_MAGNITUDE`].
fn floor_magnitude(sum: DVec2, headings: DVec2, count: u32) -> DVec2 {
    if sum.length() >= MIN_MAGNITUDE || count == 0 {
        return sum;
    }
    let mean = headings / f64::from(count);
    if mean.length() < SINGULARITY_EPS {
        return sum;
    }
    mean.normalize() * MIN_MAGNITUDE
}

// ---------------------------------------------------------------------------
// Declarative specs
// ---------------------------------------------------------------------------

/// All generator kind names accepted in a [`GeneratorSpec`].
const GENERATOR_KINDS: &[&str] = &[
    "noise",
    "fractal-noise",
    "noise-wave",
    "repulsor",
    "attractor",
    "radial-wave",
    "dipole",
    "gradient",
    "random",
    "interference",
];

/// JSON-describable generator, tagged by `kind`.
///
/// Positions are fractions of the canvas (`[0.5, 0.5]` is the centre; values
/// outside 0..1 sit in the oversampled margin). Omitted fields take the
/// defaults listed on each variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GeneratorSpec {
    /// scale 0.015, strength 1, offset 0, speed 0.
    Noise(NoiseSpec),
    /// scale 0.015, strength 1, octaves 4, offset 0, speed 0.
    FractalNoise(FractalNoiseSpec),
    /// strength 4, frequency 0.001, scale 0.005, phase 0.
    NoiseWave(NoiseWaveSpec),
    /// at [0.5, 0.5], strength 3, growth 0.
    Repulsor(PointSpec),
    /// at [0.5, 0.5], strength 3, growth 0.
    Attractor(PointSpec),
    /// at [0.5, 0.5], strength 1, frequency π.
    RadialWave(RadialWaveSpec),
    /// north [0.25, 0.5], south [0.75, 0.5], strength 1.
    Dipole(DipoleSpec),
    /// angle 0 degrees, strength 1, pulse 0.
    Gradient(GradientSpec),
    /// strength 1.
    Random(RandomSpec),
    /// strength 1, frequencies 0.01, phase 0, speed 0.
    Interference(InterferenceSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSpec {
    pub scale: f64,
    pub strength: f64,
    pub offset: f64,
    pub speed: f64,
}

impl Default for NoiseSpec {
    fn default() -> Self {
        Self {
            scale: 0.015,
            strength: 1.0,
            offset: 0.0,
            speed: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalNoiseSpec {
    pub scale: f64,
    pub strength: f64,
    pub octaves: u32,
    pub offset: f64,
    pub speed: f64,
}

impl Default for FractalNoiseSpec {
    fn default() -> Self {
        Self {
            scale: 0.015,
            strength: 1.0,
            octaves: 4,
            offset: 0.0,
            speed: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseWaveSpec {
    pub strength: f64,
    pub frequency: f64,
    pub scale: f64,
    pub phase: f64,
}

impl Default for NoiseWaveSpec {
    fn default() -> Self {
        Self {
            strength: 4.0,
            frequency: 0.001,
            scale: 0.005,
            phase: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointSpec {
    pub at: [f64; 2],
    pub strength: f64,
    pub growth: f64,
}

impl Default for PointSpec {
    fn default() -> Self {
        Self {
            at: [0.5, 0.5],
            strength: 3.0,
            growth: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialWaveSpec {
    pub at: [f64; 2],
    pub strength: f64,
    pub frequency: f64,
}

impl Default for RadialWaveSpec {
    fn default() -> Self {
        Self {
            at: [0.5, 0.5],
            strength: 1.0,
            frequency: PI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DipoleSpec {
    pub north: [f64; 2],
    pub south: [f64; 2],
    pub strength: f64,
}

impl Default for DipoleSpec {
    fn default() -> Self {
        Self {
            north: [0.25, 0.5],
            south: [0.75, 0.5],
            strength: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientSpec {
    pub angle: f64,
    pub strength: f64,
    pub pulse: f64,
}

impl Default for GradientSpec {
    fn default() -> Self {
        Self {
            angle: 0.0,
            strength: 1.0,
            pulse: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSpec {
    pub strength: f64,
}

impl Default for RandomSpec {
    fn default() -> Self {
        Self { strength: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterferenceSpec {
    pub strength: f64,
    pub frequency_x: f64,
    pub frequency_y: f64,
    pub phase: f64,
    pub speed: f64,
}

impl Default for InterferenceSpec {
    fn default() -> Self {
        Self {
            strength: 1.0,
            frequency_x: 0.01,
            frequency_y: 0.01,
            phase: 0.0,
            speed: 0.0,
        }
    }
}

/// Canvas-fraction position to world coordinates.
fn world(grid: &FieldGeometry, at: [f64; 2]) -> DVec2 {
    DVec2::new(at[0] * grid.width() as f64, at[1] * grid.height() as f64)
}

impl GeneratorSpec {
    /// Every accepted `kind` string.
    pub fn list_kinds() -> &'static [&'static str] {
        GENERATOR_KINDS
    }

    /// Parses a JSON array of specs.
    ///
    /// Returns `FlowError::UnknownGenerator` for an unrecognised `kind` and
    /// `FlowError::InvalidParameter` for any other malformed entry.
    pub fn parse_list(value: &Value) -> Result<Vec<GeneratorSpec>, FlowError> {
        let items = value
            .as_array()
            .ok_or_else(|| FlowError::invalid("generators", "expected a JSON array"))?;
        items
            .iter()
            .map(|item| {
                let kind = item
                    .get("kind")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FlowError::invalid("generators", "entry without a kind"))?;
                if !GENERATOR_KINDS.contains(&kind) {
                    return Err(FlowError::UnknownGenerator(kind.to_string()));
                }
                serde_json::from_value(item.clone())
                    .map_err(|e| FlowError::invalid("generators", e.to_string()))
            })
            .collect()
    }

    /// Builds the generator for `grid`. `layer` varies noise seeds between
    /// layers built from the same `seed`.
    pub fn build(&self, grid: &FieldGeometry, seed: u64, layer: u32) -> Box<dyn Generator> {
        let noise_seed = (seed as u32).wrapping_add(layer.wrapping_mul(LAYER_SEED_STRIDE));
        match self {
            GeneratorSpec::Noise(s) => Box::new(
                NoiseField::new(s.scale, s.strength, noise_seed)
                    .with_offset(s.offset)
                    .with_speed(s.speed),
            ),
            GeneratorSpec::FractalNoise(s) => Box::new(
                FractalNoiseField::new(s.scale, s.strength, noise_seed, s.octaves)
                    .with_offset(s.offset)
                    .with_speed(s.speed),
            ),
            GeneratorSpec::NoiseWave(s) => Box::new(NoiseWaveField::new(
                s.strength,
                s.frequency,
                s.scale,
                s.phase,
                noise_seed,
            )),
            GeneratorSpec::Repulsor(s) => {
                let at = world(grid, s.at);
                Box::new(RadialField::repulsor(grid, at.x, at.y, s.strength).with_growth(s.growth))
            }
            GeneratorSpec::Attractor(s) => {
                let at = world(grid, s.at);
                Box::new(RadialField::attractor(grid, at.x, at.y, s.strength).with_growth(s.growth))
            }
            GeneratorSpec::RadialWave(s) => {
                let at = world(grid, s.at);
                Box::new(RadialWaveField::new(grid, at.x, at.y, s.strength, s.frequency))
            }
            GeneratorSpec::Dipole(s) => Box::new(DipoleField::new(
                grid,
                world(grid, s.north),
                world(grid, s.south),
                s.strength,
            )),
            GeneratorSpec::Gradient(s) => {
                Box::new(GradientField::new(s.angle, s.strength).with_pulse(s.pulse))
            }
            GeneratorSpec::Random(s) => Box::new(RandomField::new(
                s.strength,
                seed.wrapping_add(u64::from(layer)),
            )),
            GeneratorSpec::Interference(s) => Box::new(
                InterferenceField::new(s.strength, s.frequency_x, s.frequency_y, s.phase)
                    .with_speed(s.speed),
            ),
        }
    }

    /// Whether the generator's output changes with time.
    pub fn is_animated(&self) -> bool {
        match self {
            GeneratorSpec::Noise(s) => s.speed != 0.0,
            GeneratorSpec::FractalNoise(s) => s.speed != 0.0,
            GeneratorSpec::Repulsor(s) | GeneratorSpec::Attractor(s) => s.growth != 0.0,
            GeneratorSpec::Gradient(s) => s.pulse != 0.0,
            GeneratorSpec::Interference(s) => s.speed != 0.0,
            GeneratorSpec::Random(_) => true,
            GeneratorSpec::NoiseWave(_) | GeneratorSpec::RadialWave(_) | GeneratorSpec::Dipole(_) => {
                false
            }
        }
    }
}

/// Builds and composes a list of specs, one noise layer per entry.
pub fn compose_specs(specs: &[GeneratorSpec], grid: &FieldGeometry, seed: u64) -> CompositeGenerator {
    compose(
        specs
            .iter()
            .zip(0_u32..)
            .map(|(spec, layer)| spec.build(grid, seed, layer))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldConfig;
    use serde_json::json;

    fn grid() -> FieldGeometry {
        FieldGeometry::new(800, 600, &FieldConfig::default()).unwrap()
    }

    /// Returns a fixed vector everywhere.
    struct Constant(DVec2);

    impl Generator for Constant {
        fn vector(&mut self, _: &FieldGeometry, _: usize, _: usize, _: f64) -> DVec2 {
            self.0
        }
    }

    // =======================================================================
    // Point sources
    // =======================================================================

    #[test]
    fn repulsor_points_away_from_source() {
        let g = grid();
        let mut rep = RadialField::repulsor(&g, 400.0, 300.0, 3.0);
        let (sc, sr) = rep.source();
        let v = rep.vector(&g, sc + 10, sr + 5, 0.0);
        assert!(v.x > 0.0 && v.y > 0.0, "expected push away, got {v}");
    }

    #[test]
    fn attractor_points_toward_source() {
        let g = grid();
        let mut attr = RadialField::attractor(&g, 400.0, 300.0, 3.0);
        let (sc, sr) = attr.source();
        let v = attr.vector(&g, sc + 10, sr + 5, 0.0);
        assert!(v.x < 0.0 && v.y < 0.0, "expected pull toward, got {v}");
    }

    #[test]
    fn radial_decay_follows_inverse_cube_root() {
        let g = grid();
        let mut rep = RadialField::repulsor(&g, 400.0, 300.0, 2.0);
        let (sc, sr) = rep.source();
        let near = rep.vector(&g, sc + 1, sr, 0.0).length();
        let far = rep.vector(&g, sc + 8, sr, 0.0).length();
        assert!((near - 2.0).abs() < 1e-12, "near = {near}");
        assert!((far - 1.0).abs() < 1e-12, "far = {far}");
    }

    #[test]
    fn radial_at_source_is_finite() {
        let g = grid();
        let mut rep = RadialField::repulsor(&g, 400.0, 300.0, 2.0);
        let (sc, sr) = rep.source();
        let v = rep.vector(&g, sc, sr, 0.0);
        assert!(v.is_finite());
        assert!((v.length() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn radial_growth_scales_with_time() {
        let g = grid();
        let mut rep = RadialField::repulsor(&g, 400.0, 300.0, 1.0).with_growth(0.5);
        let (sc, sr) = rep.source();
        let t0 = rep.vector(&g, sc + 1, sr, 0.0).length();
        let t2 = rep.vector(&g, sc + 1, sr, 2.0).length();
        assert!((t2 / t0 - 2.0).abs() < 1e-12, "ratio {}", t2 / t0);
    }

    #[test]
    fn radial_wave_vanishes_on_nodes() {
        let g = grid();
        let mut wave = RadialWaveField::new(&g, 400.0, 300.0, 1.0, PI);
        let (sc, sr) = g.index_for(400.0, 300.0);
        assert!(wave.vector(&g, sc + 2, sr, 0.0).length() < 1e-12);
        assert!(wave.vector(&g, sc + 1, sr, 0.0).length() < 1e-12);
        let mut half = RadialWaveField::new(&g, 400.0, 300.0, 1.0, PI / 2.0);
        assert!((half.vector(&g, sc + 1, sr, 0.0).x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dipole_pushes_from_north_and_pulls_to_south() {
        let g = grid();
        let north = DVec2::new(200.0, 300.0);
        let south = DVec2::new(600.0, 300.0);
        let mut dipole = DipoleField::new(&g, north, south, 1.0);
        let (nc, nr) = g.index_for(north.x, north.y);
        let (scol, _) = g.index_for(south.x, south.y);
        let mid = (nc + scol) / 2;
        let v = dipole.vector(&g, mid, nr, 0.0);
        assert!(v.x > 0.0, "flow should run north to south, got {v}");
        assert!(v.y.abs() < 1e-12);
    }

    // =======================================================================
    // Uniform generators
    // =======================================================================

    #[test]
    fn gradient_is_constant_across_cells() {
        let g = grid();
        let mut gradient = GradientField::new(0.0, 1.0);
        for (c, r) in [(0, 0), (50, 70), (199, 149)] {
            assert_eq!(gradient.vector(&g, c, r, 0.0), DVec2::new(1.0, 0.0));
        }
    }

    #[test]
    fn gradient_pulse_changes_magnitude_over_time() {
        let g = grid();
        let mut gradient = GradientField::new(0.0, 2.0).with_pulse(PI);
        assert!((gradient.vector(&g, 0, 0, 0.0).x - 2.0).abs() < 1e-12);
        assert!((gradient.vector(&g, 0, 0, 1.0).x + 2.0).abs() < 1e-12);
    }

    #[test]
    fn random_field_redraws_each_call_but_is_seed_deterministic() {
        let g = grid();
        let mut a = RandomField::new(1.0, 5);
        let mut b = RandomField::new(1.0, 5);
        let first = a.vector(&g, 3, 3, 0.0);
        let second = a.vector(&g, 3, 3, 0.0);
        assert_ne!(first, second, "direction should be redrawn on every call");
        assert_eq!(b.vector(&g, 3, 3, 0.0), first);
        assert!((first.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn interference_axes_are_independent() {
        let g = grid();
        let mut field = InterferenceField::new(1.0, PI / 2.0, PI / 2.0, 0.0);
        let v = field.vector(&g, 1, 0, 0.0);
        assert!((v.x - 1.0).abs() < 1e-12 && v.y.abs() < 1e-12, "got {v}");
        let w = field.vector(&g, 0, 1, 0.0);
        assert!(w.x.abs() < 1e-12 && (w.y - 1.0).abs() < 1e-12, "got {w}");
    }

    // =======================================================================
    // Noise generators
    // =======================================================================

    #[test]
    fn noise_field_has_constant_magnitude() {
        let g = grid();
        let mut field = NoiseField::new(0.015, 0.5, 42);
        for i in 0..50 {
            let v = field.vector(&g, i * 3, i * 2, 0.0);
            assert!((v.length() - 0.5).abs() < 1e-12, "cell {i}: {v}");
        }
    }

    #[test]
    fn animated_noise_changes_with_time_static_does_not() {
        let g = grid();
        let mut still = NoiseField::new(0.05, 1.0, 42);
        let mut moving = NoiseField::new(0.05, 1.0, 42).with_speed(0.7);
        assert_eq!(still.vector(&g, 13, 17, 0.0), still.vector(&g, 13, 17, 5.0));
        let changed = (0..20).any(|i| {
            moving.vector(&g, 13 + i, 17, 0.0) != moving.vector(&g, 13 + i, 17, 5.3)
        });
        assert!(changed, "animated noise should move with time");
    }

    #[test]
    fn one_octave_fractal_matches_raw_simplex_heading() {
        let g = grid();
        let mut fractal = FractalNoiseField::new(0.1, 1.0, 42, 1);
        let raw = OpenSimplex::new(42).get([1.3, 0.7, 0.0]);
        let v = fractal.vector(&g, 13, 7, 0.0);
        let expected = DVec2::from_angle(noise_heading(raw));
        assert!((v - expected).length() < 1e-9, "got {v}, expected {expected}");
    }

    #[test]
    fn zero_octaves_is_raised_to_one() {
        let g = grid();
        let mut zero = FractalNoiseField::new(0.1, 1.0, 42, 0);
        let mut one = FractalNoiseField::new(0.1, 1.0, 42, 1);
        assert_eq!(zero.vector(&g, 4, 9, 0.0), one.vector(&g, 4, 9, 0.0));
    }

    #[test]
    fn noise_heading_spans_full_turn() {
        assert_eq!(noise_heading(-1.0), 0.0);
        assert!((noise_heading(1.0) - TAU).abs() < 1e-12);
        assert!((noise_heading(0.0) - PI).abs() < 1e-12);
        assert_eq!(noise_heading(-3.0), 0.0);
    }

    #[test]
    fn noise_wave_is_finite() {
        let g = grid();
        let mut field = NoiseWaveField::new(4.0, 0.001, 0.005, 0.0, 1);
        for i in 0..40 {
            assert!(field.vector(&g, i * 5, i * 3, 0.0).is_finite());
        }
    }

    // =======================================================================
    // Composite
    // =======================================================================

    #[test]
    fn empty_composite_returns_zero() {
        let g = grid();
        let mut composite = CompositeGenerator::new();
        assert!(composite.is_empty());
        assert_eq!(composite.vector(&g, 1, 2, 3.0), DVec2::ZERO);
    }

    #[test]
    fn single_generator_passes_through_unmodified() {
        let g = grid();
        // Below the magnitude floor on purpose: identity must not lift it.
        let tiny = DVec2::new(1e-4, 0.0);
        let mut composite = CompositeGenerator::new().add(Box::new(Constant(tiny)));
        assert_eq!(composite.len(), 1);
        assert_eq!(composite.vector(&g, 0, 0, 0.0), tiny);
    }

    #[test]
    fn composite_sums_contributions() {
        let g = grid();
        let mut composite = compose(vec![
            Box::new(GradientField::new(0.0, 1.0)),
            Box::new(GradientField::new(90.0, 1.0)),
        ]);
        let v = composite.vector(&g, 0, 0, 0.0);
        assert!((v - DVec2::new(1.0, 1.0)).length() < 1e-12, "got {v}");
    }

    #[test]
    fn near_cancellation_is_lifted_to_floor_along_mean_heading() {
        let g = grid();
        let mut composite = CompositeGenerator::new()
            .add(Box::new(Constant(DVec2::new(1.0, 0.0))))
            .add(Box::new(Constant(DVec2::new(-1.0, 0.001))));
        let v = composite.vector(&g, 0, 0, 0.0);
        assert!((v.length() - MIN_MAGNITUDE).abs() < 1e-12, "got {v}");
        assert!(v.y > 0.0, "mean heading points up, got {v}");
    }

    #[test]
    fn exact_cancellation_returns_base_sum() {
        let g = grid();
        let mut composite = CompositeGenerator::new()
            .add(Box::new(GradientField::new(0.0, 1.0)))
            .add(Box::new(Constant(DVec2::new(-1.0, 0.0))));
        let v = composite.vector(&g, 0, 0, 0.0);
        assert!(v.is_finite());
        assert!(v.length() < 1e-12, "degenerate heading keeps the raw sum, got {v}");
    }

    #[test]
    fn all_zero_inputs_stay_zero() {
        let g = grid();
        let mut composite = compose(vec![
            Box::new(Constant(DVec2::ZERO)),
            Box::new(Constant(DVec2::ZERO)),
        ]);
        assert_eq!(composite.vector(&g, 0, 0, 0.0), DVec2::ZERO);
    }

    #[test]
    fn composite_nests() {
        let g = grid();
        let inner = CompositeGenerator::new().add(Box::new(GradientField::new(0.0, 1.0)));
        let mut outer = CompositeGenerator::new().add(Box::new(inner));
        assert_eq!(outer.vector(&g, 0, 0, 0.0), DVec2::new(1.0, 0.0));
    }

    // =======================================================================
    // Specs
    // =======================================================================

    #[test]
    fn spec_list_parses_with_defaults() {
        let specs = GeneratorSpec::parse_list(&json!([
            {"kind": "fractal-noise", "strength": 0.5},
            {"kind": "gradient", "angle": 45},
            {"kind": "repulsor", "at": [0.2, 0.8]},
        ]))
        .unwrap();
        assert_eq!(specs.len(), 3);
        match &specs[0] {
            GeneratorSpec::FractalNoise(s) => {
                assert_eq!(s.strength, 0.5);
                assert_eq!(s.octaves, 4);
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert!(matches!(&specs[2], GeneratorSpec::Repulsor(p) if p.at == [0.2, 0.8]));
    }

    #[test]
    fn unknown_kind_is_reported_by_name() {
        let err = GeneratorSpec::parse_list(&json!([{"kind": "swirl"}])).unwrap_err();
        assert!(matches!(err, FlowError::UnknownGenerator(ref k) if k == "swirl"));
    }

    #[test]
    fn malformed_entry_is_invalid_parameter() {
        let err = GeneratorSpec::parse_list(&json!([{"kind": "gradient", "angle": "up"}]))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidParameter { .. }));
        assert!(GeneratorSpec::parse_list(&json!({"kind": "gradient"})).is_err());
        assert!(GeneratorSpec::parse_list(&json!([{"strength": 1}])).is_err());
    }

    #[test]
    fn every_listed_kind_parses() {
        for kind in GeneratorSpec::list_kinds() {
            let parsed = GeneratorSpec::parse_list(&json!([{ "kind": kind }]));
            assert!(parsed.is_ok(), "kind {kind} failed: {parsed:?}");
        }
    }

    #[test]
    fn spec_serializes_with_kind_tag() {
        let v = serde_json::to_value(GeneratorSpec::Random(RandomSpec::default())).unwrap();
        assert_eq!(v["kind"], "random");
        assert_eq!(v["strength"], 1.0);
    }

    #[test]
    fn animated_flag_tracks_time_parameters() {
        assert!(!GeneratorSpec::Gradient(GradientSpec::default()).is_animated());
        let pulsing = GeneratorSpec::Gradient(GradientSpec {
            pulse: 1.0,
            ..GradientSpec::default()
        });
        assert!(pulsing.is_animated());
        assert!(GeneratorSpec::Random(RandomSpec::default()).is_animated());
    }

    #[test]
    fn compose_specs_builds_one_layer_per_spec() {
        let g = grid();
        let specs = vec![
            GeneratorSpec::Gradient(GradientSpec::default()),
            GeneratorSpec::Gradient(GradientSpec {
                angle: 90.0,
                ..GradientSpec::default()
            }),
        ];
        let mut composite = compose_specs(&specs, &g, 42);
        assert_eq!(composite.len(), 2);
        let v = composite.vector(&g, 0, 0, 0.0);
        assert!((v - DVec2::new(1.0, 1.0)).length() < 1e-12);
    }

    #[test]
    fn noise_layers_differ_between_layers() {
        let g = grid();
        let spec = GeneratorSpec::Noise(NoiseSpec::default());
        let mut a = spec.build(&g, 42, 0);
        let mut b = spec.build(&g, 42, 1);
        let differs = (0..30).any(|i| a.vector(&g, i * 7, i * 5, 0.0) != b.vector(&g, i * 7, i * 5, 0.0));
        assert!(differs);
    }

    // =======================================================================
    // Property-based tests
    // =======================================================================

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn all_generators_return_finite_values(
                col in 0_usize..200,
                row in 0_usize..150,
                t in 0.0_f64..100.0,
            ) {
                let g = grid();
                let mut sources: Vec<Box<dyn Generator>> = vec![
                    Box::new(NoiseField::new(0.015, 1.0, 42).with_speed(0.1)),
                    Box::new(FractalNoiseField::new(0.015, 1.0, 42, 5)),
                    Box::new(NoiseWaveField::new(4.0, 0.001, 0.005, 0.0, 42)),
                    Box::new(RadialField::repulsor(&g, 400.0, 300.0, 3.0).with_growth(0.1)),
                    Box::new(RadialField::attractor(&g, -100.0, 900.0, 3.0)),
                    Box::new(RadialWaveField::new(&g, 0.0, 0.0, 1.0, PI)),
                    Box::new(DipoleField::new(&g, DVec2::new(100.0, 100.0), DVec2::new(100.0, 100.0), 1.0)),
                    Box::new(GradientField::new(33.0, 1.0).with_pulse(0.5)),
                    Box::new(RandomField::new(1.0, 7)),
                    Box::new(InterferenceField::new(1.0, 0.01, 0.02, 0.3).with_speed(0.2)),
                ];
                for (i, source) in sources.iter_mut().enumerate() {
                    let v = source.vector(&g, col, row, t);
                    prop_assert!(v.is_finite(), "generator {i} returned {v} at ({col}, {row}, {t})");
                }
            }

            #[test]
            fn composite_of_one_is_identity(
                angle in 0.0_f64..360.0,
                strength in -5.0_f64..5.0,
                col in 0_usize..200,
                row in 0_usize..150,
            ) {
                let g = grid();
                let mut direct = GradientField::new(angle, strength);
                let mut composite = compose(vec![Box::new(GradientField::new(angle, strength))]);
                prop_assert_eq!(
                    composite.vector(&g, col, row, 0.0),
                    direct.vector(&g, col, row, 0.0)
                );
            }

            #[test]
            fn composite_magnitude_respects_floor(
                a in 0.0_f64..360.0,
                b in 0.0_f64..360.0,
                sa in 0.0_f64..2.0,
                sb in 0.0_f64..2.0,
            ) {
                let g = grid();
                let mut composite = compose(vec![
                    Box::new(GradientField::new(a, sa)),
                    Box::new(GradientField::new(b, sb)),
                ]);
                let v = composite.vector(&g, 0, 0, 0.0);
                prop_assert!(v.is_finite());
                // Either the floor applied, or the mean heading was degenerate
                // (exactly opposite inputs), or there was nothing to lift.
                let opposite = ((a - b).abs() - 180.0).abs() < 1e-6;
                if sa > 1e-9 && sb > 1e-9 && !opposite {
                    prop_assert!(v.length() >= MIN_MAGNITUDE - 1e-12, "|v| = {}", v.length());
                }
            }
        }
    }
}
