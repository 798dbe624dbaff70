#![deny(unsafe_code)]
//! Core of the flowlines procedural line-art system.
//!
//! Provides the `SeededRandom` PRNG, the `VectorField` grid (static and
//! dynamic variants), the `Generator` library and its composite, the
//! `CirclePacker` that supplies line origins, a streamline tracer, and the
//! `FlowSketch` session that ties them together. Nothing here draws pixels:
//! debug overlays go through a caller-supplied `DrawSurface`.

pub mod draw;
pub mod error;
pub mod field;
pub mod field_source;
pub mod packer;
pub mod params;
pub mod prng;
pub mod seed;
pub mod sketch;
pub mod trace;

pub use draw::{DrawSurface, RecordingSurface};
pub use error::FlowError;
pub use field::{
    Dynamic, DynamicField, FieldConfig, FieldGeometry, Refresh, Static, StaticField, VectorField,
};
pub use field_source::{compose, CompositeGenerator, Generator, GeneratorSpec};
pub use packer::{Circle, CirclePacker, Movement, PackerConfig, PointQuery, Window};
pub use prng::{random_seed_from, seed_from_str, SeededRandom};
pub use seed::Seed;
pub use sketch::{FlowSketch, SessionField};
pub use trace::{trace_group, trace_line, Cluster, Polyline, SampleField, TraceConfig};
