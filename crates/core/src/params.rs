//! Lenient lookups into a JSON parameter object.
//!
//! Config types read their overrides through these. A missing key, a value
//! of the wrong JSON type, or a non-object `params` all yield the caller's
//! default, so a partially valid parameter blob still produces a usable
//! config. Range checks happen later, in each config's `validate`.

use serde_json::Value;

fn lookup<T>(params: &Value, name: &str, read: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
    params.get(name).and_then(read)
}

/// Any JSON number as `f64`; integers included.
pub fn param_f64(params: &Value, name: &str, default: f64) -> f64 {
    lookup(params, name, Value::as_f64).unwrap_or(default)
}

/// A non-negative JSON integer. Floats and negatives fall back to `default`.
pub fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    lookup(params, name, Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

pub fn param_bool(params: &Value, name: &str, default: bool) -> bool {
    lookup(params, name, Value::as_bool).unwrap_or(default)
}

/// A `[min, max]` pair from a two-element numeric array.
///
/// Ordering is not checked here.
pub fn param_pair(params: &Value, name: &str, default: [f64; 2]) -> [f64; 2] {
    lookup(params, name, |v| match v.as_array()?.as_slice() {
        [a, b] => Some([a.as_f64()?, b.as_f64()?]),
        _ => None,
    })
    .unwrap_or(default)
}
