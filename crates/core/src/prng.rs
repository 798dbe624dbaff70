//! Deterministic PRNG based on a two-lane multiply-with-carry generator.
//!
//! [`SeededRandom`] is the only source of randomness inside the field and
//! packer. Once seeded, every draw is a pure function of the previous state,
//! so the same seed always reproduces the same artwork. The core step is
//! pure 32-bit integer arithmetic; floats only appear in the final scaling.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on rejection rounds in [`SeededRandom::gaussian_sample`].
///
/// A draw lands outside [0, 1] with probability ~1.5e-23 per round, so the
/// cap is never reached in practice; it only guarantees termination.
pub const GAUSSIAN_MAX_RETRIES: usize = 64;

/// Lane offsets applied to the seed when building the generator state.
const W_OFFSET: u32 = 123_456_789;
const Z_OFFSET: u32 = 987_654_321;

/// Two-lane multiply-with-carry PRNG. Same seed, same sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeededRandom {
    seed: u64,
    m_w: u32,
    m_z: u32,
}

impl SeededRandom {
    /// Creates a generator from `seed`. Only the low 32 bits affect the state.
    pub fn new(seed: u64) -> Self {
        let s = seed as u32;
        Self {
            seed,
            m_w: W_OFFSET.wrapping_add(s),
            m_z: Z_OFFSET.wrapping_sub(s),
        }
    }

    /// Creates a generator seeded from the wall clock (milliseconds since the
    /// Unix epoch).
    pub fn from_clock() -> Self {
        Self::new(clock_millis())
    }

    /// Seeds from `seed`, or from the wall clock when `None`.
    pub fn seeded(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_clock, Self::new)
    }

    /// The seed this generator was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Advances both lanes and returns the next 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        self.m_z = 36_969 * (self.m_z & 0xffff) + (self.m_z >> 16);
        self.m_w = 18_000 * (self.m_w & 0xffff) + (self.m_w >> 16);
        (self.m_z << 16).wrapping_add(self.m_w & 0xffff)
    }

    /// Returns a uniformly distributed f64 in [0, 1).
    pub fn random(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// Linear remap of [`random`](Self::random) onto [from, to).
    pub fn range(&mut self, from: f64, to: f64) -> f64 {
        from + (to - from) * self.random()
    }

    /// Returns an index in [0, len). `len` must be non-zero.
    pub fn range_usize(&mut self, len: usize) -> usize {
        ((self.random() * len as f64) as usize).min(len.saturating_sub(1))
    }

    /// Picks a uniformly random element, or `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.range_usize(items.len());
        items.get(idx)
    }

    /// Fisher-Yates shuffle into a new vector; `items` is left untouched.
    pub fn shuffle<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut result = items.to_vec();
        for i in (1..result.len()).rev() {
            let j = self.range_usize(i + 1);
            result.swap(i, j);
        }
        result
    }

    /// Bell-shaped sample in [0, 1] centred on 0.5 with spread ~0.1.
    ///
    /// Box-Muller transform of two uniform draws, rescaled and rejected when
    /// it falls outside [0, 1]. Rejection is bounded by
    /// [`GAUSSIAN_MAX_RETRIES`]; on exhaustion the last candidate is clamped.
    pub fn gaussian_sample(&mut self) -> f64 {
        let mut candidate = 0.5;
        for _ in 0..GAUSSIAN_MAX_RETRIES {
            let u = self.random();
            let v = self.random();
            // ln(0) is -inf; redraw instead.
            if u == 0.0 {
                continue;
            }
            candidate = (-2.0 * u.ln()).sqrt() * (TAU * v).cos() / 10.0 + 0.5;
            if (0.0..=1.0).contains(&candidate) {
                return candidate;
            }
        }
        tracing::warn!(
            seed = self.seed,
            candidate,
            "gaussian rejection cap reached, clamping"
        );
        candidate.clamp(0.0, 1.0)
    }
}

/// Hashes a string into a 16-bit seed.
///
/// Runs `hash = hash * 31 + unit` over the UTF-16 code units with 32-bit
/// wrapping and keeps the low 16 bits. The empty string hashes to 0.
pub fn seed_from_str(s: &str) -> u64 {
    let hash = s
        .encode_utf16()
        .fold(0_i32, |hash, unit| {
            (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
        });
    u64::from(hash as u32 & 0xffff)
}

/// Seed from a non-empty string, or fresh wall-clock entropy otherwise.
pub fn random_seed_from(s: Option<&str>) -> u64 {
    match s {
        Some(text) if !text.is_empty() => seed_from_str(text),
        _ => clock_millis(),
    }
}

fn clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Golden values --

    #[test]
    fn next_u32_produces_known_golden_values_for_seed_42() {
        // If this breaks, the generator changed and every saved seed renders
        // a different piece.
        let mut rng = SeededRandom::new(42);
        assert_eq!(rng.next_u32(), 171_795_723);
        assert_eq!(rng.next_u32(), 3_187_461_583);
        assert_eq!(rng.next_u32(), 2_988_574_320);
    }

    #[test]
    fn random_matches_golden_value_for_seed_zero() {
        let mut rng = SeededRandom::new(0);
        let v = rng.random();
        assert!((v - 0.732_297_654_030_844_6).abs() < 1e-15, "got {v}");
    }

    // -- Determinism --

    #[test]
    fn two_instances_with_same_seed_produce_identical_sequences() {
        let mut a = SeededRandom::new(1234);
        let mut b = SeededRandom::new(1234);
        for i in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32(), "diverged at index {i}");
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SeededRandom::new(1);
        let mut b = SeededRandom::new(2);
        let same = (0..32).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 32, "seeds 1 and 2 produced identical streams");
    }

    #[test]
    fn seeded_some_matches_new() {
        let mut a = SeededRandom::seeded(Some(77));
        let mut b = SeededRandom::new(77);
        assert_eq!(a.seed(), 77);
        assert_eq!(a.next_u32(), b.next_u32());
    }

    // -- Derived draws --

    #[test]
    fn random_always_in_unit_interval() {
        let mut rng = SeededRandom::new(12345);
        for i in 0..10_000 {
            let v = rng.random();
            assert!((0.0..1.0).contains(&v), "random() = {v} at iteration {i}");
        }
    }

    #[test]
    fn range_stays_within_bounds() {
        let mut rng = SeededRandom::new(9999);
        for _ in 0..10_000 {
            let v = rng.range(10.0, 20.0);
            assert!((10.0..20.0).contains(&v), "range(10, 20) = {v}");
        }
    }

    #[test]
    fn choose_on_empty_slice_is_none() {
        let mut rng = SeededRandom::new(3);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
    }

    #[test]
    fn choose_returns_member() {
        let mut rng = SeededRandom::new(3);
        let items = [10, 20, 30];
        for _ in 0..100 {
            let picked = rng.choose(&items).copied();
            assert!(matches!(picked, Some(10 | 20 | 30)));
        }
    }

    #[test]
    fn shuffle_is_a_permutation_and_leaves_input_intact() {
        let mut rng = SeededRandom::new(5);
        let items: Vec<u32> = (0..50).collect();
        let shuffled = rng.shuffle(&items);
        assert_eq!(items, (0..50).collect::<Vec<_>>());
        let mut sorted = shuffled.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, items);
        assert_ne!(shuffled, items, "50 elements should not shuffle to identity");
    }

    #[test]
    fn gaussian_sample_clusters_around_half() {
        let mut rng = SeededRandom::new(8);
        let n = 5000;
        let samples: Vec<f64> = (0..n).map(|_| rng.gaussian_sample()).collect();
        assert!(samples.iter().all(|v| (0.0..=1.0).contains(v)));
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 0.5).abs() < 0.01, "mean {mean}");
        assert!((var.sqrt() - 0.1).abs() < 0.01, "std dev {}", var.sqrt());
    }

    // -- String seeds --

    #[test]
    fn seed_from_empty_string_is_zero() {
        assert_eq!(seed_from_str(""), 0);
    }

    #[test]
    fn seed_from_str_matches_known_hash() {
        // "a" = 97; "ab" = 97 * 31 + 98 = 3105.
        assert_eq!(seed_from_str("a"), 97);
        assert_eq!(seed_from_str("ab"), 3105);
    }

    #[test]
    fn seed_from_str_fits_sixteen_bits() {
        let s = seed_from_str("a considerably longer seed phrase for a sketch");
        assert!(s <= 0xffff);
    }

    #[test]
    fn random_seed_from_hashes_non_empty_text() {
        assert_eq!(random_seed_from(Some("ab")), 3105);
    }

    // -- Serialization --

    #[test]
    fn serialization_roundtrip_preserves_state() {
        let mut rng = SeededRandom::new(42);
        for _ in 0..50 {
            rng.next_u32();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: SeededRandom = serde_json::from_str(&json).unwrap();
        for i in 0..100 {
            assert_eq!(rng.next_u32(), restored.next_u32(), "diverged at {i}");
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn same_seed_same_sequence(seed: u64) {
                let mut a = SeededRandom::new(seed);
                let mut b = SeededRandom::new(seed);
                let items = [1, 2, 3, 4, 5, 6, 7];
                for _ in 0..100 {
                    prop_assert_eq!(a.random().to_bits(), b.random().to_bits());
                    prop_assert_eq!(a.range(-3.0, 9.0).to_bits(), b.range(-3.0, 9.0).to_bits());
                    prop_assert_eq!(a.choose(&items), b.choose(&items));
                }
            }

            #[test]
            fn random_in_unit_interval_for_any_seed(seed: u64) {
                let mut rng = SeededRandom::new(seed);
                for _ in 0..100 {
                    let v = rng.random();
                    prop_assert!((0.0..1.0).contains(&v), "random() = {v} for seed {seed}");
                }
            }

            #[test]
            fn range_usize_below_len(seed: u64, len in 1_usize..10_000) {
                let mut rng = SeededRandom::new(seed);
                for _ in 0..100 {
                    prop_assert!(rng.range_usize(len) < len);
                }
            }

            #[test]
            fn gaussian_in_unit_interval_for_any_seed(seed: u64) {
                let mut rng = SeededRandom::new(seed);
                for _ in 0..50 {
                    let v = rng.gaussian_sample();
                    prop_assert!((0.0..=1.0).contains(&v));
                }
            }
        }
    }
}
