//! Reproducible description of a flow-line session.
//!
//! A [`Seed`] is everything a host needs to rebuild a piece exactly: canvas
//! size, numeric seed, parameter overrides and how many ticks were run.
//! When the numeric seed came from a phrase the phrase is kept alongside it.

use crate::error::FlowError;
use crate::prng::seed_from_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    pub width: usize,
    pub height: usize,
    pub seed: u64,
    /// Phrase the seed was hashed from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    /// Overrides read by the session's config types.
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default)]
    pub ticks: usize,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

impl Seed {
    /// A seed with no overrides and no ticks run.
    pub fn new(width: usize, height: usize, seed: u64) -> Self {
        Self {
            width,
            height,
            seed,
            phrase: None,
            params: empty_params(),
            ticks: 0,
        }
    }

    /// Hashes `phrase` with [`seed_from_str`] and remembers it.
    pub fn from_phrase(width: usize, height: usize, phrase: &str) -> Self {
        Self {
            phrase: Some(phrase.to_string()),
            ..Self::new(width, height, seed_from_str(phrase))
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_ticks(mut self, ticks: usize) -> Self {
        self.ticks = ticks;
        self
    }

    /// Rejects empty or overflowing canvases and non-object params.
    pub fn validate(&self) -> Result<(), FlowError> {
        let area = self.width.checked_mul(self.height);
        if matches!(area, None | Some(0)) {
            return Err(FlowError::InvalidDimensions);
        }
        if !self.params.is_object() {
            return Err(FlowError::invalid("params", "must be a JSON object"));
        }
        Ok(())
    }
}
