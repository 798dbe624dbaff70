//! CLI failures and the exit codes they map to.
//!
//! | code | cause |
//! | ---- | ----- |
//! | 0    | success |
//! | 2    | argument parsing (raised by clap before `run`) |
//! | 10   | the core rejected a canvas, config or generator list |
//! | 11   | the output file could not be written |
//! | 12   | `--params` was not a JSON object |
//! | 13   | the result could not be serialized |

use flowlines_core::FlowError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed `--params`.
    #[error("{0}")]
    Input(String),

    #[error("could not serialize result: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Flow(_) => 10,
            CliError::Write { .. } => 11,
            CliError::Input(_) => 12,
            CliError::Serialization(_) => 13,
        }
    }
}
