//! Connection lifecycle engine: the pool, the per-connection state
//! machine, and the fixed-tick scheduler that drives them.

use std::io;

use thiserror::Error;

mod conn;
mod pool;
mod run;

pub use run::{Engine, RunSummary};

/// Fatal engine failures. A target that actively rejects connections ends
/// the run; per-connection send hiccups do not.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("connect to target failed: {0}")]
    TargetConnect(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
