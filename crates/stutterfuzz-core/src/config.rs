use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chunk::ChunkPolicy;

/// Tuning profile loaded from `~/.config/stutterfuzz/config.toml`.
/// Run identity (blob directory, host, port) always comes from the command
/// line; the profile only carries knobs worth keeping between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Number of concurrent connections the pool maintains.
    pub connections: usize,
    /// Scheduler tick period in milliseconds.
    pub tick_ms: u64,
    /// Fast-open priming chance as "1 in N"; 0 disables priming.
    pub fastopen_chance: u32,
    /// Early-close chance per send-ready tick as "1 in N"; 0 disables closes.
    pub close_chance: u32,
    /// Chunk-size distribution for per-tick sends.
    #[serde(default)]
    pub chunk_policy: ChunkPolicy,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            connections: 100,
            tick_ms: 50,
            fastopen_chance: 4,
            close_chance: 50,
            chunk_policy: ChunkPolicy::Uniform,
        }
    }
}

pub fn profile_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("stutterfuzz")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load the profile from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<Profile> {
    let path = profile_path()?;
    if !path.exists() {
        let default_profile = Profile::default();
        let toml = toml::to_string_pretty(&default_profile)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default profile at {}", path.display());
        return Ok(default_profile);
    }
    load_at(&path)
}

/// Load the profile from an explicit path (no default-file creation).
pub fn load_at(path: &Path) -> Result<Profile> {
    let data = fs::read_to_string(path)?;
    Ok(toml::from_str(&data)?)
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("connections must be at least 1")]
    ZeroConnections,
    #[error("tick period must be at least 1 ms")]
    ZeroTick,
}

/// Validated runtime configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub blob_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub connections: usize,
    pub tick_ms: u64,
    pub fastopen_chance: u32,
    pub close_chance: u32,
    pub chunk_policy: ChunkPolicy,
    /// Fixed RNG seed for reproducible runs; None draws from entropy.
    pub seed: Option<u64>,
}

impl Config {
    /// Combine command-line run identity with a tuning profile.
    pub fn from_profile(blob_dir: PathBuf, host: String, port: u16, profile: &Profile) -> Self {
        Self {
            blob_dir,
            host,
            port,
            connections: profile.connections,
            tick_ms: profile.tick_ms,
            fastopen_chance: profile.fastopen_chance,
            close_chance: profile.close_chance,
            chunk_policy: profile.chunk_policy,
            seed: None,
        }
    }

    /// Check value ranges once, before the engine starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}
