//! CLI for the stutterfuzz TCP connection-churn harness.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use stutterfuzz_core::chunk::ChunkPolicy;
use stutterfuzz_core::config::{self, Config};
use stutterfuzz_core::control::ShutdownFlag;
use stutterfuzz_core::corpus::Corpus;
use stutterfuzz_core::engine::{Engine, RunSummary};

/// Top-level CLI for the stutterfuzz harness.
#[derive(Debug, Parser)]
#[command(name = "stutterfuzz")]
#[command(about = "stutterfuzz: TCP connection-churn stress harness", long_about = None)]
pub struct Cli {
    /// Directory whose files are streamed to the target.
    #[arg(long, value_name = "PATH")]
    pub blob_dir: PathBuf,

    /// Target host name or address.
    #[arg(long)]
    pub host: String,

    /// Target TCP port.
    #[arg(long)]
    pub port: u16,

    /// Concurrent connections to hold open (overrides the profile).
    #[arg(long, value_name = "N")]
    pub num_conns: Option<usize>,

    /// Tick period in milliseconds (overrides the profile).
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Prime 1 in N connects with a fast-open payload; 0 disables (overrides the profile).
    #[arg(long, value_name = "N")]
    pub fastopen_chance: Option<u32>,

    /// Tear down 1 in N send-ready connections early; 0 disables (overrides the profile).
    #[arg(long, value_name = "N")]
    pub close_chance: Option<u32>,

    /// Chunk-size distribution: uniform or sqrt (overrides the profile).
    #[arg(long, value_name = "POLICY")]
    pub chunk_policy: Option<ChunkPolicy>,

    /// Seed the random source for reproducible runs.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Load the tuning profile from PATH instead of the XDG config dir.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        Cli::parse().run().await
    }

    async fn run(self) -> Result<()> {
        let profile = match &self.config {
            Some(path) => config::load_at(path)
                .with_context(|| format!("cannot load profile {}", path.display()))?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded profile: {:?}", profile);

        let mut config =
            Config::from_profile(self.blob_dir.clone(), self.host.clone(), self.port, &profile);
        self.apply_overrides(&mut config);
        config.validate()?;

        let corpus = Corpus::load(&config.blob_dir)?;
        let shutdown = ShutdownFlag::new();
        spawn_signal_watchers(shutdown.clone());

        // The engine is synchronous by design; park it on a blocking thread
        // and keep the runtime free for the signal watchers.
        let mut engine = Engine::new(&config, corpus, shutdown)?;
        let summary = tokio::task::spawn_blocking(move || engine.run())
            .await
            .context("engine thread panicked")??;
        print_summary(&summary);
        Ok(())
    }

    /// Flags beat profile values; unset flags leave the profile alone.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(n) = self.num_conns {
            config.connections = n;
        }
        if let Some(ms) = self.tick_ms {
            config.tick_ms = ms;
        }
        if let Some(n) = self.fastopen_chance {
            config.fastopen_chance = n;
        }
        if let Some(n) = self.close_chance {
            config.close_chance = n;
        }
        if let Some(policy) = self.chunk_policy {
            config.chunk_policy = policy;
        }
        config.seed = self.seed;
    }
}

fn spawn_signal_watchers(shutdown: ShutdownFlag) {
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            flag.request();
        }
    });
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                if term.recv().await.is_some() {
                    tracing::info!("termination requested, shutting down");
                    shutdown.request();
                }
            }
            Err(err) => tracing::warn!(%err, "cannot watch SIGTERM"),
        }
    });
}

fn print_summary(summary: &RunSummary) {
    let ready_ratio = summary
        .stats
        .ready_ratio()
        .map(|r| format!("{r:.3}"))
        .unwrap_or_else(|| "n/a".into());
    println!(
        "laps={} ticks={} mean_connect_ticks={:.2} send_ready={} send_blocked={} ready_ratio={}",
        summary.laps,
        summary.ticks,
        summary.stats.mean_connect_ticks(),
        summary.stats.send_ready(),
        summary.stats.send_blocked(),
        ready_ratio
    );
}

#[cfg(test)]
mod tests;
