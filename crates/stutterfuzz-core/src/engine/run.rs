//! Fixed-tick scheduler: drives the pool until shutdown is requested or
//! the target turns fatal.

use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;
use crate::control::ShutdownFlag;
use crate::corpus::Corpus;
use crate::net::resolve;
use crate::stats::RunStats;

use super::pool::Pool;
use super::EngineError;

/// Progress line cadence, in corpus laps.
const REPORT_EVERY_LAPS: u64 = 100;

/// Counters handed back once the loop has drained.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStats,
    pub laps: u64,
    pub ticks: u64,
}

/// The churn engine: one pool, one corpus, one tick loop.
pub struct Engine {
    pool: Pool,
    corpus: Corpus,
    stats: RunStats,
    rng: StdRng,
    tick_period: Duration,
    shutdown: ShutdownFlag,
    tick: u64,
    last_report_lap: u64,
}

impl Engine {
    /// Resolve the target once and set up the pool. Resolution failure is
    /// a startup error; nothing has been opened yet.
    pub fn new(
        config: &Config,
        corpus: Corpus,
        shutdown: ShutdownFlag,
    ) -> Result<Self, EngineError> {
        let target = resolve(&config.host, config.port).map_err(|source| EngineError::Resolve {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;
        tracing::info!(%target, "target resolved");
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            pool: Pool::new(target, config)?,
            corpus,
            stats: RunStats::new(),
            rng,
            tick_period: Duration::from_millis(config.tick_ms),
            shutdown,
            tick: 0,
            last_report_lap: 0,
        })
    }

    /// Tick until the shutdown flag is raised or a run-level error occurs.
    /// The pool is drained on every exit path.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        let outcome = self.run_loop();
        self.pool.drain();
        outcome?;
        Ok(RunSummary {
            stats: self.stats.clone(),
            laps: self.corpus.laps(),
            ticks: self.tick,
        })
    }

    fn run_loop(&mut self) -> Result<(), EngineError> {
        while !self.shutdown.is_requested() {
            self.tick += 1;
            self.pool.tick_senders(&mut self.rng, &mut self.stats);
            self.pool.reap_connects(&mut self.stats, self.tick)?;
            self.pool.fill(&mut self.corpus, &mut self.rng, self.tick)?;
            self.maybe_report();
            // Full-period sleep; tick drift under load is acceptable.
            thread::sleep(self.tick_period);
        }
        tracing::info!(ticks = self.tick, "shutdown requested, draining pool");
        Ok(())
    }

    fn maybe_report(&mut self) {
        let laps = self.corpus.laps();
        if laps >= self.last_report_lap + REPORT_EVERY_LAPS {
            self.last_report_lap = laps;
            tracing::info!(
                laps,
                mean_connect_ticks = self.stats.mean_connect_ticks(),
                ready_ratio = ?self.stats.ready_ratio(),
                "progress"
            );
        }
    }
}
