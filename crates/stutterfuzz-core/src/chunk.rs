//! Chunk planning: how many bytes to push into one send attempt.
//!
//! Two selectable distributions, both pure functions of the blob length, the
//! bytes remaining, and an injected random source. Neither returns 0 while
//! bytes remain, and neither exceeds the remaining count.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Chunk-size distribution for per-tick sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPolicy {
    /// Draw over the full blob length, clamp to what is left. Near the end
    /// of a blob this often clamps to "send everything left", which is the
    /// bursty tail behavior the harness wants.
    #[default]
    Uniform,
    /// Reflected square-root draw over what is left; denser toward 1 byte,
    /// so most attempts dribble while a few send large pieces.
    Sqrt,
}

impl ChunkPolicy {
    /// Plan the next chunk size. Returns 0 only when `remaining` is 0.
    pub fn plan<R: Rng>(self, blob_len: usize, remaining: usize, rng: &mut R) -> usize {
        debug_assert!(remaining <= blob_len);
        if remaining == 0 {
            return 0;
        }
        match self {
            ChunkPolicy::Uniform => {
                let draw = rng.gen_range(0..blob_len);
                draw.min(remaining).max(1)
            }
            ChunkPolicy::Sqrt => {
                let span = remaining as u128 * remaining as u128;
                let draw = rng.gen_range(0..span);
                remaining - draw.isqrt() as usize
            }
        }
    }
}

impl std::str::FromStr for ChunkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(ChunkPolicy::Uniform),
            "sqrt" => Ok(ChunkPolicy::Sqrt),
            other => Err(format!(
                "unknown chunk policy '{other}' (expected 'uniform' or 'sqrt')"
            )),
        }
    }
}

/// One-in-`n` random decision; `n == 0` never fires, `n == 1` always fires.
pub fn one_in<R: Rng>(rng: &mut R, n: u32) -> bool {
    n != 0 && rng.gen_range(0..n) == 0
}
