//! Non-blocking socket and readiness plumbing for the engine.

mod poller;
mod socket;

pub use poller::Poller;
pub use socket::{
    fastopen_connect, open_stream, resolve, send_chunk, start_connect, unacked_bytes,
};
