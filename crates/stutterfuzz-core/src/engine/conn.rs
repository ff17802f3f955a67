//! A single outbound connection streaming one corpus blob.

use std::sync::Arc;

use socket2::Socket;

use crate::corpus::Blob;

/// One connection and its stream progress. Which phase it is in
/// (connecting or sending) is encoded by the pool map holding it.
#[derive(Debug)]
pub(super) struct Conn {
    pub(super) socket: Socket,
    pub(super) blob: Arc<Blob>,
    pub(super) cursor: usize,
    pub(super) start_tick: u64,
}

impl Conn {
    pub(super) fn new(socket: Socket, blob: Arc<Blob>, cursor: usize, start_tick: u64) -> Self {
        Self {
            socket,
            blob,
            cursor,
            start_tick,
        }
    }

    /// Bytes of the blob not yet handed to the kernel.
    pub(super) fn remaining(&self) -> usize {
        self.blob.len() - self.cursor
    }
}
