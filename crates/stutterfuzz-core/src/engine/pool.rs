//! Fixed-capacity pool of live connections, partitioned by phase into a
//! connecting map and a sending map, both keyed by poll token.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;

use rand::Rng;

use crate::chunk::{one_in, ChunkPolicy};
use crate::config::Config;
use crate::corpus::Corpus;
use crate::net::{
    fastopen_connect, open_stream, send_chunk, start_connect, unacked_bytes, Poller,
};
use crate::stats::RunStats;

use super::conn::Conn;
use super::EngineError;

pub(super) struct Pool {
    target: SocketAddr,
    capacity: usize,
    chunk_policy: ChunkPolicy,
    fastopen_chance: u32,
    close_chance: u32,
    poller: Poller,
    connecting: HashMap<u64, Conn>,
    sending: HashMap<u64, Conn>,
    next_token: u64,
}

impl Pool {
    pub(super) fn new(target: SocketAddr, config: &Config) -> Result<Self, EngineError> {
        Ok(Self {
            target,
            capacity: config.connections,
            chunk_policy: config.chunk_policy,
            fastopen_chance: config.fastopen_chance,
            close_chance: config.close_chance,
            poller: Poller::new()?,
            connecting: HashMap::new(),
            sending: HashMap::new(),
            next_token: 0,
        })
    }

    pub(super) fn len(&self) -> usize {
        self.connecting.len() + self.sending.len()
    }

    /// Top the pool back up to capacity with fresh connections.
    pub(super) fn fill<R: Rng>(
        &mut self,
        corpus: &mut Corpus,
        rng: &mut R,
        tick: u64,
    ) -> Result<(), EngineError> {
        while self.len() < self.capacity {
            self.spawn_conn(corpus, rng, tick)?;
        }
        Ok(())
    }

    fn spawn_conn<R: Rng>(
        &mut self,
        corpus: &mut Corpus,
        rng: &mut R,
        tick: u64,
    ) -> Result<(), EngineError> {
        let blob = corpus.next_blob();
        let socket = open_stream(self.target)?;
        let mut cursor = 0;
        if !blob.is_empty() && one_in(rng, self.fastopen_chance) {
            // Prime the handshake with an initial payload; the cursor
            // advances by however much the kernel accepted into it.
            let primed = ChunkPolicy::Sqrt.plan(blob.len(), blob.len(), rng);
            cursor = fastopen_connect(&socket, self.target, &blob.bytes()[..primed])?;
        } else {
            start_connect(&socket, self.target)?;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.poller.watch_writable(socket.as_raw_fd(), token)?;
        tracing::debug!(
            token,
            blob = %blob.path().display(),
            primed = cursor,
            "connection opened"
        );
        self.connecting.insert(token, Conn::new(socket, blob, cursor, tick));
        Ok(())
    }

    /// Advance every sending connection one step: gate on unacknowledged
    /// bytes, roll the early-close policy, then push one planned chunk.
    /// Connections drop out of the map when they finish, error, or lose
    /// the close roll.
    pub(super) fn tick_senders<R: Rng>(&mut self, rng: &mut R, stats: &mut RunStats) {
        let policy = self.chunk_policy;
        let close_chance = self.close_chance;
        self.sending.retain(|&token, conn| {
            match unacked_bytes(&conn.socket) {
                Ok(0) => stats.note_send_ready(),
                Ok(_) => {
                    // Prior bytes still in flight; stuttering here would be
                    // the kernel's doing, not ours.
                    stats.note_send_blocked();
                    return true;
                }
                Err(err) => {
                    tracing::debug!(token, %err, "backpressure probe failed, dropping");
                    return false;
                }
            }
            if conn.remaining() == 0 {
                tracing::debug!(token, sent = conn.cursor, "blob fully streamed");
                return false;
            }
            if one_in(rng, close_chance) {
                tracing::debug!(token, sent = conn.cursor, "random early close");
                return false;
            }
            let want = policy.plan(conn.blob.len(), conn.remaining(), rng);
            let chunk = &conn.blob.bytes()[conn.cursor..conn.cursor + want];
            match send_chunk(&conn.socket, chunk) {
                Ok(sent) if sent == want => {
                    conn.cursor += sent;
                    conn.remaining() > 0
                }
                Ok(sent) => {
                    tracing::debug!(token, want, sent, "short send, dropping");
                    false
                }
                Err(err) => {
                    tracing::debug!(token, %err, "send failed, dropping");
                    false
                }
            }
        });
    }

    /// Collect writability notifications for in-progress connects. A socket
    /// that reports a real error here means the target itself is rejecting
    /// us, which ends the run.
    pub(super) fn reap_connects(
        &mut self,
        stats: &mut RunStats,
        tick: u64,
    ) -> Result<(), EngineError> {
        for token in self.poller.ready_tokens(self.capacity)? {
            let conn = match self.connecting.remove(&token) {
                Some(conn) => conn,
                None => continue,
            };
            if let Some(err) = conn.socket.take_error()? {
                tracing::error!(token, %err, "target rejected connection");
                return Err(EngineError::TargetConnect(err));
            }
            // Connect completion is a one-shot interest; sends are gated by
            // the unacked probe instead.
            self.poller.unwatch(conn.socket.as_raw_fd())?;
            let elapsed = tick - conn.start_tick;
            stats.observe_connect(elapsed);
            tracing::debug!(token, ticks = elapsed, "connected");
            self.sending.insert(token, conn);
        }
        Ok(())
    }

    /// Close everything. Dropping a connection closes its socket.
    pub(super) fn drain(&mut self) {
        self.connecting.clear();
        self.sending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use socket2::{Domain, Socket, Type};
    use std::fs;
    use std::io::Read;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn corpus_of(contents: &[u8]) -> (TempDir, Corpus) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("blob.bin"), contents).unwrap();
        let corpus = Corpus::load(dir.path()).unwrap();
        (dir, corpus)
    }

    fn test_config(connections: usize, close_chance: u32) -> Config {
        Config {
            blob_dir: PathBuf::new(),
            host: "127.0.0.1".into(),
            port: 0,
            connections,
            tick_ms: 5,
            fastopen_chance: 0,
            close_chance,
            chunk_policy: ChunkPolicy::Uniform,
            seed: Some(99),
        }
    }

    fn reap_until_sending(
        pool: &mut Pool,
        stats: &mut RunStats,
        tick: &mut u64,
        want: usize,
    ) {
        for _ in 0..200 {
            *tick += 1;
            pool.reap_connects(stats, *tick).unwrap();
            if pool.sending.len() >= want {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("only {} of {want} connects completed", pool.sending.len());
    }

    #[test]
    fn fill_tops_up_to_capacity() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_dir, mut corpus) = corpus_of(b"payload");
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = Pool::new(listener.local_addr().unwrap(), &test_config(8, 0)).unwrap();
        pool.fill(&mut corpus, &mut rng, 1).unwrap();
        assert_eq!(pool.len(), 8);
        assert_eq!(pool.connecting.len(), 8);
    }

    #[test]
    fn reap_moves_completed_connects_to_sending() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_dir, mut corpus) = corpus_of(b"payload");
        let mut rng = StdRng::seed_from_u64(2);
        let mut stats = RunStats::new();
        let mut pool = Pool::new(listener.local_addr().unwrap(), &test_config(2, 0)).unwrap();
        pool.fill(&mut corpus, &mut rng, 1).unwrap();
        let mut tick = 1;
        reap_until_sending(&mut pool, &mut stats, &mut tick, 2);
        assert_eq!(pool.sending.len(), 2);
        assert_eq!(pool.connecting.len(), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn always_close_empties_senders_on_first_ready_tick() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_dir, mut corpus) = corpus_of(&[7u8; 65536]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut stats = RunStats::new();
        let mut pool = Pool::new(listener.local_addr().unwrap(), &test_config(4, 1)).unwrap();
        pool.fill(&mut corpus, &mut rng, 1).unwrap();
        let mut tick = 1;
        reap_until_sending(&mut pool, &mut stats, &mut tick, 4);
        pool.tick_senders(&mut rng, &mut stats);
        assert!(pool.sending.is_empty());
        assert_eq!(stats.send_ready(), 4);
    }

    #[test]
    fn full_blob_send_closes_connection_after_exactly_its_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            loop {
                match peer.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        counter.fetch_add(n, Ordering::Relaxed);
                    }
                }
            }
        });
        let (_dir, mut corpus) = corpus_of(b"ping");
        let mut rng = StdRng::seed_from_u64(4);
        let mut stats = RunStats::new();
        let mut pool = Pool::new(addr, &test_config(1, 0)).unwrap();
        let mut tick = 0;
        pool.fill(&mut corpus, &mut rng, tick).unwrap();
        for _ in 0..400 {
            tick += 1;
            pool.tick_senders(&mut rng, &mut stats);
            pool.reap_connects(&mut stats, tick).unwrap();
            if pool.len() == 0 && received.load(Ordering::Relaxed) == 4 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.len(), 0);
        assert_eq!(received.load(Ordering::Relaxed), 4);
        assert!(stats.send_ready() >= 1);
    }

    #[test]
    fn probe_failure_drops_connection() {
        let (_dir, mut corpus) = corpus_of(b"payload");
        let mut rng = StdRng::seed_from_u64(5);
        let mut stats = RunStats::new();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut pool = Pool::new(listener.local_addr().unwrap(), &test_config(1, 0)).unwrap();
        // A datagram socket rejects the TCP_INFO query outright.
        let udp = Socket::new(Domain::IPV4, Type::DGRAM, None).unwrap();
        pool.sending.insert(0, Conn::new(udp, corpus.next_blob(), 0, 1));
        pool.tick_senders(&mut rng, &mut stats);
        assert!(pool.sending.is_empty());
        assert_eq!(stats.send_ready(), 0);
        assert_eq!(stats.send_blocked(), 0);
    }

    #[test]
    fn empty_blob_closes_without_sending() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_dir, mut corpus) = corpus_of(b"");
        let mut rng = StdRng::seed_from_u64(6);
        let mut stats = RunStats::new();
        let mut pool = Pool::new(listener.local_addr().unwrap(), &test_config(1, 0)).unwrap();
        pool.fill(&mut corpus, &mut rng, 1).unwrap();
        let mut tick = 1;
        reap_until_sending(&mut pool, &mut stats, &mut tick, 1);
        pool.tick_senders(&mut rng, &mut stats);
        assert!(pool.sending.is_empty());
        assert_eq!(stats.send_ready(), 1);
    }

    #[test]
    fn drain_closes_everything() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (_dir, mut corpus) = corpus_of(b"payload");
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = Pool::new(listener.local_addr().unwrap(), &test_config(3, 0)).unwrap();
        pool.fill(&mut corpus, &mut rng, 1).unwrap();
        pool.drain();
        assert_eq!(pool.len(), 0);
    }
}
