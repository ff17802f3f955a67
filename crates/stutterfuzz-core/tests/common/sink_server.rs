//! Minimal TCP sink for integration tests: accepts every connection,
//! drains it, and records how many bytes each one delivered.

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct SinkHandle {
    counts: Arc<Mutex<Vec<usize>>>,
}

impl SinkHandle {
    /// Byte totals of connections drained to EOF so far.
    pub fn completed(&self) -> Vec<usize> {
        self.counts.lock().unwrap().clone()
    }
}

/// Bind a sink on an ephemeral loopback port and serve it from a
/// background thread for the remainder of the test process.
pub fn start() -> (SocketAddr, SinkHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind sink");
    let addr = listener.local_addr().expect("sink addr");
    let handle = SinkHandle::default();
    let counts = Arc::clone(&handle.counts);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let counts = Arc::clone(&counts);
            thread::spawn(move || drain(stream, counts));
        }
    });
    (addr, handle)
}

fn drain(mut stream: TcpStream, counts: Arc<Mutex<Vec<usize>>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut total = 0usize;
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            // A reset or timeout leaves the connection unrecorded.
            Err(_) => return,
        }
    }
    counts.lock().unwrap().push(total);
}
