use crate::conn::Connector;
use crate::error::Error;

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Default)]
struct Shared {
    // waiting to be read by the current connection
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    current: usize,
    dead: Vec<usize>,
    attempts: usize,
    fail_connects: usize,
    fail_writes: usize,
    connect_delay: Duration,
}

/// An in-memory server. Every connect makes a new stream, and only the
/// latest stream sees pushed lines.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a line (terminator added) for the current connection to read.
    pub fn push(&self, line: &str) {
        let mut shared = self.shared.lock();
        shared.inbound.extend(line.as_bytes());
        shared.inbound.extend(b"\r\n");
    }

    /// Queues raw bytes with no terminator, like half of a line arriving
    /// in one packet.
    pub fn push_partial(&self, data: &str) {
        self.shared.lock().inbound.extend(data.as_bytes());
    }

    /// Bytes the current connection hasn't read yet.
    pub fn unread(&self) -> usize {
        self.shared.lock().inbound.len()
    }

    /// Every line written so far, across all connections.
    pub fn written(&self) -> Vec<String> {
        let shared = self.shared.lock();
        String::from_utf8_lossy(&shared.written)
            .split_terminator("\r\n")
            .map(ToString::to_string)
            .collect()
    }

    pub fn fail_connects(&self, n: usize) {
        self.shared.lock().fail_connects = n;
    }

    /// The next `n` writes fail, and each failure kills its connection.
    pub fn fail_writes(&self, n: usize) {
        self.shared.lock().fail_writes = n;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.shared.lock().connect_delay = delay;
    }

    /// Makes the current connection look closed by the server.
    pub fn hang_up(&self) {
        let mut shared = self.shared.lock();
        let current = shared.current;
        shared.dead.push(current);
    }

    /// Successful connects.
    pub fn connects(&self) -> usize {
        self.shared.lock().current
    }

    /// All connect attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.shared.lock().attempts
    }
}

impl Connector for MockConnector {
    type Stream = MockStream;

    fn connect(&self) -> Result<Self::Stream, Error> {
        let delay = {
            let mut shared = self.shared.lock();
            shared.attempts += 1;
            if shared.fail_connects > 0 {
                shared.fail_connects -= 1;
                let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
                return Err(err.into());
            }
            shared.connect_delay
        };

        thread::sleep(delay);

        let mut shared = self.shared.lock();
        shared.current += 1;
        shared.inbound.clear();
        Ok(MockStream {
            id: shared.current,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MockStream {
    id: usize,
    shared: Arc<Mutex<Shared>>,
}

impl MockStream {
    fn is_dead(&self, shared: &Shared) -> bool {
        shared.current != self.id || shared.dead.contains(&self.id)
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut shared = self.shared.lock();
            if self.is_dead(&shared) {
                return Ok(0);
            }
            if !shared.inbound.is_empty() {
                let len = buf.len().min(shared.inbound.len());
                for (dst, src) in buf.iter_mut().zip(shared.inbound.drain(..len)) {
                    *dst = src;
                }
                return Ok(len);
            }
        }

        // stands in for the socket read timeout
        thread::sleep(Duration::from_millis(2));
        Err(io::ErrorKind::WouldBlock.into())
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        if self.is_dead(&shared) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if shared.fail_writes > 0 {
            shared.fail_writes -= 1;
            shared.dead.push(self.id);
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        shared.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Polls `f` until it's true, panicking after a few seconds.
pub fn wait_until<F>(what: &str, mut f: F)
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while !f() {
        if start.elapsed() > Duration::from_secs(5) {
            panic!("timed out waiting for: {}", what)
        }
        thread::sleep(Duration::from_millis(5));
    }
}
