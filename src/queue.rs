use crate::conn::{Connector, Manager};
use crate::error::Error;
use crate::ratelimit::RateLimit;
use crate::transcript::Transcript;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{self as channel, select, Receiver, RecvTimeoutError, Sender};
use log::*;

/// A line waiting to be sent, terminator included.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub(crate) line: String,
    /// Whether it counts against the rate limit
    pub(crate) limited: bool,
}

/// Producer side of the outbound queue. Cheap to clone.
#[derive(Clone)]
pub struct Outbox {
    tx: Sender<Outbound>,
    urgent: Sender<Outbound>,
    channel: String,
}

/// Consumer side of the outbound queue. Keep-alives get their own lane so
/// they never sit behind rate limited lines.
#[derive(Clone)]
pub(crate) struct Lanes {
    pub(crate) normal: Receiver<Outbound>,
    pub(crate) urgent: Receiver<Outbound>,
}

pub(crate) fn queue(channel: &str) -> (Outbox, Lanes) {
    let (tx, normal) = channel::unbounded();
    let (urgent_tx, urgent) = channel::unbounded();
    let outbox = Outbox {
        tx,
        urgent: urgent_tx,
        channel: channel.to_string(),
    };
    (outbox, Lanes { normal, urgent })
}

impl Outbox {
    /// The joined channel, with its `#`.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn send_raw(&self, raw: &str) {
        for line in split(raw) {
            self.push(line, true)
        }
    }

    pub fn privmsg(&self, target: &str, data: &str) {
        if data.is_empty() {
            warn!("tried to send an empty message to {}", target);
            return;
        }
        debug!("> [{}]: {}", target, data);
        self.send_raw(&format!("PRIVMSG {} :{}", target, data))
    }

    /// Says something in the joined channel.
    pub fn say(&self, data: &str) {
        self.privmsg(&self.channel, data)
    }

    pub fn reply(&self, who: &str, data: &str) {
        self.say(&format!("@{}: {}", who, data))
    }

    pub fn join(&self, channel: &str) {
        self.send_raw(&format!("JOIN {}", channel))
    }

    pub fn part(&self, channel: &str) {
        self.send_raw(&format!("PART {}", channel))
    }

    /// Keep-alive replies skip the rate limit and jump the queue.
    pub(crate) fn pong(&self, payload: &str) {
        let line = if payload.is_empty() {
            "PONG\r\n".to_string()
        } else {
            format!("PONG {}\r\n", payload)
        };
        let msg = Outbound {
            line,
            limited: false,
        };
        if self.urgent.send(msg).is_err() {
            warn!("outbound queue is closed, dropping a keep-alive");
        }
    }

    fn push(&self, line: String, limited: bool) {
        if self.tx.send(Outbound { line, limited }).is_err() {
            warn!("outbound queue is closed, dropping a line");
        }
    }
}

const MAX_LINE: usize = 510;

/// Terminates `raw`, splitting it into several lines if it's too long.
///
/// The trailing parameter is what gets split, and each part is sent with
/// the same head.
fn split(raw: &str) -> Vec<String> {
    if raw.len() <= MAX_LINE {
        return vec![[raw, "\r\n"].concat()];
    }

    let pos = match raw.find(" :") {
        Some(pos) if pos + 2 < MAX_LINE => pos,
        _ => {
            warn!("cannot split a long line without a trailing parameter");
            return vec![[raw, "\r\n"].concat()];
        }
    };

    let (head, mut tail) = (&raw[..pos], &raw[pos + 2..]);
    let room = MAX_LINE - head.len() - 2;

    let mut lines = vec![];
    while !tail.is_empty() {
        let mut end = room.min(tail.len());
        while !tail.is_char_boundary(end) {
            end -= 1;
        }
        // not even one char fits, so let this part run over
        if end == 0 {
            end = tail.chars().next().map_or(tail.len(), char::len_utf8);
        }
        lines.push(format!("{} :{}\r\n", head, &tail[..end]));
        tail = &tail[end..];
    }
    lines
}

/// Drains the outbound queue onto the connection, the only writer it has.
pub(crate) struct Writer<C: Connector> {
    lanes: Lanes,
    conn: Arc<Manager<C>>,
    limit: RateLimit,
    transcript: Option<Arc<Transcript>>,
}

impl<C: Connector> Writer<C> {
    // how often an idle writer checks for shutdown
    const IDLE: Duration = Duration::from_millis(100);

    pub fn new(
        lanes: Lanes,
        conn: Arc<Manager<C>>,
        limit: RateLimit,
        transcript: Option<Arc<Transcript>>,
    ) -> Self {
        Self {
            lanes,
            conn,
            limit,
            transcript,
        }
    }

    pub fn run(mut self) -> Result<(), Error> {
        trace!("starting write loop");
        while self.conn.is_running() {
            let msg = match self.next() {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match self.send(&msg) {
                Ok(()) => {}
                Err(Error::Shutdown) => break,
                Err(err) => return Err(err),
            }
        }
        trace!("end of write loop");
        Ok(())
    }

    // anything urgent goes first
    fn next(&self) -> Result<Outbound, RecvTimeoutError> {
        if let Ok(msg) = self.lanes.urgent.try_recv() {
            return Ok(msg);
        }
        select! {
            recv(self.lanes.urgent) -> msg => msg.map_err(|_| RecvTimeoutError::Disconnected),
            recv(self.lanes.normal) -> msg => msg.map_err(|_| RecvTimeoutError::Disconnected),
            default(Self::IDLE) => Err(RecvTimeoutError::Timeout),
        }
    }

    fn send(&mut self, msg: &Outbound) -> Result<(), Error> {
        if msg.limited {
            self.pace()?;
        }
        self.write(msg)
    }

    // waits out the rate limit, sending keep-alives that show up meanwhile
    fn pace(&mut self) -> Result<(), Error> {
        while let Some(delay) = self.limit.delay(Instant::now()) {
            if !self.conn.is_running() {
                return Err(Error::Shutdown);
            }
            debug!(
                "rate limited ({} in window), waiting {:?}",
                self.limit.in_window(),
                delay
            );
            match self.lanes.urgent.recv_timeout(delay.min(Self::IDLE)) {
                Ok(msg) => self.write(&msg)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(delay.min(Self::IDLE)),
            }
        }
        Ok(())
    }

    // a failed write is retried on the next connection until it goes through
    fn write(&mut self, msg: &Outbound) -> Result<(), Error> {
        while let Err(lost) = self.conn.write(msg.line.as_bytes()) {
            debug!("write failed on generation {}", lost.generation);
            self.conn.reconnect(lost.generation)?;
        }

        let line = msg.line.trim_end();
        if !line.starts_with("PASS ") && !line.starts_with("PONG") {
            trace!("--> {}", line);
        }
        if let Some(transcript) = &self.transcript {
            transcript.outbound(line);
        }
        if msg.limited {
            self.limit.record(Instant::now());
        }
        Ok(())
    }
}
