use crate::error::Error;
use crate::transcript::Transcript;

use std::convert::TryFrom;
use std::io::{self, Read, Write};
use std::iter::FromIterator;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::*;
use parking_lot::{Condvar, Mutex};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

/// Opens a fresh, ready to use stream to the chat server.
pub trait Connector: Send + Sync + 'static {
    type Stream: Read + Write + Send + 'static;

    fn connect(&self) -> Result<Self::Stream, Error>;
}

pub struct TlsConnector {
    address: String,
    port: u16,
    name: ServerName<'static>,
    config: Arc<ClientConfig>,
}

impl TlsConnector {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    // bounds how long the reader holds the connection
    const READ_TIMEOUT: Duration = Duration::from_millis(50);

    pub fn new(address: &str, port: u16, tls_name: &str) -> Result<Self, Error> {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let name = ServerName::try_from(tls_name.to_string())
            .map_err(|_| Error::InvalidServerName(tls_name.to_string()))?;

        Ok(Self {
            address: address.to_string(),
            port,
            name,
            config: Arc::new(config),
        })
    }
}

impl Connector for TlsConnector {
    type Stream = StreamOwned<ClientConnection, TcpStream>;

    fn connect(&self) -> Result<Self::Stream, Error> {
        let mut last = None;
        let mut tcp = None;
        for addr in (self.address.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, Self::CONNECT_TIMEOUT) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(err) => last = Some(err),
            }
        }
        let mut tcp = match (tcp, last) {
            (Some(tcp), _) => tcp,
            (None, Some(err)) => return Err(err.into()),
            (None, None) => {
                let err = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
                return Err(err.into());
            }
        };
        debug!("connected to {}:{}", self.address, self.port);

        let mut tls = ClientConnection::new(Arc::clone(&self.config), self.name.clone())?;
        while tls.is_handshaking() {
            tls.complete_io(&mut tcp)?;
        }
        debug!("tls established with {:?}", self.name);

        tcp.set_read_timeout(Some(Self::READ_TIMEOUT))?;
        tcp.set_nodelay(true)?;
        Ok(StreamOwned::new(tls, tcp))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum State {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
}

/// The connection with this generation failed, or there was none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lost {
    pub generation: u64,
}

#[derive(Debug, PartialEq)]
pub enum ReadStatus {
    Data { generation: u64, len: usize },
    Nothing,
}

/// Lines sent on every new connection, before anything queued.
pub fn handshake(pass: &str, nick: &str, channel: &str) -> Vec<String> {
    vec![
        "CAP REQ :twitch.tv/membership".into(),
        "CAP REQ :twitch.tv/commands".into(),
        "CAP REQ :twitch.tv/tags".into(),
        format!("PASS {}", pass),
        format!("NICK {}", nick),
        format!("USER {} * 8 :{}", nick, nick),
        format!("JOIN {}", channel),
    ]
}

struct Slot<S> {
    stream: Option<S>,
    state: State,
    generation: u64,
}

/// Owns the one live connection, and replaces it when asked.
///
/// Each connection gets a new generation. A caller that sees a failure
/// hands the generation back to [`Manager::reconnect`]; if that connection
/// was already replaced, or a replacement is in flight, the caller just
/// gets the result of that instead of starting another one.
pub struct Manager<C: Connector> {
    connector: C,
    handshake: Vec<String>,
    slot: Mutex<Slot<C::Stream>>,
    changed: Condvar,
    retry: Duration,
    running: AtomicBool,
    transcript: Option<Arc<Transcript>>,
}

impl<C: Connector> Manager<C> {
    pub fn new(connector: C, handshake: Vec<String>, retry: Duration) -> Self {
        Self {
            connector,
            handshake,
            slot: Mutex::new(Slot {
                stream: None,
                state: State::Disconnected,
                generation: 0,
            }),
            changed: Condvar::new(),
            retry,
            running: AtomicBool::new(true),
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Option<Arc<Transcript>>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn state(&self) -> State {
        self.slot.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops any reconnecting and closes the current connection.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("shutting down connection");
        let mut slot = self.slot.lock();
        slot.stream.take();
        slot.state = State::Disconnected;
        self.changed.notify_all();
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<ReadStatus, Lost> {
        let mut slot = self.slot.lock();
        let generation = slot.generation;
        let stream = slot.stream.as_mut().ok_or(Lost { generation })?;

        match stream.read(buf) {
            Ok(0) => {
                warn!("connection closed by the server");
                Err(Lost { generation })
            }
            Ok(len) => Ok(ReadStatus::Data { generation, len }),
            Err(ref err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(ReadStatus::Nothing)
            }
            Err(err) => {
                warn!("cannot read from connection: {}", err);
                Err(Lost { generation })
            }
        }
    }

    pub fn write(&self, data: &[u8]) -> Result<(), Lost> {
        let mut slot = self.slot.lock();
        let generation = slot.generation;
        let stream = slot.stream.as_mut().ok_or(Lost { generation })?;

        stream
            .write_all(data)
            .and_then(|_| stream.flush())
            .map_err(|err| {
                warn!("cannot write to connection: {}", err);
                Lost { generation }
            })
    }

    /// Replaces the connection with generation `seen`, retrying forever.
    ///
    /// Returns the generation of the connection to use from now on, or
    /// [`Error::Shutdown`] once [`Manager::shutdown`] was called.
    pub fn reconnect(&self, seen: u64) -> Result<u64, Error> {
        {
            let mut slot = self.slot.lock();
            loop {
                if !self.is_running() {
                    return Err(Error::Shutdown);
                }
                match slot.state {
                    State::Connecting | State::Handshaking => {
                        trace!("joining a reconnect already in flight");
                        self.changed.wait(&mut slot);
                    }
                    State::Connected if slot.generation != seen => return Ok(slot.generation),
                    State::Connected | State::Disconnected => break,
                }
            }

            slot.stream.take();
            slot.state = State::Connecting;
        }

        let mut attempt = 0;
        let stream = loop {
            if attempt > 0 {
                warn!(
                    "{}: connection failed, trying again in {:?}",
                    attempt, self.retry
                );
                self.pause();
            }
            if !self.is_running() {
                self.set_state(State::Disconnected);
                return Err(Error::Shutdown);
            }
            attempt += 1;

            match self.open() {
                Ok(stream) => break stream,
                Err(err) => {
                    warn!("cannot connect: {}", err);
                    self.set_state(State::Connecting);
                }
            }
        };

        let mut slot = self.slot.lock();
        if !self.is_running() {
            slot.state = State::Disconnected;
            self.changed.notify_all();
            return Err(Error::Shutdown);
        }
        slot.stream.replace(stream);
        slot.generation += 1;
        slot.state = State::Connected;
        self.changed.notify_all();
        info!("connected (generation {})", slot.generation);
        Ok(slot.generation)
    }

    fn open(&self) -> Result<C::Stream, Error> {
        let mut stream = self.connector.connect()?;
        self.set_state(State::Handshaking);

        for line in &self.handshake {
            if !line.starts_with("PASS ") {
                trace!("--> {}", line);
            }
            stream.write_all(line.as_bytes())?;
            stream.write_all(b"\r\n")?;
            if let Some(transcript) = &self.transcript {
                transcript.outbound(line);
            }
        }
        stream.flush()?;
        Ok(stream)
    }

    fn set_state(&self, state: State) {
        let mut slot = self.slot.lock();
        slot.state = state;
    }

    // waits out the retry delay, or until shutdown
    fn pause(&self) {
        let deadline = Instant::now() + self.retry;
        let mut slot = self.slot.lock();
        while self.is_running() {
            if self.changed.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
    }
}
