use crate::command::{Commands, HandlerResult};
use crate::config::Config;
use crate::conn::{handshake, Connector, Manager, ReadStatus, TlsConnector};
use crate::error::{Error, HandlerError};
use crate::irc::{Event, Line, Subscription};
use crate::mode::ModeChange;
use crate::queue::{self, Lanes, Outbox, Writer};
use crate::ratelimit::RateLimit;
use crate::room::{ModeSnapshot, Room};
use crate::transcript::Transcript;
use crate::twitch::{Directory, Follower, TwitchClient};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use log::*;
use parking_lot::Mutex;

/// Callbacks for things happening in the channel.
///
/// They all run on the reading thread, in the order the lines arrived. An
/// error stops the client and is returned from [`Bot::run`].
#[allow(unused_variables)]
pub trait Hooks {
    /// Called for every chat message, after any commands it triggered.
    fn on_message(&mut self, out: &Outbox, event: &Event) -> HandlerResult {
        Ok(())
    }

    fn on_join(&mut self, out: &Outbox, event: &Event) -> HandlerResult {
        Ok(())
    }

    fn on_part(&mut self, out: &Outbox, event: &Event) -> HandlerResult {
        Ok(())
    }

    fn on_sub(&mut self, out: &Outbox, sub: &Subscription) -> HandlerResult {
        Ok(())
    }

    fn on_mode_change(&mut self, out: &Outbox, change: &ModeChange) -> HandlerResult {
        Ok(())
    }

    fn on_follow(&mut self, out: &Outbox, follower: &Follower) -> HandlerResult {
        Ok(())
    }
}

impl Hooks for () {}

/// Stops a running [`Bot`] from another thread.
pub struct ShutdownHandle<C: Connector> {
    conn: Arc<Manager<C>>,
}

impl<C: Connector> Clone for ShutdownHandle<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl<C: Connector> ShutdownHandle<C> {
    pub fn shutdown(&self) {
        self.conn.shutdown()
    }

    pub fn is_running(&self) -> bool {
        self.conn.is_running()
    }
}

pub struct Bot<C: Connector, H: Hooks = ()> {
    conn: Arc<Manager<C>>,
    outbox: Outbox,
    lanes: Lanes,
    limit: RateLimit,
    commands: Commands,
    hooks: H,
    room: Arc<Mutex<Room>>,
    directory: Option<Arc<dyn Directory>>,
    poll_interval: Duration,
    transcript: Option<Arc<Transcript>>,
}

impl<H: Hooks> Bot<TlsConnector, H> {
    /// A client for the server in `config`. Nothing connects until [`Bot::run`].
    pub fn connect(config: &Config, commands: Commands, hooks: H) -> Result<Self, Error> {
        let connector = TlsConnector::new(&config.address, config.port, &config.tls_name)?;
        let mut bot = Self::new(connector, config, commands, hooks)?;
        if !config.client_id.is_empty() {
            let token = Some(config.pass.as_str()).filter(|s| !s.is_empty());
            let client = TwitchClient::new(&config.client_id, token, config.cache_ttl());
            bot = bot.with_directory(client);
        }
        Ok(bot)
    }
}

impl<C: Connector, H: Hooks> Bot<C, H> {
    pub fn new(connector: C, config: &Config, commands: Commands, hooks: H) -> Result<Self, Error> {
        let transcript = match &config.transcript {
            Some(path) => Some(Arc::new(Transcript::open(path)?)),
            None => None,
        };

        let conn = Manager::new(
            connector,
            handshake(&config.pass, &config.nick, &config.channel),
            config.reconnect_delay(),
        )
        .with_transcript(transcript.clone());

        let (outbox, lanes) = queue::queue(&config.channel);
        Ok(Self {
            conn: Arc::new(conn),
            outbox,
            lanes,
            limit: config.rate_limit(),
            commands,
            hooks,
            room: Arc::new(Mutex::new(Room::new(&config.channel))),
            directory: None,
            poll_interval: config.poll_interval(),
            transcript,
        })
    }

    /// Polls `directory` for the roster and followers while running.
    pub fn with_directory<D>(mut self, directory: D) -> Self
    where
        D: Directory + 'static,
    {
        self.directory.replace(Arc::new(directory));
        self
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    pub fn room(&self) -> Arc<Mutex<Room>> {
        Arc::clone(&self.room)
    }

    pub fn modes(&self) -> ModeSnapshot {
        self.room.lock().modes()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle<C> {
        ShutdownHandle {
            conn: Arc::clone(&self.conn),
        }
    }

    /// Connects and runs until shut down, or until a handler fails.
    pub fn run(mut self) -> Result<(), Error> {
        let writer = Writer::new(
            self.lanes.clone(),
            Arc::clone(&self.conn),
            std::mem::take(&mut self.limit),
            self.transcript.clone(),
        );
        let writer = thread::Builder::new()
            .name("writer".into())
            .spawn(move || writer.run())?;

        let (follows_tx, follows_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let poller = match self.directory.clone() {
            Some(directory) => {
                let poller = Poller {
                    directory,
                    room: Arc::clone(&self.room),
                    interval: self.poll_interval,
                    follows: follows_tx,
                    stop: stop_rx,
                };
                let handle = thread::Builder::new()
                    .name("poller".into())
                    .spawn(move || poller.run());
                match handle {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        self.conn.shutdown();
                        let _ = writer.join();
                        return Err(err.into());
                    }
                }
            }
            None => None,
        };

        let res = match self.read_loop(&follows_rx) {
            Err(Error::Shutdown) => Ok(()),
            res => res,
        };
        if let Err(err) = &res {
            error!("stopping: {}", err);
        }

        self.conn.shutdown();
        drop(stop_tx);
        if let Some(poller) = poller {
            let _ = poller.join();
        }
        match writer.join() {
            Ok(Err(err)) => warn!("writer stopped: {}", err),
            Err(..) => error!("writer thread panicked"),
            _ => {}
        }
        res
    }

    fn read_loop(&mut self, follows: &Receiver<Follower>) -> Result<(), Error> {
        trace!("starting read loop");
        let mut generation = self.conn.reconnect(0)?;
        let mut buf = vec![0; 4 * 1024];
        let mut pending = Vec::new();

        while self.conn.is_running() {
            for follower in follows.try_iter() {
                self.hooks
                    .on_follow(&self.outbox, &follower)
                    .map_err(hook("on_follow"))?;
            }

            let len = match self.conn.read(&mut buf) {
                Ok(ReadStatus::Nothing) => continue,
                Ok(ReadStatus::Data { generation: gen, len }) => {
                    // a partial line from an old connection is garbage
                    if gen != generation {
                        pending.clear();
                        generation = gen;
                    }
                    len
                }
                Err(lost) => {
                    generation = self.conn.reconnect(lost.generation)?;
                    pending.clear();
                    continue;
                }
            };

            pending.extend_from_slice(&buf[..len]);
            while let Some(pos) = pending.iter().position(|&c| c == b'\n') {
                let line = pending.drain(..=pos).collect::<Vec<_>>();
                self.handle_line(&String::from_utf8_lossy(&line))?;
            }
        }
        trace!("end of read loop");
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<(), Error> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if line.is_empty() {
            return Ok(());
        }
        if let Some(transcript) = &self.transcript {
            transcript.inbound(line);
        }

        let parsed = match Line::parse(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!("dropping '{}': {}", line, err);
                return Ok(());
            }
        };

        match parsed {
            Line::Ping(payload) => self.outbox.pong(&payload),
            Line::Notice(text) => {
                trace!("<-- {}", line);
                let change = self.room.lock().apply_notice(&text);
                if let Some(change) = change {
                    self.mode_changed(&change)?;
                }
            }
            Line::RoomState(tags) => {
                trace!("<-- {}", line);
                let changes = self.room.lock().apply_roomstate(&tags);
                for change in &changes {
                    self.mode_changed(change)?;
                }
            }
            Line::Join(event) => {
                trace!("<-- {}", line);
                self.hooks
                    .on_join(&self.outbox, &event)
                    .map_err(hook("on_join"))?
            }
            Line::Part(event) => {
                trace!("<-- {}", line);
                self.hooks
                    .on_part(&self.outbox, &event)
                    .map_err(hook("on_part"))?
            }
            Line::Privmsg(event, sub) => {
                trace!("<-- {}", line);
                debug!("{}", event);
                if let Some(sub) = sub {
                    info!("{} subscribed ({} months)", sub.name, sub.months);
                    self.hooks
                        .on_sub(&self.outbox, &sub)
                        .map_err(hook("on_sub"))?;
                }

                let perm = self.room.lock().permission_for(&event.name, &event.tags);
                self.commands.dispatch(&self.outbox, &event, perm)?;
                self.hooks
                    .on_message(&self.outbox, &event)
                    .map_err(hook("on_message"))?
            }
            Line::Ignored => trace!("<-- {}", line),
        }
        Ok(())
    }

    fn mode_changed(&mut self, change: &ModeChange) -> Result<(), Error> {
        debug!("mode {:?} is now {}", change.mode, if change.on { "on" } else { "off" });
        self.hooks
            .on_mode_change(&self.outbox, change)
            .map_err(hook("on_mode_change"))
    }
}

fn hook(name: &'static str) -> impl FnOnce(HandlerError) -> Error {
    move |source| Error::Handler {
        command: name.to_string(),
        source,
    }
}

struct Poller {
    directory: Arc<dyn Directory>,
    room: Arc<Mutex<Room>>,
    interval: Duration,
    follows: Sender<Follower>,
    stop: Receiver<()>,
}

impl Poller {
    fn run(self) {
        trace!("starting poller");
        loop {
            self.poll();
            match self.stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        }
        trace!("end of poller");
    }

    fn poll(&self) {
        let channel = self.room.lock().channel().to_string();
        if let Some(roster) = self.directory.room_members(&channel) {
            self.room.lock().update_roster(roster);
        }

        // an empty set is what a failed lookup looks like
        let followers = self.directory.followers(&channel);
        if followers.is_empty() {
            return;
        }

        let new = self.room.lock().update_followers(followers);
        for follower in new {
            info!("new follower: {}", follower.display_name);
            if self.follows.send(follower).is_err() {
                return;
            }
        }
    }
}
