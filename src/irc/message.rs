use super::{Prefix, Tags};

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Host used by the chat service for room-level notices and state.
pub const SERVER_HOST: &str = "tmi.twitch.tv";
/// Source of server-internal housekeeping lines.
pub const HOUSEKEEPING: &str = "jtv";
/// Source of subscription announcements.
pub const SUB_NOTIFY: &str = "twitchnotify";

static NEW_SUB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>[A-Za-z0-9_]{1,32}) just subscribed!$").unwrap());

static RE_SUB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>[A-Za-z0-9_]{1,32}) subscribed for (?P<months>[0-9]{1,10}) months in a row!$",
    )
    .unwrap()
});

/// A classified inbound line.
#[derive(Debug, PartialEq, Clone)]
pub enum Line {
    /// Keep-alive, with everything after the `PING` token
    Ping(String),
    /// Room notice text from the server
    Notice(String),
    /// Room state tags from the server
    RoomState(Tags),
    Privmsg(Event, Option<Subscription>),
    Join(Event),
    Part(Event),
    /// Understood, but nothing to do with it
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseError {
    MalformedTags,
    MissingPrefix,
    MissingNick,
    MissingCommand,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedTags => write!(f, "malformed tag section"),
            ParseError::MissingPrefix => write!(f, "line has no source prefix"),
            ParseError::MissingNick => write!(f, "source prefix has no nick"),
            ParseError::MissingCommand => write!(f, "line has no command"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A chat event from a user: a message, a join or a part.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Event {
    pub tags: Tags,
    pub name: String,
    pub command: String,
    pub channel: String,
    pub data: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Subscription {
    pub name: String,
    pub months: u32,
}

impl Subscription {
    fn detect(data: &str) -> Option<Self> {
        if let Some(caps) = NEW_SUB.captures(data) {
            return Some(Self {
                name: caps["name"].to_string(),
                months: 1,
            });
        }

        let caps = RE_SUB.captures(data)?;
        Some(Self {
            name: caps["name"].to_string(),
            months: caps["months"].parse().ok()?,
        })
    }
}

impl Line {
    /// Classifies one line, with or without its terminator.
    pub fn parse(input: &str) -> Result<Line, ParseError> {
        let input = input.trim_end_matches(|c| c == '\r' || c == '\n');
        if input.starts_with("PING") {
            let payload = input["PING".len()..].trim_start();
            return Ok(Line::Ping(payload.into()));
        }

        let (tags, input) = if input.starts_with('@') {
            let pos = input.find(' ').ok_or(ParseError::MalformedTags)?;
            let tags = Tags::parse(&input[1..pos]).map_err(|_| ParseError::MalformedTags)?;
            (tags, input[pos + 1..].trim())
        } else {
            (Tags::default(), input.trim())
        };

        let prefix = Prefix::parse(input).ok_or(ParseError::MissingPrefix)?;
        let mut args = input.split(' ').skip(1).take_while(|s| !s.starts_with(':'));
        let command = args.next().ok_or(ParseError::MissingCommand)?;
        let channel = args.next().unwrap_or_default();
        let data = input[1..]
            .find(" :")
            .map(|pos| &input[pos + 3..])
            .unwrap_or_default();

        let nick = match prefix {
            Prefix::Server { ref host } if host == HOUSEKEEPING => return Ok(Line::Ignored),
            Prefix::Server { ref host } if host == SERVER_HOST => {
                let line = match command {
                    "NOTICE" => Line::Notice(data.into()),
                    "ROOMSTATE" => Line::RoomState(tags),
                    _ => Line::Ignored,
                };
                return Ok(line);
            }
            Prefix::Server { .. } => return Err(ParseError::MissingNick),
            Prefix::User { nick, .. } => nick,
        };

        if nick == HOUSEKEEPING {
            return Ok(Line::Ignored);
        }

        let command = command.to_ascii_lowercase();
        let event = |command: &str| Event {
            name: nick.clone(),
            command: command.into(),
            channel: channel.into(),
            data: data.into(),
            tags: tags.clone(),
        };

        let line = match command.as_str() {
            "privmsg" if !data.is_empty() => {
                let sub = if nick == SUB_NOTIFY {
                    Subscription::detect(data)
                } else {
                    None
                };
                Line::Privmsg(event("privmsg"), sub)
            }
            "join" => Line::Join(event("join")),
            "part" => Line::Part(event("part")),
            _ => Line::Ignored,
        };
        Ok(line)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command.as_str() {
            "privmsg" => write!(f, "< [{}] <{}> {}", self.channel, self.name, self.data),
            _ => write!(f, "({}) [{}] <{}>", self.command, self.channel, self.name),
        }
    }
}
