use crate::error::{Error, HandlerError};
use crate::irc::{Event, Tags};
use crate::permission::Permission;
use crate::queue::Outbox;

use hashbrown::HashMap;
use log::*;
use regex::{Captures, Regex};

pub type HandlerResult = Result<(), HandlerError>;

type CommandFn = Box<dyn FnMut(&Outbox, &Request<'_>) -> HandlerResult + Send>;
type PatternFn = Box<dyn FnMut(&Outbox, &Matches<'_>) -> HandlerResult + Send>;

/// What an exact command's handler sees.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    name: &'a str,
    args: &'a str,
    event: &'a Event,
}

impl<'a> Request<'a> {
    /// The command word, as it was typed.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Everything after the first space, or empty.
    pub fn args(&self) -> &'a str {
        self.args
    }

    pub fn args_iter(&self) -> impl Iterator<Item = &'a str> {
        self.args.split_whitespace()
    }

    pub fn sender(&self) -> &'a str {
        &self.event.name
    }

    pub fn channel(&self) -> &'a str {
        &self.event.channel
    }

    pub fn tags(&self) -> &'a Tags {
        &self.event.tags
    }
}

/// Every match a pattern found in one message.
#[derive(Debug)]
pub struct Matches<'a> {
    captures: Vec<Captures<'a>>,
    event: &'a Event,
}

impl<'a> Matches<'a> {
    pub fn captures(&self) -> &[Captures<'a>] {
        &self.captures
    }

    /// The whole text of each match, in order.
    pub fn matched(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.captures
            .iter()
            .filter_map(|caps| caps.get(0))
            .map(|m| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn sender(&self) -> &'a str {
        &self.event.name
    }

    pub fn channel(&self) -> &'a str {
        &self.event.channel
    }

    pub fn tags(&self) -> &'a Tags {
        &self.event.tags
    }

    pub fn message(&self) -> &'a str {
        &self.event.data
    }
}

struct Exact {
    name: String,
    required: Permission,
    handler: CommandFn,
}

struct Pattern {
    re: Regex,
    required: Permission,
    handler: PatternFn,
}

/// Collects commands before the client starts. Once built they can't change.
#[derive(Default)]
pub struct CommandsBuilder {
    exact: Vec<Exact>,
    patterns: Vec<Pattern>,
}

impl CommandsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command triggered by the first word of a message.
    ///
    /// Words are compared ignoring case. Registering the same word again
    /// replaces the earlier handler.
    pub fn command<F>(mut self, name: &str, required: Permission, handler: F) -> Self
    where
        F: FnMut(&Outbox, &Request<'_>) -> HandlerResult + Send + 'static,
    {
        let cmd = Exact {
            name: name.to_lowercase(),
            required,
            handler: Box::new(handler),
        };

        match self.exact.iter_mut().find(|e| e.name == cmd.name) {
            Some(old) => {
                warn!("replacing the handler for '{}'", cmd.name);
                *old = cmd;
            }
            None => self.exact.push(cmd),
        }
        self
    }

    /// Adds a command triggered by a regex anywhere in a message.
    pub fn pattern<F>(mut self, re: &str, required: Permission, handler: F) -> Result<Self, Error>
    where
        F: FnMut(&Outbox, &Matches<'_>) -> HandlerResult + Send + 'static,
    {
        let re = Regex::new(re)?;
        self.patterns.push(Pattern {
            re,
            required,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    pub fn build(self) -> Commands {
        let lookup = self
            .exact
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        Commands {
            exact: self.exact,
            lookup,
            patterns: self.patterns,
        }
    }
}

pub struct Commands {
    exact: Vec<Exact>,
    lookup: HashMap<String, usize>,
    patterns: Vec<Pattern>,
}

impl Default for Commands {
    fn default() -> Self {
        CommandsBuilder::new().build()
    }
}

impl Commands {
    pub fn builder() -> CommandsBuilder {
        CommandsBuilder::new()
    }

    /// Runs every command `event` triggers for a user holding `perm`.
    ///
    /// The first failing handler stops dispatch and its error is returned.
    pub fn dispatch(&mut self, out: &Outbox, event: &Event, perm: Permission) -> Result<(), Error> {
        let data = event.data.as_str();
        let (head, args) = match data.find(' ') {
            Some(pos) => (&data[..pos], &data[pos + 1..]),
            None => (data, ""),
        };

        if let Some(&i) = self.lookup.get(&head.to_lowercase()) {
            let cmd = &mut self.exact[i];
            if perm.satisfies(cmd.required) {
                debug!("calling command: {}", cmd.name);
                let req = Request {
                    name: head,
                    args,
                    event,
                };
                (cmd.handler)(out, &req).map_err(|source| Error::Handler {
                    command: cmd.name.clone(),
                    source,
                })?;
            } else {
                debug!("{} cannot use {}", event.name, cmd.name);
            }
        }

        for pattern in &mut self.patterns {
            if !perm.satisfies(pattern.required) {
                continue;
            }

            let captures = pattern.re.captures_iter(data).collect::<Vec<_>>();
            if captures.is_empty() {
                continue;
            }

            debug!("calling pattern: {}", pattern.re.as_str());
            let matches = Matches { captures, event };
            (pattern.handler)(out, &matches).map_err(|source| Error::Handler {
                command: pattern.re.as_str().to_string(),
                source,
            })?;
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::queue;

    use std::sync::{Arc, Mutex};

    fn event(name: &str, data: &str) -> Event {
        Event {
            name: name.into(),
            command: "privmsg".into(),
            channel: "#museun".into(),
            data: data.into(),
            ..Event::default()
        }
    }

    #[test]
    fn exact_needs_permission() {
        let seen = Arc::new(Mutex::new(vec![]));
        let inner = Arc::clone(&seen);
        let mut commands = Commands::builder()
            .command("!stop", Permission::BROADCASTER, move |_, req| {
                inner.lock().unwrap().push(req.args().to_string());
                Ok(())
            })
            .build();

        let (out, _rx) = queue("#museun");
        let perm = Permission::from_badges("broadcaster/1,subscriber/0");
        commands
            .dispatch(&out, &event("museun", "!stop now"), perm)
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["now"]);

        let perm = Permission::from_badges("subscriber/12");
        commands
            .dispatch(&out, &event("someone", "!stop now"), perm)
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn exact_ignores_case() {
        let seen = Arc::new(Mutex::new(vec![]));
        let inner = Arc::clone(&seen);
        let mut commands = Commands::builder()
            .command("!Hello", Permission::NONE, move |_, req| {
                inner.lock().unwrap().push((req.name().to_string(), req.args().to_string()));
                Ok(())
            })
            .build();

        let (out, _rx) = queue("#museun");
        for data in &["!hello", "!HELLO world", "!hellothere", "say !hello"] {
            commands
                .dispatch(&out, &event("someone", data), Permission::NONE)
                .unwrap();
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("!hello".to_string(), "".to_string()),
                ("!HELLO".to_string(), "world".to_string()),
            ]
        );
    }

    #[test]
    fn pattern_fires_once_with_every_match() {
        let seen = Arc::new(Mutex::new(vec![]));
        let inner = Arc::clone(&seen);
        let mut commands = Commands::builder()
            .pattern(r"(\d{4}-\d{3}-\d{4})", Permission::NONE, move |_, matches| {
                let found = matches.captures().iter().map(|c| c[1].to_string()).collect::<Vec<_>>();
                inner.lock().unwrap().push(found);
                Ok(())
            })
            .unwrap()
            .build();

        let (out, _rx) = queue("#museun");
        let ev = event("someone", "call 1234-567-8901 or 2345-678-9012");
        commands.dispatch(&out, &ev, Permission::NONE).unwrap();
        commands
            .dispatch(&out, &event("someone", "no numbers here"), Permission::NONE)
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec!["1234-567-8901".to_string(), "2345-678-9012".to_string()]]
        );
    }

    #[test]
    fn every_pattern_is_tried() {
        let seen = Arc::new(Mutex::new(vec![]));
        let (a, b, c) = (Arc::clone(&seen), Arc::clone(&seen), Arc::clone(&seen));
        let mut commands = Commands::builder()
            .command("!hi", Permission::NONE, move |_, _| {
                a.lock().unwrap().push("exact");
                Ok(())
            })
            .pattern("hi", Permission::NONE, move |_, _| {
                b.lock().unwrap().push("first");
                Ok(())
            })
            .unwrap()
            .pattern("(?i)HI", Permission::MODERATOR | Permission::VIP, move |_, _| {
                c.lock().unwrap().push("second");
                Ok(())
            })
            .unwrap()
            .build();

        let (out, _rx) = queue("#museun");
        commands
            .dispatch(&out, &event("someone", "!hi"), Permission::VIP)
            .unwrap();
        commands
            .dispatch(&out, &event("someone", "!hi"), Permission::VIEWER)
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["exact", "first", "second", "exact", "first"]
        );
    }

    #[test]
    fn replacing_a_command() {
        let seen = Arc::new(Mutex::new(vec![]));
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        let mut commands = Commands::builder()
            .command("!foo", Permission::NONE, move |_, _| {
                a.lock().unwrap().push("old");
                Ok(())
            })
            .command("!FOO", Permission::NONE, move |_, _| {
                b.lock().unwrap().push("new");
                Ok(())
            })
            .build();
        assert_eq!(commands.len(), 1);

        let (out, _rx) = queue("#museun");
        commands
            .dispatch(&out, &event("someone", "!foo"), Permission::NONE)
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["new"]);
    }

    #[test]
    fn handler_errors_propagate() {
        let mut commands = Commands::builder()
            .command("!boom", Permission::NONE, |_, _| Err("kaboom".into()))
            .build();

        let (out, _rx) = queue("#museun");
        match commands.dispatch(&out, &event("someone", "!boom"), Permission::NONE) {
            Err(Error::Handler { command, source }) => {
                assert_eq!(command, "!boom");
                assert_eq!(source.to_string(), "kaboom");
            }
            other => panic!("expected a handler error, got {:?}", other),
        }
    }

    #[test]
    fn handlers_can_reply() {
        let mut commands = Commands::builder()
            .command("!ping", Permission::NONE, |out, req| {
                out.reply(req.sender(), "pong");
                Ok(())
            })
            .build();

        let (out, lanes) = queue("#museun");
        commands
            .dispatch(&out, &event("someone", "!ping"), Permission::NONE)
            .unwrap();
        let lines = lanes.normal.try_iter().map(|o| o.line).collect::<Vec<_>>();
        assert_eq!(lines, vec!["PRIVMSG #museun :@someone: pong\r\n"]);
    }

    #[test]
    fn bad_pattern() {
        match Commands::builder().pattern("(unclosed", Permission::NONE, |_, _| Ok(())) {
            Err(Error::InvalidPattern(..)) => {}
            Err(err) => panic!("unexpected error: {}", err),
            Ok(..) => panic!("pattern should not compile"),
        }
    }
}
