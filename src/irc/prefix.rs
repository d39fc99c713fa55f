use std::fmt;

/// Source of a line: either `nick!user@host` or a bare server/service name.
#[derive(Debug, PartialEq, Clone)]
pub enum Prefix {
    User {
        nick: String,
        user: String,
        host: String,
    },
    Server {
        host: String,
    },
}

impl Prefix {
    /// Parses the leading `:source` token of an untagged line.
    pub fn parse(input: &str) -> Option<Self> {
        if !input.starts_with(':') {
            return None;
        }

        let end = input.find(' ').unwrap_or(input.len());
        let s = input[1..end].trim();
        if s.is_empty() {
            return None;
        }

        let pos = match s.find('!') {
            Some(pos) => pos,
            None => return Some(Prefix::Server { host: s.into() }),
        };

        let (user, host) = match s[pos + 1..].find('@') {
            Some(at) => (&s[pos + 1..pos + 1 + at], &s[pos + 2 + at..]),
            None => (&s[pos + 1..], ""),
        };

        Some(Prefix::User {
            nick: s[..pos].into(),
            user: user.into(),
            host: host.into(),
        })
    }

    /// The nick for a user, the host for a server.
    pub fn name(&self) -> &str {
        match self {
            Prefix::User { nick, .. } => nick,
            Prefix::Server { host } => host,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::User { nick, user, host } => write!(f, "{}!{}@{}", nick, user, host),
            Prefix::Server { host } => write!(f, "{}", host),
        }
    }
}
