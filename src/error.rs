use std::fmt;
use std::path::PathBuf;

/// What a command handler or hook returns when it fails.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Tls(rustls::Error),
    InvalidServerName(String),
    ConfigRead(toml::de::Error),
    ConfigWrite(toml::ser::Error),
    /// No config existed, so a default one was written here
    ConfigCreated(PathBuf),
    InvalidPattern(regex::Error),
    Handler { command: String, source: HandlerError },
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Tls(err) => write!(f, "tls error: {}", err),
            Error::InvalidServerName(name) => write!(f, "invalid server name: {}", name),
            Error::ConfigRead(err) => write!(f, "cannot parse config: {}", err),
            Error::ConfigWrite(err) => write!(f, "cannot serialize config: {}", err),
            Error::ConfigCreated(path) => write!(
                f,
                "a default config was created at {}. edit it and try again",
                path.display()
            ),
            Error::InvalidPattern(err) => write!(f, "invalid command pattern: {}", err),
            Error::Handler { command, source } => {
                write!(f, "handler for '{}' failed: {}", command, source)
            }
            Error::Shutdown => write!(f, "client is shutting down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        macro_rules! cast {
            ($e:expr) => {
                Some($e as &(dyn std::error::Error + 'static))
            };
        }

        match self {
            Error::Io(err) => cast!(err),
            Error::Tls(err) => cast!(err),
            Error::ConfigRead(err) => cast!(err),
            Error::ConfigWrite(err) => cast!(err),
            Error::InvalidPattern(err) => cast!(err),
            Error::Handler { source, .. } => cast!(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigRead(err)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::ConfigWrite(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidPattern(err)
    }
}
