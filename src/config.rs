use crate::error::Error;
use crate::ratelimit::RateLimit;

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::*;
use serde::{Deserialize, Serialize};

pub const PASSWORD_VAR: &str = "TMIBOT_PASSWORD";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub address: String,
    pub port: u16,
    /// Name checked against the server's certificate
    pub tls_name: String,
    pub nick: String,
    pub pass: String,
    pub channel: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<PathBuf>,
    /// Seconds to wait between connection attempts
    pub reconnect_delay: u64,
    /// Seconds between room and follower polls
    pub poll_interval: u64,
    /// Seconds a REST response stays fresh
    pub cache_ttl: u64,
    pub limits: Limits,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    pub messages: usize,
    /// Length of the sliding window, in seconds
    pub window: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            messages: RateLimit::MESSAGES,
            window: RateLimit::WINDOW.as_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "irc.chat.twitch.tv".into(),
            port: 6697,
            tls_name: "irc.chat.twitch.tv".into(),
            nick: "".into(),
            pass: "".into(),
            channel: "".into(),
            client_id: "".into(),
            transcript: None,
            reconnect_delay: 5,
            poll_interval: 61,
            cache_ttl: 60,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Loads the config at `path`.
    ///
    /// If it doesn't exist, a default one is written there and
    /// [`Error::ConfigCreated`] is returned so it can be filled in.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::default().save(path)?;
                warn!("created a default config at {}", path.display());
                return Err(Error::ConfigCreated(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut config = Self::parse(&data)?;
        if let Ok(pass) = std::env::var(PASSWORD_VAR) {
            debug!("using the password from {}", PASSWORD_VAR);
            config.pass = pass;
        }
        Ok(config)
    }

    pub fn parse(data: &str) -> Result<Self, Error> {
        let mut config: Self = toml::from_str(data)?;
        config.channel = normalize_channel(&config.channel);
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = toml::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// `config.toml` in the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com.github", "museun", "tmibot")
            .map(|dir| dir.config_dir().join("config.toml"))
    }

    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.limits.messages,
            Duration::from_secs(self.limits.window),
        )
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

/// Lowercases `channel` and makes sure it starts with a `#`.
pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim().to_lowercase();
    if channel.is_empty() || channel.starts_with('#') {
        channel
    } else {
        format!("#{}", channel)
    }
}
