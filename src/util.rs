use log::*;
use serde::Deserialize;

use std::fmt;
use std::time::Duration;

const FIVE_SECONDS: Duration = Duration::from_secs(5);

pub(crate) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(FIVE_SECONDS)
        .timeout_read(FIVE_SECONDS)
        .build()
}

pub fn http_get_json<T>(url: &str) -> Result<T, HttpError>
where
    for<'de> T: Deserialize<'de>,
{
    let resp = agent().get(url).call().map_err(|err| {
        warn!("cannot get body for: {}: {}", url, err);
        HttpError::HttpGet(url.to_string())
    })?;

    let res = serde_json::from_reader(resp.into_reader())?;
    Ok(res)
}

#[derive(Debug)]
pub enum HttpError {
    HttpGet(String),
    Deserialize(serde_json::Error),
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::Deserialize(err)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::HttpGet(url) => write!(f, "cannot get url: {}", url),
            HttpError::Deserialize(err) => write!(f, "json deserialize error: {}", err),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::HttpGet(..) => None,
            HttpError::Deserialize(err) => Some(err),
        }
    }
}

pub fn get_log_level(var: &str) -> simplelog::LevelFilter {
    parse_log_level(&std::env::var(var).unwrap_or_default())
}

fn parse_log_level(level: &str) -> simplelog::LevelFilter {
    use simplelog::LevelFilter;
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        "OFF" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplelog::LevelFilter;

    #[test]
    fn log_levels() {
        assert_eq!(parse_log_level("trace"), LevelFilter::Trace);
        assert_eq!(parse_log_level("Debug"), LevelFilter::Debug);
        assert_eq!(parse_log_level("off"), LevelFilter::Off);
        assert_eq!(parse_log_level(""), LevelFilter::Info);
        assert_eq!(parse_log_level("loud"), LevelFilter::Info);
    }
}
