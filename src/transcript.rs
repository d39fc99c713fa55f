use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::prelude::*;
use log::*;
use parking_lot::Mutex;

/// Append-only log of everything sent and received.
pub struct Transcript {
    file: Mutex<BufWriter<File>>,
}

impl Transcript {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("writing transcript to {}", path.display());
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn outbound(&self, line: &str) {
        self.append('>', &redact(line))
    }

    pub fn inbound(&self, line: &str) {
        self.append('<', line)
    }

    fn append(&self, dir: char, line: &str) {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');

        let mut file = self.file.lock();
        if let Err(err) = writeln!(file, "{} {} {}", dir, ts, line).and_then(|_| file.flush()) {
            warn!("cannot write to transcript: {}", err)
        }
    }
}

/// Hides the secret of an authentication line.
pub fn redact(line: &str) -> Cow<'_, str> {
    let is_pass = line
        .get(..5)
        .map_or(false, |head| head.eq_ignore_ascii_case("PASS "));
    if !is_pass {
        return Cow::Borrowed(line);
    }

    let secret = line[5..].trim_end_matches(|c| c == '\r' || c == '\n');
    let tail = &line[5 + secret.len()..];
    Cow::Owned(format!("{}{}{}", &line[..5], "*".repeat(secret.len()), tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_pass() {
        assert_eq!(redact("PASS oauth:hunter2"), "PASS *************");
        assert_eq!(redact("pass oauth:abc\r\n"), "pass *********\r\n");
        assert_eq!(redact("PRIVMSG #museun :PASS oauth:abc"), "PRIVMSG #museun :PASS oauth:abc");
        assert_eq!(redact("PASS"), "PASS");
    }

    #[test]
    fn appends_lines() {
        let name = format!("tmibot-transcript-{}.log", std::process::id());
        let path = std::env::temp_dir().join(name);
        let _ = std::fs::remove_file(&path);

        {
            let transcript = Transcript::open(&path).unwrap();
            transcript.outbound("PASS oauth:hunter2\r\n");
            transcript.outbound("PRIVMSG #museun :hello\r\n");
            transcript.inbound(":tmi.twitch.tv 001 shaken :Welcome, GLHF!");
        }
        {
            let transcript = Transcript::open(&path).unwrap();
            transcript.outbound("PART #museun");
        }

        let data = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let lines = data.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("> "));
        assert!(lines[0].ends_with(" PASS *************"));
        assert!(!data.contains("hunter2"));
        assert!(lines[1].ends_with(" PRIVMSG #museun :hello"));
        assert!(lines[2].starts_with("< "));
        assert!(lines[3].ends_with(" PART #museun"));
    }
}
