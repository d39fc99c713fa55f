use crate::irc::Tags;

use log::*;

/// A channel-wide chat restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Subscribers,
    Slow,
    R9k,
    Hosting,
}

impl Mode {
    pub const fn bit(self) -> u8 {
        match self {
            Mode::Subscribers => 1 << 0,
            Mode::Slow => 1 << 1,
            Mode::R9k => 1 << 2,
            Mode::Hosting => 1 << 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModeData {
    /// Seconds between messages
    Slow(u32),
    /// The hosted channel
    Hosting(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModeChange {
    pub mode: Mode,
    pub on: bool,
    pub data: Option<ModeData>,
}

// (phrase, mode, on). matched as a prefix of the notice text
const NOTICES: &[(&str, Mode, bool)] = &[
    ("This room is now in subscribers-only mode.", Mode::Subscribers, true),
    ("This room is no longer in subscribers-only mode.", Mode::Subscribers, false),
    ("This room is now in slow mode.", Mode::Slow, true),
    ("This room is no longer in slow mode.", Mode::Slow, false),
    ("This room is now in r9k mode.", Mode::R9k, true),
    ("This room is no longer in r9k mode.", Mode::R9k, false),
    ("Now hosting", Mode::Hosting, true),
    ("Exited host mode.", Mode::Hosting, false),
];

const ROOMSTATE: &[(&str, Mode)] = &[
    ("slow", Mode::Slow), //
    ("r9k", Mode::R9k),
    ("subs-only", Mode::Subscribers),
];

/// Tracks the room modes from notices and room state updates.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ModeTracker {
    modes: u8,
    slow: u32,
    hosting: Option<String>,
}

impl ModeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bits(&self) -> u8 {
        self.modes
    }

    pub fn is_set(&self, mode: Mode) -> bool {
        self.modes & mode.bit() != 0
    }

    /// Slow mode delay in seconds, from the last room state that carried it.
    pub fn slow(&self) -> u32 {
        self.slow
    }

    pub fn hosting(&self) -> Option<&str> {
        self.hosting.as_ref().map(String::as_str)
    }

    /// Applies a server notice. Notices that don't describe a mode change are ignored.
    pub fn apply_notice(&mut self, text: &str) -> Option<ModeChange> {
        let &(_, mode, on) = NOTICES.iter().find(|(s, ..)| text.starts_with(s))?;

        let data = match (mode, on) {
            (Mode::Hosting, true) => {
                // "Now hosting <channel>."
                let channel = text
                    .split_whitespace()
                    .nth(2)
                    .map(|s| s.trim_end_matches('.').to_string());
                self.hosting = channel.clone();
                channel.map(ModeData::Hosting)
            }
            (Mode::Hosting, false) => {
                self.hosting.take();
                None
            }
            _ => None,
        };

        Some(self.set(mode, on, data))
    }

    /// Applies a room state update, returning a change for each mode tag present.
    pub fn apply_roomstate(&mut self, tags: &Tags) -> Vec<ModeChange> {
        let mut changes = vec![];
        for &(key, mode) in ROOMSTATE {
            let val = match tags.get(key) {
                Some(val) => val,
                None => continue,
            };

            let on = val != "0";
            let data = if mode == Mode::Slow {
                match val.parse::<u32>() {
                    Ok(secs) => {
                        self.slow = secs;
                        Some(ModeData::Slow(secs))
                    }
                    Err(err) => {
                        debug!("invalid slow value '{}': {}", val, err);
                        None
                    }
                }
            } else {
                None
            };

            changes.push(self.set(mode, on, data));
        }
        changes
    }

    fn set(&mut self, mode: Mode, on: bool, data: Option<ModeData>) -> ModeChange {
        if on {
            self.modes |= mode.bit()
        } else {
            self.modes &= !mode.bit()
        }
        trace!("mode {:?} is now {} ({:#06b})", mode, on, self.modes);
        ModeChange { mode, on, data }
    }
}
