use crate::irc::Tags;
use crate::mode::{Mode, ModeChange, ModeTracker};
use crate::permission::Permission;
use crate::twitch::{Chatters, Follower};

use hashbrown::HashSet;
use log::*;

/// A copy of the room modes at some point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeSnapshot {
    pub modes: u8,
    pub slow: u32,
    pub hosting: Option<String>,
}

impl ModeSnapshot {
    pub fn is_set(&self, mode: Mode) -> bool {
        self.modes & mode.bit() != 0
    }
}

/// Everything known about the joined channel: its modes and who's in it.
///
/// The reader and the poller share one of these behind a single lock.
#[derive(Debug, Default)]
pub struct Room {
    channel: String,
    modes: ModeTracker,
    roster: Option<Chatters>,
    followers: HashSet<Follower>,
    // lowercased logins of `followers`
    follower_names: HashSet<String>,
    polled_followers: bool,
}

impl Room {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            ..Self::default()
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn apply_notice(&mut self, text: &str) -> Option<ModeChange> {
        self.modes.apply_notice(text)
    }

    pub fn apply_roomstate(&mut self, tags: &Tags) -> Vec<ModeChange> {
        self.modes.apply_roomstate(tags)
    }

    pub fn modes(&self) -> ModeSnapshot {
        ModeSnapshot {
            modes: self.modes.bits(),
            slow: self.modes.slow(),
            hosting: self.modes.hosting().map(ToString::to_string),
        }
    }

    pub fn roster(&self) -> Option<&Chatters> {
        self.roster.as_ref()
    }

    pub fn update_roster(&mut self, roster: Chatters) {
        self.roster.replace(roster);
    }

    /// Replaces the follower set, returning who's new since the last update.
    ///
    /// Nobody is new on the first update.
    pub fn update_followers(&mut self, followers: HashSet<Follower>) -> Vec<Follower> {
        let new = if self.polled_followers {
            followers.difference(&self.followers).cloned().collect()
        } else {
            vec![]
        };

        trace!("{} followers, {} new", followers.len(), new.len());
        self.polled_followers = true;
        self.follower_names = followers.iter().map(|f| f.login.to_lowercase()).collect();
        self.followers = followers;
        new
    }

    pub fn is_follower(&self, name: &str) -> bool {
        self.follower_names.contains(&name.to_lowercase())
    }

    /// The effective roles of `name`: their badges, plus whatever the roster
    /// and follower list say about them.
    pub fn permission_for(&self, name: &str, tags: &Tags) -> Permission {
        let name = name.to_lowercase();
        let mut perm = Permission::from_tags(tags);

        if self.channel.trim_start_matches('#') == name {
            perm |= Permission::BROADCASTER;
        }
        if self.follower_names.contains(&name) {
            perm |= Permission::FOLLOWER;
        }

        if let Some(roster) = &self.roster {
            let lists = [
                (&roster.broadcaster, Permission::BROADCASTER),
                (&roster.vips, Permission::VIP),
                (&roster.moderators, Permission::MODERATOR),
                (&roster.staff, Permission::STAFF),
                (&roster.admins, Permission::ADMIN),
                (&roster.global_mods, Permission::GLOBAL_MOD),
                (&roster.viewers, Permission::VIEWER),
            ];
            for (list, bit) in &lists {
                if list.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
                    perm |= *bit;
                }
            }
        }

        perm
    }
}
