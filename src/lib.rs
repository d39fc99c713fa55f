pub mod error;
pub mod util;

pub mod irc;

pub mod command;
pub mod config;
pub mod conn;
pub mod mode;
pub mod permission;
pub mod queue;
pub mod ratelimit;
pub mod room;
pub mod transcript;
pub mod twitch;

mod bot;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::bot::{Bot, Hooks, ShutdownHandle};
pub use crate::command::{Commands, CommandsBuilder, HandlerResult, Matches, Request};
pub use crate::config::Config;
pub use crate::error::{Error, HandlerError};
pub use crate::irc::{Event, Subscription};
pub use crate::mode::{Mode, ModeChange, ModeData};
pub use crate::permission::Permission;
pub use crate::queue::Outbox;
pub use crate::room::{ModeSnapshot, Room};
pub use crate::twitch::{Directory, Follower};
