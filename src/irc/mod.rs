mod message;
mod prefix;
mod tags;

pub use self::message::{Event, Line, ParseError, Subscription};
pub use self::message::{HOUSEKEEPING, SERVER_HOST, SUB_NOTIFY};
pub use self::prefix::Prefix;
pub use self::tags::{Badge, MalformedTags, Tags};
