use crate::irc::{Badge, Tags};

use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

/// A set of roles, one bit per role.
///
/// As a requirement it's permissive: a user holding *any* of the listed roles
/// satisfies it, and [`Permission::NONE`] is satisfied by everyone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission(u32);

impl Permission {
    pub const NONE: Self = Self(0);
    pub const VIEWER: Self = Self(1 << 0);
    pub const MODERATOR: Self = Self(1 << 1);
    pub const SUBSCRIBER: Self = Self(1 << 2);
    pub const BROADCASTER: Self = Self(1 << 3);
    pub const STAFF: Self = Self(1 << 4);
    pub const ADMIN: Self = Self(1 << 5);
    pub const GLOBAL_MOD: Self = Self(1 << 6);
    pub const FOLLOWER: Self = Self(1 << 7);
    pub const TURBO: Self = Self(1 << 8);
    pub const PREMIUM: Self = Self(1 << 9);
    pub const VIP: Self = Self(1 << 10);
    pub const ANY: Self = Self((1 << 11) - 1);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Mask for a raw `badges` tag value, e.g. `broadcaster/1,subscriber/12`.
    ///
    /// Unknown badge names contribute nothing.
    pub fn from_badges(badges: &str) -> Self {
        badges
            .split(',')
            .filter_map(|s| s.split('/').next())
            .filter_map(|s| Badge::from_str(s).ok())
            .map(Self::from)
            .fold(Self::NONE, BitOr::bitor)
    }

    pub fn from_tags(tags: &Tags) -> Self {
        tags.get("badges")
            .map(Self::from_badges)
            .unwrap_or_default()
    }

    /// Whether a user holding `self` may use something that requires `required`.
    pub fn satisfies(self, required: Self) -> bool {
        required.is_empty() || !(self & required).is_empty()
    }
}

impl From<Badge> for Permission {
    fn from(badge: Badge) -> Self {
        match badge {
            Badge::Admin => Self::ADMIN,
            Badge::Broadcaster => Self::BROADCASTER,
            Badge::GlobalMod => Self::GLOBAL_MOD,
            Badge::Moderator => Self::MODERATOR,
            Badge::Subscriber => Self::SUBSCRIBER,
            Badge::Staff => Self::STAFF,
            Badge::Turbo => Self::TURBO,
            Badge::Premium => Self::PREMIUM,
            Badge::Vip => Self::VIP,
        }
    }
}

impl BitOr for Permission {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

impl BitAnd for Permission {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

pub fn is_authorized(user: Permission, required: Permission) -> bool {
    user.satisfies(required)
}
