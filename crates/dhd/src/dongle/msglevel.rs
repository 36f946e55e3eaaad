//! Runtime log-verbosity bitmask (the `msglevel` variable).

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Categories of driver messages that can be switched on at runtime.
///
/// `tracing` filtering still applies on top; this mask only decides whether
/// a category is emitted at all, matching what the firmware tools expect
/// when they read or write `msglevel`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgLevel(u32);

impl MsgLevel {
    pub const ERROR: Self = Self(0x0001);
    pub const TRACE: Self = Self(0x0002);
    pub const INFO: Self = Self(0x0004);
    pub const DATA: Self = Self(0x0008);
    pub const CTL: Self = Self(0x0010);
    pub const TIMER: Self = Self(0x0020);
    pub const HDRS: Self = Self(0x0040);
    pub const BYTES: Self = Self(0x0080);
    pub const INTR: Self = Self(0x0100);
    pub const LOG: Self = Self(0x0200);
    pub const GLOM: Self = Self(0x0400);
    pub const EVENT: Self = Self(0x0800);
    pub const BTA: Self = Self(0x1000);
    pub const ISCAN: Self = Self(0x2000);

    const NAMES: [(Self, &'static str); 14] = [
        (Self::ERROR, "error"),
        (Self::TRACE, "trace"),
        (Self::INFO, "info"),
        (Self::DATA, "data"),
        (Self::CTL, "ctl"),
        (Self::TIMER, "timer"),
        (Self::HDRS, "hdrs"),
        (Self::BYTES, "bytes"),
        (Self::INTR, "intr"),
        (Self::LOG, "log"),
        (Self::GLOM, "glom"),
        (Self::EVENT, "event"),
        (Self::BTA, "bta"),
        (Self::ISCAN, "iscan"),
    ];

    /// Empty mask.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap raw bits as written through the `msglevel` variable.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse a `|`-separated list of category names (`"error|event"`),
    /// or a plain number.
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(bits) = crate::util::parse::get_u32(s) {
            return Some(Self(bits));
        }
        let mut level = Self::empty();
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let (flag, _) = Self::NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(part))?;
            level |= *flag;
        }
        Some(level)
    }
}

impl Default for MsgLevel {
    fn default() -> Self {
        Self::ERROR | Self::TRACE | Self::EVENT
    }
}

impl BitOr for MsgLevel {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MsgLevel {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for MsgLevel {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for MsgLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgLevel({:#06x}: {})", self.0, self)
    }
}

impl fmt::Display for MsgLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let level = MsgLevel::default();
        assert_eq!(level.bits(), 0x0803);
        assert!(level.contains(MsgLevel::EVENT));
        assert!(!level.contains(MsgLevel::CTL));
    }

    #[test]
    fn test_parse() {
        assert_eq!(MsgLevel::parse("0x10"), Some(MsgLevel::CTL));
        assert_eq!(
            MsgLevel::parse("error | Event"),
            Some(MsgLevel::ERROR | MsgLevel::EVENT)
        );
        assert_eq!(MsgLevel::parse("bogus"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(MsgLevel::default().to_string(), "error|trace|event");
        assert_eq!(MsgLevel::empty().to_string(), "none");
    }
}
