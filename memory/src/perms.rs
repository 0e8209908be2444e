//! The three-bit read/write/execute permission mask shared by every mapped range.

use core::fmt;

/// A bitmask over `{READ, WRITE, EXEC}`, as carried by every [`RangeEntry`][crate::index::RangeEntry]
/// and every [`Engine`][crate::engine::Engine] region.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Perms(u8);

impl Perms {
    /// No access permitted.
    pub const NONE: Self = Self(0);
    /// Readable.
    pub const READ: Self = Self(1);
    /// Writable.
    pub const WRITE: Self = Self(2);
    /// Executable.
    pub const EXEC: Self = Self(4);
    /// Readable, writable, and executable.
    pub const RWX: Self = Self(Self::READ.0 | Self::WRITE.0 | Self::EXEC.0);
    /// Readable and writable.
    pub const RW: Self = Self(Self::READ.0 | Self::WRITE.0);
    /// Readable and executable.
    pub const RX: Self = Self(Self::READ.0 | Self::EXEC.0);

    /// Builds a [`Perms`] from a raw mask, masking off any bits outside `{READ, WRITE, EXEC}`.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::RWX.0)
    }

    /// Returns the raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit set in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if [`Perms::READ`] is set.
    #[must_use]
    pub const fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns `true` if [`Perms::WRITE`] is set.
    #[must_use]
    pub const fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Returns `true` if [`Perms::EXEC`] is set.
    #[must_use]
    pub const fn executable(self) -> bool {
        self.contains(Self::EXEC)
    }
}

impl core::ops::BitOr for Perms {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::from_bits_truncate(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for Perms {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self::from_bits_truncate(self.0 & rhs.0)
    }
}

/// Formats a [`Perms`] as the three-character `r/-`, `w/-`, `x/-` string described by
/// `get_mapinfo`/`show_mapinfo`.
impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.readable() { 'r' } else { '-' };
        let w = if self.writable() { 'w' } else { '-' };
        let x = if self.executable() { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

#[cfg(test)]
mod tests {
    use super::Perms;

    #[test]
    fn display_matches_rwx_order() {
        assert_eq!(Perms::RWX.to_string(), "rwx");
        assert_eq!(Perms::NONE.to_string(), "---");
        assert_eq!(Perms::READ.to_string(), "r--");
        assert_eq!((Perms::READ | Perms::EXEC).to_string(), "r-x");
    }

    #[test]
    fn from_bits_truncate_masks_unknown_bits() {
        assert_eq!(Perms::from_bits_truncate(0xFF), Perms::RWX);
    }
}
