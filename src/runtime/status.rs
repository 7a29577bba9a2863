//! Invocation status bits returned by compiled steps.

use std::fmt;
use std::ops::BitOr;

/// Bitmask returned by one closure invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(u32);

impl Status {
    /// The closure finished; release it.
    pub const REMOVE: Status = Status(1);
    /// Call the closure again.
    pub const CONTINUE: Status = Status(2);
    /// Reserved; no step produces it.
    pub const WAITING: Status = Status(4);
    /// The step wrote its fault record. Never escapes [`Closure::invoke`].
    ///
    /// [`Closure::invoke`]: crate::runtime::Closure::invoke
    pub const FAULT: Status = Status(8);

    /// Wraps raw bits returned by machine code.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` when every bit of `other` is set.
    pub const fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Status::REMOVE, "REMOVE"),
            (Status::CONTINUE, "CONTINUE"),
            (Status::WAITING, "WAITING"),
            (Status::FAULT, "FAULT"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            write!(f, "0x{:x}", self.0)?;
        }
        Ok(())
    }
}
