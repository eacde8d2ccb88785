//! Priority lanes.
//!
//! A lane is a single bit; a lower bit position is a more urgent lane. Sets of
//! lanes travel on updates, fibers and the root.

use crate::platform::Priority;

bitflags::bitflags! {
    /// A set of priority lanes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const SYNC = 1 << 0;
        const INPUT_CONTINUOUS = 1 << 1;
        const DEFAULT = 1 << 2;
        const TRANSITION = 1 << 3;
        const IDLE = 1 << 4;
    }
}

/// Lanes that always render without yielding to the host.
pub const BLOCKING_LANES: Lanes = Lanes::SYNC.union(Lanes::INPUT_CONTINUOUS);

impl Lanes {
    /// The most urgent lane in the set, or the empty set.
    #[inline]
    pub fn highest_priority(self) -> Lanes {
        let bits = self.bits();
        Lanes::from_bits_retain(bits & bits.wrapping_neg())
    }

    #[inline]
    pub fn includes_some(self, other: Lanes) -> bool {
        self.intersects(other)
    }

    /// True when every lane of `subset` is in `self`. The empty set is a
    /// subset of everything, which is what lets cloned base-queue updates
    /// (tagged with no lane) apply on every later pass.
    #[inline]
    pub fn is_superset_of(self, subset: Lanes) -> bool {
        self.contains(subset)
    }

    /// Host scheduler priority used when this lane is handed to the
    /// time-sliced callback queue.
    pub fn to_priority(self) -> Priority {
        let lane = self.highest_priority();
        if lane == Lanes::SYNC {
            Priority::Immediate
        } else if lane == Lanes::INPUT_CONTINUOUS {
            Priority::UserBlocking
        } else if lane == Lanes::DEFAULT || lane == Lanes::TRANSITION {
            Priority::Normal
        } else {
            Priority::Idle
        }
    }

    /// Update lane implied by an ambient host priority.
    pub fn from_priority(priority: Priority) -> Lanes {
        match priority {
            Priority::Immediate => Lanes::SYNC,
            Priority::UserBlocking => Lanes::INPUT_CONTINUOUS,
            Priority::Normal | Priority::Low => Lanes::DEFAULT,
            Priority::Idle => Lanes::IDLE,
        }
    }
}

#[cfg(test)]
#[path = "tests/lanes_tests.rs"]
mod tests;
