//! # Priority Lanes
//!
//! A [`Lane`] is an opaque priority bucket. Every update carries exactly one
//! lane; a render pass processes a [`Lanes`] set.
//!
//! ```text
//!   bit:    0           1             2        3       4     5
//!   lane:   Immediate   UserBlocking  Normal   Retry   Low   Idle
//!           ◄──────────── more urgent ─────────────────────────
//! ```
//!
//! Lanes are totally ordered: a lower bit outranks a higher one. `Ord` on
//! [`Lane`] follows the bit order, so `Lane::Immediate < Lane::Idle`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of distinct lanes.
pub const LANE_COUNT: usize = 6;

/// A single priority lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Discrete input (clicks, key presses). Rendered without yielding.
    Immediate,
    /// Continuous input (drags, hovers).
    UserBlocking,
    /// Default priority for updates with no explicit lane.
    #[default]
    Normal,
    /// Retry of a suspended boundary after its data resolved.
    Retry,
    /// Deferrable work.
    Low,
    /// Work that only runs when nothing else is pending.
    Idle,
}

impl Lane {
    /// All lanes, most urgent first.
    pub const ALL: [Lane; LANE_COUNT] = [
        Lane::Immediate,
        Lane::UserBlocking,
        Lane::Normal,
        Lane::Retry,
        Lane::Low,
        Lane::Idle,
    ];

    /// Position of this lane in the priority order (0 = most urgent).
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Bit representing this lane inside a [`Lanes`] mask.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self.rank()
    }

    /// Returns true if `self` is strictly more urgent than `other`.
    #[inline]
    #[must_use]
    pub const fn outranks(self, other: Lane) -> bool {
        self.rank() < other.rank()
    }

    /// Lane with the given rank, if any.
    #[must_use]
    pub const fn from_rank(rank: u8) -> Option<Lane> {
        match rank {
            0 => Some(Lane::Immediate),
            1 => Some(Lane::UserBlocking),
            2 => Some(Lane::Normal),
            3 => Some(Lane::Retry),
            4 => Some(Lane::Low),
            5 => Some(Lane::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lane::Immediate => "immediate",
            Lane::UserBlocking => "user_blocking",
            Lane::Normal => "normal",
            Lane::Retry => "retry",
            Lane::Low => "low",
            Lane::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// A set of lanes (bitmask).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lanes(u8);

impl Lanes {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every lane.
    pub const ALL: Self = Self((1 << LANE_COUNT) - 1);

    /// Creates a set holding a single lane.
    #[inline]
    #[must_use]
    pub const fn single(lane: Lane) -> Self {
        Self(lane.bit())
    }

    /// Every lane at or above `lane`'s priority (including `lane`).
    #[inline]
    #[must_use]
    pub const fn at_or_above(lane: Lane) -> Self {
        Self((lane.bit() << 1) - 1)
    }

    /// Returns the raw bitmask.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if no lane is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if `lane` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, lane: Lane) -> bool {
        (self.0 & lane.bit()) != 0
    }

    /// Returns true if the sets share at least one lane.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Lanes) -> bool {
        (self.0 & other.0) != 0
    }

    /// Returns true if every lane of `other` is in `self`.
    #[inline]
    #[must_use]
    pub const fn is_superset_of(self, other: Lanes) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of both sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Lanes) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of both sets.
    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Lanes) -> Self {
        Self(self.0 & other.0)
    }

    /// `self` without the lanes of `other`.
    #[inline]
    #[must_use]
    pub const fn without(self, other: Lanes) -> Self {
        Self(self.0 & !other.0)
    }

    /// Adds a lane.
    #[inline]
    pub fn insert(&mut self, lane: Lane) {
        self.0 |= lane.bit();
    }

    /// Removes a lane.
    #[inline]
    pub fn remove(&mut self, lane: Lane) {
        self.0 &= !lane.bit();
    }

    /// Most urgent lane in the set.
    #[must_use]
    pub fn highest_priority(self) -> Option<Lane> {
        if self.0 == 0 {
            return None;
        }
        // trailing_zeros of a non-zero u8 is < 8
        Lane::from_rank(u8::try_from(self.0.trailing_zeros()).ok()?)
    }

    /// Least urgent lane in the set.
    #[must_use]
    pub fn lowest_priority(self) -> Option<Lane> {
        if self.0 == 0 {
            return None;
        }
        Lane::from_rank(7 - u8::try_from(self.0.leading_zeros()).ok()?)
    }

    /// Iterates lanes from most to least urgent.
    pub fn iter(self) -> impl Iterator<Item = Lane> {
        Lane::ALL.into_iter().filter(move |lane| self.contains(*lane))
    }
}

impl From<Lane> for Lanes {
    fn from(lane: Lane) -> Self {
        Self::single(lane)
    }
}

impl std::ops::BitOr for Lanes {
    type Output = Lanes;

    fn bitor(self, rhs: Lanes) -> Lanes {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for Lanes {
    fn bitor_assign(&mut self, rhs: Lanes) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitOrAssign<Lane> for Lanes {
    fn bitor_assign(&mut self, rhs: Lane) {
        self.insert(rhs);
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_order() {
        assert!(Lane::Immediate.outranks(Lane::Normal));
        assert!(!Lane::Idle.outranks(Lane::Low));
        assert!(Lane::UserBlocking < Lane::Normal);
    }

    #[test]
    fn test_at_or_above() {
        let lanes = Lanes::at_or_above(Lane::Normal);
        assert!(lanes.contains(Lane::Immediate));
        assert!(lanes.contains(Lane::UserBlocking));
        assert!(lanes.contains(Lane::Normal));
        assert!(!lanes.contains(Lane::Retry));
        assert_eq!(Lanes::at_or_above(Lane::Idle), Lanes::ALL);
    }

    #[test]
    fn test_highest_and_lowest() {
        let mut lanes = Lanes::EMPTY;
        assert_eq!(lanes.highest_priority(), None);
        lanes.insert(Lane::Low);
        lanes.insert(Lane::UserBlocking);
        assert_eq!(lanes.highest_priority(), Some(Lane::UserBlocking));
        assert_eq!(lanes.lowest_priority(), Some(Lane::Low));
        lanes.remove(Lane::UserBlocking);
        assert_eq!(lanes.highest_priority(), Some(Lane::Low));
    }

    #[test]
    fn test_set_algebra() {
        let a = Lanes::single(Lane::Normal) | Lanes::single(Lane::Idle);
        let b = Lanes::single(Lane::Normal);
        assert!(a.intersects(b));
        assert!(a.is_superset_of(b));
        assert_eq!(a.without(b), Lanes::single(Lane::Idle));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![Lane::Normal, Lane::Idle]);
    }
}
