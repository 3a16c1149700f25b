//! ## FloorSet
//!
//! Set of floors stored as a 64-bit mask. Floors keep their panel numbering
//! (the lowest floor is [Bounds::min_floor], not 0), the bit of a floor is
//! its offset from the lowest floor. Every operation taking a floor checks it
//! against the bounds and fails with a recoverable [Fault] if it is outside.
//!
//! [AtomicFloorSet] is the same set shared between threads, it backs the lamp
//! shadow of the [crate::elevio::Driver].

use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::elevio::Bounds;
use crate::error::Fault;
use crate::fault_unless;

/// Bitset over the floors of one car.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloorSet {
    floors: u64,
}

fn offset(floor: i32, bounds: &Bounds) -> Result<u32, Fault> {
    fault_unless!(bounds.min_floor() <= floor, "out-of-bounds floor (minimum)");
    fault_unless!(floor <= bounds.max_floor(), "out-of-bounds floor (maximum)");
    Ok((floor - bounds.min_floor()) as u32)
}

impl FloorSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set built from raw bits, bit 0 being the lowest floor.
    pub fn from_bits(floors: u64) -> Self {
        Self { floors }
    }

    /// Raw bits of the set.
    pub fn bits(&self) -> u64 {
        self.floors
    }

    /// Whether `floor` is in the set.
    pub fn get(&self, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
        let off = offset(floor, bounds)?;
        Ok(self.floors & (1u64 << off) != 0)
    }

    /// Adds or removes `floor`, returns whether it was in the set before.
    pub fn set(&mut self, value: bool, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
        let bit = 1u64 << offset(floor, bounds)?;
        let was = self.floors & bit != 0;
        if value {
            self.floors |= bit;
        } else {
            self.floors &= !bit;
        }
        Ok(was)
    }

    /// Whether any floor strictly above `floor` is in the set.
    pub fn any_higher(&self, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
        let off = offset(floor, bounds)?;
        let mask = if off >= 63 { 0 } else { u64::MAX << (off + 1) };
        Ok(self.floors & mask != 0)
    }

    /// Whether any floor strictly below `floor` is in the set.
    pub fn any_lower(&self, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
        let off = offset(floor, bounds)?;
        Ok(self.floors & ((1u64 << off) - 1) != 0)
    }

    /// No bit is set above the highest floor of `bounds`.
    pub fn consistent(&self, bounds: &Bounds) -> bool {
        let span = bounds.floor_count() as u32;
        span >= 64 || self.floors >> span == 0
    }

    /// Removes every floor.
    pub fn reset(&mut self) {
        self.floors = 0;
    }

    /// Whether the set is non-empty.
    pub fn has_any(&self) -> bool {
        self.floors != 0
    }

    /// Floors in the set, lowest first.
    pub fn iter(&self, bounds: &Bounds) -> impl Iterator<Item = i32> + '_ {
        let min = bounds.min_floor();
        (0..64u32)
            .filter(move |off| self.floors & (1u64 << off) != 0)
            .map(move |off| min + off as i32)
    }

    /// Whether `now` holds a floor `before` did not.
    ///
    /// Used to detect a fresh button press between two polling cycles.
    /// ```
    /// use elevatorbank::utils::floor_set::FloorSet;
    ///
    /// let a = FloorSet::from_bits(0b010);
    /// let b = FloorSet::from_bits(0b110);
    /// assert!(FloorSet::has_additional(a, b));
    /// assert!(!FloorSet::has_additional(b, a));
    /// ```
    pub fn has_additional(before: FloorSet, now: FloorSet) -> bool {
        (before.floors ^ now.floors) & now.floors != 0
    }
}

impl BitOr for FloorSet {
    type Output = FloorSet;

    fn bitor(self, rhs: Self) -> Self::Output {
        FloorSet { floors: self.floors | rhs.floors }
    }
}

impl BitOrAssign for FloorSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.floors |= rhs.floors;
    }
}

/// [FloorSet] which can be read and updated from several threads.
#[derive(Debug, Default)]
pub struct AtomicFloorSet {
    floors: AtomicU64,
}

impl AtomicFloorSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `floor` is in the set.
    pub fn get(&self, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
        self.load().get(floor, bounds)
    }

    /// Adds or removes `floor`, returns whether it was in the set before.
    pub fn set(&self, value: bool, floor: i32, bounds: &Bounds) -> Result<bool, Fault> {
        let bit = 1u64 << offset(floor, bounds)?;
        let prev = if value {
            self.floors.fetch_or(bit, Ordering::AcqRel)
        } else {
            self.floors.fetch_and(!bit, Ordering::AcqRel)
        };
        Ok(prev & bit != 0)
    }

    /// Snapshot of the set.
    pub fn load(&self) -> FloorSet {
        FloorSet::from_bits(self.floors.load(Ordering::Acquire))
    }

    /// Removes every floor.
    pub fn reset(&self) {
        self.floors.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::new(1, 4)
    }

    #[test]
    fn set_then_get_every_floor() {
        let b = bounds();
        for f in 1..=4 {
            let mut s = FloorSet::new();
            s.set(true, f, &b).unwrap();
            assert!(s.get(f, &b).unwrap());
            s.set(false, f, &b).unwrap();
            assert!(!s.get(f, &b).unwrap());
        }
    }

    #[test]
    fn set_reports_previous_membership() {
        let b = bounds();
        let mut s = FloorSet::new();
        assert!(!s.set(true, 2, &b).unwrap());
        assert!(s.set(true, 2, &b).unwrap());
        assert!(s.set(false, 2, &b).unwrap());
        assert!(!s.set(false, 2, &b).unwrap());
    }

    #[test]
    fn out_of_bounds_fails_fast() {
        let b = bounds();
        let mut s = FloorSet::new();
        assert!(s.get(0, &b).is_err());
        assert!(s.get(5, &b).is_err());
        assert!(s.set(true, 5, &b).is_err());
        assert!(s.any_higher(-3, &b).is_err());
        assert!(!s.has_any());
    }

    #[test]
    fn higher_and_lower_are_strict() {
        let b = bounds();
        let mut s = FloorSet::new();
        s.set(true, 3, &b).unwrap();
        assert!(s.any_higher(2, &b).unwrap());
        assert!(!s.any_higher(3, &b).unwrap());
        assert!(s.any_lower(4, &b).unwrap());
        assert!(!s.any_lower(3, &b).unwrap());
        assert!(!s.any_lower(1, &b).unwrap());
        assert!(!s.any_higher(4, &b).unwrap());
    }

    #[test]
    fn has_additional_is_set_difference_on_now_side() {
        let b = bounds();
        let mut a = FloorSet::new();
        a.set(true, 2, &b).unwrap();
        let mut both = a;
        both.set(true, 3, &b).unwrap();
        assert!(FloorSet::has_additional(a, both));
        assert!(!FloorSet::has_additional(both, a));
        assert!(!FloorSet::has_additional(a, a));
    }

    #[test]
    fn union_and_consistency() {
        let b = bounds();
        let mut up = FloorSet::new();
        up.set(true, 1, &b).unwrap();
        let mut down = FloorSet::new();
        down.set(true, 4, &b).unwrap();
        let all = up | down;
        assert_eq!(all.iter(&b).collect::<Vec<_>>(), vec![1, 4]);
        assert!(all.consistent(&b));
        assert!(!FloorSet::from_bits(1 << 4).consistent(&b));
    }

    #[test]
    fn full_width_range_is_supported() {
        let b = Bounds::new(0, 63);
        let mut s = FloorSet::new();
        s.set(true, 63, &b).unwrap();
        assert!(!s.any_higher(63, &b).unwrap());
        assert!(s.any_higher(62, &b).unwrap());
        assert!(s.consistent(&b));
    }

    #[test]
    fn atomic_set_matches_plain_set() {
        let b = bounds();
        let s = AtomicFloorSet::new();
        assert!(!s.set(true, 4, &b).unwrap());
        assert!(s.get(4, &b).unwrap());
        assert!(s.set(false, 4, &b).unwrap());
        assert!(!s.load().has_any());
        assert!(s.set(true, 9, &b).is_err());
    }
}
