//! Small, crate-specific units: the integer [`Tick`] that every timer, delay, and
//! message length is counted in, and the real-valued [`Position`] nodes live at.
//!
//! Unlike the teacher's `Quantity!`-macro family of physical units (dBm, Hz, metres...),
//! ticks are a plain saturating integer newtype: there is only one unit of time in this
//! simulator and no unit conversions ever occur, so the extra generality would be dead
//! weight. `Position` keeps the `f64` coordinate pair the geometry genuinely needs.

use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};

/// An atomic simulation time step. All delays, message lengths, and countdown timers
/// are expressed in whole ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub const fn new(n: u64) -> Self {
        Tick(n)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Subtracts `rhs` ticks, clamping at zero rather than wrapping or panicking.
    /// Countdown timers are credited/debited by arbitrary amounts when a state is
    /// interrupted (see `node::fsm`); a timer can never usefully go negative.
    pub fn saturating_sub(self, rhs: Tick) -> Tick {
        Tick(self.0.saturating_sub(rhs.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Tick {
    fn from(value: u64) -> Self {
        Tick(value)
    }
}

impl From<Tick> for u64 {
    fn from(value: Tick) -> Self {
        value.0
    }
}

impl Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for Tick {
    type Output = Tick;

    fn add(self, rhs: Self) -> Self::Output {
        Tick(self.0 + rhs.0)
    }
}

impl AddAssign for Tick {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Tick {
    type Output = Tick;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Tick {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.saturating_sub(rhs);
    }
}

impl Sum for Tick {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Tick::ZERO, |a, b| a + b)
    }
}

/// A 2-D coordinate. Nodes are either static for the whole run or have their position
/// overwritten externally once per tick (see `topology::Topology::set_position`); the
/// simulator core does no mobility physics of its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(self, other: Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Integer propagation delay in ticks: `⌊distance⌋`.
    pub fn propagation_delay(self, other: Position) -> Tick {
        Tick::new(self.distance_to(other).floor() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    #[test]
    fn tick_saturates_at_zero() {
        let t = Tick::new(3);
        assert_eq!(t.saturating_sub(Tick::new(10)), Tick::ZERO);
        assert_eq!(t.saturating_sub(Tick::new(1)), Tick::new(2));
    }

    #[test]
    fn distance_matches_pythagoras() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_close(a.distance_to(b), 5.0);
        assert_eq!(a.propagation_delay(b), Tick::new(5));
    }

    #[test]
    fn propagation_delay_floors() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(0.0, 3.9);
        assert_eq!(a.propagation_delay(b), Tick::new(3));
    }
}
