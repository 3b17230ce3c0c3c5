use serde::{Deserialize, Serialize};

/// Number of hourly slots in a regular day-ahead planning window.
pub const DAY_AHEAD_SLOTS: usize = 24;

/// Ordered sequence of hourly slots.
///
/// Slot 0 has no predecessor: models substitute the initial conditions
/// (initial SOC, initial unit state) wherever they reference "the previous slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeHorizon {
    slots: usize,
}

impl Default for TimeHorizon {
    fn default() -> Self {
        Self::day_ahead()
    }
}

impl TimeHorizon {
    pub fn new(slots: usize) -> Self {
        Self { slots }
    }

    pub fn day_ahead() -> Self {
        Self::new(DAY_AHEAD_SLOTS)
    }

    pub fn len(&self) -> usize {
        self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots == 0
    }

    pub fn slots(&self) -> std::ops::Range<usize> {
        0..self.slots
    }

    /// Slot preceding `t`, or `None` for the first slot.
    pub fn previous(&self, t: usize) -> Option<usize> {
        t.checked_sub(1)
    }

    /// Every ordered pair `(a, b)` of distinct slots.
    pub fn ordered_pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        let n = self.slots;
        (0..n).flat_map(move |a| (0..n).filter(move |&b| b != a).map(move |b| (a, b)))
    }
}
