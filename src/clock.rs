//! Calendar source for flush partitioning and the listing window.

use chrono::NaiveDate;

/// Supplies "today". Hits are attributed to the date a flush runs, not the
/// date they were recorded, so a hit counted at 23:59 and flushed at 00:01
/// lands on the later day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
