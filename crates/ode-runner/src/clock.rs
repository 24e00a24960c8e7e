//! Wall-clock source for day rollover and midnight scheduling.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

/// Local wall-clock time. Abstracted so schedules can be tested on
/// simulated dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The host's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Time from `now` until the start of the next local calendar day.
pub fn until_next_midnight(now: NaiveDateTime) -> Duration {
    now.date()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn until_midnight_from_morning() {
        assert_eq!(until_next_midnight(at(10, 0, 0)), Duration::from_secs(14 * 3600));
    }

    #[test]
    fn until_midnight_at_midnight_is_full_day() {
        assert_eq!(until_next_midnight(at(0, 0, 0)), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn until_midnight_just_before() {
        assert_eq!(until_next_midnight(at(23, 59, 59)), Duration::from_secs(1));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(at(23, 0, 0));
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now().date(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }
}
