use std::time::Duration;

use chrono::NaiveDate;

/// Process-local pacing state. Not persisted: a restart forgets same-day
/// usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerState {
    pub actions_today: u32,
    pub current_day: NaiveDate,
    pub quota: u32,
    pub interval: Duration,
}

impl RunnerState {
    pub fn new(quota: u32, interval: Duration, today: NaiveDate) -> Self {
        Self {
            actions_today: 0,
            current_day: today,
            quota,
            interval,
        }
    }

    /// Reset the counter when `today` differs from the tracked day.
    /// Returns true if a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if today == self.current_day {
            return false;
        }
        self.current_day = today;
        self.actions_today = 0;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.actions_today >= self.quota
    }

    pub fn remaining(&self) -> u32 {
        self.quota.saturating_sub(self.actions_today)
    }

    /// Count one recorded entry against today's quota.
    pub fn record_success(&mut self) {
        self.actions_today += 1;
    }
}
