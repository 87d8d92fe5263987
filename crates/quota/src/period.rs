//! Calendar-month billing periods.
//!
//! Usage is bucketed by the calendar month containing the event, and every
//! bucket resets implicitly at the first instant of the next month (UTC).

use {
    chrono::{Datelike, TimeZone, Utc},
    serde::{Deserialize, Serialize},
};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// A (month, year) usage bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct BillingPeriod {
    /// 1-based calendar month.
    pub month: u32,
    pub year: i32,
}

impl BillingPeriod {
    /// Period containing the given epoch-millis instant (UTC).
    #[must_use]
    pub fn from_ms(now_ms: u64) -> Self {
        match Utc.timestamp_millis_opt(now_ms as i64).single() {
            Some(dt) => Self {
                month: dt.month(),
                year: dt.year(),
            },
            // Out-of-range input; clamp to the epoch month.
            None => Self {
                month: 1,
                year: 1970,
            },
        }
    }

    #[must_use]
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                month: 1,
                year: self.year + 1,
            }
        } else {
            Self {
                month: self.month + 1,
                year: self.year,
            }
        }
    }

    /// First instant of this period, epoch millis (UTC).
    #[must_use]
    pub fn start_ms(&self) -> u64 {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .map(|dt| dt.timestamp_millis() as u64)
            .unwrap_or(0)
    }

    /// When usage in this period resets: the first instant of the next month.
    #[must_use]
    pub fn reset_at_ms(&self) -> u64 {
        self.next().start_ms()
    }

    /// Whole days (rounded up) from `now_ms` until the reset instant.
    #[must_use]
    pub fn days_until_reset(&self, now_ms: u64) -> u32 {
        let reset = self.reset_at_ms();
        let remaining = reset.saturating_sub(now_ms);
        (remaining.div_ceil(DAY_MS)) as u32
    }
}
