use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stored state of one named daily counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Counter name (e.g. "daily_sms_counter")
    pub name: String,
    /// UTC day the count applies to
    pub date: NaiveDate,
    /// Deliveries counted on `date`
    pub count: u32,
    /// When the count was last rolled over to zero
    pub last_reset: DateTime<Utc>,
    /// Last write
    pub updated_at: DateTime<Utc>,
}

impl CounterRecord {
    /// Fresh record for `today`
    pub fn new(name: &str, today: NaiveDate, now: DateTime<Utc>) -> Self {
        CounterRecord {
            name: name.to_string(),
            date: today,
            count: 0,
            last_reset: now,
            updated_at: now,
        }
    }

    /// Reset to zero if the record belongs to an earlier day
    ///
    /// Returns true when a rollover happened.
    pub fn roll_over(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        if self.date == today {
            return false;
        }
        self.date = today;
        self.count = 0;
        self.last_reset = now;
        self.updated_at = now;
        true
    }
}

/// Admin/observability view of a counter against its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub name: String,
    pub date: NaiveDate,
    pub sent_today: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub percentage_used: f64,
    pub is_exhausted: bool,
}

impl CounterSnapshot {
    pub fn new(name: &str, date: NaiveDate, count: u32, limit: u32) -> Self {
        let percentage_used = if limit == 0 {
            100.0
        } else {
            ((count as f64 / limit as f64) * 10000.0).round() / 100.0
        };

        CounterSnapshot {
            name: name.to_string(),
            date,
            sent_today: count,
            daily_limit: limit,
            remaining: limit.saturating_sub(count),
            percentage_used,
            is_exhausted: count >= limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_roll_over_same_day_keeps_count() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut record = CounterRecord::new("c", day(1), now);
        record.count = 7;

        assert!(!record.roll_over(day(1), now));
        assert_eq!(record.count, 7);
    }

    #[test]
    fn test_roll_over_new_day_resets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap();
        let mut record = CounterRecord::new("c", day(1), now);
        record.count = 299;

        assert!(record.roll_over(day(2), now));
        assert_eq!(record.count, 0);
        assert_eq!(record.date, day(2));
        assert_eq!(record.last_reset, now);
    }

    #[test]
    fn test_snapshot_math() {
        let snapshot = CounterSnapshot::new("c", day(1), 75, 300);
        assert_eq!(snapshot.remaining, 225);
        assert_eq!(snapshot.percentage_used, 25.0);
        assert!(!snapshot.is_exhausted);

        let snapshot = CounterSnapshot::new("c", day(1), 1, 3);
        assert_eq!(snapshot.percentage_used, 33.33);

        let snapshot = CounterSnapshot::new("c", day(1), 310, 300);
        assert_eq!(snapshot.remaining, 0);
        assert!(snapshot.is_exhausted);
    }
}
