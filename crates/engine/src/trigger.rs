//! Cron-based scheduling trigger.
//!
//! Accepts the standard five-field cron form and computes fire times.  The
//! schedule loop that uses this lives at the binary edge; runs triggered by
//! it never overlap — a run that overruns its interval causes missed fire
//! times to be skipped, not queued (see DESIGN.md).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Parsed cron schedule with next-fire computation.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
}

impl CronTrigger {
    /// Parse a five-field cron expression (`minute hour day month weekday`).
    ///
    /// The underlying crate wants a seconds field, so the expression is
    /// normalized by prefixing `0`; other field counts are rejected rather
    /// than guessed at.
    pub fn new(expression: &str) -> Result<Self, EngineError> {
        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(EngineError::InvalidCron {
                expr: expression.to_owned(),
                message: format!("expected 5 fields, got {fields}"),
            });
        }
        let normalized = format!("0 {expression}");
        let schedule = Schedule::from_str(&normalized).map_err(|e| EngineError::InvalidCron {
            expr: expression.to_owned(),
            message: e.to_string(),
        })?;
        Ok(Self {
            expression: expression.to_owned(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// The next `count` fire times after `from`.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// Sleep until the next fire time, or return `None` on cancellation
    /// (or if the schedule has no future fire times).
    pub async fn sleep_until_next(&self, cancel: &CancellationToken) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        let next = self.next_fire(now)?;
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(wait) => Some(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn hourly_schedule_fires_on_the_hour() {
        let trigger = CronTrigger::new("0 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2018, 11, 3, 7, 30, 0).unwrap();
        let next = trigger.next_fire(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2018, 11, 3, 8, 0, 0).unwrap());
    }

    #[test]
    fn upcoming_returns_consecutive_fire_times() {
        let trigger = CronTrigger::new("0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2018, 11, 3, 7, 0, 1).unwrap();
        let times = trigger.upcoming(from, 3);
        assert_eq!(times.len(), 3);
        assert!(times.windows(2).all(|w| w[1] - w[0] == chrono::Duration::hours(1)));
        assert!(times.iter().all(|t| t.minute() == 0));
    }

    #[test]
    fn six_field_expression_is_rejected() {
        let err = CronTrigger::new("0 0 * * * *").unwrap_err();
        assert!(matches!(err, EngineError::InvalidCron { .. }));
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(CronTrigger::new("every hour or so").unwrap_err().to_string().contains("invalid cron"));
    }
}
