//! Schedule Evaluator: a pure function deciding whether a schedule
//! fires at a given instant. Integer modular arithmetic on UTC
//! calendar fields avoids DST and leap-second ambiguity; there is no
//! cron expression parser here by design.

use crate::model::{Recurring, Schedule};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Decide whether `schedule` fires at `now`. Pure and stateless: the
/// same inputs always produce the same result.
pub fn should_run(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    if schedule.start_date_time > now {
        return false;
    }

    if minute_of_day(schedule.time) == minute_of_day(now) {
        return true;
    }

    if schedule.recurring_period == 0 {
        return false;
    }

    let period = i64::from(schedule.recurring_period);

    match schedule.recurring {
        Recurring::Daily => {
            let hours = (now - schedule.start_date_time).num_hours();
            hours >= 0 && (hours / 24) % period == 0
        }
        Recurring::Weekly => {
            let hours = (now - schedule.start_date_time).num_hours();
            hours >= 0 && (hours / (24 * 7)) % period == 0
        }
        Recurring::Monthly => {
            let months = i64::from(now.year() - schedule.start_date_time.year()) * 12
                + i64::from(now.month() as i32 - schedule.start_date_time.month() as i32);
            months >= 0 && months % period == 0
        }
        Recurring::None => false,
    }
}

/// Minutes since UTC midnight, i.e. time-of-day truncated to minute
/// precision, independent of the calendar date.
fn minute_of_day(t: DateTime<Utc>) -> u32 {
    t.hour() * 60 + t.minute()
}
