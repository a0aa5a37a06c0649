//! Scheduled-wakeup computation.
//!
//! Hosts that support it schedule the next export session at shutdown;
//! the engine only computes when that should be.

use chrono::{DateTime, Duration, NaiveTime, TimeZone};

/// Won't schedule a wakeup closer than this to "now"; the session that
/// is shutting down counts as today's run.
const MIN_LEAD_SECS: i64 = 120;

/// Next occurrence of the configured wall-clock time (`minutes_of_day`
/// after midnight) that is at least two minutes away, in `now`'s zone.
/// `None` if the wall-clock time does not exist (invalid config or a
/// DST gap).
pub fn next_wakeup<Tz: TimeZone>(minutes_of_day: u16, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(
        u32::from(minutes_of_day) / 60,
        u32::from(minutes_of_day) % 60,
        0,
    )?;
    let naive = now.date_naive().and_time(time);
    let mut candidate = now.timezone().from_local_datetime(&naive).earliest()?;

    if candidate.clone() - now.clone() <= Duration::seconds(MIN_LEAD_SECS) {
        candidate = candidate + Duration::days(1);
    }
    Some(candidate)
}
