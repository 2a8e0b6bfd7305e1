use chrono::{Datelike, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use crate::types::Schedule;

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Find the schedule active at `now`.
///
/// Schedules are tested in stored order and the first day-and-time match
/// wins; overlapping windows are resolved purely by that order. A window
/// with `start > end` crosses midnight and matches `now >= start || now <= end`.
/// Disabled schedules and schedules with malformed time strings are skipped.
pub fn resolve_schedule(schedules: &[Schedule], now: NaiveDateTime) -> Option<&Schedule> {
    let day = now.weekday();
    let time = now.time();

    for schedule in schedules {
        if !schedule.enabled {
            continue;
        }
        if !schedule.days.iter().any(|d| d.matches(day)) {
            continue;
        }

        let (start, end) = match (parse_hhmm(&schedule.start), parse_hhmm(&schedule.end)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                warn!(
                    schedule = %schedule.name,
                    start = %schedule.start,
                    end = %schedule.end,
                    "malformed schedule time window, skipping"
                );
                continue;
            }
        };

        let active = if start <= end {
            start <= time && time <= end
        } else {
            time >= start || time <= end
        };

        if active {
            debug!(schedule = %schedule.name, "active schedule found");
            return Some(schedule);
        }
    }

    None
}
