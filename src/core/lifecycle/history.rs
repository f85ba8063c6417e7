//! History period rules
//!
//! [`record_event`] is what gets persisted. [`repair_history`] is only ever
//! applied to a copy used for building a payload.

use crate::domain::encounter::{Encounter, EncounterStatus};
use crate::domain::history::{History, Period};
use chrono::{DateTime, Duration, Utc};

/// Smallest gap inserted between two boundaries by [`repair_history`]
pub fn epsilon() -> Duration {
    Duration::seconds(1)
}

/// Applies one lifecycle event to a history.
///
/// Periods not touched by the status are carried over unchanged.
pub fn record_event(
    history: &History,
    status: EncounterStatus,
    process_date: DateTime<Utc>,
    is_paid: bool,
) -> History {
    let mut next = history.clone();
    match status {
        EncounterStatus::Arrived => {
            next.arrived = Period::open(process_date);
        }
        EncounterStatus::InProgress => {
            next.arrived = Period {
                start: history.arrived.start,
                end: Some(process_date),
            };
            next.in_progress = Period::open(process_date);
        }
        EncounterStatus::Finished => {
            next.in_progress = Period {
                start: history.in_progress.start,
                end: Some(process_date),
            };
            next.finished = if is_paid {
                Period {
                    start: history.in_progress.start,
                    end: Some(process_date),
                }
            } else {
                Period::open(process_date)
            };
        }
        EncounterStatus::Cancelled => {
            next.cancelled = Period::closed(process_date, process_date);
        }
    }
    next
}

/// A boundary is missing or two consecutive boundaries are out of order
pub fn needs_repair(history: &History) -> bool {
    let points = history.timeline();
    if points.iter().any(Option::is_none) {
        return true;
    }
    points.windows(2).any(|w| w[0] > w[1])
}

/// Returns a copy of the history with a strictly increasing timeline.
///
/// Missing boundaries take the previous known value (the first known one at
/// the head). An end that overshoots the next period's start is capped at
/// that start, then every boundary not after its predecessor is moved to
/// predecessor + [`epsilon`]. A history without any boundary is returned as is.
pub fn repair_history(history: &History) -> History {
    let timeline = history.timeline();
    let Some(first) = timeline.iter().flatten().next().copied() else {
        return history.clone();
    };

    let mut last = first;
    let mut points = timeline.map(|p| {
        if let Some(t) = p {
            last = t;
        }
        last
    });

    for end in [1, 3] {
        let (start, next_start) = (points[end - 1], points[end + 1]);
        if points[end] > next_start && next_start > start {
            points[end] = next_start;
        }
    }

    for i in 1..points.len() {
        if points[i] <= points[i - 1] {
            points[i] = points[i - 1] + epsilon();
        }
    }

    history.with_timeline(points.map(Some))
}

/// Every boundary present and none before its predecessor
pub fn is_monotonic(history: &History) -> bool {
    let points = history.timeline();
    points.iter().all(Option::is_some) && points.windows(2).all(|w| w[0] <= w[1])
}

/// Why an encounter cannot be submitted yet, if anything
pub fn readiness_issue(encounter: &Encounter) -> Option<&'static str> {
    if encounter.status != EncounterStatus::Finished {
        return Some("encounter is not finished");
    }
    if !encounter.has_required_references() {
        return Some("patient, practitioner or location reference is missing");
    }
    if encounter.history.arrived.start.is_none() {
        return Some("arrival time is missing");
    }
    if encounter.history.finished.end.is_none() {
        return Some("finish time is missing");
    }
    None
}

pub fn is_ready_submission(encounter: &Encounter) -> bool {
    readiness_issue(encounter).is_none()
}
