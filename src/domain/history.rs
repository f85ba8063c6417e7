//! Encounter history periods
//!
//! Each lifecycle phase of an encounter is a half-open period whose
//! boundaries may still be unknown. The rules that fill and repair these
//! periods live in [`crate::core::lifecycle`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A (start, end) pair where either boundary may still be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Start of the period
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,

    /// End of the period, `None` while the phase is ongoing
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Period {
    /// A period that started at `at` and has not ended yet
    pub fn open(at: DateTime<Utc>) -> Self {
        Self {
            start: Some(at),
            end: None,
        }
    }

    /// A period with both boundaries known
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Both boundaries are present
    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Neither boundary is present
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Lifecycle history of an encounter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Patient registered and waiting
    #[serde(default)]
    pub arrived: Period,

    /// Patient being attended
    #[serde(default)]
    pub in_progress: Period,

    /// Visit concluded
    #[serde(default)]
    pub finished: Period,

    /// Visit cancelled
    #[serde(default)]
    pub cancelled: Period,
}

impl History {
    /// Ordered boundaries of the arrived, in-progress and finished periods
    pub fn timeline(&self) -> [Option<DateTime<Utc>>; 6] {
        [
            self.arrived.start,
            self.arrived.end,
            self.in_progress.start,
            self.in_progress.end,
            self.finished.start,
            self.finished.end,
        ]
    }

    /// Rebuilds the three ordered periods from a timeline, keeping `cancelled`
    pub fn with_timeline(&self, points: [Option<DateTime<Utc>>; 6]) -> Self {
        Self {
            arrived: Period {
                start: points[0],
                end: points[1],
            },
            in_progress: Period {
                start: points[2],
                end: points[3],
            },
            finished: Period {
                start: points[4],
                end: points[5],
            },
            cancelled: self.cancelled,
        }
    }
}
