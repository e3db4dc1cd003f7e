use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{ReviewGrade, ReviewLog};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("too many logs for a single session: {len}")]
    TooManyLogs { len: usize },
}

/// Aggregate summary for a finished study session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_reviews: u32,
    again: u32,
    good: u32,
}

impl SessionSummary {
    /// Build a summary from the grading log of a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if `completed_at` is before `started_at`.
    /// Returns `SessionSummaryError::TooManyLogs` if the log count cannot fit in `u32`.
    pub fn from_logs(
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        logs: &[ReviewLog],
    ) -> Result<Self, SessionSummaryError> {
        if completed_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        let total_reviews = u32::try_from(logs.len())
            .map_err(|_| SessionSummaryError::TooManyLogs { len: logs.len() })?;

        let mut again = 0_u32;
        let mut good = 0_u32;
        for log in logs {
            match log.grade {
                ReviewGrade::Again => again = again.saturating_add(1),
                ReviewGrade::Good => good = good.saturating_add(1),
            }
        }

        Ok(Self {
            started_at,
            completed_at,
            total_reviews,
            again,
            good,
        })
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn total_reviews(&self) -> u32 {
        self.total_reviews
    }

    #[must_use]
    pub fn again(&self) -> u32 {
        self.again
    }

    #[must_use]
    pub fn good(&self) -> u32 {
        self.good
    }
}
