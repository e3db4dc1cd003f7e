use chrono::{DateTime, Duration, Utc};

use crate::model::{CardId, CardRecord, LeitnerBox, ReviewGrade, ReviewLog};
use crate::time::SECONDS_PER_DAY;

/// Days until the next review, indexed by the box a card lands in.
///
/// Box 3 is effectively permanent retirement.
pub const INTERVAL_DAYS: [i64; 4] = [0, 1, 4, 36_500];

/// Delay before a failed card resurfaces, independent of the box table.
pub const RELEARN_DELAY_SECS: i64 = 300;

//
// ─── APPLIED REVIEW ────────────────────────────────────────────────────────────
//

/// Outcome of applying a review: the rescheduled record and its log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedReview {
    pub record: CardRecord,
    pub log: ReviewLog,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Leitner-box scheduler with fixed intervals.
///
/// Pure: the result depends only on the record, the grade, and `now`.
///
/// # Examples
///
/// ```
/// # use recall_core::scheduler::Scheduler;
/// # use recall_core::model::{DiscoveredCard, LeitnerBox, ReviewGrade};
/// let scheduler = Scheduler::new();
/// let now = recall_core::time::fixed_now();
/// let record = DiscoveredCard::new("0001", "a.mp3", "b.mp3").to_new_record();
///
/// let next = scheduler.grade(&record, ReviewGrade::Good, now);
/// assert_eq!(next.leitner_box(), LeitnerBox::LEARNING);
/// assert_eq!(next.due(), now + chrono::Duration::days(1));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Review interval for a card sitting in `leitner_box`.
    #[must_use]
    pub fn interval_for(leitner_box: LeitnerBox) -> Duration {
        let days = INTERVAL_DAYS[usize::from(leitner_box.value())];
        Duration::seconds(days * SECONDS_PER_DAY)
    }

    /// Compute the rescheduled record for a review.
    ///
    /// - `Good`: move up one box (capped at 3), due after that box's interval
    /// - `Again`: back to box 1, due after the relearn delay
    #[must_use]
    pub fn grade(
        &self,
        record: &CardRecord,
        grade: ReviewGrade,
        now: DateTime<Utc>,
    ) -> CardRecord {
        let (leitner_box, delay) = if grade.is_success() {
            let promoted = record.leitner_box().promoted();
            (promoted, Self::interval_for(promoted))
        } else {
            (LeitnerBox::LEARNING, Duration::seconds(RELEARN_DELAY_SECS))
        };
        // Saturate instead of panicking for clocks near the end of representable time.
        let due = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        record.rescheduled(leitner_box, due)
    }

    /// Grade a card and produce the matching log entry.
    #[must_use]
    pub fn apply_review(
        &self,
        card_id: &CardId,
        record: &CardRecord,
        grade: ReviewGrade,
        reviewed_at: DateTime<Utc>,
    ) -> AppliedReview {
        let updated = self.grade(record, grade, reviewed_at);
        let log = ReviewLog::new(
            card_id.clone(),
            grade,
            reviewed_at,
            record.leitner_box(),
            updated.leitner_box(),
        );
        AppliedReview {
            record: updated,
            log,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
