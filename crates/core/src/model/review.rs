use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::card::LeitnerBox;
use crate::model::ids::CardId;

//
// ─── REVIEW GRADE ─────────────────────────────────────────────────────────────
//

/// Pass/fail outcome of reviewing a card.
///
/// - `Again`: not recalled; the card relearns after a short delay
/// - `Good`: recalled; the card moves up one box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewGrade {
    Again,
    Good,
}

impl ReviewGrade {
    #[must_use]
    pub fn from_success(success: bool) -> Self {
        if success { Self::Good } else { Self::Again }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Good)
    }
}

//
// ─── REVIEW LOG ───────────────────────────────────────────────────────────────
//

/// Record of a single grading event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLog {
    pub card_id: CardId,
    pub reviewed_at: DateTime<Utc>,
    pub grade: ReviewGrade,
    pub previous_box: LeitnerBox,
    pub new_box: LeitnerBox,
}

impl ReviewLog {
    #[must_use]
    pub fn new(
        card_id: CardId,
        grade: ReviewGrade,
        reviewed_at: DateTime<Utc>,
        previous_box: LeitnerBox,
        new_box: LeitnerBox,
    ) -> Self {
        Self {
            card_id,
            reviewed_at,
            grade,
            previous_box,
            new_box,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
