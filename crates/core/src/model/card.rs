use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, MediaRef};
use crate::time::epoch;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("box must be between 0 and {max}, got {provided}")]
    InvalidBox { provided: u8, max: u8 },
}

//
// ─── LEITNER BOX ───────────────────────────────────────────────────────────────
//

/// Leitner bucket a card currently sits in.
///
/// - `0`: new, or failed and not yet graded today; always eligible
/// - `1`: learning
/// - `2`: review
/// - `3`: retired
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LeitnerBox(u8);

impl LeitnerBox {
    pub const NEW: Self = Self(0);
    pub const LEARNING: Self = Self(1);
    pub const REVIEW: Self = Self(2);
    pub const RETIRED: Self = Self(3);

    /// Highest box index.
    pub const MAX: u8 = 3;

    /// Creates a box from its index.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidBox` if `value` is above [`LeitnerBox::MAX`].
    pub fn new(value: u8) -> Result<Self, CardError> {
        if value > Self::MAX {
            return Err(CardError::InvalidBox {
                provided: value,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// The next box up, saturating at retirement.
    #[must_use]
    pub fn promoted(self) -> Self {
        Self((self.0 + 1).min(Self::MAX))
    }

    #[must_use]
    pub fn is_new(self) -> bool {
        self == Self::NEW
    }

    #[must_use]
    pub fn is_retired(self) -> bool {
        self == Self::RETIRED
    }

    /// Boxes 1 and 2 are the ones whose due time matters.
    #[must_use]
    pub fn is_in_rotation(self) -> bool {
        !self.is_new() && !self.is_retired()
    }
}

impl TryFrom<u8> for LeitnerBox {
    type Error = CardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LeitnerBox> for u8 {
    fn from(value: LeitnerBox) -> Self {
        value.0
    }
}

//
// ─── CARD RECORD ───────────────────────────────────────────────────────────────
//

/// Progress for one card: its box, when it is next due, and its media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    leitner_box: LeitnerBox,
    due: DateTime<Utc>,
    front: MediaRef,
    back: MediaRef,
}

impl CardRecord {
    /// A never-reviewed card: box 0, due at the epoch.
    #[must_use]
    pub fn new_card(front: MediaRef, back: MediaRef) -> Self {
        Self {
            leitner_box: LeitnerBox::NEW,
            due: epoch(),
            front,
            back,
        }
    }

    /// Rehydrate a record from persisted storage.
    #[must_use]
    pub fn from_persisted(
        leitner_box: LeitnerBox,
        due: DateTime<Utc>,
        front: MediaRef,
        back: MediaRef,
    ) -> Self {
        Self {
            leitner_box,
            due,
            front,
            back,
        }
    }

    #[must_use]
    pub fn leitner_box(&self) -> LeitnerBox {
        self.leitner_box
    }

    #[must_use]
    pub fn due(&self) -> DateTime<Utc> {
        self.due
    }

    #[must_use]
    pub fn front(&self) -> &MediaRef {
        &self.front
    }

    #[must_use]
    pub fn back(&self) -> &MediaRef {
        &self.back
    }

    /// True for reviews in rotation whose due time has passed.
    ///
    /// New cards are not "due reviews"; they are selected separately.
    #[must_use]
    pub fn is_due_review(&self, now: DateTime<Utc>) -> bool {
        self.leitner_box.is_in_rotation() && self.due <= now
    }

    /// True when the card may enter a session at `now`.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.leitner_box.is_new() || self.is_due_review(now)
    }

    pub(crate) fn rescheduled(&self, leitner_box: LeitnerBox, due: DateTime<Utc>) -> Self {
        Self {
            leitner_box,
            due,
            front: self.front.clone(),
            back: self.back.clone(),
        }
    }
}

/// A card reported by a card source: identity plus its two recordings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCard {
    pub id: CardId,
    pub front: MediaRef,
    pub back: MediaRef,
}

impl DiscoveredCard {
    #[must_use]
    pub fn new(id: impl Into<String>, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id: CardId::new(id),
            front: MediaRef::new(front),
            back: MediaRef::new(back),
        }
    }

    /// The record a brand-new card starts with.
    #[must_use]
    pub fn to_new_record(&self) -> CardRecord {
        CardRecord::new_card(self.front.clone(), self.back.clone())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
