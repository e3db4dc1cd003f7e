use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rng;
use rand::seq::SliceRandom;

use recall_core::model::{CardId, CardRecord, StudySettings};

/// Selection result for a session build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionPlan {
    pub queue: Vec<CardId>,
    pub due_selected: usize,
    pub new_selected: usize,
}

impl SessionPlan {
    /// Total number of cards in this plan.
    #[must_use]
    pub fn total(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is due and no new cards are available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Picks and orders the working set of one session.
///
/// Every eligible review is included, even past `session_limit`; new cards
/// fill whatever room is left, up to `new_card_cap`, lowest ids first.
pub struct SessionQueueBuilder {
    session_limit: usize,
    new_card_cap: usize,
    shuffle: bool,
}

impl SessionQueueBuilder {
    #[must_use]
    pub fn new(settings: &StudySettings) -> Self {
        Self {
            session_limit: usize::try_from(settings.session_limit()).unwrap_or(usize::MAX),
            new_card_cap: usize::try_from(settings.new_card_cap()).unwrap_or(usize::MAX),
            shuffle: settings.shuffle(),
        }
    }

    /// Override the shuffle setting.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Build a session plan using the thread-local RNG for shuffling.
    pub fn build<'a>(
        self,
        records: impl IntoIterator<Item = (&'a CardId, &'a CardRecord)>,
        now: DateTime<Utc>,
    ) -> SessionPlan {
        self.build_with_rng(records, now, &mut rng())
    }

    /// Build a session plan, shuffling with `rng` when enabled.
    ///
    /// - due reviews (boxes 1–2, `due <= now`) come first, oldest due first
    /// - new cards (box 0) follow in ascending id order
    /// - retired cards never enter a session
    pub fn build_with_rng<'a, R: Rng + ?Sized>(
        self,
        records: impl IntoIterator<Item = (&'a CardId, &'a CardRecord)>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> SessionPlan {
        let mut due: Vec<(&CardId, &CardRecord)> = Vec::new();
        let mut new: Vec<&CardId> = Vec::new();
        for (id, record) in records {
            if record.is_due_review(now) {
                due.push((id, record));
            } else if record.leitner_box().is_new() {
                new.push(id);
            }
        }

        due.sort_by(|(a_id, a), (b_id, b)| a.due().cmp(&b.due()).then_with(|| a_id.cmp(b_id)));
        new.sort();

        let slots = self.session_limit.saturating_sub(due.len());
        let take_new = slots.min(self.new_card_cap);
        new.truncate(take_new);

        let due_selected = due.len();
        let new_selected = new.len();
        let mut queue: Vec<CardId> = due
            .into_iter()
            .map(|(id, _)| id.clone())
            .chain(new.into_iter().cloned())
            .collect();

        if self.shuffle {
            queue.as_mut_slice().shuffle(rng);
        }

        SessionPlan {
            queue,
            due_selected,
            new_selected,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
