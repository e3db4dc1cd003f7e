use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use recall_core::Clock;
use recall_core::model::{CardId, RequeuePolicy, ReviewGrade, ReviewLog, SessionSummary};
use recall_core::scheduler::Scheduler;
use storage::{ProgressStore, SaveScheduler};
use tracing::{debug, info, warn};

use super::progress::SessionProgress;
use crate::error::SessionError;
use crate::player::Player;

//
// ─── COMMANDS, STATES, EVENTS ──────────────────────────────────────────────────
//

/// User actions the session understands. Binding keys or buttons to these is up to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reveal the answer, or move on (failing the card if the answer is showing).
    Advance,
    /// Grade the current card as known and move on.
    MarkKnown,
    /// Go back one screen, or to the previous card.
    Rewind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ShowingQuestion,
    ShowingAnswer,
    /// Transient: entered after grading and left immediately for the next card.
    CardFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
}

/// Why a command did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// Grading was requested while no card is being shown.
    NoCurrentCard,
    /// Rewind at the start of the session.
    NothingToRewind,
}

/// Observable effects of one command, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Played { card_id: CardId, side: Side },
    Graded(ReviewLog),
    Requeued(CardId),
    Rewound(CardId),
    /// An earlier background save failed; progress is still held in memory.
    SaveFailed(String),
    Completed,
    Ignored(IgnoredReason),
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

/// Drives one card at a time through question → answer → grade → next card.
///
/// Every card that leaves the answer screen is graded; there is no skip.
/// All transitions are synchronous. Playback is requested and never awaited,
/// and saves are handed to the `SaveScheduler`.
pub struct SessionStateMachine {
    clock: Clock,
    scheduler: Scheduler,
    store: Arc<ProgressStore>,
    saves: Arc<dyn SaveScheduler>,
    player: Arc<dyn Player>,
    requeue: RequeuePolicy,
    queue: VecDeque<CardId>,
    history: Vec<CardId>,
    current: Option<CardId>,
    state: SessionState,
    logs: Vec<ReviewLog>,
    presented: usize,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionStateMachine {
    /// Create an idle session over `queue`. Nothing plays until the first `Advance`.
    #[must_use]
    pub fn new(
        queue: Vec<CardId>,
        store: Arc<ProgressStore>,
        saves: Arc<dyn SaveScheduler>,
        player: Arc<dyn Player>,
    ) -> Self {
        let clock = Clock::default_clock();
        Self {
            clock,
            scheduler: Scheduler::new(),
            store,
            saves,
            player,
            requeue: RequeuePolicy::default(),
            queue: queue.into(),
            history: Vec::new(),
            current: None,
            state: SessionState::Idle,
            logs: Vec::new(),
            presented: 0,
            started_at: clock.now(),
            completed_at: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.started_at = clock.now();
        self
    }

    #[must_use]
    pub fn with_requeue(mut self, requeue: RequeuePolicy) -> Self {
        self.requeue = requeue;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn current_card(&self) -> Option<&CardId> {
        self.current.as_ref()
    }

    /// Cards still waiting, front first.
    #[must_use]
    pub fn queue(&self) -> &VecDeque<CardId> {
        &self.queue
    }

    /// Previously presented cards, most recent last.
    #[must_use]
    pub fn history(&self) -> &[CardId] {
        &self.history
    }

    #[must_use]
    pub fn logs(&self) -> &[ReviewLog] {
        &self.logs
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Mutable access to the clock, so tests and replays can move time forward.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            presented: self.presented,
            graded: self.logs.len(),
            failed: self
                .logs
                .iter()
                .filter(|log| !log.grade.is_success())
                .count(),
            remaining: self.queue.len(),
            is_complete: self.is_complete(),
        }
    }

    /// Summarise the grades recorded so far.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Summary` if the log cannot be summarised.
    pub fn summary(&self) -> Result<SessionSummary, SessionError> {
        let completed_at = self.completed_at.unwrap_or_else(|| self.clock.now());
        Ok(SessionSummary::from_logs(
            self.started_at,
            completed_at,
            &self.logs,
        )?)
    }

    /// Apply one user command.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the progress store cannot be read or
    /// updated, and `SessionError::UnknownCard` if the current card vanished from it.
    pub fn apply(&mut self, command: Command) -> Result<Vec<SessionEvent>, SessionError> {
        match command {
            Command::Advance => self.advance(),
            Command::MarkKnown => self.mark_known(),
            Command::Rewind => self.rewind(),
        }
    }

    /// Primary forward action.
    ///
    /// # Errors
    ///
    /// See [`SessionStateMachine::apply`].
    pub fn advance(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        match self.state {
            SessionState::Idle | SessionState::CardFinished => self.load_next(&mut events)?,
            SessionState::ShowingQuestion => self.reveal_answer(&mut events)?,
            // Leaving the answer without marking it known counts as a failure.
            SessionState::ShowingAnswer => {
                self.grade_and_continue(ReviewGrade::Again, &mut events)?;
            }
        }
        Ok(events)
    }

    /// Grade the current card as known and load the next one.
    ///
    /// # Errors
    ///
    /// See [`SessionStateMachine::apply`].
    pub fn mark_known(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        self.grade(ReviewGrade::Good)
    }

    /// Grade the current card and load the next one.
    ///
    /// With no card on screen this is ignored and reported as
    /// `IgnoredReason::NoCurrentCard`.
    ///
    /// # Errors
    ///
    /// See [`SessionStateMachine::apply`].
    pub fn grade(&mut self, grade: ReviewGrade) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        self.grade_and_continue(grade, &mut events)?;
        Ok(events)
    }

    /// Step back.
    ///
    /// From the answer this replays the question of the same card. Otherwise
    /// the previous card returns and the current one goes back to the front of
    /// the queue; at session start this does nothing.
    ///
    /// # Errors
    ///
    /// See [`SessionStateMachine::apply`].
    pub fn rewind(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        match self.state {
            SessionState::ShowingAnswer => match self.current.clone() {
                Some(card_id) => {
                    self.state = SessionState::ShowingQuestion;
                    self.play(&card_id, Side::Front, &mut events)?;
                }
                None => events.push(SessionEvent::Ignored(IgnoredReason::NoCurrentCard)),
            },
            SessionState::ShowingQuestion | SessionState::Idle | SessionState::CardFinished => {
                self.step_back(&mut events)?;
            }
        }
        Ok(events)
    }

    fn load_next(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }

        while let Some(next) = self.queue.pop_front() {
            if self.store.get(&next)?.is_none() {
                warn!(card_id = %next, "skipping queued card missing from progress store");
                continue;
            }
            self.show_question(next, events)?;
            return Ok(());
        }

        self.state = SessionState::Idle;
        if self.completed_at.is_none() {
            let completed_at = self.clock.now();
            self.completed_at = Some(completed_at);
            info!(graded = self.logs.len(), "session complete");
        }
        self.player.stop();
        events.push(SessionEvent::Completed);
        Ok(())
    }

    fn show_question(
        &mut self,
        card_id: CardId,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), SessionError> {
        self.current = Some(card_id.clone());
        self.state = SessionState::ShowingQuestion;
        self.presented += 1;
        self.play(&card_id, Side::Front, events)
    }

    fn reveal_answer(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
        let Some(card_id) = self.current.clone() else {
            events.push(SessionEvent::Ignored(IgnoredReason::NoCurrentCard));
            return Ok(());
        };
        self.play(&card_id, Side::Back, events)?;
        self.state = SessionState::ShowingAnswer;
        Ok(())
    }

    fn grade_and_continue(
        &mut self,
        grade: ReviewGrade,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), SessionError> {
        if self.grade_current(grade, events)? {
            self.load_next(events)?;
        }
        Ok(())
    }

    /// Returns `false` when there was nothing to grade.
    fn grade_current(
        &mut self,
        grade: ReviewGrade,
        events: &mut Vec<SessionEvent>,
    ) -> Result<bool, SessionError> {
        let Some(card_id) = self.current.clone() else {
            warn!("grade requested with no current card");
            events.push(SessionEvent::Ignored(IgnoredReason::NoCurrentCard));
            return Ok(false);
        };

        let record = self
            .store
            .get(&card_id)?
            .ok_or_else(|| SessionError::UnknownCard(card_id.clone()))?;
        let applied = self
            .scheduler
            .apply_review(&card_id, &record, grade, self.clock.now());
        self.store.record_review(&card_id, applied.record)?;
        if let Some(err) = self.saves.schedule_save() {
            warn!(error = %err, "progress not yet durable");
            events.push(SessionEvent::SaveFailed(err.to_string()));
        }

        debug!(
            card_id = %card_id,
            grade = ?grade,
            from = applied.log.previous_box.value(),
            to = applied.log.new_box.value(),
            "graded card"
        );
        self.logs.push(applied.log.clone());
        events.push(SessionEvent::Graded(applied.log));

        if !grade.is_success() && self.requeue == RequeuePolicy::Immediate {
            self.queue.push_back(card_id.clone());
            events.push(SessionEvent::Requeued(card_id.clone()));
        }
        self.current = None;
        self.history.push(card_id);
        self.state = SessionState::CardFinished;
        Ok(true)
    }

    fn step_back(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
        let Some(previous) = self.history.pop() else {
            debug!("rewind at session start ignored");
            events.push(SessionEvent::Ignored(IgnoredReason::NothingToRewind));
            return Ok(());
        };

        if let Some(current) = self.current.take() {
            self.queue.push_front(current);
        }
        // A failed card may be waiting at the back; it is current again now.
        if let Some(pos) = self.queue.iter().position(|id| *id == previous) {
            self.queue.remove(pos);
        }
        self.completed_at = None;

        events.push(SessionEvent::Rewound(previous.clone()));
        self.show_question(previous, events)
    }

    fn play(
        &self,
        card_id: &CardId,
        side: Side,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), SessionError> {
        let record = self
            .store
            .get(card_id)?
            .ok_or_else(|| SessionError::UnknownCard(card_id.clone()))?;
        let media = match side {
            Side::Front => record.front(),
            Side::Back => record.back(),
        };
        self.player.play(media);
        events.push(SessionEvent::Played {
            card_id: card_id.clone(),
            side,
        });
        Ok(())
    }
}

impl fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("queue_len", &self.queue.len())
            .field("history_len", &self.history.len())
            .field("logs_len", &self.logs.len())
            .field("started_at", &self.started_at)
            .field("completed_at", &self.completed_at)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::RecordingPlayer;
    use chrono::Duration;
    use recall_core::model::{CardRecord, DiscoveredCard, LeitnerBox, MediaRef};
    use recall_core::time::{fixed_clock, fixed_now};
    use storage::ImmediateSave;

    struct Harness {
        store: Arc<ProgressStore>,
        player: Arc<RecordingPlayer>,
        machine: SessionStateMachine,
    }

    fn harness(ids: &[&str], queue: &[&str]) -> Harness {
        let store = Arc::new(ProgressStore::in_memory());
        store
            .merge(
                ids.iter()
                    .map(|id| DiscoveredCard::new(*id, format!("{id}-front"), format!("{id}-back"))),
            )
            .unwrap();
        let player = Arc::new(RecordingPlayer::new());
        let machine = SessionStateMachine::new(
            queue.iter().map(|id| CardId::new(*id)).collect(),
            Arc::clone(&store),
            Arc::new(ImmediateSave::new(Arc::clone(&store))),
            player.clone(),
        )
        .with_clock(fixed_clock());
        Harness {
            store,
            player,
            machine,
        }
    }

    fn set_record(store: &ProgressStore, id: &str, value: u8, due: DateTime<Utc>) {
        let record = CardRecord::from_persisted(
            LeitnerBox::new(value).unwrap(),
            due,
            MediaRef::new(format!("{id}-front")),
            MediaRef::new(format!("{id}-back")),
        );
        store.record_review(&CardId::new(id), record).unwrap();
    }

    fn record(store: &ProgressStore, id: &str) -> CardRecord {
        store.get(&CardId::new(id)).unwrap().unwrap()
    }

    fn ids(queue: &VecDeque<CardId>) -> Vec<&str> {
        queue.iter().map(CardId::as_str).collect()
    }

    #[test]
    fn advance_walks_question_then_answer() {
        let mut h = harness(&["a", "b"], &["a", "b"]);

        let events = h.machine.advance().unwrap();
        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
        assert_eq!(
            events,
            vec![SessionEvent::Played {
                card_id: CardId::new("a"),
                side: Side::Front
            }]
        );

        h.machine.advance().unwrap();
        assert_eq!(h.machine.state(), SessionState::ShowingAnswer);
        assert_eq!(
            h.player.played(),
            vec![MediaRef::new("a-front"), MediaRef::new("a-back")]
        );
    }

    #[test]
    fn advancing_past_answer_fails_and_requeues() {
        let mut h = harness(&["a", "b"], &["a", "b"]);
        let now = fixed_now();
        set_record(&h.store, "a", 1, now - Duration::seconds(10));

        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        let events = h.machine.advance().unwrap();

        let a = record(&h.store, "a");
        assert_eq!(a.leitner_box(), LeitnerBox::LEARNING);
        assert_eq!(a.due(), now + Duration::seconds(300));
        assert!(events.contains(&SessionEvent::Requeued(CardId::new("a"))));
        assert_eq!(h.machine.current_card(), Some(&CardId::new("b")));
        assert_eq!(ids(h.machine.queue()), vec!["a"]);
        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
    }

    #[test]
    fn failed_single_card_resurfaces_immediately() {
        let mut h = harness(&["a"], &["a"]);
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();

        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
        assert!(!h.machine.is_complete());
    }

    #[test]
    fn next_session_policy_does_not_requeue() {
        let mut h = harness(&["a"], &["a"]);
        h.machine = h.machine.with_requeue(RequeuePolicy::NextSession);

        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        let events = h.machine.advance().unwrap();

        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Requeued(_))));
        assert!(events.contains(&SessionEvent::Completed));
        assert_eq!(record(&h.store, "a").leitner_box(), LeitnerBox::LEARNING);
    }

    #[test]
    fn mark_known_on_new_card_moves_to_learning() {
        let mut h = harness(&["a"], &["a"]);
        h.machine.advance().unwrap();

        let events = h.machine.mark_known().unwrap();

        let a = record(&h.store, "a");
        assert_eq!(a.leitner_box(), LeitnerBox::LEARNING);
        assert_eq!(a.due(), fixed_now() + Duration::seconds(86_400));
        assert_eq!(events.last(), Some(&SessionEvent::Completed));
        assert_eq!(h.machine.state(), SessionState::Idle);
        assert!(h.machine.is_complete());
    }

    #[test]
    fn mark_known_from_answer_advances_to_next_card() {
        let mut h = harness(&["a", "b"], &["a", "b"]);
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        h.machine.mark_known().unwrap();

        assert_eq!(h.machine.current_card(), Some(&CardId::new("b")));
        assert_eq!(h.machine.history(), &[CardId::new("a")]);
        assert!(h.machine.queue().is_empty());
    }

    #[test]
    fn grading_without_a_card_is_ignored() {
        let mut h = harness(&["a"], &["a"]);
        let events = h.machine.mark_known().unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::Ignored(IgnoredReason::NoCurrentCard)]
        );
        assert_eq!(h.machine.state(), SessionState::Idle);
        assert_eq!(record(&h.store, "a").leitner_box(), LeitnerBox::NEW);
    }

    #[test]
    fn rewind_at_session_start_is_a_no_op() {
        let mut h = harness(&["a"], &["a"]);
        h.machine.advance().unwrap();

        let events = h.machine.rewind().unwrap();

        assert_eq!(
            events,
            vec![SessionEvent::Ignored(IgnoredReason::NothingToRewind)]
        );
        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
    }

    #[test]
    fn rewind_from_answer_replays_question_of_same_card() {
        let mut h = harness(&["a", "b"], &["a", "b"]);
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();

        h.machine.rewind().unwrap();

        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
        assert_eq!(h.player.last(), Some(MediaRef::new("a-front")));
        assert!(h.machine.history().is_empty());
    }

    #[test]
    fn rewind_returns_previous_card_and_keeps_current_queued() {
        let mut h = harness(&["a", "b", "c"], &["a", "b", "c"]);
        h.machine.advance().unwrap();
        h.machine.mark_known().unwrap();
        assert_eq!(h.machine.current_card(), Some(&CardId::new("b")));

        let events = h.machine.rewind().unwrap();

        assert_eq!(events[0], SessionEvent::Rewound(CardId::new("a")));
        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
        assert_eq!(ids(h.machine.queue()), vec!["b", "c"]);
        assert_eq!(h.player.last(), Some(MediaRef::new("a-front")));
    }

    #[test]
    fn rewind_to_failed_card_drops_its_requeued_copy() {
        let mut h = harness(&["a", "b"], &["a", "b"]);
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        assert_eq!(ids(h.machine.queue()), vec!["a"]);

        h.machine.rewind().unwrap();

        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
        assert_eq!(ids(h.machine.queue()), vec!["b"]);
    }

    #[test]
    fn rewind_after_completion_reopens_session() {
        let mut h = harness(&["a"], &["a"]);
        h.machine.advance().unwrap();
        h.machine.mark_known().unwrap();
        assert!(h.machine.is_complete());

        h.machine.rewind().unwrap();

        assert!(!h.machine.is_complete());
        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
        let events = h.machine.mark_known().unwrap();
        assert_eq!(events.last(), Some(&SessionEvent::Completed));
        assert_eq!(record(&h.store, "a").leitner_box(), LeitnerBox::REVIEW);
    }

    #[test]
    fn empty_queue_completes_on_first_advance() {
        let mut h = harness(&[], &[]);
        let events = h.machine.advance().unwrap();
        assert_eq!(events, vec![SessionEvent::Completed]);
        assert!(h.machine.is_complete());
        assert!(h.player.played().is_empty());
    }

    #[test]
    fn unknown_queued_cards_are_skipped() {
        let mut h = harness(&["a"], &["ghost", "a"]);
        h.machine.advance().unwrap();
        assert_eq!(h.machine.current_card(), Some(&CardId::new("a")));
    }

    #[test]
    fn progress_and_summary_track_grades() {
        let mut h = harness(&["a", "b"], &["a", "b"]);
        h.machine.advance().unwrap();
        h.machine.mark_known().unwrap();
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        h.machine.advance().unwrap();
        h.machine.mark_known().unwrap();

        let progress = h.machine.progress();
        assert_eq!(progress.graded, 3);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.presented, 3);
        assert!(progress.is_complete);

        let summary = h.machine.summary().unwrap();
        assert_eq!(summary.total_reviews(), 3);
        assert_eq!(summary.again(), 1);
        assert_eq!(summary.good(), 2);
    }

    #[test]
    fn apply_dispatches_commands() {
        let mut h = harness(&["a"], &["a"]);
        h.machine.apply(Command::Advance).unwrap();
        h.machine.apply(Command::Advance).unwrap();
        h.machine.apply(Command::Rewind).unwrap();
        assert_eq!(h.machine.state(), SessionState::ShowingQuestion);
        h.machine.apply(Command::MarkKnown).unwrap();
        assert!(h.machine.is_complete());
    }
}
