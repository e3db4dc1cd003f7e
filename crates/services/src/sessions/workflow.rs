use std::sync::Arc;

use recall_core::model::{DiscoveredCard, SessionSummary, StudySettings};
use storage::{ProgressStore, SaveQueue};
use tracing::{info, warn};

use super::machine::SessionStateMachine;
use super::plan::SessionQueueBuilder;
use crate::Clock;
use crate::error::{SessionError, SourceError};
use crate::player::Player;
use crate::source::CardSource;

/// A running session together with the saver it writes through.
#[derive(Debug)]
#[must_use = "call `finish` so graded progress is flushed to disk"]
pub struct ActiveSession {
    pub machine: SessionStateMachine,
    pub due_selected: usize,
    pub new_selected: usize,
    saves: Arc<SaveQueue>,
}

impl ActiveSession {
    #[must_use]
    pub fn saves(&self) -> &SaveQueue {
        &self.saves
    }

    /// Flush outstanding saves, stop the saver and summarise the session.
    ///
    /// The saver is always shut down first, even when the summary cannot be built.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the final save fails; the grades are
    /// still in the store and a later save may succeed. Returns
    /// `SessionError::Summary` if the clock went backwards during the session.
    pub async fn finish(self) -> Result<SessionSummary, SessionError> {
        let flushed = self.saves.shutdown().await;
        let summary = self.machine.summary();
        flushed?;
        let summary = summary?;
        info!(
            reviews = summary.total_reviews(),
            again = summary.again(),
            good = summary.good(),
            "session finished"
        );
        Ok(summary)
    }
}

/// Orchestrates card discovery and session start.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    settings: StudySettings,
    store: Arc<ProgressStore>,
    source: Arc<dyn CardSource>,
    player: Arc<dyn Player>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: StudySettings,
        store: Arc<ProgressStore>,
        source: Arc<dyn CardSource>,
        player: Arc<dyn Player>,
    ) -> Self {
        Self {
            clock,
            settings,
            store,
            source,
            player,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &StudySettings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// Ask the card source for its cards and add the unknown ones as new.
    ///
    /// Discovery runs on the blocking pool; the merge happens here. A source
    /// that cannot be read is logged and contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the store cannot be updated.
    pub async fn refresh_cards(&self) -> Result<usize, SessionError> {
        let cards = match self.discover().await {
            Ok(cards) => cards,
            Err(err) => {
                warn!(error = %err, "card discovery failed");
                return Ok(0);
            }
        };
        Ok(self.store.merge(cards)?)
    }

    /// Build the queue for a new session and start its saver.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the store cannot be read or the
    /// saver cannot start.
    pub fn start_session(&self) -> Result<ActiveSession, SessionError> {
        let now = self.clock.now();
        let records = self.store.snapshot()?;
        let plan = SessionQueueBuilder::new(&self.settings).build(&records, now);
        info!(
            due = plan.due_selected,
            new = plan.new_selected,
            "session queue built"
        );

        let saves = Arc::new(SaveQueue::spawn(Arc::clone(&self.store))?);
        let machine = SessionStateMachine::new(
            plan.queue,
            Arc::clone(&self.store),
            saves.clone(),
            Arc::clone(&self.player),
        )
        .with_clock(self.clock)
        .with_requeue(self.settings.requeue());

        Ok(ActiveSession {
            machine,
            due_selected: plan.due_selected,
            new_selected: plan.new_selected,
            saves,
        })
    }

    async fn discover(&self) -> Result<Vec<DiscoveredCard>, SourceError> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.discover())
            .await
            .map_err(|e| SourceError::Worker(e.to_string()))?
    }
}

impl std::fmt::Debug for SessionLoopService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLoopService")
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::SilentPlayer;
    use crate::source::{AudioDirectorySource, StaticSource};
    use recall_core::model::{CardId, LeitnerBox, RequeuePolicy, SessionSummaryError};
    use recall_core::time::fixed_clock;

    fn service(source: Arc<dyn CardSource>, settings: StudySettings) -> SessionLoopService {
        SessionLoopService::new(
            fixed_clock(),
            settings,
            Arc::new(ProgressStore::in_memory()),
            source,
            Arc::new(SilentPlayer),
        )
    }

    fn cards(n: usize) -> Vec<DiscoveredCard> {
        (0..n)
            .map(|i| DiscoveredCard::new(format!("{i:04}"), format!("{i}-a"), format!("{i}-b")))
            .collect()
    }

    #[tokio::test]
    async fn refresh_adds_only_unknown_cards() {
        let svc = service(Arc::new(StaticSource::new(cards(3))), StudySettings::default());
        assert_eq!(svc.refresh_cards().await.unwrap(), 3);
        assert_eq!(svc.refresh_cards().await.unwrap(), 0);
        assert_eq!(svc.store().len().unwrap(), 3);
    }

    #[tokio::test]
    async fn unreadable_source_contributes_nothing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let svc = service(
            Arc::new(AudioDirectorySource::new(file.path())),
            StudySettings::default(),
        );
        assert_eq!(svc.refresh_cards().await.unwrap(), 0);
        assert!(svc.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn start_session_respects_limits() {
        let settings = StudySettings::default()
            .with_session_limit(5)
            .with_new_card_cap(2)
            .with_shuffle(false)
            .with_requeue(RequeuePolicy::NextSession);
        let svc = service(Arc::new(StaticSource::new(cards(10))), settings);
        svc.refresh_cards().await.unwrap();

        let session = svc.start_session().unwrap();

        assert_eq!(session.new_selected, 2);
        assert_eq!(session.due_selected, 0);
        assert_eq!(session.machine.queue().len(), 2);
        session.finish().await.unwrap();
    }

    #[test]
    fn start_session_needs_a_runtime() {
        let svc = service(Arc::new(StaticSource::new(cards(1))), StudySettings::default());
        assert!(matches!(
            svc.start_session(),
            Err(SessionError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn finish_flushes_even_when_summary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let (store, _) = ProgressStore::open(&path);
        let svc = SessionLoopService::new(
            fixed_clock(),
            StudySettings::default().with_shuffle(false),
            Arc::new(store),
            Arc::new(StaticSource::new(cards(2))),
            Arc::new(SilentPlayer),
        );
        svc.refresh_cards().await.unwrap();

        let mut session = svc.start_session().unwrap();
        session.machine.advance().unwrap();
        session.machine.mark_known().unwrap();
        session.machine.clock_mut().advance(chrono::Duration::seconds(-5));

        assert!(matches!(
            session.finish().await,
            Err(SessionError::Summary(SessionSummaryError::InvalidTimeRange))
        ));

        let (reloaded, _) = ProgressStore::open(&path);
        let graded = reloaded.get(&CardId::new("0000")).unwrap().unwrap();
        assert_eq!(graded.leitner_box(), LeitnerBox::LEARNING);
    }
}
