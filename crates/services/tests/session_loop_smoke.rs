use std::sync::Arc;

use chrono::Duration;
use recall_core::model::{CardId, DiscoveredCard, LeitnerBox, MediaRef, StudySettings};
use recall_core::time::fixed_now;
use services::{
    Clock, Command, RecordingPlayer, SessionEvent, SessionLoopService, SessionState, StaticSource,
};
use storage::ProgressStore;

fn deck() -> Vec<DiscoveredCard> {
    ["0001", "0002", "0003"]
        .into_iter()
        .map(|id| DiscoveredCard::new(id, format!("{id}_A.mp3"), format!("{id}_B.mp3")))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_session_persists_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    let now = fixed_now();

    let (store, _) = ProgressStore::open(&path);
    let store = Arc::new(store);
    let player = Arc::new(RecordingPlayer::new());
    let svc = SessionLoopService::new(
        Clock::fixed(now),
        StudySettings::default().with_shuffle(false),
        Arc::clone(&store),
        Arc::new(StaticSource::new(deck())),
        player.clone(),
    );
    assert_eq!(svc.refresh_cards().await.unwrap(), 3);

    let mut session = svc.start_session().unwrap();
    assert_eq!(session.new_selected, 3);

    // 0001 known from the question, 0002 failed from the answer and then
    // known on its second pass, 0003 known from the answer.
    let script = [
        Command::Advance,
        Command::MarkKnown,
        Command::Advance,
        Command::Advance,
        Command::Advance,
        Command::MarkKnown,
        Command::MarkKnown,
    ];
    let mut events = Vec::new();
    for command in script {
        events.extend(session.machine.apply(command).unwrap());
    }
    assert_eq!(session.machine.state(), SessionState::Idle);
    assert!(events.contains(&SessionEvent::Requeued(CardId::new("0002"))));
    assert_eq!(events.last(), Some(&SessionEvent::Completed));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::SaveFailed(_))));
    assert_eq!(player.played().first(), Some(&MediaRef::new("0001_A.mp3")));

    let summary = session.finish().await.unwrap();
    assert_eq!(summary.total_reviews(), 4);
    assert_eq!(summary.again(), 1);
    assert_eq!(summary.good(), 3);

    let (reloaded, report) = ProgressStore::open(&path);
    assert_eq!(report.loaded, 3);
    assert_eq!(reloaded.snapshot().unwrap(), store.snapshot().unwrap());

    let first = reloaded.get(&CardId::new("0001")).unwrap().unwrap();
    assert_eq!(first.leitner_box(), LeitnerBox::LEARNING);
    assert_eq!(first.due(), now + Duration::days(1));

    // Relearn delay puts 0002 back in box 1; its second grade promotes it.
    let second = reloaded.get(&CardId::new("0002")).unwrap().unwrap();
    assert_eq!(second.leitner_box(), LeitnerBox::REVIEW);
    assert_eq!(second.due(), now + Duration::days(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_session_picks_up_only_due_cards() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    let now = fixed_now();

    {
        let (store, _) = ProgressStore::open(&path);
        let svc = SessionLoopService::new(
            Clock::fixed(now),
            StudySettings::default().with_shuffle(false),
            Arc::new(store),
            Arc::new(StaticSource::new(deck())),
            Arc::new(RecordingPlayer::new()),
        );
        svc.refresh_cards().await.unwrap();
        let mut session = svc.start_session().unwrap();
        session.machine.apply(Command::Advance).unwrap();
        session.machine.apply(Command::MarkKnown).unwrap();
        session.finish().await.unwrap();
    }

    let (store, _) = ProgressStore::open(&path);
    let later = SessionLoopService::new(
        Clock::fixed(now + Duration::days(2)),
        StudySettings::default()
            .with_shuffle(false)
            .with_new_card_cap(0),
        Arc::new(store),
        Arc::new(StaticSource::new(deck())),
        Arc::new(RecordingPlayer::new()),
    );
    assert_eq!(later.refresh_cards().await.unwrap(), 0);

    let session = later.start_session().unwrap();
    assert_eq!(session.due_selected, 1);
    assert_eq!(session.new_selected, 0);
    assert_eq!(session.machine.queue().front(), Some(&CardId::new("0001")));
    session.finish().await.unwrap();
}
