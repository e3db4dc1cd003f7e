use std::sync::Mutex;

use recall_core::model::MediaRef;
use tracing::debug;

/// Receives playback requests from the session engine.
///
/// Requests are fire-and-forget: the engine never waits for audio to finish,
/// and nothing a player reports back advances the session.
pub trait Player: Send + Sync {
    /// Stop whatever is playing and start `media`.
    fn play(&self, media: &MediaRef);

    /// Stop playback, if any.
    fn stop(&self) {}
}

/// Discards playback requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

impl Player for SilentPlayer {
    fn play(&self, media: &MediaRef) {
        debug!(media = %media, "silent player ignoring playback request");
    }
}

/// Remembers every request, for tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingPlayer {
    played: Mutex<Vec<MediaRef>>,
}

impl RecordingPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything played so far, oldest first.
    #[must_use]
    pub fn played(&self) -> Vec<MediaRef> {
        self.played
            .lock()
            .map(|played| played.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last(&self) -> Option<MediaRef> {
        self.played
            .lock()
            .ok()
            .and_then(|played| played.last().cloned())
    }
}

impl Player for RecordingPlayer {
    fn play(&self, media: &MediaRef) {
        if let Ok(mut played) = self.played.lock() {
            played.push(media.clone());
        }
    }
}
