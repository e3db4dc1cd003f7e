use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("session limit must be > 0")]
    InvalidSessionLimit,
}

//
// ─── REQUEUE POLICY ────────────────────────────────────────────────────────────
//

/// What happens to a failed card within the running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequeuePolicy {
    /// Append the card to the back of the live queue so it resurfaces this session.
    #[default]
    Immediate,
    /// Only reschedule it; it returns in a later session once due.
    NextSession,
}

impl RequeuePolicy {
    /// Parses `immediate` or `next-session` / `next_session`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "next-session" | "next_session" => Some(Self::NextSession),
            _ => None,
        }
    }
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Options recognised when building and running a session.
///
/// Deserialises with per-field defaults, so partial settings files are fine;
/// call [`StudySettings::validate`] after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudySettings {
    session_limit: u32,
    new_card_cap: u32,
    shuffle: bool,
    requeue: RequeuePolicy,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            session_limit: 20,
            new_card_cap: 20,
            shuffle: true,
            requeue: RequeuePolicy::Immediate,
        }
    }
}

impl StudySettings {
    /// Creates custom study settings.
    ///
    /// A `new_card_cap` of zero is allowed and yields review-only sessions.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidSessionLimit` if `session_limit` is zero.
    pub fn new(
        session_limit: u32,
        new_card_cap: u32,
        shuffle: bool,
        requeue: RequeuePolicy,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            session_limit,
            new_card_cap,
            shuffle,
            requeue,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks invariants on settings built from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidSessionLimit` if `session_limit` is zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.session_limit == 0 {
            return Err(SettingsError::InvalidSessionLimit);
        }
        Ok(())
    }

    #[must_use]
    pub fn session_limit(&self) -> u32 {
        self.session_limit
    }

    #[must_use]
    pub fn new_card_cap(&self) -> u32 {
        self.new_card_cap
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    #[must_use]
    pub fn requeue(&self) -> RequeuePolicy {
        self.requeue
    }

    #[must_use]
    pub fn with_session_limit(mut self, session_limit: u32) -> Self {
        self.session_limit = session_limit;
        self
    }

    #[must_use]
    pub fn with_new_card_cap(mut self, new_card_cap: u32) -> Self {
        self.new_card_cap = new_card_cap;
        self
    }

    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn with_requeue(mut self, requeue: RequeuePolicy) -> Self {
        self.requeue = requeue;
        self
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
