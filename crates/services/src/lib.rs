#![forbid(unsafe_code)]

pub mod error;
pub mod player;
pub mod sessions;
pub mod source;

pub use recall_core::Clock;
pub use sessions as session;

pub use error::{SessionError, SourceError};
pub use player::{Player, RecordingPlayer, SilentPlayer};
pub use source::{AudioDirectorySource, CardSource, StaticSource, display_label};

pub use sessions::{
    ActiveSession, Command, IgnoredReason, SessionEvent, SessionLoopService, SessionPlan,
    SessionProgress, SessionQueueBuilder, SessionState, SessionStateMachine, Side,
};
