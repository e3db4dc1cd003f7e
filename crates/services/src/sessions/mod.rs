mod machine;
mod plan;
mod progress;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use machine::{
    Command, IgnoredReason, SessionEvent, SessionState, SessionStateMachine, Side,
};
pub use plan::{SessionPlan, SessionQueueBuilder};
pub use progress::SessionProgress;
pub use workflow::{ActiveSession, SessionLoopService};
