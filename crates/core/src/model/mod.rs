mod card;
mod ids;
mod review;
mod session;
mod settings;

pub use ids::{CardId, EmptyIdError, MediaRef};

pub use card::{CardError, CardRecord, DiscoveredCard, LeitnerBox};
pub use review::{ReviewGrade, ReviewLog};
pub use session::{SessionSummary, SessionSummaryError};
pub use settings::{RequeuePolicy, SettingsError, StudySettings};
