pub mod analysis;
pub mod fact;
pub mod session;
pub mod specialty;

pub use analysis::{title_case, AnalysisResult, FallbackReason, Resolved, RoutingResult};
pub use fact::{Fact, Predicate};
pub use session::{
    DeliveryMode, Session, SessionError, SessionFailure, SessionState, TIMEOUT_MESSAGE,
};
pub use specialty::{KnowledgeDomain, Specialty, UrgencyLevel};
