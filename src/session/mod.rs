pub mod state_machine;
pub mod types;

pub use state_machine::{PickingSessionMachine, VerificationProgress};
pub use types::{PersistedSessionMeta, Session, SessionError, SessionStatus};
