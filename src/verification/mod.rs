pub mod reconciler;

pub use reconciler::{VerificationChecklist, VerificationError, VerificationItem};
