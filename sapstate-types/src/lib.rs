//! Shared DTOs for the sapstate workspace.
//!
//! # Design constraints
//! - State results are serialized to stdout and consumed by automation runtimes.
//! - Be conservative with breaking changes to [`result::StateResult`].
//! - Secrets never implement `Serialize`.

pub mod control;
pub mod destination;
pub mod instance;
pub mod result;
pub mod secret;

pub use destination::{LogFileSet, ObservedDestination, SldDestination};
pub use instance::{IdError, InstanceNumber, InstanceTarget, Sid};
pub use result::{FailureKind, StateResult};
pub use secret::Secret;

/// Schema identifiers.
pub mod schema {
    pub const SAPSTATE_RESULT_V1: &str = "sapstate.result.v1";
    pub const SAPSTATE_CONTROL_V1: &str = "sapstate.control.v1";
}
