//! Wrappers around SAP's `sapcontrol` and `sldreg` command line tools.
//!
//! Responsibilities:
//! - Run external commands with a deadline, an optional run-as user and
//!   redacted logging.
//! - Parse `sapcontrol` replies into typed records.
//! - Classify failures (credentials, connectivity, everything else).

pub mod error;
pub mod locate;
pub mod output;
pub mod runner;
pub mod sapcontrol;
pub mod sldreg;

pub use error::{ControlError, ControlResult};
pub use locate::{SAPCONTROL_FALLBACK_PATH, find_executable, sldreg_kernel_path};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use sapcontrol::{Protocol, SapControl, SapControlOptions};
pub use sldreg::Sldreg;
