//! Domain logic: decide whether an SLD destination must be rewritten, whether
//! registration logs confirm success, and whether a system is healthy.
//!
//! Nothing here runs external commands. Effects live in `sapstate-control`
//! and `sapstate-core`; this crate only reads through [`LogView`].

mod health;
mod marker;
mod ports;
mod sld;

pub use health::{
    DEFAULT_NON_CRITICAL, HealthError, HealthPolicy, HealthReport, evaluate_health,
    parse_check_from, syslog_problems, workprocess_problems,
};
pub use marker::{
    DEFAULT_EXPECTED_CODE, DEFAULT_MARKER_PATTERN, LogState, MarkerError, SuccessMarker,
    evaluate_logs,
};
pub use ports::{FsLogView, LogView};
pub use sld::{
    CodecError, DestinationField, UpdateReason, destination_fingerprint, diff_destination,
    parse_destination_file, parse_showconnect, plan_update, render_destination_file,
};
