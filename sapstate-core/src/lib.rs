//! Embeddable core library for sapstate.
//!
//! Provides clap-free, I/O-abstracted state entry points that a host
//! automation runtime (or the `sapstate` binary) can call directly.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`ControlPort`](ports::ControlPort): query and drive `sapstartsrv`
//! - [`DestinationStore`](ports::DestinationStore): read and write the SLD destination config
//! - [`LogStore`](ports::LogStore): read and remove registration logs
//! - [`CredentialProvider`](ports::CredentialProvider): resolve password references
//!
//! The [`adapters`] module provides default implementations backed by the
//! vendor binaries and the local filesystem.
//!
//! # Entry points
//!
//! - [`sld_registered`](pipeline::sld_registered)
//! - [`running`](pipeline::running) / [`dead`](pipeline::dead)
//! - [`system_health_ok`](pipeline::system_health_ok)

pub mod adapters;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use error::{StateError, exit_code_for, state_exit_code};
pub use pipeline::{RegistrationRequest, dead, failed, running, sld_registered, system_health_ok};

// Re-export the domain's LogView so callers don't need sapstate-domain directly.
pub use sapstate_domain::LogView;
