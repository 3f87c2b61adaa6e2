//! Library half of the `sapstate` binary: config file loading and merging.

pub mod config;
