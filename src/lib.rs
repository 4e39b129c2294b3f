//! Service supervisor daemon for XML-declared child processes.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binary (src/bin/main.rs)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
use ctrlc as _;
#[cfg(test)]
use predicates as _;
use strum as _;
use tracing_subscriber as _;

/// CLI parsing.
pub mod cli;

/// Constants.
pub mod constants;

/// Errors.
pub mod error;

/// Property tree.
pub mod ptree;

/// Service records and table.
pub mod service;

/// Setting store.
pub mod setting;

/// Supervisor engine and management API.
pub mod supervisor;

/// Test utils.
#[doc(hidden)]
pub mod test_utils;

/// Timer wheel.
pub mod timer;

/// XML codec.
pub mod xml;
