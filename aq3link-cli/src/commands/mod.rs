//! Command implementations.
//!
//! Each subcommand is implemented in its own module.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod ports;
pub(crate) mod probe;
pub(crate) mod show;
pub(crate) mod transfer;
