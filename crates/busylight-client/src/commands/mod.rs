//! Subcommand implementations.

pub mod config;
pub mod daemon;
pub mod send;
pub mod status;
