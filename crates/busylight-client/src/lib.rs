//! CLI and control socket client
//!
//! This crate provides the `busylight` command-line interface.

pub mod cli;
pub mod commands;
pub mod error;
pub mod socket;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use socket::SocketClient;
