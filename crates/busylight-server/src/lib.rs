//! Daemon: control loop, light transport, signals, control socket.
//!
//! The daemon drives a serial busy light from three inputs:
//! - the calendar, polled hourly and whenever the schedule goes stale
//! - Unix signals, one [`Event`](busylight_core::Event) per signal
//! - requests on the control socket
//!
//! # Example
//!
//! ```rust,no_run
//! use busylight_server::{DaemonOptions, run_daemon};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     run_daemon(DaemonOptions {
//!         config_path: "/etc/busylight/config.toml".into(),
//!         debug: false,
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

mod availability;
mod config;
mod daemon;
mod error;
mod event_loop;
mod pidfile;
mod signals;
mod socket;
mod timer;
mod transport;

pub use availability::{AvailabilityTracker, Evaluation};
pub use config::{
    DaemonConfig, DeviceConfig, ScheduleConfig, default_config_path, default_socket_path,
};
pub use daemon::{DaemonOptions, FileConfigLoader, run_daemon};
pub use error::{ServerError, ServerResult};
pub use event_loop::{ConfigLoader, EventLoop, INPUT_QUEUE_DEPTH, LoopInput, input_channel};
pub use pidfile::{PidFile, default_pid_path};
pub use signals::{forward_signals, signal_events};
pub use socket::{ControlServer, DEFAULT_CONNECTION_TIMEOUT, STATUS_TIMEOUT};
pub use timer::Timer;
pub use transport::{IndicatorTransport, SUPPORTED_BAUD_RATES, SerialTransport, play_pattern};
