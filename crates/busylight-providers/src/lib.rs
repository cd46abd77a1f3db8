//! Calendar sources for the busylight daemon.
//!
//! - [`CalendarSource`]: the trait every free/busy backend implements
//! - [`collect_busy_periods`]: applies per-calendar policy to a response
//! - [`ProviderError`]: error type for source operations
//!
//! ```text
//! ┌─────────────────┐
//! │  Google API     │
//! └────────┬────────┘
//!          ▼
//! ┌──────────────────────┐
//! │ GoogleFreeBusySource │  CalendarSource
//! └────────┬─────────────┘
//!          ▼ FreeBusyResponse
//! ┌──────────────────────┐
//! │ collect_busy_periods │  CalendarSettings
//! └────────┬─────────────┘
//!          ▼
//!     Vec<BusyPeriod>
//! ```

pub mod error;
pub mod filter;
#[cfg(feature = "google")]
pub mod google;
pub mod provider;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use filter::{ALL_DAY_TOLERANCE_SECS, CalendarSettings, collect_busy_periods};
pub use provider::{
    BoxFuture, CalendarBusy, CalendarSource, ErrorSource, FreeBusyQuery, FreeBusyResponse,
    StaticSource,
};
