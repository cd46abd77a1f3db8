//! Core types: busy periods, schedule merging, availability, display state

pub mod availability;
pub mod display;
pub mod event;
pub mod merge;
pub mod time;
pub mod tracing;

pub use availability::{AvailabilityConfig, AvailabilityScheduler, Freshness};
pub use display::{
    DisplayState, IndicatorCommand, Light, ResolvedIndicator, SHUTDOWN_PATTERN, STARTUP_PATTERN,
    Transition,
};
pub use event::{Event, UnknownEvent};
pub use merge::MergedSchedule;
pub use time::{BusyPeriod, Clock, SystemClock, TimeError, TimeWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
