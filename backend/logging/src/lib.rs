//! Structured logging for vendorscope.
//!
//! Console plus rolling NDJSON file output, per-site lifecycle events, and the
//! sanitizer applied to every error message before it is logged or exported.

pub mod event_logger;
pub mod logger;
pub mod sanitize;

pub use event_logger::{EventLogEntry, EventLogger, SiteEvent};
pub use logger::init_logger;
pub use sanitize::sanitize_error;
