//! `vendorscope-consent`: CMP detection and consent verification.
//!
//! Drives a [`vendorscope_core::Page`] through TCF API detection, CMP
//! identification, the CMP's consent procedure and the vendor membership
//! check, one site at a time.

pub mod orchestrator;
pub mod poll;
pub mod registry;
pub mod resolver;
pub mod tcf;
pub mod timeouts;

#[cfg(test)]
pub(crate) mod fake;

pub use orchestrator::SiteValidator;
pub use poll::{poll_until, PollPolicy};
pub use registry::{lookup, CmpStrategy, StrategyRunner, REGISTRY};
pub use resolver::resolve_and_click;
pub use tcf::{NativeProcedure, TcfClient};
pub use timeouts::Timeouts;
