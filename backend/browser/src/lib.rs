//! `vendorscope-browser`: DevTools-protocol browser driver.
//!
//! Implements the `Page` and `BrowsingContext` capabilities from
//! `vendorscope-core` on top of a Chrome instance, either launched locally or
//! attached through a `ws://` endpoint.

pub mod cdp_client;
pub mod context;
pub mod element_query;
pub mod launcher;
pub mod page_control;

#[cfg(test)]
mod mock_devtools;

pub use cdp_client::{CdpClient, CdpEvent};
pub use context::{BrowserStartError, CdpBrowser, CdpContext};
pub use launcher::{find_chrome, ChromeProcess, LaunchError, LaunchOptions};
pub use page_control::CdpPage;
