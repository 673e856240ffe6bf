pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConsentError, DriverError};
pub use traits::{BrowsingContext, Page};
pub use types::{
    CmpId, ConsentVector, DomNode, ElementHandle, FrameHandle, NodeId, PingResponse, RunSummary,
    Scope, SiteValidationResult, SiteVisit, ValidationRun, VendorId, VisitStage,
};
