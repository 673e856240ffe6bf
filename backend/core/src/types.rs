use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Numeric IAB vendor identifier.
pub type VendorId = u32;

/// Numeric CMP identifier as reported by the TCF `ping` command.
pub type CmpId = u32;

// ---------------------------------------------------------------------------
// Per-site results
// ---------------------------------------------------------------------------

/// Outcome of visiting one site. `None` means "not determined".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteValidationResult {
    pub site: String,
    pub vendor_id: VendorId,
    pub has_tcf: Option<bool>,
    pub cmp_id: Option<CmpId>,
    pub vendor_is_present: Option<bool>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Where a visit currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStage {
    Navigating,
    DetectingApi,
    NoTcf,
    IdentifyingCmp,
    DispatchingStrategy,
    Verifying,
    Done,
    Failed,
}

impl VisitStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, VisitStage::NoTcf | VisitStage::Done | VisitStage::Failed)
    }
}

impl fmt::Display for VisitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VisitStage::Navigating => "navigating",
            VisitStage::DetectingApi => "detecting_api",
            VisitStage::NoTcf => "no_tcf",
            VisitStage::IdentifyingCmp => "identifying_cmp",
            VisitStage::DispatchingStrategy => "dispatching_strategy",
            VisitStage::Verifying => "verifying",
            VisitStage::Done => "done",
            VisitStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// In-progress record for one site visit.
///
/// Fields only ever go from unknown to known; once determined they are never
/// overwritten. Finishing consumes the visit, so a result is stamped exactly
/// once.
#[derive(Debug, Clone)]
pub struct SiteVisit {
    site: String,
    vendor_id: VendorId,
    stage: VisitStage,
    has_tcf: Option<bool>,
    cmp_id: Option<CmpId>,
    vendor_is_present: Option<bool>,
}

impl SiteVisit {
    pub fn new(site: impl Into<String>, vendor_id: VendorId) -> Self {
        Self {
            site: site.into(),
            vendor_id,
            stage: VisitStage::Navigating,
            has_tcf: None,
            cmp_id: None,
            vendor_is_present: None,
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }

    pub fn stage(&self) -> VisitStage {
        self.stage
    }

    pub fn has_tcf(&self) -> Option<bool> {
        self.has_tcf
    }

    pub fn cmp_id(&self) -> Option<CmpId> {
        self.cmp_id
    }

    pub fn vendor_is_present(&self) -> Option<bool> {
        self.vendor_is_present
    }

    pub fn advance(&mut self, stage: VisitStage) {
        if !self.stage.is_terminal() {
            self.stage = stage;
        }
    }

    pub fn record_tcf(&mut self, present: bool) {
        self.has_tcf.get_or_insert(present);
    }

    pub fn record_cmp(&mut self, cmp_id: CmpId) {
        self.cmp_id.get_or_insert(cmp_id);
    }

    pub fn record_vendor(&mut self, present: bool) {
        self.vendor_is_present.get_or_insert(present);
    }

    /// Finalize a visit that reached a determination.
    pub fn complete(mut self) -> SiteValidationResult {
        if self.stage != VisitStage::NoTcf {
            self.stage = VisitStage::Done;
        }
        self.into_result(None)
    }

    /// Finalize a visit that stopped on an error, keeping everything learned so far.
    pub fn fail(mut self, error: impl Into<String>) -> SiteValidationResult {
        self.stage = VisitStage::Failed;
        self.into_result(Some(error.into()))
    }

    fn into_result(self, error: Option<String>) -> SiteValidationResult {
        SiteValidationResult {
            site: self.site,
            vendor_id: self.vendor_id,
            has_tcf: self.has_tcf,
            cmp_id: self.cmp_id,
            vendor_is_present: self.vendor_is_present,
            timestamp: Utc::now(),
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Ordered results of one invocation, one entry per input site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRun {
    pub run_id: Uuid,
    pub vendor_id: VendorId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    results: Vec<SiteValidationResult>,
}

impl ValidationRun {
    pub fn new(vendor_id: VendorId) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            vendor_id,
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: SiteValidationResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at.get_or_insert_with(Utc::now);
    }

    pub fn results(&self) -> &[SiteValidationResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for r in &self.results {
            match (r.error.is_some(), r.has_tcf, r.vendor_is_present) {
                (true, _, _) => summary.failed += 1,
                (false, Some(false), _) => summary.no_tcf += 1,
                (false, _, Some(true)) => summary.vendor_present += 1,
                _ => summary.vendor_absent += 1,
            }
        }
        summary
    }
}

/// Totals over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub vendor_present: usize,
    pub vendor_absent: usize,
    pub no_tcf: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// TCF payloads
// ---------------------------------------------------------------------------

/// Subset of the TCF `ping` return object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    #[serde(default)]
    cmp_id: Option<CmpId>,
    #[serde(default)]
    pub cmp_loaded: Option<bool>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub cmp_status: Option<String>,
    #[serde(default)]
    pub display_status: Option<String>,
}

impl PingResponse {
    /// The CMP id, treating the placeholder `0` some stubs return as absent.
    pub fn cmp_id(&self) -> Option<CmpId> {
        self.cmp_id.filter(|id| *id != 0)
    }
}

/// Vendor id → consent flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentVector(BTreeMap<VendorId, bool>);

impl ConsentVector {
    /// Build from a JSON consent payload.
    ///
    /// Accepts an object keyed by vendor id (`{"755": true}`) or an array of
    /// consented vendor ids. Non-numeric keys are skipped. Returns `None` for
    /// any other shape.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(
                map.iter()
                    .filter_map(|(k, v)| {
                        let id = k.trim().parse::<VendorId>().ok()?;
                        let granted = match v {
                            Value::Bool(b) => *b,
                            Value::Number(n) => n.as_u64().is_some_and(|n| n != 0),
                            _ => false,
                        };
                        Some((id, granted))
                    })
                    .collect(),
            ),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::Number(n) => n.as_u64().and_then(|n| VendorId::try_from(n).ok()),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    })
                    .map(|id| (id, true))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Whether the vector records consent for `vendor_id`.
    pub fn grants(&self, vendor_id: VendorId) -> bool {
        self.0.get(&vendor_id).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(VendorId, bool)> for ConsentVector {
    fn from_iter<I: IntoIterator<Item = (VendorId, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Driver handles
// ---------------------------------------------------------------------------

/// Document an element lookup runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The page's top-level document.
    Document,
    /// The content document of the first iframe matching this CSS selector.
    Frame(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Document => f.write_str("document"),
            Scope::Frame(selector) => write!(f, "frame {selector}"),
        }
    }
}

/// A lazily resolved element: the scope plus the selector to run in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub scope: Scope,
    pub selector: String,
}

/// A frame of the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    pub id: String,
    pub name: Option<String>,
    pub url: String,
    pub parent_id: Option<String>,
}

/// Backend DOM node id, stable across documents of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// One node of a flattened, shadow-pierced DOM snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomNode {
    pub node_id: NodeId,
    pub node_name: String,
    pub attributes: Vec<(String, String)>,
}

impl DomNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
