use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One structured business listing pulled out of the results panel.
///
/// Every field except `name` is best-effort: a listing with a readable name is
/// always emitted, with whatever else the page gave up. `None` means the page
/// did not show the field; a present value is verbatim page data (parsed where
/// numeric). `review_count: Some(0)` is a confirmed explicit zero, never a
/// parse fallback.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BusinessRecord {
    pub name: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Anything else the card showed that we captured defensively
    /// (opening hours, "N+ years in business", ...). Key → raw text.
    #[serde(default)]
    pub raw_fields: BTreeMap<String, String>,
    /// The search term this record was harvested under.
    pub source_term: String,
}

impl BusinessRecord {
    pub fn new(source_term: impl Into<String>) -> Self {
        Self {
            source_term: source_term.into(),
            ..Default::default()
        }
    }
}

/// Per-term progress bookkeeping. Created when a term starts, reset when the
/// term completes or is abandoned.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub term: String,
    /// Listings counted in the results panel so far. Non-decreasing for the
    /// lifetime of the state, including across challenge suspensions.
    pub listings_loaded: usize,
    /// Listings already turned into records. Resume points here, so a
    /// suspension never re-extracts.
    pub listings_extracted: usize,
    pub challenge_pending: bool,
    /// Monotonic panel generation. Bumped on every reload/re-search; handles
    /// from an older generation are stale.
    pub panel_generation: u64,
    /// Where this term's records land.
    pub export_path: PathBuf,
}

impl SessionState {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            listings_loaded: 0,
            listings_extracted: 0,
            challenge_pending: false,
            panel_generation: 0,
            export_path: PathBuf::new(),
        }
    }

    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = path.into();
        self
    }
}

/// Raised when the challenge detector sees an anti-bot interstitial.
/// Owned by the orchestrator, which blocks the term on it until an operator
/// resumes or the wait ceiling expires.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeEvent {
    pub detected_at: DateTime<Utc>,
    pub term: String,
    pub resumed: bool,
}

impl ChallengeEvent {
    pub fn now(term: impl Into<String>) -> Self {
        Self {
            detected_at: Utc::now(),
            term: term.into(),
            resumed: false,
        }
    }
}

/// How a single term ended.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum TermStatus {
    /// All loaded listings were extracted and exported.
    Completed,
    /// Term gave partial (possibly zero) results; the run moved on.
    /// The string is the human-readable reason.
    Abandoned(String),
    /// Term was already in the progress file and never touched the browser.
    SkippedDone,
}

/// Aggregate counters for a whole run. Everything that was not exported shows
/// up in one of these counters — nothing is dropped silently.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub terms_completed: usize,
    pub terms_abandoned: usize,
    pub terms_skipped: usize,
    pub records_exported: usize,
    pub listings_discarded_nameless: usize,
    pub listings_skipped_errors: usize,
    pub challenges: Vec<ChallengeEvent>,
}
