//! mapscout — map-search business listing harvester.
//!
//! Drives one stealth Chromium session through a list of search terms,
//! expanding the local-results panel, extracting a structured record per
//! listing, and appending everything to a CSV. Interaction is human-paced;
//! anti-bot challenges suspend the run for a human instead of being fought.

pub mod core;
pub mod export;
pub mod features;
pub mod scraping;
pub mod session;

// --- Primary exports ---
pub use core::{BusinessRecord, ChallengeEvent, JitterMode, RunSummary, ScoutConfig, SessionState};
pub use export::{CsvExporter, ExportError};
pub use features::challenge::{classify, PageClass};
pub use features::operator::{ConsoleGate, OperatorGate};
pub use features::pacing::Pacer;
pub use features::progress::ProgressLog;
pub use scraping::extract::ListingExtractor;
pub use scraping::orchestrator::{Orchestrator, RunError};
pub use scraping::pagination::{Expansion, PaginationController, PaginationState};
pub use scraping::ScrapeError;
pub use session::{
    cdp::CdpSession, BrowserSession, ElementRef, ListingHandle, PageSnapshot, SessionError,
};
