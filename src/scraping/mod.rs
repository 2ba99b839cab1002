//! The scraping control loops: results-panel expansion, per-listing
//! extraction, and the per-term orchestration that sequences them.

pub mod extract;
pub mod orchestrator;
pub mod pagination;

use thiserror::Error;

use crate::session::SessionError;

/// Term-level failures. None of these abort the run — the orchestrator logs,
/// exports whatever was collected, and moves to the next term.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no results for \"{term}\" after one retry")]
    EmptyResults { term: String },

    #[error("challenge unresolved past the wait ceiling for \"{term}\"")]
    ChallengeUnresolved { term: String },

    #[error("pagination stalled after {attempts} fruitless attempts ({loaded} listings loaded)")]
    PaginationStalled { attempts: u32, loaded: usize },
}
