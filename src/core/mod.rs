pub mod config;
pub mod types;

pub use config::{JitterMode, ScoutConfig};
pub use types::{BusinessRecord, ChallengeEvent, RunSummary, SessionState, TermStatus};
