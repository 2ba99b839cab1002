pub mod challenge;
pub mod operator;
pub mod pacing;
pub mod progress;
