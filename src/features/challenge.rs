//! Challenge detection.
//!
//! Classification is a pure function over one [`PageSnapshot`], so the control
//! loops can call it after every navigation and every expansion step without
//! touching the live page twice. A challenge can appear mid-session, not just
//! at entry. We never attempt to solve one — that escalates to the operator
//! gate.

use serde::Serialize;

use crate::session::PageSnapshot;

/// Body-text phrases that mean the page swapped to an interstitial, used in
/// addition to the challenge-element marker (text survives markup drift
/// better than selectors do).
const CHALLENGE_PHRASES: &[&str] = &[
    "unusual traffic from your computer network",
    "our systems have detected unusual traffic",
    "i'm not a robot",
    "why did this happen?",
];

const EMPTY_PHRASES: &[&str] = &["did not match any", "no results found for"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageClass {
    Normal,
    EmptyResults,
    ChallengePresented,
}

/// Classify the current page state from its observable markers.
pub fn classify(snapshot: &PageSnapshot) -> PageClass {
    if snapshot.challenge_marker {
        return PageClass::ChallengePresented;
    }
    let body = snapshot.body_text.to_lowercase();
    if CHALLENGE_PHRASES.iter().any(|p| body.contains(p)) {
        return PageClass::ChallengePresented;
    }
    if snapshot.result_count == 0 {
        return PageClass::EmptyResults;
    }
    if EMPTY_PHRASES.iter().any(|p| body.contains(p)) {
        return PageClass::EmptyResults;
    }
    PageClass::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(body: &str, results: usize, marker: bool) -> PageSnapshot {
        PageSnapshot {
            url: "https://example.test/search".to_string(),
            body_text: body.to_string(),
            result_count: results,
            challenge_marker: marker,
        }
    }

    #[test]
    fn test_normal_page() {
        assert_eq!(
            classify(&snap("Springfield Gym · 4.6 (120)", 12, false)),
            PageClass::Normal
        );
    }

    #[test]
    fn test_marker_beats_everything() {
        assert_eq!(
            classify(&snap("plenty of results here", 12, true)),
            PageClass::ChallengePresented
        );
    }

    #[test]
    fn test_challenge_phrase_in_body() {
        assert_eq!(
            classify(&snap(
                "Our systems have detected unusual traffic from your computer network.",
                0,
                false
            )),
            PageClass::ChallengePresented
        );
    }

    #[test]
    fn test_zero_results_is_empty() {
        assert_eq!(classify(&snap("Maps more places", 0, false)), PageClass::EmptyResults);
    }

    #[test]
    fn test_explicit_no_match_phrase() {
        assert_eq!(
            classify(&snap("Your search did not match any documents", 0, false)),
            PageClass::EmptyResults
        );
    }
}
