//! Per-listing extraction.
//!
//! For each handle, in panel order: read the summary-card fields first, then
//! try to open the detail pane for the richer fields. Every read is
//! best-effort — a missing field degrades to absent, a dead detail pane
//! degrades to a summary-only record, and only a listing with no recoverable
//! name is discarded (counted, never silently).
//!
//! Extraction is resumable: it starts from `SessionState::listings_extracted`,
//! so a challenge suspension mid-term never re-extracts a listing.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::ScrapeError;
use crate::core::{BusinessRecord, ChallengeEvent, ScoutConfig, SessionState};
use crate::features::challenge::{classify, PageClass};
use crate::features::pacing::Pacer;
use crate::session::{descriptors, BrowserSession, ListingHandle, SessionError};

#[derive(Debug)]
pub enum ExtractionOutcome {
    /// All remaining handles processed.
    Completed,
    /// A challenge appeared between listings. Re-invoke after the operator
    /// resumes; progress is checkpointed in [`SessionState`].
    Interrupted(ChallengeEvent),
}

/// Counters for one `extract_all` invocation.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub discarded_nameless: usize,
    pub skipped_errors: usize,
}

pub struct ListingExtractor {
    cfg: ScoutConfig,
}

impl ListingExtractor {
    pub fn new(cfg: ScoutConfig) -> Self {
        Self { cfg }
    }

    /// Extract every handle not yet processed, appending to `records`.
    pub async fn extract_all(
        &self,
        session: &mut dyn BrowserSession,
        pacer: &Pacer,
        st: &mut SessionState,
        handles: &[ListingHandle],
        records: &mut Vec<BusinessRecord>,
        report: &mut ExtractReport,
    ) -> Result<ExtractionOutcome, ScrapeError> {
        for handle in handles.iter().skip(st.listings_extracted) {
            let snapshot = session.snapshot().await?;
            if classify(&snapshot) == PageClass::ChallengePresented {
                warn!(
                    "challenge presented mid-extraction for \"{}\" ({}/{} extracted)",
                    st.term,
                    st.listings_extracted,
                    handles.len()
                );
                st.challenge_pending = true;
                return Ok(ExtractionOutcome::Interrupted(ChallengeEvent::now(&st.term)));
            }

            match self.extract_one(session, handle, &st.term).await {
                Ok(Some(record)) => {
                    debug!("extracted listing #{}: {}", handle.index, record.name);
                    records.push(record);
                }
                Ok(None) => {
                    warn!(
                        "discarding listing #{} for \"{}\": no recoverable name",
                        handle.index, st.term
                    );
                    report.discarded_nameless += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "skipping listing #{} for \"{}\": {}",
                        handle.index, st.term, e
                    );
                    report.skipped_errors += 1;
                }
                Err(e) => return Err(e.into()),
            }
            st.listings_extracted += 1;
            pacer.pace().await;
        }
        Ok(ExtractionOutcome::Completed)
    }

    /// One listing → one record (or `None` when the name is unrecoverable).
    async fn extract_one(
        &self,
        session: &mut dyn BrowserSession,
        handle: &ListingHandle,
        term: &str,
    ) -> Result<Option<BusinessRecord>, SessionError> {
        let mut record = BusinessRecord::new(term);

        // Summary-card fields first: they survive a detail-pane failure.
        if let Some(name) = read_first_in(session, &handle.element, descriptors::LISTING_NAME).await
        {
            record.name = name;
        }
        if let Some(line) =
            read_first_in(session, &handle.element, descriptors::SUMMARY_LINE).await
        {
            parse_summary_line(&mut record, &line);
        }
        if let Ok(Some(card_text)) = session.read_text(&handle.element).await {
            parse_card_details(&mut record, &card_text);
        }

        if record.name.trim().is_empty() {
            return Ok(None);
        }

        match self.open_detail(session, handle).await {
            Ok(()) => {
                if let Some(phone) = read_first(session, descriptors::DETAIL_PHONE).await {
                    record.phone = Some(phone);
                }
                if let Some(address) = read_first(session, descriptors::DETAIL_ADDRESS).await {
                    record.address = Some(address);
                }
                if record.category.is_none() {
                    record.category = read_first(session, descriptors::DETAIL_CATEGORY).await;
                }
                if let Some(hours) = read_first(session, descriptors::DETAIL_HOURS).await {
                    record.raw_fields.insert("hours".to_string(), hours);
                }
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "detail pane unavailable for listing #{} ({}), emitting summary-only record",
                    handle.index, e
                );
            }
            Err(e) => return Err(e),
        }

        Ok(Some(record))
    }

    /// Click the card and wait for the detail pane, retrying transient
    /// failures with a short backoff.
    async fn open_detail(
        &self,
        session: &mut dyn BrowserSession,
        handle: &ListingHandle,
    ) -> Result<(), SessionError> {
        let attempts = self.cfg.retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            let result = async {
                session.scroll_into_view(&handle.element).await?;
                session.click(&handle.element).await?;
                session
                    .wait_for(descriptors::DETAIL_PANEL, self.cfg.element_timeout)
                    .await?;
                Ok::<(), SessionError>(())
            }
            .await;
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!("detail open attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(Duration::from_millis(300 * attempt as u64)).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            SessionError::ElementNotFound(descriptors::DETAIL_PANEL.to_string())
        }))
    }
}

async fn read_first(session: &mut dyn BrowserSession, descriptor: &str) -> Option<String> {
    let found = session.find_all(descriptor).await.ok()?;
    let el = found.first()?;
    session.read_text(el).await.ok().flatten()
}

async fn read_first_in(
    session: &mut dyn BrowserSession,
    parent: &crate::session::ElementRef,
    descriptor: &str,
) -> Option<String> {
    let found = session.find_in(parent, descriptor).await.ok()?;
    let el = found.first()?;
    session.read_text(el).await.ok().flatten()
}

// ── Field parsing ────────────────────────────────────────────────────────────

fn rating_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Anchored, single decimal digit: a rating leads the summary line and
    // never runs to three decimals. Unanchored or open-ended, the pattern
    // would also hit the thousands separator inside "(1,234)" or "1,234".
    RE.get_or_init(|| Regex::new(r"^(\d)[.,](\d)(?:\D|$)").unwrap())
}

fn count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").unwrap())
}

fn paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([\d,.]+)\)").unwrap())
}

fn years_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+\+?)\s+years in business").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d[\d\s().-]{6,}\d").unwrap())
}

/// Parse a star rating, tolerating locale decimal punctuation ("4.6" / "4,6").
/// Out-of-range values are absent, not clamped.
pub fn parse_rating(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(cap) = rating_re().captures(trimmed) {
        let value: f64 = format!("{}.{}", &cap[1], &cap[2]).parse().ok()?;
        return (0.0..=5.0).contains(&value).then_some(value);
    }
    // Whole-star ratings render without a decimal.
    let value: f64 = trimmed.parse().ok()?;
    (0.0..=5.0).contains(&value).then_some(value)
}

/// Parse a review count: digits only, thousands separators and parenthetical
/// wrapping stripped. Text with no digit at all ("No reviews") is absent —
/// `Some(0)` only comes from an explicit "0".
pub fn parse_review_count(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = if let Some(cap) = paren_re().captures(trimmed) {
        cap[1].to_string()
    } else {
        count_re().find(trimmed)?.as_str().to_string()
    };
    digits.replace([',', '.'], "").parse().ok()
}

/// The "4.6 (1,234) · Plumber" summary line: rating and review count before
/// the separator, category after it.
fn parse_summary_line(record: &mut BusinessRecord, line: &str) {
    let mut parts = line.splitn(2, '·');
    let head = parts.next().unwrap_or_default();

    if record.rating.is_none() {
        record.rating = parse_rating(head);
    }
    if record.review_count.is_none() {
        if let Some(cap) = paren_re().captures(head) {
            record.review_count = parse_review_count(&cap[1]);
        }
    }
    if record.category.is_none() {
        if let Some(tail) = parts.next() {
            let category = tail.trim();
            if !category.is_empty() {
                record.category = Some(category.to_string());
            }
        }
    }
}

/// Defensive sweep over the card's remaining text lines: years-in-business,
/// phone, opening hours, and an address heuristic (first long line that is
/// none of the above).
fn parse_card_details(record: &mut BusinessRecord, card_text: &str) {
    if let Some(cap) = years_re().captures(card_text) {
        record
            .raw_fields
            .entry("years_in_business".to_string())
            .or_insert_with(|| cap[1].to_string());
    }

    if record.phone.is_none() {
        // The rating line also looks number-ish; require a real phone-length
        // digit run before accepting a match.
        for m in phone_re().find_iter(card_text) {
            let digits = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
            if digits >= 8 {
                record.phone = Some(m.as_str().trim().to_string());
                break;
            }
        }
    }

    for line in card_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();
        if lower.contains("open") || lower.contains("closes") || lower.contains("closed") {
            record
                .raw_fields
                .entry("hours".to_string())
                .or_insert_with(|| line.to_string());
            continue;
        }
        if record.address.is_some() {
            continue;
        }
        if line.contains('·')
            || lower.contains("years in business")
            || line == record.name
            || record
                .phone
                .as_deref()
                .is_some_and(|p| line.contains(p.trim()))
        {
            continue;
        }
        if line.len() > 15 {
            record.address = Some(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_review_count_thousands() {
        assert_eq!(parse_review_count("1,234 reviews"), Some(1234));
    }

    #[test]
    fn test_parse_review_count_parenthetical() {
        assert_eq!(parse_review_count("(12)"), Some(12));
    }

    #[test]
    fn test_parse_review_count_no_reviews_is_absent() {
        assert_eq!(parse_review_count("No reviews"), None);
    }

    #[test]
    fn test_parse_review_count_explicit_zero() {
        assert_eq!(parse_review_count("0"), Some(0));
    }

    #[test]
    fn test_parse_rating_locale_punctuation() {
        assert_eq!(parse_rating("4.6"), Some(4.6));
        assert_eq!(parse_rating("4,6"), Some(4.6));
        assert_eq!(parse_rating("5"), Some(5.0));
    }

    #[test]
    fn test_parse_rating_out_of_range_is_absent() {
        assert_eq!(parse_rating("9.1"), None);
        assert_eq!(parse_rating("stars"), None);
    }

    #[test]
    fn test_parse_rating_ignores_review_count_separator() {
        assert_eq!(parse_rating("(1,234)"), None);
        assert_eq!(parse_rating("1,234 reviews"), None);
    }

    #[test]
    fn test_summary_line_count_without_rating() {
        let mut rec = BusinessRecord::new("t");
        parse_summary_line(&mut rec, "(1,234) · Gym");
        assert_eq!(rec.rating, None);
        assert_eq!(rec.review_count, Some(1234));
        assert_eq!(rec.category.as_deref(), Some("Gym"));
    }

    #[test]
    fn test_summary_line_full() {
        let mut rec = BusinessRecord::new("t");
        parse_summary_line(&mut rec, "4.6 (1,234) · Plumber");
        assert_eq!(rec.rating, Some(4.6));
        assert_eq!(rec.review_count, Some(1234));
        assert_eq!(rec.category.as_deref(), Some("Plumber"));
    }

    #[test]
    fn test_summary_line_without_category() {
        let mut rec = BusinessRecord::new("t");
        parse_summary_line(&mut rec, "3,9 (87)");
        assert_eq!(rec.rating, Some(3.9));
        assert_eq!(rec.review_count, Some(87));
        assert_eq!(rec.category, None);
    }

    #[test]
    fn test_card_details_sweep() {
        let mut rec = BusinessRecord::new("t");
        rec.name = "Springfield Gym".to_string();
        parse_card_details(
            &mut rec,
            "Springfield Gym\n4.6 (120) · Gym\n10+ years in business\n742 Evergreen Terrace, Springfield\nOpen ⋅ Closes 10 PM\n017 2345 6789",
        );
        assert_eq!(
            rec.raw_fields.get("years_in_business").map(String::as_str),
            Some("10+")
        );
        assert_eq!(
            rec.address.as_deref(),
            Some("742 Evergreen Terrace, Springfield")
        );
        assert!(rec.raw_fields.contains_key("hours"));
        assert!(rec.phone.is_some());
    }

    #[test]
    fn test_card_details_missing_everything_keeps_record_intact() {
        let mut rec = BusinessRecord::new("t");
        rec.name = "Bare Minimum LLC".to_string();
        parse_card_details(&mut rec, "Bare Minimum LLC");
        assert_eq!(rec.phone, None);
        assert_eq!(rec.address, None);
        assert!(rec.raw_fields.is_empty());
    }
}
