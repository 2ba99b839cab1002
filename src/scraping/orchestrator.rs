//! Per-term orchestration.
//!
//! Terms run strictly sequentially over one browser session: search → entry
//! classification → panel expansion → extraction → export → advance. A
//! challenge at any point suspends the term cooperatively — the operator gate
//! is raised, and on resume the control loops continue from their checkpoints.
//! Term-level failures abandon the term with whatever was collected; only
//! export/filesystem failures abort the run.

use thiserror::Error;
use tracing::{error, info, warn};

use super::extract::{ExtractReport, ExtractionOutcome, ListingExtractor};
use super::pagination::{Expansion, PaginationController};
use super::ScrapeError;
use crate::core::{BusinessRecord, ChallengeEvent, RunSummary, ScoutConfig, SessionState, TermStatus};
use crate::export::{CsvExporter, ExportError};
use crate::features::challenge::{classify, PageClass};
use crate::features::operator::OperatorGate;
use crate::features::pacing::Pacer;
use crate::features::progress::ProgressLog;
use crate::session::{descriptors, BrowserSession};

/// Run-fatal failures. Everything else degrades to a skipped field, listing,
/// or term.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("progress file error: {0}")]
    Progress(#[from] std::io::Error),
}

pub struct Orchestrator {
    session: Box<dyn BrowserSession>,
    gate: Box<dyn OperatorGate>,
    pacer: Pacer,
    cfg: ScoutConfig,
}

impl Orchestrator {
    pub fn new(
        cfg: ScoutConfig,
        session: Box<dyn BrowserSession>,
        gate: Box<dyn OperatorGate>,
    ) -> Self {
        let pacer = Pacer::new(&cfg);
        Self {
            session,
            gate,
            pacer,
            cfg,
        }
    }

    /// Process every term in order, exporting after each one.
    pub async fn run(&mut self, terms: &[String]) -> Result<RunSummary, RunError> {
        let mut exporter = CsvExporter::create(&self.cfg.output_path)?;
        let mut progress = ProgressLog::load(&self.cfg.progress_path)?;
        let mut summary = RunSummary::default();

        for (i, term) in terms.iter().enumerate() {
            if progress.is_done(term) {
                info!("skipping already completed term: \"{}\"", term);
                summary.terms_skipped += 1;
                continue;
            }
            info!("processing term {}/{}: \"{}\"", i + 1, terms.len(), term);

            let (records, status) = self.run_term(term, &mut summary).await;

            // Export before anything else: partial data beats no data, and a
            // failing export must abort before the term is marked done.
            exporter.append(&records)?;
            summary.records_exported += records.len();

            match &status {
                TermStatus::Completed => {
                    info!(
                        "term \"{}\" completed: {} records → {:?}",
                        term,
                        records.len(),
                        self.cfg.output_path
                    );
                    summary.terms_completed += 1;
                }
                TermStatus::Abandoned(reason) => {
                    warn!(
                        "term \"{}\" abandoned ({}): {} partial records exported",
                        term,
                        reason,
                        records.len()
                    );
                    summary.terms_abandoned += 1;
                }
                TermStatus::SkippedDone => unreachable!("handled before run_term"),
            }

            // Abandoned terms are marked too — retrying them automatically on
            // the next run would walk straight back into whatever broke.
            if let Err(e) = progress.mark_done(term) {
                warn!("could not record progress for \"{}\": {}", term, e);
            }

            if i + 1 < terms.len() {
                self.pacer.between_terms().await;
            }
        }

        if let Err(e) = self.session.close().await {
            warn!("session close failed: {}", e);
        }

        info!(
            "run finished: {} completed, {} abandoned, {} skipped, {} records",
            summary.terms_completed,
            summary.terms_abandoned,
            summary.terms_skipped,
            summary.records_exported
        );
        Ok(summary)
    }

    /// One term, end to end. Never fails the run: errors fold into the
    /// returned status, and whatever records were collected come back with it.
    async fn run_term(
        &mut self,
        term: &str,
        summary: &mut RunSummary,
    ) -> (Vec<BusinessRecord>, TermStatus) {
        let mut st = SessionState::new(term).with_export_path(&self.cfg.output_path);
        let mut records = Vec::new();

        match self.drive_term(&mut st, &mut records, summary).await {
            Ok(status) => (records, status),
            Err(e) => {
                error!("term \"{}\" failed: {}", term, e);
                (records, TermStatus::Abandoned(e.to_string()))
            }
        }
    }

    async fn drive_term(
        &mut self,
        st: &mut SessionState,
        records: &mut Vec<BusinessRecord>,
        summary: &mut RunSummary,
    ) -> Result<TermStatus, ScrapeError> {
        self.issue_search(&st.term).await?;
        st.panel_generation += 1;

        self.classify_entry(st, summary).await?;

        // Expansion, suspending on challenges until the operator clears them.
        let mut controller = PaginationController::new();
        let mut abandoned_reason: Option<String> = None;
        let handles = loop {
            match controller
                .expand(self.session.as_mut(), &self.pacer, &self.cfg, st)
                .await?
            {
                Expansion::Exhausted(handles) => break handles,
                Expansion::Stalled { handles, attempts } => {
                    abandoned_reason = Some(
                        ScrapeError::PaginationStalled {
                            attempts,
                            loaded: st.listings_loaded,
                        }
                        .to_string(),
                    );
                    break handles;
                }
                Expansion::Interrupted(event) => {
                    if self.gate_challenge(event, summary).await {
                        controller.resume(st);
                    } else {
                        return Err(ScrapeError::ChallengeUnresolved {
                            term: st.term.clone(),
                        });
                    }
                }
            }
        };

        // Extraction, resumable across challenge suspensions. The extractor
        // owns its config copy so the gate can borrow the orchestrator inside
        // the loop.
        let extractor = ListingExtractor::new(self.cfg.clone());
        let mut report = ExtractReport::default();
        loop {
            match extractor
                .extract_all(
                    self.session.as_mut(),
                    &self.pacer,
                    st,
                    &handles,
                    records,
                    &mut report,
                )
                .await?
            {
                ExtractionOutcome::Completed => break,
                ExtractionOutcome::Interrupted(event) => {
                    if self.gate_challenge(event, summary).await {
                        st.challenge_pending = false;
                    } else {
                        return Err(ScrapeError::ChallengeUnresolved {
                            term: st.term.clone(),
                        });
                    }
                }
            }
        }
        summary.listings_discarded_nameless += report.discarded_nameless;
        summary.listings_skipped_errors += report.skipped_errors;

        Ok(match abandoned_reason {
            Some(reason) => TermStatus::Abandoned(reason),
            None => TermStatus::Completed,
        })
    }

    /// Navigate to the search page, clear any consent banner, and type the
    /// query like a person would.
    async fn issue_search(&mut self, term: &str) -> Result<(), ScrapeError> {
        self.session.open(&self.cfg.search_url).await?;
        self.dismiss_consent().await;
        self.pacer.pace().await;

        let search_box = self
            .session
            .wait_for(descriptors::SEARCH_BOX, self.cfg.element_timeout)
            .await?;
        self.pacer
            .human_type(self.session.as_mut(), &search_box, term)
            .await?;
        self.session.press_key(&search_box, "Enter").await?;
        self.pacer.pace().await;
        Ok(())
    }

    /// Best-effort cookie-consent dismissal; a miss is fine.
    async fn dismiss_consent(&mut self) {
        for selector in descriptors::CONSENT_BUTTONS {
            match self.session.find_all(selector).await {
                Ok(found) => {
                    if let Some(button) = found.first() {
                        info!("dismissing consent banner via {}", selector);
                        if self.session.click(button).await.is_ok() {
                            self.pacer.pace().await;
                        }
                        return;
                    }
                }
                Err(e) => {
                    warn!("consent scan failed on {}: {}", selector, e);
                }
            }
        }
    }

    /// Classify the page right after search: challenge → gate; empty results
    /// → one retry, then the term is skipped.
    async fn classify_entry(
        &mut self,
        st: &mut SessionState,
        summary: &mut RunSummary,
    ) -> Result<(), ScrapeError> {
        let mut empty_attempts = 0u32;
        loop {
            let snapshot = self.session.snapshot().await?;
            match classify(&snapshot) {
                PageClass::Normal => return Ok(()),
                PageClass::ChallengePresented => {
                    let event = ChallengeEvent::now(&st.term);
                    st.challenge_pending = true;
                    if self.gate_challenge(event, summary).await {
                        st.challenge_pending = false;
                    } else {
                        return Err(ScrapeError::ChallengeUnresolved {
                            term: st.term.clone(),
                        });
                    }
                }
                PageClass::EmptyResults => {
                    empty_attempts += 1;
                    if empty_attempts > 1 {
                        return Err(ScrapeError::EmptyResults {
                            term: st.term.clone(),
                        });
                    }
                    warn!("no results for \"{}\", retrying search once", st.term);
                    let term = st.term.clone();
                    self.issue_search(&term).await?;
                    st.panel_generation += 1;
                }
            }
        }
    }

    /// Surface the challenge to the operator and block for the resume signal
    /// under the configured ceiling. The resolved event lands in the summary
    /// either way.
    async fn gate_challenge(&mut self, mut event: ChallengeEvent, summary: &mut RunSummary) -> bool {
        let resumed = self
            .gate
            .wait_for_resume(&event, self.cfg.challenge_wait_ceiling)
            .await;
        event.resumed = resumed;
        summary.challenges.push(event);
        if resumed {
            // Give the page a moment to settle after the human cleared it.
            self.pacer.pace().await;
        }
        resumed
    }
}
