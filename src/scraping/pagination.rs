//! Results-panel expansion.
//!
//! A small state machine drives the panel until the full listing set is
//! loaded: `Initial → Expanding → Stable → Exhausted`, with `Interrupted`
//! reachable from any non-terminal state when a challenge appears. The
//! loaded-count sequence is non-decreasing for the lifetime of one term, and
//! the controller checkpoints it across suspensions so a resume never
//! re-counts.

use tracing::{debug, info, warn};

use super::ScrapeError;
use crate::core::{ChallengeEvent, ScoutConfig, SessionState};
use crate::features::challenge::{classify, PageClass};
use crate::features::pacing::Pacer;
use crate::session::{descriptors, BrowserSession, ListingHandle, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Initial,
    Expanding,
    Stable,
    Exhausted,
    Interrupted,
}

/// How one `expand` call ended.
#[derive(Debug)]
pub enum Expansion {
    /// Panel fully loaded; handles are in panel order, capped at
    /// `max_listings_per_term`.
    Exhausted(Vec<ListingHandle>),
    /// Load-more kept failing without progress. Partial handle set — the term
    /// is abandoned with whatever loaded.
    Stalled {
        handles: Vec<ListingHandle>,
        attempts: u32,
    },
    /// A challenge appeared. Caller must get an operator resume and call
    /// [`PaginationController::resume`] before expanding again.
    Interrupted(ChallengeEvent),
}

#[derive(Debug)]
pub struct PaginationController {
    state: PaginationState,
    /// Consecutive checks where the loaded count did not increase.
    non_increasing: u32,
    /// Consecutive load-more attempts that errored without any progress.
    stall_attempts: u32,
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new()
    }
}

impl PaginationController {
    pub fn new() -> Self {
        Self {
            state: PaginationState::Initial,
            non_increasing: 0,
            stall_attempts: 0,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    /// Re-enter `Expanding` after an operator cleared a challenge. The loaded
    /// count checkpoint in [`SessionState`] is untouched.
    pub fn resume(&mut self, st: &mut SessionState) {
        debug_assert_eq!(self.state, PaginationState::Interrupted);
        st.challenge_pending = false;
        self.state = PaginationState::Expanding;
        info!(
            "pagination resumed for \"{}\" from {} loaded listings",
            st.term, st.listings_loaded
        );
    }

    /// Drive the panel until it is exhausted, stalled, or interrupted.
    pub async fn expand(
        &mut self,
        session: &mut dyn BrowserSession,
        pacer: &Pacer,
        cfg: &ScoutConfig,
        st: &mut SessionState,
    ) -> Result<Expansion, ScrapeError> {
        loop {
            match self.state {
                PaginationState::Initial => {
                    let count = count_cards(session).await?;
                    st.listings_loaded = st.listings_loaded.max(count);
                    debug!("initial panel: {} listings", st.listings_loaded);
                    self.state = PaginationState::Expanding;
                }

                PaginationState::Expanding => {
                    if let Some(event) = self.check_challenge(session, st).await? {
                        return Ok(Expansion::Interrupted(event));
                    }

                    if st.listings_loaded >= cfg.max_listings_per_term {
                        info!(
                            "listing cap reached for \"{}\" ({} ≥ {})",
                            st.term, st.listings_loaded, cfg.max_listings_per_term
                        );
                        self.state = PaginationState::Stable;
                        continue;
                    }

                    if let Err(e) = self.load_more(session, pacer).await {
                        if !e.is_transient() {
                            return Err(e.into());
                        }
                        // A failed action is not a stability check — only
                        // successful load-mores with no growth count toward
                        // Stable.
                        self.stall_attempts += 1;
                        debug!(
                            "load-more attempt failed ({}/{}): {}",
                            self.stall_attempts, cfg.pagination_stall_threshold, e
                        );
                        if self.stall_attempts >= cfg.pagination_stall_threshold {
                            warn!(
                                "pagination stalled for \"{}\": {} attempts, {} loaded",
                                st.term, self.stall_attempts, st.listings_loaded
                            );
                            let handles = self.collect(session, cfg, st).await?;
                            return Ok(Expansion::Stalled {
                                handles,
                                attempts: self.stall_attempts,
                            });
                        }
                        pacer.pace().await;
                        continue;
                    }

                    pacer.pace().await;

                    let count = count_cards(session).await?;
                    if count > st.listings_loaded {
                        st.listings_loaded = count;
                        self.non_increasing = 0;
                        self.stall_attempts = 0;
                        debug!("panel grew: {} listings", count);
                    } else {
                        self.non_increasing += 1;
                        debug!(
                            "no growth ({} listings, check {}/{})",
                            st.listings_loaded, self.non_increasing, cfg.stable_checks
                        );
                        if self.non_increasing >= cfg.stable_checks {
                            self.state = PaginationState::Stable;
                        }
                    }
                }

                PaginationState::Stable => {
                    if let Some(event) = self.check_challenge(session, st).await? {
                        return Ok(Expansion::Interrupted(event));
                    }
                    // One debounce re-check against late-loading content.
                    pacer.pace().await;
                    let count = count_cards(session).await?;
                    if count > st.listings_loaded && st.listings_loaded < cfg.max_listings_per_term
                    {
                        st.listings_loaded = count;
                        self.non_increasing = 0;
                        debug!("late content arrived, back to expanding ({} listings)", count);
                        self.state = PaginationState::Expanding;
                    } else {
                        self.state = PaginationState::Exhausted;
                    }
                }

                PaginationState::Exhausted => {
                    let handles = self.collect(session, cfg, st).await?;
                    info!(
                        "panel exhausted for \"{}\": {} listings",
                        st.term,
                        handles.len()
                    );
                    return Ok(Expansion::Exhausted(handles));
                }

                PaginationState::Interrupted => {
                    // Caller forgot resume(); treat the call as the resume.
                    self.resume(st);
                }
            }
        }
    }

    async fn check_challenge(
        &mut self,
        session: &mut dyn BrowserSession,
        st: &mut SessionState,
    ) -> Result<Option<ChallengeEvent>, SessionError> {
        let snapshot = session.snapshot().await?;
        if classify(&snapshot) == PageClass::ChallengePresented {
            warn!(
                "challenge presented mid-pagination for \"{}\" ({} listings loaded)",
                st.term, st.listings_loaded
            );
            self.state = PaginationState::Interrupted;
            st.challenge_pending = true;
            return Ok(Some(ChallengeEvent::now(&st.term)));
        }
        Ok(None)
    }

    /// Invoke one load-more action: a more-results control if present, else a
    /// next-page control, else an incremental scroll of the panel.
    async fn load_more(
        &mut self,
        session: &mut dyn BrowserSession,
        pacer: &Pacer,
    ) -> Result<(), SessionError> {
        for control in [descriptors::MORE_RESULTS, descriptors::NEXT_PAGE] {
            let found = session.find_all(control).await?;
            if let Some(el) = found.first() {
                session.scroll_into_view(el).await?;
                session.click(el).await?;
                debug!("clicked load-more control {}", control);
                return Ok(());
            }
        }
        pacer.human_scroll(session, 1_200).await
    }

    async fn collect(
        &self,
        session: &mut dyn BrowserSession,
        cfg: &ScoutConfig,
        st: &SessionState,
    ) -> Result<Vec<ListingHandle>, ScrapeError> {
        let mut handles: Vec<ListingHandle> = session
            .find_all(descriptors::RESULT_CARD)
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, element)| ListingHandle { element, index })
            .collect();
        handles.truncate(cfg.max_listings_per_term);
        debug_assert!(handles.len() <= st.listings_loaded.max(handles.len()));
        Ok(handles)
    }
}

async fn count_cards(session: &mut dyn BrowserSession) -> Result<usize, SessionError> {
    Ok(session.find_all(descriptors::RESULT_CARD).await?.len())
}
