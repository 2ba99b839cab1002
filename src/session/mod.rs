//! Browser session capability seam.
//!
//! Everything above this module talks to the page through [`BrowserSession`]:
//! navigate, find, read, click, scroll, wait. The live chromiumoxide handle
//! lives behind [`cdp::CdpSession`]; tests drive the same control loops with a
//! scripted implementation. All session failures are recoverable values, never
//! panics — the control loops decide whether a miss degrades a field, skips a
//! listing, or abandons a term.

pub mod cdp;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out after {waited:?} waiting for {descriptor}")]
    Timeout {
        descriptor: String,
        waited: Duration,
    },

    /// Driver-level failure (transport dropped, page crashed). Still
    /// recoverable at term granularity.
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl SessionError {
    /// Transient failures are worth a short retry before degrading.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ElementNotFound(_) | Self::Timeout { .. })
    }
}

/// Opaque reference to a live element.
///
/// Only meaningful to the session that produced it, and only while the panel
/// it came from is still the current one: the session stamps each ref with the
/// panel generation and refuses stale refs with `ElementNotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    id: u64,
    generation: u64,
}

impl ElementRef {
    pub fn new(id: u64, generation: u64) -> Self {
        Self { id, generation }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// One result entry in the currently loaded panel, in panel order.
/// Invalidated (like its `element`) by any panel reload or re-search.
#[derive(Debug, Clone)]
pub struct ListingHandle {
    pub element: ElementRef,
    pub index: usize,
}

/// Observable page markers, captured in one pass so classification can be a
/// pure function (and scriptable in tests).
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    /// Leading chunk of the page's visible text.
    pub body_text: String,
    /// Count of result-card containers currently rendered.
    pub result_count: usize,
    /// A challenge-specific element (e.g. the reCAPTCHA iframe) is present.
    pub challenge_marker: bool,
}

/// Thin capability interface over a controllable browser.
///
/// Operations block up to their configured timeout and surface
/// [`SessionError`] on non-convergence. One live page, exclusively owned;
/// strictly sequential use.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate the page. Invalidates every previously issued [`ElementRef`].
    async fn open(&mut self, url: &str) -> Result<(), SessionError>;

    /// All elements currently matching `descriptor`, in document order.
    /// An empty match is `Ok(vec![])`, not an error.
    async fn find_all(&mut self, descriptor: &str) -> Result<Vec<ElementRef>, SessionError>;

    /// Matching descendants of `parent`.
    async fn find_in(
        &mut self,
        parent: &ElementRef,
        descriptor: &str,
    ) -> Result<Vec<ElementRef>, SessionError>;

    /// Visible text of the element; `None` when the element renders empty.
    async fn read_text(&mut self, el: &ElementRef) -> Result<Option<String>, SessionError>;

    async fn click(&mut self, el: &ElementRef) -> Result<(), SessionError>;

    async fn scroll_into_view(&mut self, el: &ElementRef) -> Result<(), SessionError>;

    /// Scroll the page by `dy` pixels (negative scrolls up).
    async fn scroll_by(&mut self, dy: i64) -> Result<(), SessionError>;

    async fn type_text(&mut self, el: &ElementRef, text: &str) -> Result<(), SessionError>;

    async fn press_key(&mut self, el: &ElementRef, key: &str) -> Result<(), SessionError>;

    /// Block until `descriptor` matches, polling up to `timeout`.
    async fn wait_for(
        &mut self,
        descriptor: &str,
        timeout: Duration,
    ) -> Result<ElementRef, SessionError>;

    /// Capture the current observable page markers.
    async fn snapshot(&mut self) -> Result<PageSnapshot, SessionError>;

    /// Release the underlying browser. Idempotent.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Element descriptors for the map-search results surface.
///
/// SERP markup drifts; these are isolated here so a markup change is a
/// one-file fix. Comma-separated alternates are tried left to right by the
/// CDP session.
pub mod descriptors {
    /// The search input on the entry page.
    pub const SEARCH_BOX: &str = "[name='q']";

    /// Cookie-consent buttons, most permissive first.
    pub const CONSENT_BUTTONS: &[&str] = &[
        "button[aria-label='Accept all']",
        "#L2AGLb",
        "button[aria-label='Reject all']",
    ];

    /// One business card in the local-results panel.
    pub const RESULT_CARD: &str = "div.rllt__details";

    /// Business name inside a card.
    pub const LISTING_NAME: &str = "div.dbg0pd span, div.dbg0pd";

    /// The "4.6 ★ (1,234) · Category" summary line inside a card.
    pub const SUMMARY_LINE: &str = "span.Y0A0hc";

    /// Link that expands the initial three-pack into the full listing panel.
    pub const MORE_RESULTS: &str = "g-more-link a, a.LGwnxb";

    /// Next-page control inside the expanded panel.
    pub const NEXT_PAGE: &str = "#pnnext";

    /// Detail pane that opens when a card is clicked.
    pub const DETAIL_PANEL: &str = "div.xpdopen";

    pub const DETAIL_PHONE: &str = "span[data-dtype='d3ph']";
    pub const DETAIL_ADDRESS: &str = "span[data-dtype='d3adr']";
    pub const DETAIL_CATEGORY: &str = "span[data-attrid*='category']";
    pub const DETAIL_HOURS: &str = "span[data-attrid*='hours']";

    /// Challenge interstitial marker.
    pub const CHALLENGE_IFRAME: &str = "iframe[title='reCAPTCHA'], form#captcha-form";
}
