//! Scripted browser session + operator gate for driving the control loops
//! without a real browser.

// Each test binary uses a different slice of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mapscout::session::{descriptors, BrowserSession, ElementRef, PageSnapshot, SessionError};
use mapscout::{ChallengeEvent, OperatorGate};

#[derive(Clone, Debug)]
pub struct MockListing {
    pub name: String,
    pub summary: String,
    pub card_text: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Clicking this card never produces a detail pane.
    pub detail_times_out: bool,
}

impl MockListing {
    pub fn new(name: &str, summary: &str) -> Self {
        Self {
            name: name.to_string(),
            summary: summary.to_string(),
            card_text: format!("{}\n{}", name, summary),
            phone: Some("017 2345 6789".to_string()),
            address: Some("742 Evergreen Terrace, Springfield".to_string()),
            detail_times_out: false,
        }
    }

    pub fn with_detail_timeout(mut self) -> Self {
        self.detail_times_out = true;
        self
    }
}

/// Counters the tests read back after the session is boxed away.
#[derive(Default, Debug)]
pub struct MockStats {
    pub opens: usize,
    pub searches: usize,
    pub typed: String,
    pub more_clicks: usize,
    pub card_count_calls: usize,
    /// Every scroll_by delta, in order.
    pub scrolls: Vec<i64>,
    /// listing index → times its name element was read.
    pub name_reads: HashMap<usize, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    SearchBox,
    MoreButton,
    Card(usize),
    Name(usize),
    Summary(usize),
    DetailPanel,
    DetailPhone(usize),
    DetailAddress(usize),
}

pub struct MockSession {
    listings: Vec<MockListing>,
    initially_visible: usize,
    /// Extra listings revealed per more-results click, consumed front-to-back.
    more_batches: VecDeque<usize>,
    /// Explicit visible-count sequence, one entry consumed per card count.
    counts_script: VecDeque<usize>,
    visible: usize,
    generation: u64,
    next_id: u64,
    nodes: HashMap<u64, Node>,
    detail_open: Option<usize>,
    /// Challenge window: [start, start+len) in snapshot-call indices.
    challenge_at: Option<(usize, usize)>,
    snapshot_calls: usize,
    fail_scroll: bool,
    pub stats: Arc<Mutex<MockStats>>,
}

impl MockSession {
    pub fn new(listings: Vec<MockListing>, initially_visible: usize) -> Self {
        Self {
            initially_visible: initially_visible.min(listings.len()),
            listings,
            more_batches: VecDeque::new(),
            counts_script: VecDeque::new(),
            visible: 0,
            generation: 0,
            next_id: 0,
            nodes: HashMap::new(),
            detail_open: None,
            challenge_at: None,
            snapshot_calls: 0,
            fail_scroll: false,
            stats: Arc::new(Mutex::new(MockStats::default())),
        }
    }

    pub fn with_more_batch(mut self, extra: usize) -> Self {
        self.more_batches.push_back(extra);
        self
    }

    /// Present a challenge for `len` consecutive snapshots starting at
    /// snapshot call `start` (0-based across the whole session).
    pub fn with_challenge_at_snapshot(mut self, start: usize, len: usize) -> Self {
        self.challenge_at = Some((start, len));
        self
    }

    pub fn with_failing_scroll(mut self) -> Self {
        self.fail_scroll = true;
        self
    }

    /// Script the visible count per card-count call (last value repeats).
    pub fn with_counts_script(mut self, counts: &[usize]) -> Self {
        self.counts_script = counts.iter().copied().collect();
        self
    }

    /// Pretend the results panel already rendered (skip the search flow when
    /// driving the pagination controller directly).
    pub fn with_results_loaded(mut self) -> Self {
        self.visible = self.initially_visible;
        self
    }

    pub fn stats(&self) -> Arc<Mutex<MockStats>> {
        Arc::clone(&self.stats)
    }

    fn register(&mut self, node: Node) -> ElementRef {
        self.next_id += 1;
        self.nodes.insert(self.next_id, node);
        ElementRef::new(self.next_id, self.generation)
    }

    fn resolve(&self, el: &ElementRef) -> Result<Node, SessionError> {
        if el.generation() != self.generation {
            return Err(SessionError::ElementNotFound("stale element ref".to_string()));
        }
        self.nodes
            .get(&el.id())
            .copied()
            .ok_or_else(|| SessionError::ElementNotFound("unknown element ref".to_string()))
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn open(&mut self, _url: &str) -> Result<(), SessionError> {
        self.generation += 1;
        self.nodes.clear();
        self.visible = 0;
        self.detail_open = None;
        self.stats.lock().unwrap().opens += 1;
        Ok(())
    }

    async fn find_all(&mut self, descriptor: &str) -> Result<Vec<ElementRef>, SessionError> {
        match descriptor {
            d if d == descriptors::RESULT_CARD => {
                self.stats.lock().unwrap().card_count_calls += 1;
                if let Some(n) = self.counts_script.pop_front() {
                    self.visible = n.min(self.listings.len());
                }
                let refs = (0..self.visible)
                    .map(|i| self.register(Node::Card(i)))
                    .collect();
                Ok(refs)
            }
            d if d == descriptors::MORE_RESULTS => {
                if !self.more_batches.is_empty() && self.visible > 0 {
                    Ok(vec![self.register(Node::MoreButton)])
                } else {
                    Ok(vec![])
                }
            }
            d if d == descriptors::DETAIL_PHONE => match self.detail_open {
                Some(i) if self.listings[i].phone.is_some() => {
                    Ok(vec![self.register(Node::DetailPhone(i))])
                }
                _ => Ok(vec![]),
            },
            d if d == descriptors::DETAIL_ADDRESS => match self.detail_open {
                Some(i) if self.listings[i].address.is_some() => {
                    Ok(vec![self.register(Node::DetailAddress(i))])
                }
                _ => Ok(vec![]),
            },
            _ => Ok(vec![]),
        }
    }

    async fn find_in(
        &mut self,
        parent: &ElementRef,
        descriptor: &str,
    ) -> Result<Vec<ElementRef>, SessionError> {
        let node = self.resolve(parent)?;
        let Node::Card(i) = node else {
            return Ok(vec![]);
        };
        match descriptor {
            d if d == descriptors::LISTING_NAME => Ok(vec![self.register(Node::Name(i))]),
            d if d == descriptors::SUMMARY_LINE => {
                if self.listings[i].summary.is_empty() {
                    Ok(vec![])
                } else {
                    Ok(vec![self.register(Node::Summary(i))])
                }
            }
            _ => Ok(vec![]),
        }
    }

    async fn read_text(&mut self, el: &ElementRef) -> Result<Option<String>, SessionError> {
        let node = self.resolve(el)?;
        Ok(match node {
            Node::Name(i) => {
                *self
                    .stats
                    .lock()
                    .unwrap()
                    .name_reads
                    .entry(i)
                    .or_insert(0) += 1;
                Some(self.listings[i].name.clone()).filter(|s| !s.is_empty())
            }
            Node::Summary(i) => Some(self.listings[i].summary.clone()),
            Node::Card(i) => Some(self.listings[i].card_text.clone()),
            Node::DetailPhone(i) => self.listings[i].phone.clone(),
            Node::DetailAddress(i) => self.listings[i].address.clone(),
            _ => None,
        })
    }

    async fn click(&mut self, el: &ElementRef) -> Result<(), SessionError> {
        match self.resolve(el)? {
            Node::Card(i) => {
                // A fresh click always closes the previous pane.
                self.detail_open = if self.listings[i].detail_times_out {
                    None
                } else {
                    Some(i)
                };
            }
            Node::MoreButton => {
                if let Some(extra) = self.more_batches.pop_front() {
                    self.visible = (self.visible + extra).min(self.listings.len());
                }
                self.stats.lock().unwrap().more_clicks += 1;
            }
            _ => {}
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, el: &ElementRef) -> Result<(), SessionError> {
        self.resolve(el)?;
        Ok(())
    }

    async fn scroll_by(&mut self, dy: i64) -> Result<(), SessionError> {
        if self.fail_scroll {
            return Err(SessionError::ElementNotFound(
                "results panel is not scrollable".to_string(),
            ));
        }
        self.stats.lock().unwrap().scrolls.push(dy);
        Ok(())
    }

    async fn type_text(&mut self, el: &ElementRef, text: &str) -> Result<(), SessionError> {
        if self.resolve(el)? == Node::SearchBox {
            self.stats.lock().unwrap().typed.push_str(text);
        }
        Ok(())
    }

    async fn press_key(&mut self, el: &ElementRef, key: &str) -> Result<(), SessionError> {
        if self.resolve(el)? == Node::SearchBox && key == "Enter" {
            self.visible = self.initially_visible;
            self.stats.lock().unwrap().searches += 1;
        }
        Ok(())
    }

    async fn wait_for(
        &mut self,
        descriptor: &str,
        _timeout: Duration,
    ) -> Result<ElementRef, SessionError> {
        match descriptor {
            d if d == descriptors::SEARCH_BOX => Ok(self.register(Node::SearchBox)),
            d if d == descriptors::DETAIL_PANEL => {
                if self.detail_open.is_some() {
                    Ok(self.register(Node::DetailPanel))
                } else {
                    Err(SessionError::Timeout {
                        descriptor: descriptor.to_string(),
                        waited: Duration::ZERO,
                    })
                }
            }
            _ => Err(SessionError::Timeout {
                descriptor: descriptor.to_string(),
                waited: Duration::ZERO,
            }),
        }
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot, SessionError> {
        let idx = self.snapshot_calls;
        self.snapshot_calls += 1;
        let challenged = self
            .challenge_at
            .is_some_and(|(start, len)| idx >= start && idx < start + len);
        Ok(PageSnapshot {
            url: "https://mock.test/search".to_string(),
            body_text: if challenged {
                "Our systems have detected unusual traffic".to_string()
            } else {
                "Results".to_string()
            },
            result_count: self.visible,
            challenge_marker: challenged,
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Operator gate with canned answers; defaults to "resumed" when the script
/// runs out.
pub struct ScriptedGate {
    responses: VecDeque<bool>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedGate {
    pub fn resuming() -> Self {
        Self {
            responses: VecDeque::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_responses(responses: &[bool]) -> Self {
        Self {
            responses: responses.iter().copied().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl OperatorGate for ScriptedGate {
    async fn wait_for_resume(&mut self, _event: &ChallengeEvent, _ceiling: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.pop_front().unwrap_or(true)
    }
}

/// Fast test configuration: real control flow, millisecond pacing.
pub fn test_config(tag: &str) -> mapscout::ScoutConfig {
    let dir = std::env::temp_dir();
    let pid = std::process::id();
    mapscout::ScoutConfig::default()
        .with_delays(Duration::from_millis(1), Duration::from_millis(2))
        .with_between_terms(Duration::from_millis(1), Duration::from_millis(2))
        .with_element_timeout(Duration::from_millis(50))
        .with_output_path(dir.join(format!("mapscout-{}-{}.csv", tag, pid)))
        .with_progress_path(dir.join(format!("mapscout-{}-{}.progress", tag, pid)))
}
