//! Operator signal channel.
//!
//! When a challenge interstitial appears the run cannot proceed on its own:
//! solving is explicitly out of automated scope. The orchestrator raises an
//! operator-visible notification and blocks on [`OperatorGate::wait_for_resume`]
//! until the human confirms the page is clear — or the wait ceiling expires
//! and the term is abandoned.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::core::ChallengeEvent;

#[async_trait]
pub trait OperatorGate: Send {
    /// Block until the operator signals the challenge is solved, or `ceiling`
    /// elapses. Returns `true` on an explicit resume signal.
    async fn wait_for_resume(&mut self, event: &ChallengeEvent, ceiling: Duration) -> bool;
}

/// Console transport: banner on stdout, resume = operator pressing Enter.
/// With the `desktop-alerts` feature an OS notification fires as well.
#[derive(Debug, Default)]
pub struct ConsoleGate;

impl ConsoleGate {
    pub fn new() -> Self {
        Self
    }

    fn banner(event: &ChallengeEvent, ceiling: Duration) {
        println!("\n{}", "=".repeat(60));
        println!("ACTION REQUIRED: solve the challenge in the browser window.");
        println!("Search term: \"{}\"", event.term);
        println!(
            "Press Enter here once it is solved. Waiting up to {} minutes.",
            ceiling.as_secs() / 60
        );
        println!("{}\n", "=".repeat(60));
    }

    #[cfg(feature = "desktop-alerts")]
    fn desktop_alert(event: &ChallengeEvent) {
        if let Err(e) = notify_rust::Notification::new()
            .summary("mapscout: challenge needs a human")
            .body(&format!(
                "An anti-bot challenge is blocking the term \"{}\".",
                event.term
            ))
            .show()
        {
            warn!("desktop alert failed: {}", e);
        }
    }

    #[cfg(not(feature = "desktop-alerts"))]
    fn desktop_alert(_event: &ChallengeEvent) {}
}

/// Wait for one line on `reader` under `ceiling`. Only an actual line counts
/// as a resume: a zero-byte read means the channel is at EOF (piped or
/// detached stdin) and no operator will ever answer.
async fn await_resume_line<R>(reader: &mut R, event: &ChallengeEvent, ceiling: Duration) -> bool
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = String::new();
    match tokio::time::timeout(ceiling, reader.read_line(&mut line)).await {
        Ok(Ok(0)) => {
            warn!(
                "operator channel closed (EOF) — no human available for \"{}\"",
                event.term
            );
            false
        }
        Ok(Ok(_)) => {
            info!("operator resume signal received for \"{}\"", event.term);
            true
        }
        Ok(Err(e)) => {
            warn!("operator channel read failed: {}", e);
            false
        }
        Err(_) => {
            warn!(
                "challenge wait ceiling ({}s) expired for \"{}\"",
                ceiling.as_secs(),
                event.term
            );
            false
        }
    }
}

#[async_trait]
impl OperatorGate for ConsoleGate {
    async fn wait_for_resume(&mut self, event: &ChallengeEvent, ceiling: Duration) -> bool {
        Self::banner(event, ceiling);
        Self::desktop_alert(event);

        let mut reader = BufReader::new(tokio::io::stdin());
        await_resume_line(&mut reader, event, ceiling).await
    }
}
