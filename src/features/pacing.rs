//! Human-behavior pacing.
//!
//! Uniformly-timed automation is the loudest fingerprint there is. Every page
//! interaction goes through a [`Pacer`], which sleeps a randomized duration and
//! breaks scrolls/typing into small jittered increments. The only contract is
//! "never faster than `min_delay`" — the rest is wall-clock noise.

use rand::distr::{Distribution, Uniform};
use std::time::Duration;
use tracing::debug;

use crate::core::{JitterMode, ScoutConfig};
use crate::session::{BrowserSession, ElementRef, SessionError};

#[derive(Debug, Clone)]
pub struct Pacer {
    min: Duration,
    max: Duration,
    mode: JitterMode,
    between_terms_min: Duration,
    between_terms_max: Duration,
}

impl Pacer {
    pub fn new(cfg: &ScoutConfig) -> Self {
        Self {
            min: cfg.min_delay,
            max: cfg.max_delay.max(cfg.min_delay),
            mode: cfg.jitter_mode,
            between_terms_min: cfg.between_terms_min,
            between_terms_max: cfg.between_terms_max.max(cfg.between_terms_min),
        }
    }

    /// Sample one pause from the configured distribution. Always ≥ `min`.
    pub fn sample(&self) -> Duration {
        sample_range(self.min, self.max, self.mode)
    }

    /// Block the calling interaction for one sampled pause.
    pub async fn pace(&self) {
        let d = self.sample();
        debug!("pacing {}ms", d.as_millis());
        tokio::time::sleep(d).await;
    }

    /// Long randomized break between search terms.
    pub async fn between_terms(&self) {
        let d = sample_range(
            self.between_terms_min,
            self.between_terms_max,
            JitterMode::Uniform,
        );
        debug!("between-terms break: {}ms", d.as_millis());
        tokio::time::sleep(d).await;
    }

    /// Scroll `total` pixels in several small increments with a short pause
    /// between each, instead of one detectable jump.
    pub async fn human_scroll(
        &self,
        session: &mut dyn BrowserSession,
        total: i64,
    ) -> Result<(), SessionError> {
        use rand::RngExt;

        let steps = {
            let mut rng = rand::rng();
            rng.random_range(3..=6)
        };
        let mut step = total / steps as i64;
        if step == 0 {
            step = total.signum();
        }
        for _ in 0..steps {
            let jitter = {
                let mut rng = rand::rng();
                rng.random_range(-40..=40)
            };
            session.scroll_by(step + jitter).await?;
            // Scroll pauses are shorter than full interaction pauses.
            tokio::time::sleep(self.sample() / 3).await;
        }
        Ok(())
    }

    /// Type character by character with per-keystroke jitter, like a person
    /// who knows what they want to search for.
    pub async fn human_type(
        &self,
        session: &mut dyn BrowserSession,
        el: &ElementRef,
        text: &str,
    ) -> Result<(), SessionError> {
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            session.type_text(el, ch.encode_utf8(&mut buf)).await?;
            let keystroke = (self.sample() / 20).min(Duration::from_millis(150));
            tokio::time::sleep(keystroke).await;
        }
        Ok(())
    }
}

fn sample_range(min: Duration, max: Duration, mode: JitterMode) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    if hi <= lo {
        return min;
    }
    let dist = match Uniform::new_inclusive(lo, hi) {
        Ok(d) => d,
        Err(_) => return min,
    };
    let mut rng = rand::rng();
    let ms = match mode {
        JitterMode::Uniform => dist.sample(&mut rng),
        // Mean of three uniform draws clusters around the midpoint — close
        // enough to a bell curve without pulling in a Normal sampler, and it
        // can never leave [lo, hi].
        JitterMode::Gaussian => {
            (dist.sample(&mut rng) + dist.sample(&mut rng) + dist.sample(&mut rng)) / 3
        }
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pacer(min_ms: u64, max_ms: u64, mode: JitterMode) -> Pacer {
        Pacer::new(
            &ScoutConfig::default()
                .with_delays(
                    Duration::from_millis(min_ms),
                    Duration::from_millis(max_ms),
                )
                .with_jitter_mode(mode),
        )
    }

    #[test]
    fn test_sample_respects_bounds_uniform() {
        let p = pacer(20, 80, JitterMode::Uniform);
        for _ in 0..500 {
            let d = p.sample();
            assert!(d >= Duration::from_millis(20));
            assert!(d <= Duration::from_millis(80));
        }
    }

    #[test]
    fn test_sample_respects_bounds_gaussian() {
        let p = pacer(20, 80, JitterMode::Gaussian);
        for _ in 0..500 {
            let d = p.sample();
            assert!(d >= Duration::from_millis(20));
            assert!(d <= Duration::from_millis(80));
        }
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let p = pacer(50, 50, JitterMode::Uniform);
        assert_eq!(p.sample(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pace_never_faster_than_min() {
        let p = pacer(30, 60, JitterMode::Uniform);
        let start = Instant::now();
        p.pace().await;
        // Allow slight timer variance.
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
