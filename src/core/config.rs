use std::path::PathBuf;
use std::time::Duration;

/// Shape of the randomized delay distribution used between page interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    #[default]
    Uniform,
    /// Bell-curve-ish jitter; delays cluster around the middle of the range.
    Gaussian,
}

impl JitterMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Some(Self::Uniform),
            "gaussian" | "normal" => Some(Self::Gaussian),
            _ => None,
        }
    }
}

/// Run configuration.
///
/// Defaults mirror the pacing a careful human shows on a results page; all of
/// the termination thresholds are tunable rather than baked in. Every field
/// can also be overridden from the environment via `MAPSCOUT_*` (see
/// [`ScoutConfig::from_env`]).
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    /// Page the search starts from.
    pub search_url: String,
    /// Floor for every randomized pause. No interaction ever completes
    /// faster than this.
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter_mode: JitterMode,
    /// Long break between terms, drawn uniformly from this range.
    pub between_terms_min: Duration,
    pub between_terms_max: Duration,
    /// Hard cap on listings harvested per term.
    pub max_listings_per_term: usize,
    /// Consecutive non-increasing count checks before the panel is considered
    /// stable (debounce against late-loading content).
    pub stable_checks: u32,
    /// Consecutive failed load-more attempts (no progress, action erroring)
    /// before the term is declared stalled and abandoned.
    pub pagination_stall_threshold: u32,
    /// How long the run will wait for an operator to clear a challenge before
    /// abandoning the term.
    pub challenge_wait_ceiling: Duration,
    /// Timeout for any single wait-for-element.
    pub element_timeout: Duration,
    /// Transient element failures are retried this many times before being
    /// treated as absent.
    pub retry_attempts: u32,
    pub output_path: PathBuf,
    /// Completed-terms file; lets a restarted run skip finished terms.
    pub progress_path: PathBuf,
    pub headless: bool,
    /// Reuse a persistent browser profile (keeps cookies, looks lived-in).
    pub user_profile_path: Option<PathBuf>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.google.com".to_string(),
            min_delay: Duration::from_millis(2_500),
            max_delay: Duration::from_millis(4_000),
            jitter_mode: JitterMode::Uniform,
            between_terms_min: Duration::from_secs(10),
            between_terms_max: Duration::from_secs(25),
            max_listings_per_term: 200,
            stable_checks: 2,
            pagination_stall_threshold: 5,
            challenge_wait_ceiling: Duration::from_secs(15 * 60),
            element_timeout: Duration::from_secs(20),
            retry_attempts: 2,
            output_path: PathBuf::from("listings.csv"),
            progress_path: PathBuf::from("completed_terms.txt"),
            headless: true,
            user_profile_path: None,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl ScoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with any `MAPSCOUT_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("MAPSCOUT_SEARCH_URL") {
            cfg.search_url = url;
        }
        if let Some(ms) = env_u64("MAPSCOUT_MIN_DELAY_MS") {
            cfg.min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("MAPSCOUT_MAX_DELAY_MS") {
            cfg.max_delay = Duration::from_millis(ms);
        }
        if let Some(mode) = std::env::var("MAPSCOUT_JITTER")
            .ok()
            .and_then(|v| JitterMode::parse(&v))
        {
            cfg.jitter_mode = mode;
        }
        if let Some(n) = env_u64("MAPSCOUT_MAX_LISTINGS") {
            cfg.max_listings_per_term = n as usize;
        }
        if let Some(n) = env_u64("MAPSCOUT_STALL_THRESHOLD") {
            cfg.pagination_stall_threshold = n as u32;
        }
        if let Some(n) = env_u64("MAPSCOUT_STABLE_CHECKS") {
            cfg.stable_checks = (n as u32).max(1);
        }
        if let Some(secs) = env_u64("MAPSCOUT_CHALLENGE_WAIT_SECS") {
            cfg.challenge_wait_ceiling = Duration::from_secs(secs);
        }
        if let Ok(p) = std::env::var("MAPSCOUT_OUTPUT") {
            cfg.output_path = PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("MAPSCOUT_PROGRESS_FILE") {
            cfg.progress_path = PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("MAPSCOUT_PROFILE_DIR") {
            cfg.user_profile_path = Some(PathBuf::from(p));
        }
        cfg
    }

    pub fn with_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }

    pub fn with_between_terms(mut self, min: Duration, max: Duration) -> Self {
        self.between_terms_min = min;
        self.between_terms_max = max.max(min);
        self
    }

    pub fn with_jitter_mode(mut self, mode: JitterMode) -> Self {
        self.jitter_mode = mode;
        self
    }

    pub fn with_max_listings(mut self, n: usize) -> Self {
        self.max_listings_per_term = n;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_progress_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_challenge_wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.challenge_wait_ceiling = ceiling;
        self
    }

    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = ScoutConfig::default();
        assert!(cfg.min_delay <= cfg.max_delay);
        assert!(cfg.stable_checks >= 2);
        assert!(cfg.pagination_stall_threshold >= 1);
    }

    #[test]
    fn test_builder_clamps_inverted_range() {
        let cfg = ScoutConfig::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(50));
        assert_eq!(cfg.min_delay, cfg.max_delay);
    }

    #[test]
    fn test_jitter_mode_parse() {
        assert_eq!(JitterMode::parse("uniform"), Some(JitterMode::Uniform));
        assert_eq!(JitterMode::parse("GAUSSIAN"), Some(JitterMode::Gaussian));
        assert_eq!(JitterMode::parse("chaotic"), None);
    }
}
