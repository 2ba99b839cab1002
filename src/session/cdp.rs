//! Native chromiumoxide implementation of [`BrowserSession`].
//!
//! Single source of truth for:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Launching the session with stealth-friendly flags and a realistic UA.
//! * Mapping live DOM elements to generation-stamped [`ElementRef`]s.
//!
//! Stealth model: process-level only (flags + user-agent rotation). Timing
//! stealth is the pacer's job, and challenge handling is explicitly a human's.

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Element, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserSession, ElementRef, PageSnapshot, SessionError};
use crate::core::ScoutConfig;
use crate::session::descriptors;
use async_trait::async_trait;

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox 133 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/brave",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

fn build_browser_config(exe: &str, cfg: &ScoutConfig) -> Result<BrowserConfig, SessionError> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1920,
            height: 1080,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1920, 1080)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-infobars")
        .arg("--mute-audio")
        // Stealth: suppress CDP automation fingerprint
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if let Some(profile) = &cfg.user_profile_path {
        builder = builder.arg(format!("--user-data-dir={}", profile.display()));
    }
    if !cfg.headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| SessionError::Driver(format!("failed to build browser config: {}", e)))
}

/// Live chromiumoxide session. Owns the browser process, its event-handler
/// task, and the element registry that backs [`ElementRef`]s.
pub struct CdpSession {
    browser: Option<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    /// Live elements by ref id. Cleared on every navigation.
    elements: HashMap<u64, Element>,
    next_id: u64,
    /// Bumped on every navigation; refs stamped with an older generation are
    /// rejected as stale instead of dereferencing a dead DOM node.
    generation: u64,
}

impl CdpSession {
    /// Launch a fresh browser and open a blank page.
    pub async fn launch(cfg: &ScoutConfig) -> Result<Self, SessionError> {
        let exe = find_chrome_executable().ok_or_else(|| {
            SessionError::Driver(
                "no browser found — install Brave, Chrome, or Chromium (or set CHROME_EXECUTABLE)"
                    .to_string(),
            )
        })?;
        info!("launching browser: {} (headless={})", exe, cfg.headless);

        let config = build_browser_config(&exe, cfg)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Driver(format!("failed to launch {}: {}", exe, e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Driver(format!("failed to open page: {}", e)))?;

        Ok(Self {
            browser: Some(browser),
            page,
            handler_task,
            elements: HashMap::new(),
            next_id: 1,
            generation: 0,
        })
    }

    fn register(&mut self, el: Element) -> ElementRef {
        let id = self.next_id;
        self.next_id += 1;
        self.elements.insert(id, el);
        ElementRef::new(id, self.generation)
    }

    fn resolve(&self, el: &ElementRef) -> Result<&Element, SessionError> {
        if el.generation() != self.generation {
            return Err(SessionError::ElementNotFound(format!(
                "stale element ref #{} (panel generation {} != {})",
                el.id(),
                el.generation(),
                self.generation
            )));
        }
        self.elements
            .get(&el.id())
            .ok_or_else(|| SessionError::ElementNotFound(format!("unknown element ref #{}", el.id())))
    }

    fn driver_err(e: impl std::fmt::Display) -> SessionError {
        SessionError::Driver(e.to_string())
    }

    /// chromiumoxide reports a zero-node match as an error; callers want that
    /// as an empty vec. Anything else (dead page, dropped transport) must not
    /// masquerade as "no results".
    fn nodes_or_empty(
        found: Result<Vec<Element>, chromiumoxide::error::CdpError>,
    ) -> Result<Vec<Element>, SessionError> {
        match found {
            Ok(els) => Ok(els),
            Err(chromiumoxide::error::CdpError::NotFound) => Ok(Vec::new()),
            Err(e) if e.to_string().to_lowercase().contains("could not find node") => {
                Ok(Vec::new())
            }
            Err(e) => Err(SessionError::Driver(e.to_string())),
        }
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn open(&mut self, url: &str) -> Result<(), SessionError> {
        debug!("navigating to {}", url);
        self.generation += 1;
        self.elements.clear();
        self.page
            .goto(url)
            .await
            .map_err(|e| SessionError::Driver(format!("navigation to {} failed: {}", url, e)))?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn find_all(&mut self, descriptor: &str) -> Result<Vec<ElementRef>, SessionError> {
        let found = Self::nodes_or_empty(self.page.find_elements(descriptor).await)?;
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn find_in(
        &mut self,
        parent: &ElementRef,
        descriptor: &str,
    ) -> Result<Vec<ElementRef>, SessionError> {
        let parent_el = self.resolve(parent)?;
        let found = Self::nodes_or_empty(parent_el.find_elements(descriptor).await)?;
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn read_text(&mut self, el: &ElementRef) -> Result<Option<String>, SessionError> {
        let element = self.resolve(el)?;
        let text = element.inner_text().await.map_err(Self::driver_err)?;
        Ok(text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
    }

    async fn click(&mut self, el: &ElementRef) -> Result<(), SessionError> {
        let element = self.resolve(el)?;
        element.click().await.map_err(Self::driver_err)?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, el: &ElementRef) -> Result<(), SessionError> {
        let element = self.resolve(el)?;
        element.scroll_into_view().await.map_err(Self::driver_err)?;
        Ok(())
    }

    async fn scroll_by(&mut self, dy: i64) -> Result<(), SessionError> {
        self.page
            .evaluate(format!(
                "window.scrollBy({{top: {}, behavior: 'smooth'}});",
                dy
            ))
            .await
            .map_err(Self::driver_err)?;
        Ok(())
    }

    async fn type_text(&mut self, el: &ElementRef, text: &str) -> Result<(), SessionError> {
        let element = self.resolve(el)?;
        element.type_str(text).await.map_err(Self::driver_err)?;
        Ok(())
    }

    async fn press_key(&mut self, el: &ElementRef, key: &str) -> Result<(), SessionError> {
        let element = self.resolve(el)?;
        element.press_key(key).await.map_err(Self::driver_err)?;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        descriptor: &str,
        timeout: Duration,
    ) -> Result<ElementRef, SessionError> {
        let started = Instant::now();
        loop {
            if let Ok(el) = self.page.find_element(descriptor).await {
                return Ok(self.register(el));
            }
            if started.elapsed() >= timeout {
                return Err(SessionError::Timeout {
                    descriptor: descriptor.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot, SessionError> {
        let url = self.page.url().await.ok().flatten().unwrap_or_default();

        let body_text = match self
            .page
            .evaluate("document.body ? document.body.innerText.slice(0, 4000) : ''")
            .await
        {
            Ok(val) => val.into_value::<String>().unwrap_or_default(),
            Err(e) => {
                warn!("snapshot: body text read failed: {}", e);
                String::new()
            }
        };

        let result_count = self
            .page
            .find_elements(descriptors::RESULT_CARD)
            .await
            .map(|v| v.len())
            .unwrap_or(0);

        let challenge_marker = self
            .page
            .find_elements(descriptors::CHALLENGE_IFRAME)
            .await
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        Ok(PageSnapshot {
            url,
            body_text,
            result_count,
            challenge_marker,
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.elements.clear();
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agents_look_real() {
        for ua in DESKTOP_USER_AGENTS {
            assert!(ua.contains("Mozilla"));
        }
        assert!(random_user_agent().contains("Mozilla"));
    }

    #[test]
    fn test_zero_match_reads_as_empty_but_driver_errors_surface() {
        use chromiumoxide::error::CdpError;

        assert!(CdpSession::nodes_or_empty(Ok(Vec::new()))
            .unwrap()
            .is_empty());
        assert!(CdpSession::nodes_or_empty(Err(CdpError::NotFound))
            .unwrap()
            .is_empty());
        assert!(CdpSession::nodes_or_empty(Err(CdpError::msg(
            "Could not find node with given id"
        )))
        .unwrap()
        .is_empty());
        // A dead transport must not look like an empty panel.
        assert!(matches!(
            CdpSession::nodes_or_empty(Err(CdpError::Timeout)),
            Err(SessionError::Driver(_))
        ));
    }
}
