use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tokio::task::JoinHandle;

const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("Navigation to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },
}

/// Something that can turn a URL into fully rendered HTML.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: (u32, u32),
    pub user_agent: String,
    pub chrome_executable: Option<PathBuf>,
    /// Element that must be attached before the page counts as rendered.
    pub marker_selector: String,
    pub navigation_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: (1280, 720),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            chrome_executable: None,
            marker_selector: ".box".to_string(),
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

/// Viewport applied to every new tab. Without it chromiumoxide falls back to
/// 800x600 whatever the window size is.
fn page_viewport(config: &BrowserConfig) -> Viewport {
    let (width, height) = config.viewport;
    Viewport {
        width,
        height,
        ..Default::default()
    }
}

/// JS expression that is true once `marker` matches an attached element.
fn marker_script(marker: &str) -> String {
    format!(
        "document.querySelector({}) !== null",
        serde_json::Value::from(marker)
    )
}

/// A headless Chrome session with a single reusable tab.
pub struct ChromeFetcher {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    config: BrowserConfig,
}

impl ChromeFetcher {
    pub async fn launch(config: BrowserConfig) -> Result<Self, FetchError> {
        let (width, height) = config.viewport;
        let mut builder = CdpConfig::builder()
            .window_size(width, height)
            .viewport(page_viewport(&config));
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(FetchError::Browser)?;

        log::debug!("Launching browser (headless: {})", config.headless);
        let (browser, mut events) = Browser::launch(cdp_config)
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    log::debug!("Browser event loop stopped: {e}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        page.set_user_agent(SetUserAgentOverrideParams::new(config.user_agent.clone()))
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        Ok(Self {
            browser,
            page,
            handler,
            config,
        })
    }

    pub async fn close(mut self) -> Result<(), FetchError> {
        log::debug!("Closing browser");
        self.browser
            .close()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        self.browser
            .wait()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        if let Err(e) = self.handler.await {
            log::debug!("Browser event task ended abnormally: {e}");
        }
        Ok(())
    }
}

async fn load_rendered(page: &Page, marker: &str, url: &str) -> Result<String, FetchError> {
    let navigation = |e: chromiumoxide::error::CdpError| FetchError::Navigation {
        url: url.to_string(),
        reason: e.to_string(),
    };

    page.goto(url).await.map_err(navigation)?;

    // The content is filled in by client side script after the load event.
    // A CDP error here means the tab or connection is gone, not that the
    // marker is missing.
    let script = marker_script(marker);
    loop {
        let attached = page
            .evaluate(script.as_str())
            .await
            .map_err(navigation)?
            .into_value::<bool>()
            .unwrap_or(false);
        if attached {
            break;
        }
        tokio::time::sleep(MARKER_POLL_INTERVAL).await;
    }

    page.content().await.map_err(navigation)
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let timeout = self.config.navigation_timeout;
        let marker = self.config.marker_selector.as_str();
        tokio::time::timeout(timeout, load_rendered(&self.page, marker, url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                seconds: timeout.as_secs(),
            })?
    }
}

/// Launches a browser, hands it to `f`, and closes it again once `f` has
/// finished, whatever `f` returned.
pub async fn with_browser<T>(
    config: BrowserConfig,
    f: impl AsyncFnOnce(&mut ChromeFetcher) -> T,
) -> Result<T, FetchError> {
    let mut fetcher = ChromeFetcher::launch(config).await?;
    let output = f(&mut fetcher).await;
    if let Err(e) = fetcher.close().await {
        log::warn!("Failed to close browser cleanly: {}", e);
    }
    Ok(output)
}
