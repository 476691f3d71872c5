use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use thirtyfour::{By, DesiredCapabilities, WebDriver};
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::parser::{Page, Rule};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const USER_AGENT: &str = concat!("listing_scraper/", env!("CARGO_PKG_VERSION"));

/// Something that can load a URL and hand back the rendered markup.
///
/// One renderer is held for a whole run and released with `close`.
#[async_trait]
pub trait Renderer: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError>;

    async fn current_markup(&mut self) -> Result<String, ScrapeError>;

    /// Block until `marker` (a CSS selector) is present or `timeout` passes.
    /// `Ok(false)` means the marker never showed up.
    async fn wait_for(&mut self, marker: &str, timeout: Duration) -> Result<bool, ScrapeError>;

    async fn close(&mut self) -> Result<(), ScrapeError> {
        Ok(())
    }
}

/// Renderers that return finished markup in one shot can only check the marker once.
pub(crate) fn markup_has(markup: &str, marker: &str) -> bool {
    match Rule::new(marker) {
        Ok(rule) => Page::parse(markup).find_first(&rule).is_some(),
        Err(e) => {
            warn!("{:#}", e);
            false
        }
    }
}

/// A page loaded through a one-shot renderer.
struct Loaded {
    url: String,
    markup: String,
}

fn loaded_markup(page: &Option<Loaded>) -> Result<String, ScrapeError> {
    page.as_ref()
        .map(|p| p.markup.clone())
        .ok_or_else(|| ScrapeError::fetch("<none>", anyhow!("no page loaded")))
}

// ── spider.cloud ──

/// Renders pages through spider.cloud and keeps the raw HTML it returns.
pub struct SpiderRenderer {
    spider: Spider,
    page: Option<Loaded>,
}

impl SpiderRenderer {
    pub fn from_env() -> Result<Self, ScrapeError> {
        let api_key = std::env::var("SPIDER_API_KEY").map_err(|_| {
            ScrapeError::FatalSetupFailure("SPIDER_API_KEY environment variable must be set".into())
        })?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| ScrapeError::FatalSetupFailure(format!("Failed to create Spider client: {}", e)))?;
        Ok(Self { spider, page: None })
    }
}

#[async_trait]
impl Renderer for SpiderRenderer {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        self.page = None;
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| ScrapeError::fetch(url, anyhow!("Spider scrape failed: {}", e)))?;
        debug!("spider returned {} in {}ms", url, start.elapsed().as_millis());

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        if let Some(status) = first.and_then(|obj| obj.get("status")).and_then(|s| s.as_i64()) {
            if status >= 400 {
                return Err(ScrapeError::fetch(url, anyhow!("HTTP status {}", status)));
            }
        }

        let markup = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| ScrapeError::fetch(url, anyhow!("No content in spider response")))?;

        self.page = Some(Loaded {
            url: url.to_string(),
            markup: markup.to_string(),
        });
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String, ScrapeError> {
        loaded_markup(&self.page)
    }

    async fn wait_for(&mut self, marker: &str, _timeout: Duration) -> Result<bool, ScrapeError> {
        Ok(self.page.as_ref().is_some_and(|p| markup_has(&p.markup, marker)))
    }
}

// ── WebDriver ──

/// Drives a real browser through a running WebDriver server (chromedriver).
pub struct WebDriverRenderer {
    driver: Option<WebDriver>,
}

impl WebDriverRenderer {
    pub async fn connect(server_url: &str) -> Result<Self, ScrapeError> {
        let caps = DesiredCapabilities::chrome();
        let driver = WebDriver::new(server_url, caps)
            .await
            .map_err(|e| ScrapeError::FatalSetupFailure(format!("WebDriver at {}: {}", server_url, e)))?;
        info!("Connected to WebDriver at {}", server_url);
        Ok(Self {
            driver: Some(driver),
        })
    }

    fn driver(&self) -> Result<&WebDriver, ScrapeError> {
        self.driver
            .as_ref()
            .ok_or_else(|| ScrapeError::FatalSetupFailure("browser session already closed".into()))
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        self.driver()?
            .goto(url)
            .await
            .map_err(|e| ScrapeError::fetch(url, e))
    }

    async fn current_markup(&mut self) -> Result<String, ScrapeError> {
        let driver = self.driver()?;
        let url = driver
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_default();
        driver.source().await.map_err(|e| ScrapeError::fetch(&url, e))
    }

    async fn wait_for(&mut self, marker: &str, timeout: Duration) -> Result<bool, ScrapeError> {
        let driver = self.driver()?;
        let deadline = Instant::now() + timeout;
        loop {
            if driver.find(By::Css(marker)).await.is_ok() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        if let Some(driver) = self.driver.take() {
            driver
                .quit()
                .await
                .map_err(|e| ScrapeError::FatalSetupFailure(format!("closing browser: {}", e)))?;
            info!("Browser closed.");
        }
        Ok(())
    }
}

// ── plain HTTP ──

/// Fetches markup with a plain GET. No script execution.
pub struct HttpRenderer {
    client: reqwest::Client,
    page: Option<Loaded>,
}

impl HttpRenderer {
    pub fn new() -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScrapeError::FatalSetupFailure(format!("HTTP client: {}", e)))?;
        Ok(Self { client, page: None })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        self.page = None;
        let markup = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::fetch(url, e))?
            .text()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))?;
        self.page = Some(Loaded {
            url: url.to_string(),
            markup,
        });
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String, ScrapeError> {
        if let Some(p) = &self.page {
            debug!("serving {} bytes for {}", p.markup.len(), p.url);
        }
        loaded_markup(&self.page)
    }

    async fn wait_for(&mut self, marker: &str, _timeout: Duration) -> Result<bool, ScrapeError> {
        Ok(self.page.as_ref().is_some_and(|p| markup_has(&p.markup, marker)))
    }
}
