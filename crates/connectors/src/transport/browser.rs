use crate::{
    error::{ConnectorError, PageFailure},
    transport::{PageResponse, PageTransport},
};
use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    error::CdpError,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::{sync::Mutex, task::JoinHandle, time::timeout};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Page-load timeout.
    pub timeout: Duration,
    /// Extra wait after load before the page is read.
    pub settle: Duration,
    pub window: (u32, u32),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: Duration::from_secs(12),
            settle: Duration::ZERO,
            window: (1920, 1080),
        }
    }
}

/// One Chromium instance with a single tab, owned by one worker.
pub struct BrowserTransport {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    timeout: Duration,
    settle: Duration,
}

impl BrowserTransport {
    pub async fn launch(options: &BrowserOptions) -> Result<Self, ConnectorError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(options.window.0, options.window.1)
            .request_timeout(options.timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(ConnectorError::BrowserConfig)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    trace!(error = %err, "Browser handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        debug!(headless = options.headless, "Browser session opened");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            timeout: options.timeout,
            settle: options.settle,
        })
    }
}

fn classify_cdp(err: CdpError, url: &str) -> PageFailure {
    match err {
        CdpError::Timeout => PageFailure::timeout(format!("{url} timed out")),
        other => PageFailure::transport(format!("{url}: {other}")),
    }
}

#[async_trait]
impl PageTransport for BrowserTransport {
    async fn get(&self, url: &str) -> Result<PageResponse, PageFailure> {
        trace!(url, "Navigating");
        match timeout(self.timeout, self.page.goto(url)).await {
            Err(_) => {
                return Err(PageFailure::timeout(format!(
                    "{url} did not load within {:?}",
                    self.timeout
                )));
            }
            Ok(Err(err)) => return Err(classify_cdp(err, url)),
            Ok(Ok(_)) => {}
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let body = self.page.content().await.map_err(|e| classify_cdp(e, url))?;
        let final_url = self
            .page
            .url()
            .await
            .map_err(|e| classify_cdp(e, url))?
            .unwrap_or_else(|| url.to_string());

        Ok(PageResponse {
            status: None,
            final_url,
            body,
        })
    }

    async fn close(&self) {
        if let Err(err) = self.page.clone().close().await {
            debug!(error = %err, "Failed to close page");
        }
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!(error = %err, "Failed to close browser");
        }
        if let Err(err) = browser.wait().await {
            debug!(error = %err, "Browser process did not exit cleanly");
        }
        self.handler.abort();
        debug!("Browser session closed");
    }
}
