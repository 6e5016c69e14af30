use crate::{
    error::{ConnectorError, PageFailure},
    transport::{PageResponse, PageTransport, classify_status},
};
use async_trait::async_trait;
use reqwest::{Client, redirect::Policy};
use std::time::Duration;
use tracing::trace;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Plain HTTP session. Redirects are followed; the response URL is the final one.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

fn classify_error(err: &reqwest::Error, url: &str) -> PageFailure {
    if err.is_timeout() {
        PageFailure::timeout(format!("{url} timed out: {err}"))
    } else {
        PageFailure::transport(format!("{url}: {err}"))
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<PageResponse, PageFailure> {
        trace!(url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(&e, url))?;

        let status = resp.status().as_u16();
        classify_status(status, url)?;

        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(|e| classify_error(&e, url))?;
        Ok(PageResponse {
            status: Some(status),
            final_url,
            body,
        })
    }
}
