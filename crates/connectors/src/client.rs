use crate::{
    extract::Extractor,
    transport::{
        PageTransport,
        browser::{BrowserOptions, BrowserTransport},
        http::HttpTransport,
    },
};
use async_trait::async_trait;
use engine_core::{
    connectors::fetch::{ClientFactory, FetchClient},
    error::SessionError,
};
use model::execution::{
    fetch_result::{FailureKind, FetchResult},
    work_item::WorkItem,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

/// A `FetchClient` made of one transport session and a shared extractor.
pub struct PageClient {
    transport: Box<dyn PageTransport>,
    extractor: Arc<dyn Extractor>,
}

impl PageClient {
    pub fn new(transport: Box<dyn PageTransport>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            transport,
            extractor,
        }
    }
}

#[async_trait]
impl FetchClient for PageClient {
    async fn fetch(&self, item: &WorkItem) -> FetchResult {
        if let Err(reason) = self.extractor.validate_id(&item.id) {
            return FetchResult::failure(
                item,
                FailureKind::NotFound,
                format!("malformed id: {reason}"),
            );
        }

        match self.extractor.extract(self.transport.as_ref(), item).await {
            Ok(record) => {
                let missing = record.missing_required(self.extractor.schema());
                if missing.is_empty() {
                    FetchResult::success(item, record)
                } else {
                    FetchResult::failure(
                        item,
                        FailureKind::ParseError,
                        format!("missing required fields: {}", missing.join(", ")),
                    )
                }
            }
            Err(failure) => FetchResult::failure(item, failure.kind, failure.message),
        }
    }

    async fn shutdown(&self) {
        self.transport.close().await;
    }
}

/// Opens one reqwest session per worker.
pub struct HttpClientFactory {
    extractor: Arc<dyn Extractor>,
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(extractor: Arc<dyn Extractor>, timeout: Duration) -> Self {
        Self { extractor, timeout }
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn open(&self, worker: usize) -> Result<Box<dyn FetchClient>, SessionError> {
        let transport =
            HttpTransport::new(self.timeout).map_err(|e| SessionError::new(worker, e.to_string()))?;
        debug!(worker, extractor = self.extractor.name(), "HTTP session opened");
        Ok(Box::new(PageClient::new(
            Box::new(transport),
            Arc::clone(&self.extractor),
        )))
    }
}

/// Launches one browser per worker.
pub struct BrowserClientFactory {
    extractor: Arc<dyn Extractor>,
    options: BrowserOptions,
}

impl BrowserClientFactory {
    pub fn new(extractor: Arc<dyn Extractor>, options: BrowserOptions) -> Self {
        Self { extractor, options }
    }
}

#[async_trait]
impl ClientFactory for BrowserClientFactory {
    async fn open(&self, worker: usize) -> Result<Box<dyn FetchClient>, SessionError> {
        let transport = BrowserTransport::launch(&self.options)
            .await
            .map_err(|e| SessionError::new(worker, e.to_string()))?;
        info!(worker, headless = self.options.headless, "Browser launched");
        Ok(Box::new(PageClient::new(
            Box::new(transport),
            Arc::clone(&self.extractor),
        )))
    }
}
