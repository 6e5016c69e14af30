use crate::error::PageFailure;
use async_trait::async_trait;

pub mod browser;
pub mod http;

/// A loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status, when the transport can see it.
    pub status: Option<u16>,
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
}

/// Loads pages for one worker session.
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<PageResponse, PageFailure>;

    async fn close(&self) {}
}

/// Status classification shared by transports: 404/410 mean the page does not exist.
pub fn classify_status(status: u16, url: &str) -> Result<(), PageFailure> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(PageFailure::not_found(format!("{url} returned HTTP {status}"))),
        _ => Err(PageFailure::transport(format!("{url} returned HTTP {status}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::execution::fetch_result::FailureKind;

    #[test]
    fn statuses_map_to_failure_kinds() {
        assert!(classify_status(200, "u").is_ok());
        assert_eq!(classify_status(404, "u").unwrap_err().kind, FailureKind::NotFound);
        assert_eq!(classify_status(410, "u").unwrap_err().kind, FailureKind::NotFound);
        assert_eq!(
            classify_status(503, "u").unwrap_err().kind,
            FailureKind::TransportError
        );
        assert_eq!(
            classify_status(429, "u").unwrap_err().kind,
            FailureKind::TransportError
        );
    }
}
