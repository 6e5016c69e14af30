use crate::{error::PageFailure, extract::Extractor, transport::PageTransport};
use async_trait::async_trait;
use model::{
    core::identifiers::ItemId,
    execution::work_item::WorkItem,
    records::{record::Record, schema::Schema},
};
use reqwest::Url;

/// Resolves a URL to where it finally lands after redirects.
pub struct RedirectExtractor {
    schema: Schema,
}

impl RedirectExtractor {
    pub fn new() -> Self {
        Self {
            schema: Schema::new("url").required("final_url"),
        }
    }
}

impl Default for RedirectExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for RedirectExtractor {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn validate_id(&self, id: &ItemId) -> Result<(), String> {
        let url = Url::parse(id.as_str()).map_err(|e| e.to_string())?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(format!("unsupported scheme `{other}`")),
        }
    }

    async fn extract(
        &self,
        transport: &dyn PageTransport,
        item: &WorkItem,
    ) -> Result<Record, PageFailure> {
        let page = transport.get(item.id.as_str()).await?;
        Ok(Record::new(item.id.clone()).with("final_url", page.final_url))
    }
}
