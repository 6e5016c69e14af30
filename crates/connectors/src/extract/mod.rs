use crate::{error::PageFailure, transport::PageTransport};
use async_trait::async_trait;
use model::{
    core::identifiers::ItemId,
    execution::work_item::WorkItem,
    records::{record::Record, schema::Schema},
};

pub mod conference;
pub mod redirect;

/// Turns the pages behind one id into one record with a fixed schema.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> &Schema;

    /// Rejects ids that cannot name a page, before any I/O.
    fn validate_id(&self, id: &ItemId) -> Result<(), String>;

    async fn extract(
        &self,
        transport: &dyn PageTransport,
        item: &WorkItem,
    ) -> Result<Record, PageFailure>;
}
