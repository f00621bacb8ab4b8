//! The cost-management catalog prices are synchronized into.

pub mod http;
pub mod offline;
pub mod payload;

use async_trait::async_trait;

use crate::error::{BundleError, ReconcileError};
use crate::model::{Bundle, DestinationId, PricingRecord};

pub use http::HttpCatalog;
pub use offline::OfflineCatalog;

/// Write side of the destination catalog. One call per remote operation;
/// retries are layered on top by the caller.
#[async_trait]
pub trait CatalogDestination: Send + Sync {
    /// Id of the price whose code matches exactly, if any.
    async fn find_price(&self, code: &str) -> Result<Option<DestinationId>, ReconcileError>;

    async fn create_price(&self, record: &PricingRecord) -> Result<DestinationId, ReconcileError>;

    async fn update_price(
        &self,
        id: DestinationId,
        record: &PricingRecord,
    ) -> Result<(), ReconcileError>;

    async fn create_bundle(&self, bundle: &Bundle) -> Result<Option<DestinationId>, BundleError>;
}
