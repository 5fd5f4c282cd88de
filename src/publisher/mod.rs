use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod marketplace;
pub mod mock;

#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest {
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub variant_index: i32,
    pub category: String,
    pub title: String,
    pub description: String,
    pub price_minor: i64,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub listing_ref: String,
}

#[async_trait::async_trait]
pub trait ListingPublisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn make_live(&self, request: &PublishRequest) -> Result<PublishReceipt>;
}
