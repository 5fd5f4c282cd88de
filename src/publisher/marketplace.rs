use anyhow::{anyhow, Result};
use serde_json::json;

use crate::publisher::{ListingPublisher, PublishReceipt, PublishRequest};

pub struct MarketplacePublisher {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl ListingPublisher for MarketplacePublisher {
    fn name(&self) -> &'static str {
        "marketplace"
    }

    async fn make_live(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        let url = format!("{}/v1/listings", self.base_url);
        let body = json!({
            "external_ref": format!("exp_{}_v{}", request.experiment_id, request.variant_index),
            "category": request.category,
            "title": request.title,
            "description": request.description,
            "price_minor": request.price_minor,
            "images": request.images,
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let listing_ref = v
                    .get("id")
                    .and_then(|id| id.as_str())
                    .map(ToString::to_string)
                    .ok_or_else(|| anyhow!("marketplace response is missing the listing id"))?;
                Ok(PublishReceipt { listing_ref })
            }
            Ok(r) => {
                let status = r.status();
                let body = r.text().await.unwrap_or_default();
                Err(anyhow!(
                    "marketplace returned HTTP_{}: {}",
                    status.as_u16(),
                    body.chars().take(200).collect::<String>()
                ))
            }
            Err(e) if e.is_timeout() => Err(anyhow!("marketplace publish timed out")),
            Err(e) => Err(anyhow!("marketplace request failed: {}", e)),
        }
    }
}
