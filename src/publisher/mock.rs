use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};

use crate::publisher::{ListingPublisher, PublishReceipt, PublishRequest};

pub struct MockPublisher {
    pub behavior: String,
    pub calls: AtomicUsize,
}

impl MockPublisher {
    pub fn new(behavior: &str) -> Self {
        Self {
            behavior: behavior.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ListingPublisher for MockPublisher {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn make_live(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.behavior.as_str() {
            "ALWAYS_FAILURE" => Err(anyhow!("mock publish declined")),
            "ALWAYS_TIMEOUT" => Err(anyhow!("mock publish timeout")),
            _ => Ok(PublishReceipt {
                listing_ref: format!(
                    "mock_listing_{}_{}",
                    request.variant_index,
                    uuid::Uuid::new_v4()
                ),
            }),
        }
    }
}
