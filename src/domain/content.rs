use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingContent {
    pub title: String,
    pub description: String,
    pub price_minor: i64,
    #[serde(default)]
    pub images: Vec<String>,
}
