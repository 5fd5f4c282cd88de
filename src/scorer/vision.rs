use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::json;

use crate::scorer::{bucket_for, ImageAssessment, ImageScorer};

pub struct VisionScorer {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VisionItem {
    quality_score: f64,
    cover_score: f64,
    #[serde(default)]
    defects: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    assessments: Vec<VisionItem>,
}

#[async_trait::async_trait]
impl ImageScorer for VisionScorer {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn assess(&self, images: &[String], category: &str) -> Result<Vec<ImageAssessment>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/assessments", self.base_url);
        let body = json!({
            "images": images,
            "category": category,
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "vision scorer returned HTTP_{}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            ));
        }

        let parsed: VisionResponse = resp.json().await?;
        if parsed.assessments.len() != images.len() {
            return Err(anyhow!(
                "vision scorer returned {} assessments for {} images",
                parsed.assessments.len(),
                images.len()
            ));
        }

        Ok(images
            .iter()
            .zip(parsed.assessments)
            .map(|(image, item)| ImageAssessment {
                image: image.clone(),
                quality_score: item.quality_score,
                cover_score: item.cover_score,
                bucket: bucket_for(item.quality_score),
                defects: item.defects,
                recommendations: item.recommendations,
                description: item.description,
            })
            .collect())
    }
}
