use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod heuristic;
pub mod vision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAssessment {
    pub image: String,
    pub quality_score: f64,
    pub cover_score: f64,
    pub bucket: QualityBucket,
    pub defects: Vec<String>,
    pub recommendations: Vec<String>,
    pub description: String,
}

#[async_trait::async_trait]
pub trait ImageScorer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn assess(&self, images: &[String], category: &str) -> Result<Vec<ImageAssessment>>;
}

pub fn bucket_for(quality_score: f64) -> QualityBucket {
    if quality_score >= 70.0 {
        QualityBucket::High
    } else if quality_score >= 40.0 {
        QualityBucket::Medium
    } else {
        QualityBucket::Low
    }
}
