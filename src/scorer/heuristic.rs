use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::scorer::{bucket_for, ImageAssessment, ImageScorer};

pub struct HeuristicScorer;

#[async_trait::async_trait]
impl ImageScorer for HeuristicScorer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn assess(&self, images: &[String], _category: &str) -> Result<Vec<ImageAssessment>> {
        Ok(assess_all(images))
    }
}

pub fn assess_all(images: &[String]) -> Vec<ImageAssessment> {
    images
        .iter()
        .enumerate()
        .map(|(position, image)| assess_one(image, position))
        .collect()
}

pub fn assess_one(image: &str, position: usize) -> ImageAssessment {
    let quality_score = clamp(90.0 - 5.0 * position as f64 + jitter(image), 10.0, 100.0);
    let cover_score = if position == 0 {
        90.0
    } else {
        70.0 - 5.0 * position as f64
    };

    let mut defects = Vec::new();
    if quality_score < 50.0 {
        defects.push("low overall quality".to_string());
    }

    let mut recommendations = Vec::new();
    if position == 0 {
        recommendations.push("use as cover image".to_string());
    }

    ImageAssessment {
        image: image.to_string(),
        quality_score,
        cover_score,
        bucket: bucket_for(quality_score),
        defects,
        recommendations,
        description: format!("synthetic assessment for upload position {}", position + 1),
    }
}

fn jitter(image: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(image.as_bytes());
    let hash = hasher.finalize();
    (hash[0] % 7) as f64 - 3.0
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}
