use std::sync::Arc;

use crate::allocator::slots::SlotPolicy;
use crate::config::AppConfig;
use crate::scorer::heuristic::{self, HeuristicScorer};
use crate::scorer::vision::VisionScorer;
use crate::scorer::{ImageAssessment, ImageScorer};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageSet {
    pub images: Vec<String>,
    pub rationale: String,
    pub predicted_engagement: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AllocationPlan {
    pub scored_by: String,
    pub assessments: Vec<ImageAssessment>,
    pub sets: Vec<ImageSet>,
}

pub fn build_image_sets(assessments: &[ImageAssessment], max_slots: usize) -> Vec<ImageSet> {
    if assessments.is_empty() || max_slots == 0 {
        return Vec::new();
    }

    let mut selected: Vec<&ImageAssessment> = assessments.iter().collect();
    selected.sort_by(|a, b| {
        b.quality_score
            .partial_cmp(&a.quality_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    selected.truncate(max_slots);
    selected.sort_by(|a, b| {
        b.cover_score
            .partial_cmp(&a.cover_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let primary: Vec<String> = selected.iter().map(|a| a.image.clone()).collect();

    let mut sets = vec![ImageSet {
        images: primary.clone(),
        rationale: "best overall quality, optimized cover".to_string(),
        predicted_engagement: 75.0,
    }];

    if primary.len() >= 2 {
        let mut alternate_cover = primary.clone();
        alternate_cover.swap(0, 1);
        sets.push(ImageSet {
            images: alternate_cover,
            rationale: "second-ranked cover first, remaining order unchanged".to_string(),
            predicted_engagement: 65.0,
        });
    }

    if primary.len() >= 5 {
        let mut mixed: Vec<String> = Vec::with_capacity(primary.len());
        mixed.extend(primary.iter().skip(1).step_by(2).cloned());
        mixed.extend(primary.iter().step_by(2).cloned());
        sets.push(ImageSet {
            images: mixed,
            rationale: "alternating order to mix angles and styles".to_string(),
            predicted_engagement: 60.0,
        });
    }

    sets
}

pub struct ImageSetPlanner {
    pub scorer: Arc<dyn ImageScorer>,
    pub slot_policy: SlotPolicy,
}

impl ImageSetPlanner {
    pub fn from_config(config: &AppConfig) -> Self {
        let scorer: Arc<dyn ImageScorer> = if config.scorer_base_url.is_empty() {
            Arc::new(HeuristicScorer)
        } else {
            Arc::new(VisionScorer {
                base_url: config.scorer_base_url.clone(),
                api_key: config.scorer_api_key.clone(),
                timeout_ms: config.scorer_timeout_ms,
                client: reqwest::Client::new(),
            })
        };

        ImageSetPlanner {
            scorer,
            slot_policy: config.slot_policy(),
        }
    }

    pub async fn plan(&self, images: &[String], category: &str) -> AllocationPlan {
        if images.is_empty() {
            return AllocationPlan {
                scored_by: self.scorer.name().to_string(),
                assessments: Vec::new(),
                sets: Vec::new(),
            };
        }

        let (scored_by, assessments) = match self.scorer.assess(images, category).await {
            Ok(assessments) if assessments.len() == images.len() => {
                (self.scorer.name().to_string(), assessments)
            }
            Ok(assessments) => {
                tracing::warn!(
                    "image scorer {} returned {} assessments for {} images, using heuristic fallback",
                    self.scorer.name(),
                    assessments.len(),
                    images.len()
                );
                ("heuristic".to_string(), heuristic::assess_all(images))
            }
            Err(err) => {
                tracing::warn!(
                    "image scorer {} failed, using heuristic fallback: {}",
                    self.scorer.name(),
                    err
                );
                ("heuristic".to_string(), heuristic::assess_all(images))
            }
        };

        let max_slots = self.slot_policy.max_slots(category);
        let sets = build_image_sets(&assessments, max_slots);

        AllocationPlan {
            scored_by,
            assessments,
            sets,
        }
    }
}
