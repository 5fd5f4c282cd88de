use uuid::Uuid;

use crate::domain::error::ExperimentError;
use crate::domain::experiment::Variant;

#[derive(Debug, Clone, Copy)]
pub struct SelectionThresholds {
    pub min_total_views: i64,
    pub min_variant_views: i64,
    pub allow_low_sample: bool,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            min_total_views: 50,
            min_variant_views: 20,
            allow_low_sample: false,
        }
    }
}

impl SelectionThresholds {
    pub fn forced() -> Self {
        Self {
            min_total_views: 0,
            min_variant_views: 0,
            allow_low_sample: true,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VariantScore {
    pub variant_id: Uuid,
    pub variant_index: i32,
    pub views: i64,
    pub contacts: i64,
    pub favorites: i64,
    pub ctr: f64,
    pub favorite_rate: f64,
    pub confidence: f64,
    pub score: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WinnerReport {
    pub variant_id: Uuid,
    pub variant_index: i32,
    pub ctr: f64,
    pub score: f64,
    pub total_views: i64,
    pub evaluated: Vec<VariantScore>,
}

pub fn score_variant(variant: &Variant) -> VariantScore {
    let ctr = ratio(variant.contacts, variant.views);
    let favorite_rate = ratio(variant.favorites, variant.views);
    let confidence = (variant.views as f64 / 100.0).min(1.0);
    let score = (0.7 * ctr + 0.3 * favorite_rate) * (0.4 + 0.6 * confidence);

    VariantScore {
        variant_id: variant.id,
        variant_index: variant.index,
        views: variant.views,
        contacts: variant.contacts,
        favorites: variant.favorites,
        ctr,
        favorite_rate,
        confidence,
        score,
    }
}

pub fn select_winner(
    variants: &[Variant],
    thresholds: &SelectionThresholds,
) -> Result<WinnerReport, ExperimentError> {
    if variants.is_empty() {
        return Err(ExperimentError::Validation(
            "experiment has no variants".to_string(),
        ));
    }

    let total_views: i64 = variants.iter().map(|v| v.views).sum();
    if !thresholds.allow_low_sample && total_views < thresholds.min_total_views {
        return Err(ExperimentError::InsufficientData {
            collected: total_views,
            required: thresholds.min_total_views,
        });
    }

    let mut pool: Vec<&Variant> = variants
        .iter()
        .filter(|v| v.views >= thresholds.min_variant_views)
        .collect();
    if pool.is_empty() {
        if thresholds.allow_low_sample {
            pool = variants.iter().collect();
        } else {
            let best_variant_views = variants.iter().map(|v| v.views).max().unwrap_or(0);
            return Err(ExperimentError::InsufficientData {
                collected: best_variant_views,
                required: thresholds.min_variant_views,
            });
        }
    }

    pool.sort_by_key(|v| v.index);
    let evaluated: Vec<VariantScore> = pool.into_iter().map(score_variant).collect();

    let mut best = 0;
    for i in 1..evaluated.len() {
        if evaluated[i].score > evaluated[best].score {
            best = i;
        }
    }

    let winner = &evaluated[best];
    Ok(WinnerReport {
        variant_id: winner.variant_id,
        variant_index: winner.variant_index,
        ctr: winner.ctr,
        score: winner.score,
        total_views,
        evaluated,
    })
}

fn ratio(a: i64, b: i64) -> f64 {
    if b <= 0 {
        0.0
    } else {
        a as f64 / b as f64
    }
}
