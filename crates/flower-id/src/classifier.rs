//! Nearest-centroid classification by Euclidean distance.

use crate::types::{
    CategoryDistance, CentroidMap, ClassificationResult, FlowerError, FlowerResult,
};

/// Confidence below which a match is reported as unidentified.
pub const DEFAULT_REJECTION_THRESHOLD: f64 = 40.0;

/// Euclidean distance between two vectors of equal length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> FlowerResult<f64> {
    if a.len() != b.len() {
        return Err(FlowerError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();

    Ok(sum.sqrt())
}

/// Map a distance to a score in `(0, 100]`: `100 / (1 + distance)`.
pub fn confidence_from_distance(distance: f64) -> f64 {
    100.0 / (1.0 + distance)
}

/// Check that a rejection threshold is a finite percentage.
pub fn validate_threshold(threshold: f64) -> FlowerResult<f64> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(FlowerError::InvalidInput(format!(
            "rejection threshold must be within 0..=100, got {threshold}"
        )))
    }
}

fn validate_live(live: &[f32], centroids: &CentroidMap) -> FlowerResult<()> {
    let dim = centroids.dim().ok_or(FlowerError::NoReferenceData)?;

    if live.is_empty() {
        return Err(FlowerError::InvalidEmbedding("live embedding is empty".to_string()));
    }
    if let Some(i) = live.iter().position(|v| !v.is_finite()) {
        return Err(FlowerError::InvalidEmbedding(format!(
            "non-finite value {} at index {i}",
            live[i]
        )));
    }
    if live.len() != dim {
        return Err(FlowerError::DimensionMismatch {
            expected: dim,
            actual: live.len(),
        });
    }
    Ok(())
}

/// Score every category against a live embedding, nearest first.
///
/// The sort is stable, so categories at equal distance keep the map's
/// construction order.
pub fn rank(live: &[f32], centroids: &CentroidMap) -> FlowerResult<Vec<CategoryDistance>> {
    validate_live(live, centroids)?;

    let mut ranked = centroids
        .iter()
        .map(|(category, centroid)| {
            let distance = euclidean_distance(&centroid.vector, live)?;
            Ok(CategoryDistance {
                category: category.clone(),
                distance,
                confidence: confidence_from_distance(distance),
            })
        })
        .collect::<FlowerResult<Vec<_>>>()?;

    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(ranked)
}

/// Classify a live embedding against the reference centroids.
///
/// Returns `Rejected` when the best confidence is below `rejection_threshold`.
/// An empty mapping is always `NoReferenceData`, whatever the threshold.
pub fn classify(
    live: &[f32],
    centroids: &CentroidMap,
    rejection_threshold: f64,
) -> FlowerResult<ClassificationResult> {
    let ranked = rank(live, centroids)?;
    classify_ranked(&ranked, rejection_threshold)
}

/// Decide on a ranking already produced by [`rank`].
pub fn classify_ranked(
    ranked: &[CategoryDistance],
    rejection_threshold: f64,
) -> FlowerResult<ClassificationResult> {
    let best = ranked.first().ok_or(FlowerError::NoReferenceData)?;
    let threshold = validate_threshold(rejection_threshold)?;

    tracing::debug!(
        "Nearest centroid '{}' at distance {:.4} (confidence {:.2})",
        best.category,
        best.distance,
        best.confidence
    );

    if best.confidence < threshold {
        return Ok(ClassificationResult::Rejected {
            confidence: best.confidence,
            distance: best.distance,
        });
    }

    Ok(ClassificationResult::Identified {
        label: best.category.clone(),
        confidence: best.confidence,
        distance: best.distance,
    })
}
