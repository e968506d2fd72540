//! Text and JSON rendering of capture outcomes.

use serde_json::{json, Value};

use flower_id::ClassificationResult;

use crate::session::CaptureOutcome;

/// Human-readable result, e.g. `Flower: ROSE` / `Confidence: 66.67%`.
pub fn render_result(result: &ClassificationResult) -> String {
    match result {
        ClassificationResult::Identified {
            label, confidence, ..
        } => format!(
            "Flower: {}\nConfidence: {confidence:.2}%",
            label.as_str().to_uppercase()
        ),
        ClassificationResult::Rejected { .. } => {
            "Unable to confidently identify flower\nPlease try again".to_string()
        }
    }
}

/// Result text followed by up to `top` ranked categories.
pub fn render_outcome(outcome: &CaptureOutcome, top: usize) -> String {
    let mut out = render_result(&outcome.result);
    if top > 0 && !outcome.ranking.is_empty() {
        out.push_str("\nNearest:");
        for entry in outcome.ranking.iter().take(top) {
            out.push_str(&format!(
                "\n  {:<12} distance {:>9.4}  confidence {:>6.2}%",
                entry.category.as_str(),
                entry.distance,
                entry.confidence
            ));
        }
    }
    out
}

/// JSON form of an outcome; `ranking` is cut to `top` entries.
pub fn outcome_json(outcome: &CaptureOutcome, top: usize) -> Value {
    json!({
        "source": outcome.source,
        "width": outcome.width,
        "height": outcome.height,
        "result": outcome.result,
        "ranking": outcome.ranking.iter().take(top).collect::<Vec<_>>(),
    })
}
