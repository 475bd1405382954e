//! Canned classifier documents.

use serde_json::json;

/// Number of classes every model scores.
pub const CLASSES: usize = 5;

/// A linear model over `feature_names` that always prefers class `favored`.
///
/// All coefficients are zero, so the intercepts alone decide the scores.
pub fn constant_model_json(feature_names: &[String], favored: usize) -> String {
    let coefficients = vec![vec![0.0_f64; feature_names.len()]; CLASSES];
    let intercepts: Vec<f64> = (0..CLASSES)
        .map(|class| if class == favored { 2.0 } else { 0.0 })
        .collect();
    json!({
        "feature_names": feature_names,
        "coefficients": coefficients,
        "intercepts": intercepts,
    })
    .to_string()
}

/// A linear model where class `class_for_feature[i]` gains weight from feature `i`.
pub fn weighted_model_json(feature_names: &[String], class_for_feature: &[usize]) -> String {
    let mut coefficients = vec![vec![0.0_f64; feature_names.len()]; CLASSES];
    for (feature, class) in class_for_feature.iter().enumerate() {
        if let Some(row) = coefficients.get_mut(*class) {
            if let Some(weight) = row.get_mut(feature) {
                *weight = 1.0;
            }
        }
    }
    json!({
        "feature_names": feature_names,
        "coefficients": coefficients,
        "intercepts": vec![0.0_f64; CLASSES],
    })
    .to_string()
}
