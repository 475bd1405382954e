//! Classifier invocation and label mapping.

use exitcast_schema::{FeatureBatch, Label, PredictionRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// An opaque trained model.
pub trait Classifier {
    /// Feature names the model was trained on, when the model records them.
    fn feature_names(&self) -> Option<&[String]>;

    fn n_features(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// One class-score vector per input row.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;
}

/// Multinomial linear model serialized as JSON.
///
/// ```json
/// { "feature_names": ["age", ...],
///   "coefficients": [[...], ...],   // one row per class
///   "intercepts": [0.0, ...] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearClassifier {
    feature_names: Vec<String>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LinearClassifier {
    /// Build and validate a model.
    pub fn new(
        feature_names: Vec<String>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    ) -> Result<Self> {
        let model = Self {
            feature_names,
            coefficients,
            intercepts,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load a model document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let model: Self = serde_json::from_slice(bytes).map_err(|e| {
            PipelineError::model_mismatch(format!("model document is not a linear model: {}", e))
        })?;
        model.validate()?;
        debug!(
            features = model.feature_names.len(),
            classes = model.intercepts.len(),
            "Loaded linear classifier"
        );
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let classes = Label::PREDICTABLE.len();
        if self.coefficients.len() != classes || self.intercepts.len() != classes {
            return Err(PipelineError::model_mismatch(format!(
                "model must score {} classes, has {} coefficient rows and {} intercepts",
                classes,
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        if let Some((class, row)) = self
            .coefficients
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.feature_names.len())
        {
            return Err(PipelineError::model_mismatch(format!(
                "class {} has {} coefficients for {} features",
                class,
                row.len(),
                self.feature_names.len()
            )));
        }
        let finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(PipelineError::model_mismatch("model holds non-finite weights"));
        }
        Ok(())
    }
}

impl Classifier for LinearClassifier {
    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.feature_names)
    }

    fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.n_features() {
                    return Err(PipelineError::model_mismatch(format!(
                        "row has {} values, model expects {}",
                        row.len(),
                        self.n_features()
                    )));
                }
                let logits: Vec<f64> = self
                    .coefficients
                    .iter()
                    .zip(&self.intercepts)
                    .map(|(weights, bias)| {
                        bias + weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
                    })
                    .collect();
                Ok(softmax(&logits))
            })
            .collect()
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

/// Index of the highest score. Ties go to the lowest index; NaN never wins.
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scores.iter().copied().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Runs a classifier over a feature batch and re-attaches episode keys.
pub struct InferenceRunner<C> {
    classifier: C,
}

impl<C: Classifier> InferenceRunner<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn run(&self, batch: &FeatureBatch) -> Result<Vec<PredictionRecord>> {
        if batch.is_empty() {
            info!("Feature batch is empty; classifier not invoked");
            return Ok(Vec::new());
        }

        let classes = Label::PREDICTABLE.len();
        if self.classifier.n_classes() != classes {
            return Err(PipelineError::model_mismatch(format!(
                "classifier scores {} classes, label set has {}",
                self.classifier.n_classes(),
                classes
            )));
        }
        if batch.width() != self.classifier.n_features() {
            return Err(PipelineError::model_mismatch(format!(
                "feature matrix has {} columns, classifier expects {}",
                batch.width(),
                self.classifier.n_features()
            )));
        }
        if let Some(expected) = self.classifier.feature_names() {
            if let Some((pos, (got, want))) = batch
                .feature_columns()
                .iter()
                .zip(expected)
                .enumerate()
                .find(|(_, (got, want))| got != want)
            {
                return Err(PipelineError::schema_mismatch(format!(
                    "feature column {} is '{}', classifier was trained on '{}'",
                    pos, got, want
                )));
            }
        }

        let scores = self.classifier.predict(batch.rows())?;
        if scores.len() != batch.len() {
            return Err(PipelineError::model_mismatch(format!(
                "classifier returned {} score vectors for {} rows",
                scores.len(),
                batch.len()
            )));
        }

        let mut predictions = Vec::with_capacity(batch.len());
        for (row, (key, row_scores)) in batch.keys().iter().zip(&scores).enumerate() {
            if row_scores.len() != classes {
                return Err(PipelineError::model_mismatch(format!(
                    "row {} has {} class scores, expected {}",
                    row,
                    row_scores.len(),
                    classes
                )));
            }
            let label = argmax(row_scores)
                .and_then(Label::from_class_index)
                .ok_or_else(|| {
                    PipelineError::invalid_value(format!("row {} has no comparable class score", row))
                })?;
            predictions.push(PredictionRecord::new(key.clone(), label));
        }

        info!(rows = predictions.len(), "Predicted exit destinations");
        Ok(predictions)
    }
}
