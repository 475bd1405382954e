//! One function per pipeline stage.
//!
//! Each stage takes an open store session (when it needs one) and the artifact
//! channel, and returns a serializable summary. Callers own the session and
//! close it on every path.

use exitcast_db::ClientStore;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::artifact::{read_features, read_predictions, write_features, write_predictions, ArtifactStore};
use crate::config::ArtifactObjects;
use crate::error::Result;
use crate::inference::{InferenceRunner, LinearClassifier};
use crate::sync::{ApplyReport, PredictionSynchronizer, RetireReport};
use crate::tokenize::{TokenizeReport, Tokenizer};
use crate::transform::{FeatureTransformer, TransformReport};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub object: String,
    pub schema_version: u32,
    pub features: usize,
    #[serde(flatten)]
    pub transform: TransformReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferSummary {
    pub object: String,
    pub rows: usize,
    /// Predictions per label
    pub labels: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub extract: ExtractSummary,
    pub infer: InferSummary,
    pub apply: ApplyReport,
    pub retire: RetireReport,
}

/// Store → transform → feature artifact.
#[instrument(skip_all, fields(stage = "extract"))]
pub async fn extract(
    store: &ClientStore,
    transformer: &FeatureTransformer,
    artifacts: &dyn ArtifactStore,
    objects: &ArtifactObjects,
) -> Result<ExtractSummary> {
    let raw = store.fetch_open_episodes().await?;
    let (features, report) = transformer.transform(raw)?;
    artifacts.put(&objects.features, &write_features(&features)?)?;

    info!(object = %objects.features, rows = features.len(), "Published feature artifact");
    Ok(ExtractSummary {
        object: objects.features.clone(),
        schema_version: transformer.spec().version,
        features: features.width(),
        transform: report,
    })
}

/// Feature artifact + model → prediction artifact.
#[instrument(skip_all, fields(stage = "infer"))]
pub fn infer(artifacts: &dyn ArtifactStore, objects: &ArtifactObjects) -> Result<InferSummary> {
    let model = LinearClassifier::from_json(&artifacts.get(&objects.model)?)?;
    let features = read_features(&artifacts.get(&objects.features)?)?;
    let predictions = InferenceRunner::new(model).run(&features)?;
    artifacts.put(&objects.predictions, &write_predictions(&predictions)?)?;

    let mut labels = BTreeMap::new();
    for p in &predictions {
        *labels.entry(p.label.to_string()).or_insert(0) += 1;
    }
    info!(object = %objects.predictions, rows = predictions.len(), "Published prediction artifact");
    Ok(InferSummary {
        object: objects.predictions.clone(),
        rows: predictions.len(),
        labels,
    })
}

/// Prediction artifact → store.
#[instrument(skip_all, fields(stage = "apply"))]
pub async fn apply(
    store: &ClientStore,
    artifacts: &dyn ArtifactStore,
    objects: &ArtifactObjects,
) -> Result<ApplyReport> {
    let predictions = read_predictions(&artifacts.get(&objects.predictions)?)?;
    PredictionSynchronizer::new(store).apply(&predictions).await
}

#[instrument(skip_all, fields(stage = "retire"))]
pub async fn retire(store: &ClientStore) -> Result<RetireReport> {
    PredictionSynchronizer::new(store).retire().await
}

#[instrument(skip_all, fields(stage = "tokenize"))]
pub async fn tokenize(store: &ClientStore, tokenizer: &Tokenizer) -> Result<TokenizeReport> {
    tokenizer.run(store).await
}

/// Every prediction stage in order. Retire runs last so it follows the apply
/// pass of the same cycle.
pub async fn run(
    store: &ClientStore,
    transformer: &FeatureTransformer,
    artifacts: &dyn ArtifactStore,
    objects: &ArtifactObjects,
) -> Result<RunSummary> {
    let extract = extract(store, transformer, artifacts, objects).await?;
    let infer = infer(artifacts, objects)?;
    let apply = apply(store, artifacts, objects).await?;
    let retire = retire(store).await?;
    Ok(RunSummary {
        extract,
        infer,
        apply,
        retire,
    })
}
