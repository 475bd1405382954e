//! Exitcast
//!
//! Predicts where active clients will exit to and keeps those predictions in
//! step with the client store:
//!
//! - [`transform`]: raw intake records to a fixed numeric feature schema
//! - [`inference`]: an opaque classifier over the features, mapped onto labels
//! - [`sync`]: per-row prediction writes and the `exited` retire pass
//! - [`tokenize`]: SSN tokenization, independent of the prediction stages
//!
//! Stages hand data to each other through the [`artifact`] channel only.

pub mod artifact;
pub mod config;
pub mod error;
pub mod inference;
pub mod outcome;
pub mod stages;
pub mod sync;
pub mod tokenize;
pub mod transform;

pub use artifact::{ArtifactStore, FsArtifactStore};
pub use error::{PipelineError, Result};
pub use inference::{argmax, Classifier, InferenceRunner, LinearClassifier};
pub use outcome::{FailureKind, RowOutcome, SkipReason};
pub use sync::{ApplyReport, PredictionSynchronizer, RetireReport};
pub use tokenize::{normalize_ssn, TokenizeReport, Tokenizer};
pub use transform::{FeatureTransformer, TransformReport};
