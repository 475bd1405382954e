//! Exitcast Test Utilities
//!
//! Fixtures shared by the pipeline's integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use exitcast_test_utils::{seeded_store, IntakeBuilder};
//!
//! #[tokio::test]
//! async fn test_extract() {
//!     let batch = IntakeBuilder::new()
//!         .row("A1", "2023-01-01", &[("gender", "Female".into())])
//!         .build();
//!     let store = seeded_store(&batch).await.unwrap();
//!     // ...
//!     store.close().await;
//! }
//! ```

pub mod intake;
pub mod model;
pub mod store;

pub use intake::{IntakeBuilder, SURVIVING_COLUMNS};
pub use model::{constant_model_json, weighted_model_json};
pub use store::{
    close_episode, file_store, memory_store, seeded_file_store, seeded_store, stored_ssn, TEST_TABLE,
};
