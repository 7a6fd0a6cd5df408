//! # Kagami
//!
//! Classifies images by embedding them and voting among the nearest
//! labeled embeddings in a persisted store.
//!
//! This crate wires the pieces together: [`Context`] owns the embedder, the
//! class-directory layout and the feature database, and exposes ingest and
//! classification as async operations. The building blocks are re-exported
//! from [`kagami_core`] and [`kagami_vecdb`].
//!
//! ```rust,no_run
//! use kagami::{Context, Settings};
//!
//! # async fn run() -> kagami::Result<()> {
//! let ctx = Context::start(Settings::from_env()?).await?;
//! let prediction = ctx.classify_image("query.jpg".as_ref()).await?;
//! println!("{prediction}");
//! # Ok(())
//! # }
//! ```

pub mod context;

pub use context::{Context, ImageClassification, IngestReport, Status};

pub use kagami_core::{
    DataLoader, Embedder, EmbedderKind, IndexConfig, KagamiError, Matrix, Prediction, Result,
    Settings, UNKNOWN_LABEL,
};
pub use kagami_vecdb::{Classifier, DatabaseStats, FeatureDatabase, SimilaritySearch};
