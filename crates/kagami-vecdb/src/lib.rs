//! # Kagami VecDB
//!
//! Append-only nearest-neighbor store over fixed-dimension embeddings, the
//! label ledger that runs parallel to it, and a majority-vote classifier
//! built on top of both.
//!
//! Control flow for a prediction:
//! [`Classifier::predict`] → [`SimilaritySearch::find_similar`] →
//! [`VectorStore::search`] + [`LabelLedger::get`] → vote.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kagami_core::{IndexConfig, Matrix};
//! use kagami_vecdb::{Classifier, FeatureDatabase, SimilaritySearch};
//!
//! let db = FeatureDatabase::create("features.kgm", 2, IndexConfig::Flat).unwrap();
//! let batch = Matrix::from_rows(&[[0.0, 0.0], [0.1, 0.0], [5.0, 5.0]]).unwrap();
//! db.add_batch(&batch, &["cat", "cat", "dog"]).unwrap();
//!
//! let classifier = Classifier::new(SimilaritySearch::new(Arc::new(db)));
//! assert_eq!(classifier.predict(&[0.05, 0.0], 3).unwrap(), "cat");
//! ```

pub mod classifier;
pub mod database;
pub mod index;
pub mod ledger;
pub mod persist;
pub mod search;

pub use classifier::{Classifier, majority_vote};
pub use database::{DatabaseStats, FeatureDatabase, Snapshot};
pub use index::{SearchResults, VectorStore};
pub use ledger::LabelLedger;
pub use search::{SimilarityResults, SimilaritySearch};
