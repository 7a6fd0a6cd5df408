//! # Kagami Core
//!
//! Shared building blocks for the Kagami nearest-neighbor image classifier:
//! error types, settings, the embedding matrix type, embedding providers and
//! the class-directory loader.
//!
//! ## Quick Start
//!
//! ```rust
//! use kagami_core::{Matrix, Settings};
//!
//! let settings = Settings::new().with_k_neighbors(3);
//! assert!(settings.validate().is_ok());
//!
//! let queries = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
//! assert_eq!(queries.rows(), 2);
//! ```
pub mod config;
pub mod data;
pub mod embed;
pub mod error;
pub mod types;

// Re-export primary API
pub use config::{IndexConfig, Settings, labels_path_for};
pub use data::{DataLoader, LabeledPaths, is_image_file};
pub use embed::{ColorHistogramEmbedder, Embedder, EmbedderKind, ResNetEmbedder, load_embedder};
pub use error::{KagamiError, Result};
pub use types::{Match, Matrix, Neighbor, Prediction, UNKNOWN_LABEL, VectorId};
