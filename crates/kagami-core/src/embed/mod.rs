//! # Embedding Providers
//!
//! Turns an image into a fixed-length feature vector. Providers are
//! registered in [`EmbedderKind`] and resolved once, when settings are read.

pub mod histogram;
pub mod resnet;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Settings;
use crate::error::{KagamiError, Result};

pub use histogram::ColorHistogramEmbedder;
pub use resnet::ResNetEmbedder;

/// Capability shared by every embedding provider.
pub trait Embedder: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dim(&self) -> usize;

    /// Embed the image at `path`.
    ///
    /// An `Ok` with an empty vector means the image held no usable signal.
    fn embed(&self, path: &Path) -> Result<Vec<f32>>;
}

/// Registered embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderKind {
    /// Joint RGB colour histogram. Needs no weights.
    #[default]
    ColorHistogram,
    /// ResNet-50 backbone without its classification head.
    #[serde(rename = "resnet50")]
    ResNet50,
}

impl EmbedderKind {
    /// All registered providers.
    pub const ALL: [EmbedderKind; 2] = [Self::ColorHistogram, Self::ResNet50];

    /// File name looked up in the model directory when no path is configured.
    #[must_use]
    pub fn weights_file_name(self) -> &'static str {
        match self {
            Self::ColorHistogram => "color-histogram.none",
            Self::ResNet50 => "resnet50.safetensors",
        }
    }

    /// Instantiate the provider.
    pub fn load(self, settings: &Settings) -> Result<Box<dyn Embedder>> {
        let embedder: Box<dyn Embedder> = match self {
            Self::ColorHistogram => Box::new(ColorHistogramEmbedder::default()),
            Self::ResNet50 => Box::new(ResNetEmbedder::load(&settings.resolved_model_path())?),
        };
        info!(
            embedder = embedder.name(),
            dim = embedder.dim(),
            "feature extractor initialized"
        );
        Ok(embedder)
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColorHistogram => write!(f, "color-histogram"),
            Self::ResNet50 => write!(f, "resnet50"),
        }
    }
}

impl FromStr for EmbedderKind {
    type Err = KagamiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "color-histogram" | "histogram" => Ok(Self::ColorHistogram),
            "resnet50" | "resnet" | "resnetextractor" => Ok(Self::ResNet50),
            other => Err(KagamiError::InvalidConfig(format!(
                "unknown feature model {other:?}"
            ))),
        }
    }
}

/// Resolve and load the provider named in `settings`.
pub fn load_embedder(settings: &Settings) -> Result<Box<dyn Embedder>> {
    settings.feature_model.load(settings)
}
