//! # Settings
//!
//! Process configuration for the classifier. Values come from the
//! environment (see [`Settings::from_env`]) or from the `with_*` builders.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embed::EmbedderKind;
use crate::error::{KagamiError, Result};

pub const DEFAULT_DATA_PATH: &str = "./data";
pub const DEFAULT_DATABASE_PATH: &str = "./database/features.kgm";
pub const DEFAULT_LOGGING_LEVEL: &str = "INFO";
pub const DEFAULT_K_NEIGHBORS: usize = 5;
pub const DEFAULT_NLIST: usize = 100;
pub const DEFAULT_NPROBE: usize = 8;

/// Which index structure backs the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    /// Exact search over every stored vector.
    Flat,
    /// Inverted-file index with `nlist` clusters, probing `nprobe` per query.
    Ivf { nlist: usize, nprobe: usize },
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::Flat
    }
}

impl IndexConfig {
    /// IVF configuration with the default probe count.
    #[must_use]
    pub fn ivf(nlist: usize) -> Self {
        Self::Ivf {
            nlist,
            nprobe: DEFAULT_NPROBE.min(nlist.max(1)),
        }
    }

    /// Rejects zero cluster or probe counts.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Flat => Ok(()),
            Self::Ivf { nlist, nprobe } => {
                if nlist == 0 {
                    return Err(KagamiError::InvalidConfig("nlist must be > 0".into()));
                }
                if nprobe == 0 {
                    return Err(KagamiError::InvalidConfig("nprobe must be > 0".into()));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Ivf { nlist, nprobe } => write!(f, "ivf(nlist={nlist}, nprobe={nprobe})"),
        }
    }
}

/// Runtime settings for the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding one sub-directory per class.
    pub data_path: PathBuf,
    /// Persisted index file. Labels live next to it in `<path>.labels`.
    pub database_path: PathBuf,
    /// Max log level for the subscriber (`TRACE`..`ERROR`).
    pub logging_level: String,
    /// Embedding provider to load.
    pub feature_model: EmbedderKind,
    /// Weights for providers that need them.
    pub model_path: Option<PathBuf>,
    /// Neighbors consulted per vote.
    pub k_neighbors: usize,
    /// Index structure used when a fresh store is created.
    pub index: IndexConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            logging_level: DEFAULT_LOGGING_LEVEL.to_string(),
            feature_model: EmbedderKind::default(),
            model_path: None,
            k_neighbors: DEFAULT_K_NEIGHBORS,
            index: IndexConfig::Flat,
        }
    }
}

impl Settings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// Recognised keys: `DATA_PATH`, `DATABASE_PATH`, `LOGGING_LEVEL`,
    /// `FEATURE_MODEL`, `MODEL_PATH`, `K_NEIGHBORS`, `INDEX_KIND`,
    /// `IVF_NLIST`, `IVF_NPROBE`. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("DATA_PATH") {
            settings.data_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            settings.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOGGING_LEVEL") {
            settings.logging_level = v;
        }
        if let Some(v) = lookup("FEATURE_MODEL") {
            settings.feature_model = v.parse()?;
        }
        if let Some(v) = lookup("MODEL_PATH") {
            settings.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("K_NEIGHBORS") {
            settings.k_neighbors = parse_count("K_NEIGHBORS", &v)?;
        }

        let nlist = match lookup("IVF_NLIST") {
            Some(v) => parse_count("IVF_NLIST", &v)?,
            None => DEFAULT_NLIST,
        };
        let nprobe = match lookup("IVF_NPROBE") {
            Some(v) => parse_count("IVF_NPROBE", &v)?,
            None => DEFAULT_NPROBE,
        };
        settings.index = match lookup("INDEX_KIND").as_deref().map(str::trim) {
            None | Some("") | Some("flat") => IndexConfig::Flat,
            Some("ivf") => IndexConfig::Ivf { nlist, nprobe },
            Some(other) => {
                return Err(KagamiError::InvalidConfig(format!(
                    "unknown INDEX_KIND {other:?} (expected flat or ivf)"
                )));
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Set the data root.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Set the index file path.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the embedding provider.
    pub fn with_feature_model(mut self, kind: EmbedderKind) -> Self {
        self.feature_model = kind;
        self
    }

    /// Set the model weights path.
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Set the default neighbor count.
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    /// Set the index structure.
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    /// Set the log level.
    pub fn with_logging_level(mut self, level: impl Into<String>) -> Self {
        self.logging_level = level.into();
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.k_neighbors == 0 {
            return Err(KagamiError::InvalidConfig("k_neighbors must be > 0".into()));
        }
        self.index.validate()
    }

    /// Weights path for the configured model, falling back to the user data dir.
    #[must_use]
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| default_model_dir().join(self.feature_model.weights_file_name()))
    }

    /// Sibling label file of the index.
    #[must_use]
    pub fn labels_path(&self) -> PathBuf {
        labels_path_for(&self.database_path)
    }
}

/// `<index_path>.labels`
#[must_use]
pub fn labels_path_for(index_path: &Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_os_string();
    name.push(".labels");
    PathBuf::from(name)
}

/// Default directory for model weights.
fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kagami")
        .join("models")
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    let n = usize::from_str(value.trim())
        .map_err(|e| KagamiError::InvalidConfig(format!("{key}={value:?}: {e}")))?;
    if n == 0 {
        return Err(KagamiError::InvalidConfig(format!("{key} must be > 0")));
    }
    Ok(n)
}
