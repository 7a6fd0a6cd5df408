//! # Class Directory Loader
//!
//! The data root holds one sub-directory per class; the directory name is
//! the label and every image file inside it is a sample.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{KagamiError, Result};

/// Extensions recognised as images (lowercase, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Returns `true` if `path` has an image extension (case-insensitive).
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Labeled image paths found under the data root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabeledPaths {
    pub paths: Vec<PathBuf>,
    pub labels: Vec<String>,
}

impl LabeledPaths {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Walks and maintains the class-directory layout.
#[derive(Debug, Clone)]
pub struct DataLoader {
    root: PathBuf,
}

impl DataLoader {
    /// Open an existing data root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(KagamiError::NotADirectory(root));
        }
        info!(root = %root.display(), "data path");
        Ok(Self { root })
    }

    /// Open the data root, creating it if it does not exist yet.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class names, sorted.
    pub fn classes(&self) -> Result<Vec<String>> {
        let mut classes = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        if classes.is_empty() {
            warn!(root = %self.root.display(), "no class directories found");
        }
        Ok(classes)
    }

    /// Every image under every class directory, with its class label.
    pub fn load_data(&self) -> Result<LabeledPaths> {
        let mut out = LabeledPaths::default();

        for label in self.classes()? {
            let class_dir = self.root.join(&label);
            let mut files: Vec<PathBuf> = fs::read_dir(&class_dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .collect();
            files.sort();

            for path in files {
                if path.is_file() && is_image_file(&path) {
                    out.paths.push(path);
                    out.labels.push(label.clone());
                } else {
                    debug!(path = %path.display(), "non-image file skipped");
                }
            }
        }

        info!(
            images = out.len(),
            root = %self.root.display(),
            "loaded images"
        );
        Ok(out)
    }

    /// Directory for `class`, which must already exist.
    pub fn class_dir(&self, class: &str) -> Result<PathBuf> {
        validate_class_name(class)?;
        let dir = self.root.join(class);
        if !dir.is_dir() {
            return Err(KagamiError::ClassNotFound(class.to_string()));
        }
        Ok(dir)
    }

    /// Create an empty class directory.
    pub fn add_class(&self, class: &str) -> Result<PathBuf> {
        validate_class_name(class)?;
        let dir = self.root.join(class);
        if dir.exists() {
            warn!(class, "class already exists");
            return Err(KagamiError::ClassExists(class.to_string()));
        }
        fs::create_dir(&dir)?;
        info!(dir = %dir.display(), "created class directory");
        Ok(dir)
    }

    /// Copy `source` into the directory of `class` under a fresh unique
    /// name that keeps the original extension. Returns the new path.
    pub fn store_upload(&self, class: &str, source: &Path) -> Result<PathBuf> {
        let dir = self.class_dir(class)?;

        let mut name = Uuid::new_v4().simple().to_string();
        if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        let dest = dir.join(name);
        fs::copy(source, &dest)?;

        info!(dest = %dest.display(), class, "saved image");
        Ok(dest)
    }
}

/// Labels are written one per line and used as directory names.
fn validate_class_name(class: &str) -> Result<()> {
    let bad = class.trim().is_empty()
        || class == "."
        || class == ".."
        || class.contains(['/', '\\', '\n', '\r']);
    if bad {
        return Err(KagamiError::InvalidConfig(format!(
            "invalid class name {class:?}"
        )));
    }
    Ok(())
}
