//! # Application Context
//!
//! Owns the embedder, the class-directory loader and the shared feature
//! database. Built once by the caller and passed wherever it is needed.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use kagami_core::{
    DataLoader, Embedder, KagamiError, Matrix, Prediction, Result, Settings, VectorId,
    load_embedder,
};
use kagami_vecdb::{Classifier, DatabaseStats, FeatureDatabase, SimilaritySearch};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{info, warn};

/// Outcome of an ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    /// Images offered for ingest.
    pub requested: usize,
    /// Images whose embeddings were stored.
    pub added: usize,
    /// Images skipped because no usable embedding came back.
    pub skipped: Vec<PathBuf>,
    /// Ids assigned to the stored embeddings.
    pub ids: Range<VectorId>,
}

/// Classification of a single image file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageClassification {
    pub path: PathBuf,
    pub prediction: Option<Prediction>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub embedder: String,
    pub dim: usize,
    pub k_neighbors: usize,
    pub data_path: PathBuf,
    pub classes_on_disk: Vec<String>,
    pub database: DatabaseStats,
}

pub struct Context {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    embed_workers: usize,
    loader: DataLoader,
    database: Arc<FeatureDatabase>,
    classifier: Classifier,
}

impl Context {
    /// Load the embedder and open the database at the configured path.
    ///
    /// When no index file exists yet the database is populated from the
    /// data directory before returning.
    pub async fn start(settings: Settings) -> Result<Self> {
        let bootstrap = !settings.database_path.exists();
        let ctx = Self::assemble(settings, false).await?;

        if bootstrap {
            info!(data = %ctx.loader.root().display(), "no index found, ingesting data directory");
            ctx.ingest_directory().await?;
        }
        info!(
            vectors = ctx.database.len(),
            embedder = ctx.embedder.name(),
            "context ready"
        );
        Ok(ctx)
    }

    /// Re-embed the whole data directory into a new database.
    ///
    /// The index and label files on disk are only replaced after every
    /// image has been embedded, so a failure before that leaves them intact.
    pub async fn rebuild(settings: Settings) -> Result<Self> {
        let ctx = Self::assemble(settings, true).await?;
        let report = ctx.ingest_directory().await?;

        if report.added == 0 {
            let database = Arc::clone(&ctx.database);
            run_blocking(move || database.persist()).await?;
        }
        info!(
            vectors = ctx.database.len(),
            skipped = report.skipped.len(),
            "rebuilt feature database"
        );
        Ok(ctx)
    }

    async fn assemble(settings: Settings, fresh: bool) -> Result<Self> {
        settings.validate()?;

        let load_settings = settings.clone();
        let embedder: Arc<dyn Embedder> =
            Arc::from(run_blocking(move || load_embedder(&load_settings)).await?);
        let loader = DataLoader::create(&settings.data_path)?;

        let path = &settings.database_path;
        let database = if fresh {
            FeatureDatabase::create(path, embedder.dim(), settings.index)?
        } else {
            FeatureDatabase::open(path, embedder.dim(), settings.index)?
        };
        let database = Arc::new(database);
        let classifier = Classifier::new(SimilaritySearch::new(Arc::clone(&database)));
        let embed_workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);

        Ok(Self {
            settings,
            embedder,
            embed_workers,
            loader,
            database,
            classifier,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Arc<FeatureDatabase> {
        &self.database
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn data_loader(&self) -> &DataLoader {
        &self.loader
    }

    /// Embed every image in the data directory and append the results.
    pub async fn ingest_directory(&self) -> Result<IngestReport> {
        let loader = self.loader.clone();
        let data = run_blocking(move || loader.load_data()).await?;
        self.ingest_paths(data.paths, data.labels).await
    }

    /// Embed `paths` concurrently, then store every usable embedding with
    /// its label in one add and persist.
    ///
    /// Images that fail to embed, or embed to nothing, are skipped.
    pub async fn ingest_paths(
        &self,
        paths: Vec<PathBuf>,
        labels: Vec<String>,
    ) -> Result<IngestReport> {
        if paths.len() != labels.len() {
            return Err(KagamiError::InvalidShape(format!(
                "{} images but {} labels",
                paths.len(),
                labels.len()
            )));
        }
        let requested = paths.len();
        let embeddings = embed_all(&self.embedder, &paths, self.embed_workers).await?;

        let mut rows = Vec::with_capacity(requested);
        let mut kept = Vec::with_capacity(requested);
        let mut skipped = Vec::new();
        for ((path, label), embedding) in paths.into_iter().zip(labels).zip(embeddings) {
            match embedding {
                Ok(v) if !v.is_empty() => {
                    rows.push(v);
                    kept.push(label);
                }
                Ok(_) => {
                    warn!(path = %path.display(), "empty embedding, skipping image");
                    skipped.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to embed image, skipping");
                    skipped.push(path);
                }
            }
        }

        let next = self.database.len() as VectorId;
        let ids = if rows.is_empty() {
            warn!(requested, "no usable embeddings to store");
            next..next
        } else {
            let database = Arc::clone(&self.database);
            run_blocking(move || {
                let batch = Matrix::from_rows(&rows)?;
                database.commit(&batch, &kept)
            })
            .await?
        };

        let report = IngestReport {
            requested,
            added: (ids.end - ids.start) as usize,
            skipped,
            ids,
        };
        info!(
            requested = report.requested,
            added = report.added,
            skipped = report.skipped.len(),
            "ingest finished"
        );
        Ok(report)
    }

    /// Create a new, empty class directory.
    pub fn add_class(&self, name: &str) -> Result<PathBuf> {
        self.loader.add_class(name)
    }

    /// Copy images into an existing class directory and ingest them.
    pub async fn upload_images(&self, class: &str, files: &[PathBuf]) -> Result<IngestReport> {
        self.loader.class_dir(class)?;

        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            stored.push(self.loader.store_upload(class, file)?);
        }
        let labels = vec![class.to_string(); stored.len()];
        self.ingest_paths(stored, labels).await
    }

    /// Classify one image with the configured `k`.
    pub async fn classify_image(&self, path: &Path) -> Result<Prediction> {
        let k = self.settings.k_neighbors;
        let embedder = Arc::clone(&self.embedder);
        let classifier = self.classifier.clone();
        let path = path.to_path_buf();

        run_blocking(move || {
            let embedding = embedder.embed(&path)?;
            let prediction = classifier.predict_detailed(&embedding, k)?;
            info!(path = %path.display(), %prediction, "classified image");
            Ok(prediction)
        })
        .await
    }

    /// Classify several images with one batched search.
    ///
    /// Images that cannot be embedded get an error entry instead of failing
    /// the whole batch.
    pub async fn classify_images(&self, paths: &[PathBuf]) -> Result<Vec<ImageClassification>> {
        let k = self.settings.k_neighbors;
        let embeddings = embed_all(&self.embedder, paths, self.embed_workers).await?;

        let mut out: Vec<ImageClassification> = Vec::with_capacity(paths.len());
        let mut queries = Vec::new();
        let mut slots = Vec::new();
        for (path, embedding) in paths.iter().zip(embeddings) {
            let error = match embedding {
                Ok(v) if !v.is_empty() => {
                    slots.push(out.len());
                    queries.push(v);
                    None
                }
                Ok(_) => Some(KagamiError::EmptyEmbedding.to_string()),
                Err(e) => Some(e.to_string()),
            };
            out.push(ImageClassification {
                path: path.clone(),
                prediction: None,
                error,
            });
        }

        if !queries.is_empty() {
            let classifier = self.classifier.clone();
            let predictions =
                run_blocking(move || classifier.predict_batch_detailed(&queries, k)).await?;
            for (slot, prediction) in slots.into_iter().zip(predictions) {
                out[slot].prediction = Some(prediction);
            }
        }
        Ok(out)
    }

    /// Class directories present under the data root.
    pub fn list_classes(&self) -> Result<Vec<String>> {
        self.loader.classes()
    }

    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            embedder: self.embedder.name().to_string(),
            dim: self.embedder.dim(),
            k_neighbors: self.settings.k_neighbors,
            data_path: self.loader.root().to_path_buf(),
            classes_on_disk: self.loader.classes()?,
            database: self.database.stats(),
        })
    }

    /// Re-cluster the IVF index on the stored vectors and persist it.
    pub async fn retrain(&self) -> Result<DatabaseStats> {
        let database = Arc::clone(&self.database);
        run_blocking(move || {
            database.retrain()?;
            Ok(database.stats())
        })
        .await
    }
}

/// Embed `paths` on blocking workers, at most `workers` at a time.
///
/// Results keep the order of `paths`.
async fn embed_all(
    embedder: &Arc<dyn Embedder>,
    paths: &[PathBuf],
    workers: usize,
) -> Result<Vec<Result<Vec<f32>>>> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(paths.len());
    for path in paths {
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|e| KagamiError::Embedding(e.to_string()))?;
        let embedder = Arc::clone(embedder);
        let path = path.clone();
        handles.push(task::spawn_blocking(move || {
            let _permit = permit;
            embedder.embed(&path)
        }));
    }

    let mut embeddings = Vec::with_capacity(handles.len());
    for handle in handles {
        embeddings.push(handle.await.map_err(join_error)?);
    }
    Ok(embeddings)
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f).await.map_err(join_error)?
}

fn join_error(e: task::JoinError) -> KagamiError {
    KagamiError::Embedding(format!("worker task failed: {e}"))
}
