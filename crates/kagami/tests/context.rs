use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use kagami::{
    Context, EmbedderKind, FeatureDatabase, IndexConfig, KagamiError, Settings, UNKNOWN_LABEL,
};

const RED: Rgb<u8> = Rgb([230, 20, 20]);
const BLUE: Rgb<u8> = Rgb([20, 20, 230]);
const GREEN: Rgb<u8> = Rgb([20, 230, 20]);

fn write_png(path: &Path, color: Rgb<u8>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(8, 8, color).save(path).unwrap();
}

fn settings(root: &Path) -> Settings {
    Settings::new()
        .with_data_path(root.join("data"))
        .with_database_path(root.join("database").join("features.kgm"))
        .with_k_neighbors(3)
}

fn seed_classes(root: &Path) {
    for i in 0..3 {
        write_png(&root.join(format!("data/red/{i}.png")), RED);
        write_png(&root.join(format!("data/blue/{i}.png")), BLUE);
    }
}

#[tokio::test]
async fn start_bootstraps_from_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());

    let ctx = Context::start(settings(dir.path())).await.unwrap();
    assert_eq!(ctx.database().len(), 6);
    assert!(dir.path().join("database/features.kgm").exists());
    assert!(dir.path().join("database/features.kgm.labels").exists());

    let query = dir.path().join("query.png");
    write_png(&query, RED);
    let prediction = ctx.classify_image(&query).await.unwrap();
    assert_eq!(prediction.label, "red");
    assert_eq!(prediction.votes, 3);
}

#[tokio::test]
async fn restart_reuses_persisted_index() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());

    drop(Context::start(settings(dir.path())).await.unwrap());

    // New images are not picked up without an explicit ingest.
    write_png(&dir.path().join("data/red/extra.png"), RED);
    let ctx = Context::start(settings(dir.path())).await.unwrap();
    assert_eq!(ctx.database().len(), 6);
}

#[tokio::test]
async fn empty_store_classifies_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::start(settings(dir.path())).await.unwrap();
    assert!(ctx.database().is_empty());

    let query = dir.path().join("query.png");
    write_png(&query, GREEN);
    let prediction = ctx.classify_image(&query).await.unwrap();
    assert_eq!(prediction.label, UNKNOWN_LABEL);
}

#[tokio::test]
async fn unreadable_images_are_skipped_on_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::start(settings(dir.path())).await.unwrap();

    let good = dir.path().join("in/good.png");
    let bad = dir.path().join("in/bad.png");
    write_png(&good, BLUE);
    fs::write(&bad, b"not an image").unwrap();

    let report = ctx
        .ingest_paths(vec![good, bad.clone()], vec!["blue".into(), "blue".into()])
        .await
        .unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.added, 1);
    assert_eq!(report.skipped, vec![bad]);
    assert_eq!(report.ids, 0..1);
}

#[tokio::test]
async fn upload_copies_and_ingests() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::start(settings(dir.path())).await.unwrap();

    ctx.add_class("green").unwrap();
    assert!(matches!(ctx.add_class("green"), Err(KagamiError::ClassExists(_))));

    let files: Vec<PathBuf> = (0..2)
        .map(|i| {
            let p = dir.path().join(format!("upload/{i}.png"));
            write_png(&p, GREEN);
            p
        })
        .collect();

    let report = ctx.upload_images("green", &files).await.unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(ctx.list_classes().unwrap(), vec!["green"]);
    assert_eq!(
        fs::read_dir(dir.path().join("data/green")).unwrap().count(),
        2
    );

    assert!(matches!(
        ctx.upload_images("purple", &files).await,
        Err(KagamiError::ClassNotFound(_))
    ));
}

#[tokio::test]
async fn batch_classification_reports_per_image() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());
    let ctx = Context::start(settings(dir.path())).await.unwrap();

    let red = dir.path().join("q/red.png");
    let blue = dir.path().join("q/blue.png");
    let missing = dir.path().join("q/missing.png");
    write_png(&red, RED);
    write_png(&blue, BLUE);

    let results = ctx
        .classify_images(&[red, missing, blue])
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].prediction.as_ref().unwrap().label, "red");
    assert!(results[1].prediction.is_none());
    assert!(results[1].error.is_some());
    assert_eq!(results[2].prediction.as_ref().unwrap().label, "blue");
}

#[tokio::test]
async fn status_reflects_database() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());
    let ctx = Context::start(settings(dir.path())).await.unwrap();

    let status = ctx.status().unwrap();
    assert_eq!(status.embedder, "color-histogram");
    assert_eq!(status.dim, 64);
    assert_eq!(status.classes_on_disk, vec!["blue", "red"]);
    assert_eq!(status.database.vectors, 6);
    assert_eq!(
        status.database.classes,
        vec![("blue".to_string(), 3), ("red".to_string(), 3)]
    );
}

#[tokio::test]
async fn rebuild_replaces_the_database() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());
    drop(Context::start(settings(dir.path())).await.unwrap());

    write_png(&dir.path().join("data/blue/extra.png"), BLUE);
    let ctx = Context::rebuild(settings(dir.path())).await.unwrap();
    assert_eq!(ctx.database().len(), 7);

    let reloaded = FeatureDatabase::load(dir.path().join("database/features.kgm")).unwrap();
    assert_eq!(reloaded.len(), 7);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_files() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());
    drop(Context::start(settings(dir.path())).await.unwrap());

    let broken = settings(dir.path())
        .with_feature_model(EmbedderKind::ResNet50)
        .with_model_path(dir.path().join("missing.safetensors"));
    assert!(matches!(
        Context::rebuild(broken).await,
        Err(KagamiError::ModelLoad(_))
    ));

    let index = dir.path().join("database/features.kgm");
    assert!(index.exists());
    assert_eq!(FeatureDatabase::load(&index).unwrap().len(), 6);
}

#[tokio::test]
async fn rebuild_of_empty_data_writes_empty_pair() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());
    drop(Context::start(settings(dir.path())).await.unwrap());

    fs::remove_dir_all(dir.path().join("data")).unwrap();
    let ctx = Context::rebuild(settings(dir.path())).await.unwrap();
    assert!(ctx.database().is_empty());

    let reloaded = FeatureDatabase::load(dir.path().join("database/features.kgm")).unwrap();
    assert!(reloaded.is_empty());
}

#[tokio::test]
async fn retrain_reclusters_ivf_index() {
    let dir = tempfile::tempdir().unwrap();
    seed_classes(dir.path());
    let ctx = Context::start(settings(dir.path()).with_index(IndexConfig::ivf(2)))
        .await
        .unwrap();

    let stats = ctx.retrain().await.unwrap();
    assert_eq!(stats.vectors, 6);
    assert!(!stats.placeholder_trained);

    let query = dir.path().join("query.png");
    write_png(&query, BLUE);
    assert_eq!(ctx.classify_image(&query).await.unwrap().label, "blue");
}
