//! Classifier session integration tests against temporary datasets.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use image::{DynamicImage, Rgb, RgbImage};

use flower_id::{Category, FlowerError, FrameSource, SnapshotCamera};
use flower_id_cli::config::AppConfig;
use flower_id_cli::render::render_result;
use flower_id_cli::session::ClassifierSession;

// ─────────────────────── helpers ───────────────────────

fn solid(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb(color)))
}

fn write_png(path: &Path, color: [u8; 3]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    solid(color).save(path).unwrap();
}

fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    solid(color).write_with_encoder(encoder).unwrap();
    buf
}

fn base_color(category: &str) -> [u8; 3] {
    match category {
        "rose" => [210, 20, 30],
        "lotus" => [235, 150, 205],
        "tulip" => [245, 215, 20],
        _ => [0, 0, 0],
    }
}

/// Config pointing at a fresh rose/lotus/tulip dataset of PNG samples.
fn dataset_config(dir: &tempfile::TempDir) -> AppConfig {
    let config = AppConfig {
        dataset: dir.path().join("dataset"),
        pattern: "{category}/{initial}{index}.png".to_string(),
        grid: 2,
        ..AppConfig::default()
    };

    for (category, index, path) in config.reference_set().samples(&config.layout()) {
        let [r, g, b] = base_color(category.as_str());
        let jitter = index as u8 * 2;
        write_png(&path, [r.saturating_sub(jitter), g, b.saturating_add(jitter)]);
    }
    config
}

fn frame_file(dir: &tempfile::TempDir, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.path().join(name);
    write_png(&path, color);
    path
}

// ─────────────────────── tests ───────────────────────

#[test]
fn test_open_builds_every_centroid() {
    let dir = tempfile::tempdir().unwrap();
    let session = ClassifierSession::open(&dataset_config(&dir)).unwrap();

    let centroids = session.centroids();
    assert_eq!(centroids.len(), 3);
    assert_eq!(centroids.dim(), Some(12));
    for name in ["rose", "lotus", "tulip"] {
        assert_eq!(centroids.get(&Category::from(name)).unwrap().samples, 6);
    }
    assert_eq!(session.extractor_name(), "color-grid");
    assert_eq!(session.threshold(), 40.0);
}

#[test]
fn test_classify_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();

    let frame = frame_file(&dir, "frame.png", [236, 148, 204]);
    let outcome = session.classify_file(&frame).unwrap();

    assert_eq!(outcome.result.label().map(|c| c.as_str()), Some("lotus"));
    assert_eq!((outcome.width, outcome.height), (24, 24));
    assert_eq!(outcome.ranking.len(), 3);
    assert_eq!(outcome.ranking[0].category.as_str(), "lotus");
    assert!(render_result(&outcome.result).starts_with("Flower: LOTUS"));
    assert_eq!(session.stats().identified, 1);
}

#[test]
fn test_classify_data_url() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();

    let payload = base64::engine::general_purpose::STANDARD.encode(png_bytes([244, 214, 24]));
    let outcome = session
        .classify_data_url(&format!("data:image/png;base64,{payload}"))
        .unwrap();

    assert_eq!(outcome.result.label().map(|c| c.as_str()), Some("tulip"));
    assert!(matches!(outcome.source, FrameSource::Base64 { .. }));
}

#[test]
fn test_unrecognised_frame_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();
    session.set_threshold(99.0).unwrap();

    let frame = frame_file(&dir, "grass.png", [20, 160, 40]);
    let outcome = session.classify_file(&frame).unwrap();

    assert!(outcome.result.is_rejected());
    assert!(outcome.result.label().is_none());
    assert!(render_result(&outcome.result).contains("Please try again"));
    assert_eq!(session.stats().rejected, 1);
}

#[test]
fn test_result_comes_from_top_of_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();

    let frame = frame_file(&dir, "rose.png", [212, 18, 28]);
    let outcome = session.classify_file(&frame).unwrap();
    let best = &outcome.ranking[0];
    assert_eq!(outcome.result.label(), Some(&best.category));
    assert_eq!(outcome.result.confidence(), best.confidence);
    assert_eq!(outcome.result.distance(), best.distance);

    session.set_threshold(100.0).unwrap();
    let outcome = session.classify_file(&frame).unwrap();
    assert!(outcome.result.is_rejected());
    assert_eq!(outcome.result.confidence(), outcome.ranking[0].confidence);
}

#[test]
fn test_failed_capture_leaves_session_usable() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();
    let before = session.centroids();

    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"garbage").unwrap();
    assert!(session.classify_file(&broken).is_err());
    assert!(session.classify_file(&dir.path().join("missing.png")).is_err());
    assert!(session.classify_data_url("data:image/png;base64,###").is_err());

    let frame = frame_file(&dir, "rose.png", [208, 22, 32]);
    let outcome = session.classify_file(&frame).unwrap();
    assert_eq!(outcome.result.label().map(|c| c.as_str()), Some("rose"));

    let stats = session.stats();
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.identified, 1);
    assert_eq!(stats.total(), 4);

    let after = session.centroids();
    assert_eq!(before.len(), after.len());
    for ((ca, a), (cb, b)) in before.iter().zip(after.iter()) {
        assert_eq!(ca, cb);
        assert_eq!(a, b);
    }
}

#[test]
fn test_snapshot_camera_capture() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();

    let snapshot = frame_file(&dir, "webcam.png", [212, 18, 28]);
    let mut camera = SnapshotCamera::open(&snapshot).unwrap();

    let outcome = session.capture_and_classify(&mut camera).unwrap();
    assert_eq!(outcome.result.label().map(|c| c.as_str()), Some("rose"));
    assert!(matches!(outcome.source, FrameSource::Camera { .. }));

    write_png(&snapshot, [246, 216, 22]);
    let outcome = session.capture_and_classify(&mut camera).unwrap();
    assert_eq!(outcome.result.label().map(|c| c.as_str()), Some("tulip"));
}

#[test]
fn test_missing_sample_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = dataset_config(&dir);
    std::fs::remove_file(config.layout().sample_path(&Category::from("tulip"), 2)).unwrap();

    match ClassifierSession::open(&config) {
        Err(FlowerError::ImageLoad {
            category, index, ..
        }) => {
            assert_eq!(category.as_str(), "tulip");
            assert_eq!(index, 2);
        }
        Err(other) => panic!("expected ImageLoad, got {other}"),
        Ok(_) => panic!("session opened with an incomplete reference set"),
    }
}

#[test]
fn test_missing_model_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = dataset_config(&dir);
    config.model.path = Some(dir.path().join("mobilenet.onnx"));

    assert!(matches!(
        ClassifierSession::open(&config),
        Err(FlowerError::ModelNotAvailable(_))
    ));
}

#[test]
fn test_threshold_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();

    assert!(session.set_threshold(-1.0).is_err());
    assert!(session.set_threshold(100.5).is_err());
    assert_eq!(session.threshold(), 40.0);
    session.set_threshold(75.0).unwrap();
    assert_eq!(session.threshold(), 75.0);
}

#[test]
fn test_shared_centroids_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ClassifierSession::open(&dataset_config(&dir)).unwrap();
    let centroids = session.centroids();

    let live = ["rose", "lotus", "tulip"].map(|name| {
        let ranking = session.rank_image(&solid(base_color(name))).unwrap();
        assert_eq!(ranking[0].category.as_str(), name);
        let img = solid(base_color(name));
        flower_id::embed_image(&mut flower_id::ColorGridExtractor::new(2), &img).unwrap()
    });

    let handles: Vec<_> = live
        .into_iter()
        .map(|embedding| {
            let centroids = std::sync::Arc::clone(&centroids);
            std::thread::spawn(move || {
                flower_id::classify(&embedding, &centroids, 40.0)
                    .unwrap()
                    .label()
                    .map(|c| c.to_string())
            })
        })
        .collect();

    let labels: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        labels,
        vec![
            Some("rose".to_string()),
            Some("lotus".to_string()),
            Some("tulip".to_string()),
        ]
    );
}
