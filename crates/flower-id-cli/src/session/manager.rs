//! Classifier session: the extractor plus the reference centroids, built once.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use serde::Serialize;

use flower_id::classifier::validate_threshold;
use flower_id::{
    capture_from_data_url, capture_from_file, classify_ranked, embed_image, load_reference_set, rank,
    Camera, CategoryDistance, CentroidMap, ClassificationResult, ColorGridExtractor,
    FeatureExtractor, FlowerResult, FrameSource, OnnxExtractor,
};

use crate::config::AppConfig;

/// Owns everything a capture needs: the feature extractor, the immutable
/// centroid mapping, and the rejection threshold.
pub struct ClassifierSession {
    extractor: Box<dyn FeatureExtractor>,
    centroids: Arc<CentroidMap>,
    threshold: f64,
    stats: SessionStats,
}

/// Counters for the captures handled by a session.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    pub identified: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl SessionStats {
    pub fn total(&self) -> u64 {
        self.identified + self.rejected + self.failed
    }
}

/// Result of classifying one frame.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub source: FrameSource,
    pub width: u32,
    pub height: u32,
    pub result: ClassificationResult,
    /// Every category, nearest first.
    pub ranking: Vec<CategoryDistance>,
}

impl ClassifierSession {
    /// Build the extractor described by `config` and load the reference set.
    ///
    /// Returns only once every centroid is ready; any sample failure aborts.
    pub fn open(config: &AppConfig) -> FlowerResult<Self> {
        let extractor = build_extractor(config)?;
        Self::with_extractor(extractor, config)
    }

    /// Load the reference set with a caller-provided extractor.
    pub fn with_extractor(
        mut extractor: Box<dyn FeatureExtractor>,
        config: &AppConfig,
    ) -> FlowerResult<Self> {
        config.validate()?;
        let centroids = load_reference_set(
            extractor.as_mut(),
            &config.reference_set(),
            &config.layout(),
        )?;

        tracing::info!(
            "Session ready: {} categories, extractor '{}', threshold {:.1}",
            centroids.len(),
            extractor.name(),
            config.rejection_threshold
        );

        Ok(Self {
            extractor,
            centroids: Arc::new(centroids),
            threshold: config.rejection_threshold,
            stats: SessionStats::default(),
        })
    }

    /// Shared handle to the centroid mapping.
    pub fn centroids(&self) -> Arc<CentroidMap> {
        Arc::clone(&self.centroids)
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) -> FlowerResult<()> {
        self.threshold = validate_threshold(threshold)?;
        tracing::debug!("Rejection threshold set to {threshold:.1}");
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Score every category for a frame, nearest first.
    pub fn rank_image(&mut self, img: &DynamicImage) -> FlowerResult<Vec<CategoryDistance>> {
        let live = embed_image(self.extractor.as_mut(), img)?;
        rank(&live, &self.centroids)
    }

    /// Classify one frame. Failures are counted and returned; the session
    /// stays usable for the next capture.
    pub fn classify_image(
        &mut self,
        img: &DynamicImage,
        source: FrameSource,
    ) -> FlowerResult<CaptureOutcome> {
        let outcome = self.try_classify(img, source);
        match &outcome {
            Ok(o) if o.result.is_rejected() => {
                self.stats.rejected += 1;
                tracing::warn!(
                    "Capture rejected: best confidence {:.2} below {:.1}",
                    o.result.confidence(),
                    self.threshold
                );
            }
            Ok(_) => self.stats.identified += 1,
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!("Capture failed: {e}");
            }
        }
        outcome
    }

    fn try_classify(
        &mut self,
        img: &DynamicImage,
        source: FrameSource,
    ) -> FlowerResult<CaptureOutcome> {
        let (width, height) = img.dimensions();
        let live = embed_image(self.extractor.as_mut(), img)?;
        let ranking = rank(&live, &self.centroids)?;
        let result = classify_ranked(&ranking, self.threshold)?;

        Ok(CaptureOutcome {
            source,
            width,
            height,
            result,
            ranking,
        })
    }

    /// Classify an image file.
    pub fn classify_file(&mut self, path: &Path) -> FlowerResult<CaptureOutcome> {
        match capture_from_file(path) {
            Ok((img, source)) => self.classify_image(&img, source),
            Err(e) => {
                self.stats.failed += 1;
                Err(e)
            }
        }
    }

    /// Classify a `data:` URL frame.
    pub fn classify_data_url(&mut self, url: &str) -> FlowerResult<CaptureOutcome> {
        match capture_from_data_url(url) {
            Ok((img, source)) => self.classify_image(&img, source),
            Err(e) => {
                self.stats.failed += 1;
                Err(e)
            }
        }
    }

    /// Grab the current camera frame and classify it.
    pub fn capture_and_classify(&mut self, camera: &mut dyn Camera) -> FlowerResult<CaptureOutcome> {
        let source = FrameSource::Camera {
            device: camera.device(),
        };
        match camera.capture_frame() {
            Ok(img) => self.classify_image(&img, source),
            Err(e) => {
                self.stats.failed += 1;
                Err(e)
            }
        }
    }
}

/// ONNX extractor when a model is configured, colour grid otherwise.
pub fn build_extractor(config: &AppConfig) -> FlowerResult<Box<dyn FeatureExtractor>> {
    match &config.model.path {
        Some(path) => Ok(Box::new(OnnxExtractor::load(
            path,
            config.model.preprocess,
            config.model.l2_normalize,
        )?)),
        None => {
            tracing::warn!(
                "No ONNX model configured; using the {}x{} colour-grid extractor",
                config.grid,
                config.grid
            );
            Ok(Box::new(ColorGridExtractor::new(config.grid)))
        }
    }
}
