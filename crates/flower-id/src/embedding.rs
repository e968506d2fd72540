//! Image preprocessing and feature extractors.
//!
//! An extractor is an opaque `image -> Vec<f32>` function. Callers hand it an
//! input tensor already resized and normalised to the shape the extractor
//! declares through its [`Preprocess`].

use std::path::Path;

use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::types::{Embedding, FlowerError, FlowerResult};

/// Input resolution of MobileNet-style extractors.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Default cell count per side for [`ColorGridExtractor`].
pub const DEFAULT_GRID: u32 = 8;

#[allow(clippy::excessive_precision)]
pub const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
#[allow(clippy::excessive_precision)]
pub const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Resampling filter used when resizing to the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    #[default]
    Nearest,
    Triangle,
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => Self::Nearest,
            ResizeFilter::Triangle => Self::Triangle,
            ResizeFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Axis order of the input batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, height, width, 3]`, the TensorFlow convention.
    #[default]
    Nhwc,
    /// `[1, 3, height, width]`, the PyTorch convention.
    Nchw,
}

/// How 8-bit pixel values are mapped to floats.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// `value / 255`, giving `[0, 1]`.
    #[default]
    UnitRange,
    /// `(value / 255 - mean[c]) / std[c]` per channel.
    MeanStd { mean: [f32; 3], std: [f32; 3] },
    /// `MeanStd` with the CLIP image statistics.
    Clip,
}

impl Normalization {
    fn apply(&self, channel: usize, value: u8) -> f32 {
        let v = value as f32 / 255.0;
        match self {
            Self::UnitRange => v,
            Self::MeanStd { mean, std } => (v - mean[channel]) / std[channel],
            Self::Clip => (v - CLIP_MEAN[channel]) / CLIP_STD[channel],
        }
    }
}

/// Resize and normalisation applied before inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocess {
    pub input_size: u32,
    pub filter: ResizeFilter,
    pub layout: TensorLayout,
    pub normalization: Normalization,
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            filter: ResizeFilter::Nearest,
            layout: TensorLayout::Nhwc,
            normalization: Normalization::UnitRange,
        }
    }
}

impl Preprocess {
    /// Shape of the batch produced by [`Preprocess::apply`].
    pub fn shape(&self) -> [usize; 4] {
        let s = self.input_size as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, s, s, 3],
            TensorLayout::Nchw => [1, 3, s, s],
        }
    }

    /// Resize `img` to a square input and pack it into a batch of one.
    pub fn apply(&self, img: &DynamicImage) -> FlowerResult<Array4<f32>> {
        if self.input_size == 0 {
            return Err(FlowerError::InvalidInput("input size must be positive".to_string()));
        }

        let resized = img.resize_exact(self.input_size, self.input_size, self.filter.into());
        let rgb = resized.to_rgb8();

        let mut tensor = Array4::<f32>::zeros(self.shape());
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3usize {
                let value = self.normalization.apply(c, pixel[c]);
                match self.layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                }
            }
        }

        Ok(tensor)
    }
}

/// An image feature extractor.
pub trait FeatureExtractor {
    /// Short human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Input shape and normalisation the extractor expects.
    fn preprocess(&self) -> &Preprocess;

    /// Run the extractor on a preprocessed batch of one.
    fn infer(&mut self, input: Array4<f32>) -> FlowerResult<Embedding>;
}

/// Preprocess `img`, run the extractor, and reject non-finite output.
pub fn embed_image<E>(extractor: &mut E, img: &DynamicImage) -> FlowerResult<Embedding>
where
    E: FeatureExtractor + ?Sized,
{
    let input = extractor.preprocess().apply(img)?;
    let embedding = extractor.infer(input)?;
    check_finite(&embedding)?;
    Ok(embedding)
}

/// Fail with `InvalidEmbedding` if the vector is empty or holds NaN/inf.
pub fn check_finite(embedding: &[f32]) -> FlowerResult<()> {
    if embedding.is_empty() {
        return Err(FlowerError::InvalidEmbedding(
            "extractor returned an empty vector".to_string(),
        ));
    }
    match embedding.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(FlowerError::InvalidEmbedding(format!(
            "extractor returned {} at index {i}",
            embedding[i]
        ))),
        None => Ok(()),
    }
}

fn l2_normalize(mut embedding: Embedding) -> Embedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= norm);
    }
    embedding
}

/// Extractor backed by an ONNX Runtime session.
pub struct OnnxExtractor {
    session: Session,
    preprocess: Preprocess,
    l2_normalize: bool,
    name: String,
}

impl OnnxExtractor {
    /// Load an ONNX model whose first output is the feature vector.
    pub fn load(
        model_path: impl AsRef<Path>,
        preprocess: Preprocess,
        l2_normalize: bool,
    ) -> FlowerResult<Self> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(FlowerError::ModelNotAvailable(format!(
                "no ONNX model at {}",
                path.display()
            )));
        }

        tracing::info!("Loading ONNX model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| FlowerError::Embedding(format!("Failed to load ONNX model: {e}")))?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        tracing::info!("ONNX model '{name}' loaded");
        Ok(Self {
            session,
            preprocess,
            l2_normalize,
            name,
        })
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn preprocess(&self) -> &Preprocess {
        &self.preprocess
    }

    fn infer(&mut self, input: Array4<f32>) -> FlowerResult<Embedding> {
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| FlowerError::Embedding(format!("Failed to create input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| FlowerError::Embedding(format!("ONNX inference failed: {e}")))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FlowerError::Embedding(format!("Failed to extract output: {e}")))?;

        let embedding = data.to_vec();
        if self.l2_normalize {
            Ok(l2_normalize(embedding))
        } else {
            Ok(embedding)
        }
    }
}

/// Model-free extractor: mean colour of each cell in a `grid x grid` layout.
///
/// Produces `grid * grid * 3` values in `[0, 1]`. Coarse, but deterministic
/// and good enough to tell apart flowers of clearly different colours.
#[derive(Debug, Clone)]
pub struct ColorGridExtractor {
    preprocess: Preprocess,
}

impl ColorGridExtractor {
    pub fn new(grid: u32) -> Self {
        Self {
            preprocess: Preprocess {
                input_size: grid,
                filter: ResizeFilter::Triangle,
                layout: TensorLayout::Nhwc,
                normalization: Normalization::UnitRange,
            },
        }
    }

    pub fn dim(&self) -> usize {
        let g = self.preprocess.input_size as usize;
        g * g * 3
    }
}

impl Default for ColorGridExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_GRID)
    }
}

impl FeatureExtractor for ColorGridExtractor {
    fn name(&self) -> &str {
        "color-grid"
    }

    fn preprocess(&self) -> &Preprocess {
        &self.preprocess
    }

    fn infer(&mut self, input: Array4<f32>) -> FlowerResult<Embedding> {
        if input.shape() != self.preprocess.shape() {
            return Err(FlowerError::Embedding(format!(
                "expected input shape {:?}, got {:?}",
                self.preprocess.shape(),
                input.shape()
            )));
        }
        Ok(input.iter().copied().collect())
    }
}
