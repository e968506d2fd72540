//! Nearest-centroid flower identification over image embeddings.

pub mod capture;
pub mod centroid;
pub mod classifier;
pub mod embedding;
pub mod reference;
pub mod types;

pub use capture::{
    capture_from_base64, capture_from_data_url, capture_from_file, Camera, FrameSource,
    SnapshotCamera,
};
pub use centroid::mean_embedding;
pub use classifier::{
    classify, classify_ranked, confidence_from_distance, euclidean_distance, rank,
    DEFAULT_REJECTION_THRESHOLD,
};
pub use embedding::{
    embed_image, ColorGridExtractor, FeatureExtractor, Normalization, OnnxExtractor, Preprocess,
    ResizeFilter, TensorLayout,
};
pub use reference::{load_reference_set, ReferenceSet, SampleLayout};
pub use types::*;
