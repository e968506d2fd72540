//! Core data types for reference centroids and classification results.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A live or sample image embedding.
pub type Embedding = Vec<f32>;

/// A flower category label, e.g. `rose`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First character of the label, used by sample file naming conventions.
    pub fn initial(&self) -> Option<char> {
        self.0.chars().next()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Mean embedding of one category's sample images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub vector: Embedding,
    /// Number of sample embeddings averaged into `vector`.
    pub samples: usize,
}

impl Centroid {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    /// Euclidean norm of the centroid vector.
    pub fn norm(&self) -> f64 {
        self.vector
            .iter()
            .map(|&v| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt()
    }
}

/// Immutable mapping from category to centroid.
///
/// Entries keep their construction order. That order is the iteration order
/// used by the classifier, so on equal distances the earlier category wins.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CentroidMap {
    entries: Vec<(Category, Centroid)>,
}

impl CentroidMap {
    /// Build a mapping from `(category, centroid)` pairs.
    ///
    /// Fails on duplicate categories, empty centroid vectors, or centroids
    /// of differing dimensionality.
    pub fn from_entries<I>(entries: I) -> FlowerResult<Self>
    where
        I: IntoIterator<Item = (Category, Centroid)>,
    {
        let entries: Vec<(Category, Centroid)> = entries.into_iter().collect();

        let mut dim = None;
        for (i, (category, centroid)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(c, _)| c == category) {
                return Err(FlowerError::InvalidInput(format!(
                    "duplicate category '{category}'"
                )));
            }
            if centroid.vector.is_empty() {
                return Err(FlowerError::InvalidEmbedding(format!(
                    "centroid for '{category}' is empty"
                )));
            }
            match dim {
                None => dim = Some(centroid.dim()),
                Some(expected) if expected != centroid.dim() => {
                    return Err(FlowerError::DimensionMismatch {
                        expected,
                        actual: centroid.dim(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, category: &Category) -> Option<&Centroid> {
        self.entries
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, centroid)| centroid)
    }

    /// Iterate in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (&Category, &Centroid)> {
        self.entries.iter().map(|(c, centroid)| (c, centroid))
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.entries.iter().map(|(c, _)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared dimensionality of all centroids, `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.entries.first().map(|(_, centroid)| centroid.dim())
    }
}

/// Outcome of classifying one live embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationResult {
    /// Nearest centroid was close enough to report.
    Identified {
        label: Category,
        confidence: f64,
        distance: f64,
    },
    /// Nearest centroid was too far away; no label is assigned.
    Rejected { confidence: f64, distance: f64 },
}

impl ClassificationResult {
    pub fn label(&self) -> Option<&Category> {
        match self {
            Self::Identified { label, .. } => Some(label),
            Self::Rejected { .. } => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Identified { confidence, .. } | Self::Rejected { confidence, .. } => *confidence,
        }
    }

    pub fn distance(&self) -> f64 {
        match self {
            Self::Identified { distance, .. } | Self::Rejected { distance, .. } => *distance,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Distance and confidence of one category against a live embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDistance {
    pub category: Category,
    pub distance: f64,
    pub confidence: f64,
}

/// Errors that can occur in the flower-id library.
#[derive(thiserror::Error, Debug)]
pub enum FlowerError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load sample {index} of '{category}' ({}): {reason}", path.display())]
    ImageLoad {
        category: Category,
        index: usize,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to build centroid for '{category}': {reason}")]
    Centroid { category: Category, reason: String },

    #[error("No reference data: the centroid mapping is empty")]
    NoReferenceData,

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    #[error("Camera access error: {0}")]
    CameraAccess(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type FlowerResult<T> = Result<T, FlowerError>;
