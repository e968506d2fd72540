//! Reference set loading: sample images per category averaged into centroids.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::centroid::mean_embedding;
use crate::embedding::{embed_image, FeatureExtractor};
use crate::types::{Category, CentroidMap, FlowerError, FlowerResult};

/// Sample file naming used by the bundled dataset: `rose/r1.jpg`.
pub const DEFAULT_PATTERN: &str = "{category}/{initial}{index}.jpg";

/// Samples per category in the bundled dataset.
pub const DEFAULT_SAMPLES_PER_CATEGORY: usize = 6;

/// Where sample images live and how they are named.
///
/// `pattern` is a path relative to `root` with the placeholders
/// `{category}`, `{initial}` (first character of the category), and
/// `{index}` (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleLayout {
    pub root: PathBuf,
    pub pattern: String,
}

impl SampleLayout {
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pattern: pattern.into(),
        }
    }

    /// Layout with the default naming pattern under `root`.
    pub fn with_default_pattern(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_PATTERN)
    }

    /// Path of sample `index` for `category`.
    pub fn sample_path(&self, category: &Category, index: usize) -> PathBuf {
        let initial = category.initial().map(String::from).unwrap_or_default();
        let relative = self
            .pattern
            .replace("{category}", category.as_str())
            .replace("{initial}", &initial)
            .replace("{index}", &index.to_string());
        self.root.join(relative)
    }

    /// Check the pattern before any I/O happens.
    pub fn validate(&self) -> FlowerResult<()> {
        if !self.pattern.contains("{index}") {
            return Err(FlowerError::InvalidInput(format!(
                "sample pattern '{}' has no {{index}} placeholder",
                self.pattern
            )));
        }
        if Path::new(&self.pattern).is_absolute() {
            return Err(FlowerError::InvalidInput(format!(
                "sample pattern '{}' must be relative to the dataset root",
                self.pattern
            )));
        }
        Ok(())
    }

    /// Every `(category, index, path)` whose sample file does not exist.
    pub fn missing_samples(&self, set: &ReferenceSet) -> Vec<(Category, usize, PathBuf)> {
        set.samples(self)
            .filter(|(_, _, path)| !path.is_file())
            .collect()
    }
}

/// The categories to learn and how many samples each one has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSet {
    pub categories: Vec<Category>,
    pub samples_per_category: usize,
}

impl ReferenceSet {
    pub fn new<I, C>(categories: I, samples_per_category: usize) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Category>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            samples_per_category,
        }
    }

    /// Fail on an empty category list, zero samples, or duplicate names.
    pub fn validate(&self) -> FlowerResult<()> {
        if self.categories.is_empty() {
            return Err(FlowerError::InvalidInput("no categories configured".to_string()));
        }
        if self.samples_per_category == 0 {
            return Err(FlowerError::InvalidInput(
                "samples per category must be at least 1".to_string(),
            ));
        }
        for (i, category) in self.categories.iter().enumerate() {
            if category.as_str().trim().is_empty() {
                return Err(FlowerError::InvalidInput("empty category name".to_string()));
            }
            if self.categories[..i].contains(category) {
                return Err(FlowerError::InvalidInput(format!(
                    "duplicate category '{category}'"
                )));
            }
        }
        Ok(())
    }

    /// All sample locations, category by category, index ascending.
    pub fn samples<'a>(
        &'a self,
        layout: &'a SampleLayout,
    ) -> impl Iterator<Item = (Category, usize, PathBuf)> + 'a {
        self.categories.iter().flat_map(move |category| {
            (1..=self.samples_per_category)
                .map(move |index| (category.clone(), index, layout.sample_path(category, index)))
        })
    }
}

impl Default for ReferenceSet {
    fn default() -> Self {
        Self::new(["rose", "lotus", "tulip"], DEFAULT_SAMPLES_PER_CATEGORY)
    }
}

/// Embed every sample image and average them into one centroid per category.
///
/// Categories are processed in configured order, which becomes the map's
/// iteration order. The first sample that cannot be read or embedded aborts
/// the whole load.
pub fn load_reference_set<E>(
    extractor: &mut E,
    set: &ReferenceSet,
    layout: &SampleLayout,
) -> FlowerResult<CentroidMap>
where
    E: FeatureExtractor + ?Sized,
{
    set.validate()?;
    layout.validate()?;

    tracing::info!(
        "Loading reference set: {} categories x {} samples from {} ({})",
        set.categories.len(),
        set.samples_per_category,
        layout.root.display(),
        extractor.name()
    );

    let mut entries = Vec::with_capacity(set.categories.len());
    for category in &set.categories {
        let mut embeddings = Vec::with_capacity(set.samples_per_category);

        for index in 1..=set.samples_per_category {
            let path = layout.sample_path(category, index);
            let load_error = |reason: String| FlowerError::ImageLoad {
                category: category.clone(),
                index,
                path: path.clone(),
                reason,
            };

            let img = image::open(&path).map_err(|e| load_error(e.to_string()))?;
            let embedding = embed_image(extractor, &img).map_err(|e| load_error(e.to_string()))?;

            tracing::debug!("Embedded {} ({} dims)", path.display(), embedding.len());
            embeddings.push(embedding);
        }

        let centroid = mean_embedding(&embeddings).map_err(|e| FlowerError::Centroid {
            category: category.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(
            "Centroid for '{category}' from {} samples, norm {:.4}",
            centroid.samples,
            centroid.norm()
        );
        entries.push((category.clone(), centroid));
    }

    let map = CentroidMap::from_entries(entries)?;
    tracing::info!(
        "Reference set ready: {} centroids of {} dims",
        map.len(),
        map.dim().unwrap_or(0)
    );
    Ok(map)
}
