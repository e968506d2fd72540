//! Frame capture: image files, base64 payloads, and snapshot cameras.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::types::{FlowerError, FlowerResult};

/// Where a captured frame came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameSource {
    File { path: String },
    Base64 { mime: String },
    Camera { device: String },
}

/// Load an image from a file path.
pub fn capture_from_file(path: impl AsRef<Path>) -> FlowerResult<(DynamicImage, FrameSource)> {
    let path = path.as_ref();
    let img = image::open(path)?;
    let source = FrameSource::File {
        path: path.display().to_string(),
    };
    Ok((img, source))
}

/// Load an image from base64-encoded data.
pub fn capture_from_base64(data: &str, mime: &str) -> FlowerResult<(DynamicImage, FrameSource)> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| FlowerError::InvalidInput(format!("Invalid base64: {e}")))?;

    let format = match mime {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/webp" => Some(ImageFormat::WebP),
        "image/gif" => Some(ImageFormat::Gif),
        "image/bmp" => Some(ImageFormat::Bmp),
        _ => None,
    };

    let img = if let Some(fmt) = format {
        image::load_from_memory_with_format(&bytes, fmt)?
    } else {
        image::load_from_memory(&bytes)?
    };

    let source = FrameSource::Base64 {
        mime: mime.to_string(),
    };
    Ok((img, source))
}

/// Load an image from a `data:<mime>;base64,<payload>` URL, as produced by
/// a browser canvas.
pub fn capture_from_data_url(url: &str) -> FlowerResult<(DynamicImage, FrameSource)> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| FlowerError::InvalidInput("data URL must start with 'data:'".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FlowerError::InvalidInput("data URL has no payload".to_string()))?;

    let mime = header.strip_suffix(";base64").ok_or_else(|| {
        FlowerError::InvalidInput("only base64 data URLs are supported".to_string())
    })?;

    capture_from_base64(payload, mime)
}

/// Check if a file path points to a supported image format.
pub fn is_supported_format(path: impl AsRef<Path>) -> bool {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    matches!(
        ext.as_str(),
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" | "tiff" | "tif"
    )
}

/// A source of live frames.
pub trait Camera {
    /// Grab the current frame.
    fn capture_frame(&mut self) -> FlowerResult<DynamicImage>;

    /// Identifier shown in logs and results.
    fn device(&self) -> String;
}

/// A camera backed by a snapshot file that an external webcam tool keeps
/// overwriting with the latest frame (e.g. `fswebcam --loop`).
#[derive(Debug, Clone)]
pub struct SnapshotCamera {
    path: PathBuf,
}

impl SnapshotCamera {
    /// Open the snapshot camera. Fails with `CameraAccess` when the snapshot
    /// file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> FlowerResult<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(FlowerError::CameraAccess(format!(
                "no camera snapshot at {}; is the capture tool running?",
                path.display()
            )));
        }
        tracing::info!("Using snapshot camera at {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Camera for SnapshotCamera {
    fn capture_frame(&mut self) -> FlowerResult<DynamicImage> {
        image::open(&self.path).map_err(|e| {
            FlowerError::Capture(format!("Failed to read {}: {e}", self.path.display()))
        })
    }

    fn device(&self) -> String {
        self.path.display().to_string()
    }
}
