//! Classifier session lifecycle.

pub mod manager;

pub use manager::{build_extractor, CaptureOutcome, ClassifierSession, SessionStats};
