//! flower-id CLI: classify camera snapshots and image files against a
//! reference flower dataset.

pub mod config;
pub mod render;
pub mod repl;
pub mod session;

pub use config::{AppConfig, Overrides};
pub use session::{CaptureOutcome, ClassifierSession};
