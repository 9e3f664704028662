pub mod config;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{NoopProgress, PipelineStep, ProgressEvent, ProgressReporter, StoreProgress};
pub use runner::{translated_file_name, Pipeline};
