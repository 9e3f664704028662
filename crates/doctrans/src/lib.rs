pub mod archive;
pub mod config;
pub mod error;
pub mod extractor;
pub mod format;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod retention;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod translation;
pub mod worker;

pub use config::{load_config, resolve_api_key, Config};
pub use error::{
    ArchiveError, ConfigError, DoctransError, DownloadError, ExtractError, QueueError, Result,
    ServiceError, StorageError,
};
pub use extractor::ExtractorRegistry;
pub use format::DocumentFormat;
pub use job::{Job, JobError, JobStatus, JobStore, MemoryJobStore};
pub use logging::init_logging;
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, ProgressEvent, ProgressReporter};
pub use retention::{RetentionSweeper, SweepReport};
pub use secrets::{resolve_secret, SecretError};
pub use service::{StoreObserver, TranslationService};
pub use storage::FileStorage;
pub use translation::{Language, TranslateError, TranslationClient, Translator};
pub use worker::{JobOutcome, JobQueue};
