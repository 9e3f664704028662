use std::path::PathBuf;
use thiserror::Error;

use crate::translation::TranslateError;

#[derive(Error, Debug)]
pub enum DoctransError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve translator API key: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("UnsupportedFormatError: unsupported file extension '{0}'")]
    UnsupportedFormat(String),

    #[error("ExtractionError: {0}")]
    Extraction(String),

    #[error("Failed to render {format} output: {reason}")]
    Render { format: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("InvalidArchive: {0}")]
    Invalid(String),

    #[error("EmptyArchive: archive contains no files")]
    Empty,

    #[error("Failed to read archive '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupted archive entry '{name}': {reason}")]
    Entry { name: String, reason: String },

    #[error("Failed to write archive '{path}': {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue is shut down")]
    ChannelClosed,

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Spool error for '{path}': {reason}")]
    Spool { path: PathBuf, reason: String },

    #[error("Invalid max_attempts {0}: must be at least 1")]
    InvalidAttempts(u32),
}

/// Errors raised by the intake and status facade.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error(transparent)]
    Job(#[from] crate::job::JobError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Translate(#[from] TranslateError),
}

/// Why a result artifact cannot be served.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Job '{0}' has not completed yet")]
    NotReady(String),

    #[error("No translated file available for job '{0}'")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, DoctransError>;
