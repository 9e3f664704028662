use thiserror::Error;

use crate::error::{ArchiveError, ExtractError, StorageError};
use crate::translation::TranslateError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("NoFilesTranslated: {attempted} of {total} archive entries were eligible and none could be translated")]
    NoFilesTranslated {
        attempted: usize,
        total: usize,
        /// Whether at least one entry failed for a reason that may go away.
        retryable: bool,
    },

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Whether running the same job again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Extract(_) => false,
            Self::Archive(
                ArchiveError::Invalid(_) | ArchiveError::Empty | ArchiveError::Entry { .. },
            ) => false,
            Self::Archive(ArchiveError::Read { .. } | ArchiveError::Write { .. }) => true,
            Self::Translate(e) => e.is_retryable(),
            Self::Storage(StorageError::InvalidName(_)) => false,
            Self::Storage(_) => true,
            Self::NoFilesTranslated { retryable, .. } => *retryable,
            Self::Panicked(_) => true,
        }
    }
}
