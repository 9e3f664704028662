use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::archive::{self, ArchiveEntry, ArchiveReader};
use crate::error::{ExtractError, StorageError};
use crate::extractor::ExtractorRegistry;
use crate::format::DocumentFormat;
use crate::sanitize;
use crate::storage::FileStorage;
use crate::translation::{TranslateError, Translator};
use crate::worker::{Delivery, JobPayload};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{PipelineStep, ProgressEvent, ProgressReporter};

/// Directory that holds translated entries inside a result archive.
const ARCHIVE_OUTPUT_DIR: &str = "translated";

/// Highest progress an attempt reports before its result is stored; 100 is
/// reserved for completion.
const MAX_ACTIVE_PROGRESS: u8 = 99;

pub struct Pipeline {
    storage: FileStorage,
    extractors: ExtractorRegistry,
    translator: Arc<dyn Translator>,
}

impl Pipeline {
    pub fn from_config(config: &PipelineConfig, translator: Arc<dyn Translator>) -> Self {
        Self::new(
            FileStorage::new(&config.data_directory),
            ExtractorRegistry::new(),
            translator,
        )
    }

    pub fn new(
        storage: FileStorage,
        extractors: ExtractorRegistry,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            storage,
            extractors,
            translator,
        }
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Runs one attempt of a job.
    ///
    /// The attempt's temp directory is always removed. When the outcome is
    /// final (success, permanent error or last attempt) the source upload is
    /// deleted and the terminal state is reported.
    pub async fn run(
        &self,
        delivery: &Delivery,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let payload = &delivery.payload;
        let span = info_span!("pipeline",
            job_id = %payload.job_id,
            filename = %sanitize::redact_path(&payload.file_path),
            target = %payload.target_language,
            attempt = delivery.attempt,
        );

        async move {
            let outcome = match self
                .storage
                .create_attempt_dir(&payload.job_id, delivery.attempt)
            {
                Ok(attempt_dir) => self.execute(payload, &attempt_dir, progress).await,
                Err(e) => Err(e.into()),
            };

            self.storage
                .cleanup_attempt_dir(&payload.job_id, delivery.attempt);

            let is_final = match &outcome {
                Ok(_) => true,
                Err(e) => !delivery.will_retry(e.is_retryable()),
            };
            if is_final {
                self.release_source(&payload.file_path);
            }

            match &outcome {
                Ok(result_path) => {
                    info!("Translation completed");
                    progress.report(ProgressEvent::Completed {
                        result_path: result_path.clone(),
                    });
                }
                Err(e) if is_final => {
                    error!("Translation failed: {}", e);
                    progress.report(ProgressEvent::Failed {
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed, will retry: {}",
                        delivery.attempt, delivery.max_attempts, e
                    );
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        payload: &JobPayload,
        attempt_dir: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let format = DocumentFormat::from_path(Path::new(&payload.original_name))?;
        match format {
            DocumentFormat::Archive => {
                self.translate_archive(payload, attempt_dir, progress)
                    .await
            }
            DocumentFormat::Text | DocumentFormat::Docx | DocumentFormat::Pdf => {
                self.translate_document(payload, format, progress).await
            }
        }
    }

    async fn translate_document(
        &self,
        payload: &JobPayload,
        format: DocumentFormat,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        progress.report(ProgressEvent::Step {
            step: PipelineStep::Extracting,
            progress: 25,
        });
        let text = info_span!("extract").in_scope(|| -> Result<String, PipelineError> {
            let bytes = read_source(&payload.file_path)?;
            Ok(self.extractors.extract(&bytes, format)?)
        })?;
        debug!("Extracted {} characters", text.len());

        progress.report(ProgressEvent::Step {
            step: PipelineStep::Translating,
            progress: 50,
        });
        let translated = self
            .translate_text(&text, &payload.target_language)
            .instrument(info_span!("translate"))
            .await?;

        progress.report(ProgressEvent::Step {
            step: PipelineStep::Saving,
            progress: 75,
        });
        let _step = info_span!("save").entered();
        let rendered = self.extractors.render(&translated, format)?;
        let file_name = translated_file_name(&payload.original_name, &payload.target_language);
        Ok(self
            .storage
            .store_result(&payload.job_id, &file_name, &rendered)?)
    }

    async fn translate_archive(
        &self,
        payload: &JobPayload,
        attempt_dir: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        progress.report(ProgressEvent::Step {
            step: PipelineStep::Unpacking,
            progress: 0,
        });
        let mut reader =
            info_span!("unpack").in_scope(|| ArchiveReader::open(&payload.file_path))?;

        let listed = reader.entries().len();
        let eligible: Vec<ArchiveEntry> = reader
            .entries()
            .iter()
            .filter(|e| e.is_translatable())
            .cloned()
            .collect();
        let total = eligible.len();
        for skipped in reader.entries().iter().filter(|e| !e.is_translatable()) {
            debug!("Skipping unsupported archive entry {}", skipped.name);
        }

        progress.report(ProgressEvent::Entries {
            current: 0,
            total,
            progress: 0,
        });
        if total == 0 {
            return Err(PipelineError::NoFilesTranslated {
                attempted: 0,
                total: listed,
                retryable: false,
            });
        }

        progress.report(ProgressEvent::Step {
            step: PipelineStep::TranslatingEntries,
            progress: 0,
        });

        let output_root = attempt_dir.join(ARCHIVE_OUTPUT_DIR);
        let mut written: Vec<(String, PathBuf)> = Vec::new();
        let mut retryable = false;

        for (index, entry) in eligible.iter().enumerate() {
            let entry_span = info_span!("entry", name = %entry.name);
            let translated = match reader.read(entry) {
                Ok(bytes) => {
                    self.translate_entry(entry, &bytes, &payload.target_language)
                        .instrument(entry_span)
                        .await
                }
                Err(e) => Err(e.into()),
            };

            match translated {
                Ok(bytes) => {
                    let path = output_root.join(&entry.name);
                    write_entry(&path, &bytes)?;
                    written.push((format!("{}/{}", ARCHIVE_OUTPUT_DIR, entry.name), path));
                }
                Err(e) => {
                    warn!("Skipping archive entry {}: {}", entry.name, e);
                    retryable |= e.is_retryable();
                }
            }

            let processed = index + 1;
            progress.report(ProgressEvent::Entries {
                current: processed,
                total,
                progress: entry_percent(processed, total),
            });
        }

        if written.is_empty() {
            return Err(PipelineError::NoFilesTranslated {
                attempted: total,
                total: listed,
                retryable,
            });
        }

        progress.report(ProgressEvent::Step {
            step: PipelineStep::Packing,
            progress: MAX_ACTIVE_PROGRESS,
        });
        let _step = info_span!("pack", files = written.len()).entered();

        let result_name = format!(
            "translated_to_{}_{}",
            payload.target_language, payload.original_name
        );
        let built = archive::pack(&written, &attempt_dir.join(&result_name))?;
        info!(
            "Packed {} of {} eligible entries",
            written.len(),
            total
        );

        Ok(self
            .storage
            .promote_result(&payload.job_id, &built, &result_name)?)
    }

    async fn translate_entry(
        &self,
        entry: &ArchiveEntry,
        bytes: &[u8],
        target_language: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let format = entry
            .format
            .ok_or_else(|| ExtractError::UnsupportedFormat(entry.name.clone()))?;
        let text = self.extractors.extract(bytes, format)?;
        let translated = self.translate_text(&text, target_language).await?;
        Ok(self.extractors.render(&translated, format)?)
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslateError> {
        let translated = self.translator.translate(text, target_language).await?;
        if translated.trim().is_empty() && !text.trim().is_empty() {
            return Err(TranslateError::Service {
                status: 200,
                body: "translation service returned an empty translation".to_string(),
            });
        }
        Ok(translated)
    }

    fn release_source(&self, source_path: &Path) {
        match self.storage.remove_upload(source_path) {
            Ok(true) => debug!("Removed source upload"),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove source upload: {}", e),
        }
    }
}

/// `{basename}_translated_to_{lang}{ext}`
pub fn translated_file_name(original_name: &str, target_language: &str) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_translated_to_{}.{}", stem, target_language, ext),
        None => format!("{}_translated_to_{}", stem, target_language),
    }
}

/// `round(processed * 100 / total)`, held at 99 until the archive is packed.
fn entry_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return MAX_ACTIVE_PROGRESS;
    }
    ((processed * 100 + total / 2) / total).min(MAX_ACTIVE_PROGRESS as usize) as u8
}

fn read_source(path: &Path) -> Result<Vec<u8>, StorageError> {
    std::fs::read(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_entry(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, bytes).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}
