//! Per-format text extraction and rendering.
//!
//! Each supported document format has an extractor that pulls plain text out
//! of the raw bytes and renders translated text back into the same format.

pub mod docx;
pub mod pdf;
pub mod text;

use crate::error::ExtractError;
use crate::format::DocumentFormat;

pub trait ContentExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
    fn render(&self, text: &str) -> Result<Vec<u8>, ExtractError>;
    fn supports(&self, format: DocumentFormat) -> bool;
}

pub struct ExtractorRegistry {
    text: text::TextExtractor,
    docx: docx::DocxExtractor,
    pdf: pdf::PdfExtractor,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            text: text::TextExtractor::new(),
            docx: docx::DocxExtractor::new(),
            pdf: pdf::PdfExtractor::new(),
        }
    }

    /// Returns the extractor for `format`. Archives are containers, not
    /// documents, and have none.
    pub fn get(&self, format: DocumentFormat) -> Result<&dyn ContentExtractor, ExtractError> {
        match format {
            DocumentFormat::Text => Ok(&self.text),
            DocumentFormat::Docx => Ok(&self.docx),
            DocumentFormat::Pdf => Ok(&self.pdf),
            DocumentFormat::Archive => Err(ExtractError::UnsupportedFormat(
                format.extension().to_string(),
            )),
        }
    }

    pub fn extract(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
        self.get(format)?.extract(bytes)
    }

    pub fn render(&self, text: &str, format: DocumentFormat) -> Result<Vec<u8>, ExtractError> {
        self.get(format)?.render(text)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
