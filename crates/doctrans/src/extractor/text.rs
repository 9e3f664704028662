use crate::error::ExtractError;
use crate::extractor::ContentExtractor;
use crate::format::DocumentFormat;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            ExtractError::Extraction(format!(
                "text file is not valid UTF-8 (at byte {})",
                e.utf8_error().valid_up_to()
            ))
        })
    }

    fn render(&self, text: &str) -> Result<Vec<u8>, ExtractError> {
        Ok(text.as_bytes().to_vec())
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text)
    }
}
