use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// File formats the pipeline knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Docx,
    Pdf,
    Archive,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            "zip" => Some(Self::Archive),
            _ => None,
        }
    }

    /// Detects the format from a file name, failing with `UnsupportedFormat`
    /// naming the extension (empty when the name has none).
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(extension)
            .ok_or_else(|| ExtractError::UnsupportedFormat(extension.to_string()))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Archive => "zip",
        }
    }

    /// Whether documents of this format carry text that can be translated
    /// directly (as opposed to containers of such documents).
    pub fn is_document(&self) -> bool {
        !matches!(self, Self::Archive)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension_known() {
        assert_eq!(DocumentFormat::from_extension("txt"), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("zip"), Some(DocumentFormat::Archive));
    }

    #[test]
    fn test_from_extension_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("Docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("ZIP"), Some(DocumentFormat::Archive));
    }

    #[test]
    fn test_from_extension_unknown() {
        assert_eq!(DocumentFormat::from_extension("md"), None);
        assert_eq!(DocumentFormat::from_extension("doc"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
    }

    #[test]
    fn test_from_path_names_extension() {
        match DocumentFormat::from_path(Path::new("slides.pptx")) {
            Err(ExtractError::UnsupportedFormat(ext)) => assert_eq!(ext, "pptx"),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_from_path_without_extension() {
        match DocumentFormat::from_path(Path::new("README")) {
            Err(ExtractError::UnsupportedFormat(ext)) => assert_eq!(ext, ""),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_archive_is_not_a_document() {
        assert!(DocumentFormat::Text.is_document());
        assert!(DocumentFormat::Pdf.is_document());
        assert!(!DocumentFormat::Archive.is_document());
    }
}
