use std::io::{Cursor, Read, Seek, Write};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ExtractError;
use crate::extractor::ContentExtractor;
use crate::format::DocumentFormat;

const DOCUMENT_XML: &str = "word/document.xml";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_FOOTER: &str = "</w:body></w:document>";

pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ExtractError::Extraction(format!("Failed to open DOCX: {}", e)))?;

        let text = extract_docx_text(&mut archive)?;

        if text.trim().is_empty() {
            return Err(ExtractError::Extraction(
                "DOCX document contains no text".to_string(),
            ));
        }

        Ok(text)
    }

    fn render(&self, text: &str) -> Result<Vec<u8>, ExtractError> {
        create_docx(text).map_err(|reason| ExtractError::Render {
            format: "docx".to_string(),
            reason,
        })
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Docx)
    }
}

fn extract_docx_text<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, ExtractError> {
    let mut document_xml = archive.by_name(DOCUMENT_XML).map_err(|e| {
        ExtractError::Extraction(format!("Failed to find document.xml: {}", e))
    })?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| ExtractError::Extraction(format!("Failed to read document.xml: {}", e)))?;

    parse_docx_xml(&xml_content)
}

/// Collects the text runs of a WordprocessingML body, one line per paragraph.
fn parse_docx_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let decoded = e.decode().map_err(|e| {
                        ExtractError::Extraction(format!("Invalid text in document.xml: {}", e))
                    })?;
                    text.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text_element {
                    let name = e.decode().map_err(|e| {
                        ExtractError::Extraction(format!("Invalid reference in document.xml: {}", e))
                    })?;
                    text.push_str(&resolve_reference(&name)?);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Extraction(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

/// Resolves the body of `&name;`: a predefined entity or a character reference.
fn resolve_reference(name: &str) -> Result<String, ExtractError> {
    if let Some(value) = resolve_predefined_entity(name) {
        return Ok(value.to_string());
    }

    let code = match name.strip_prefix('#') {
        Some(hex) if hex.starts_with('x') || hex.starts_with('X') => {
            u32::from_str_radix(&hex[1..], 16).ok()
        }
        Some(decimal) => decimal.parse::<u32>().ok(),
        None => None,
    };

    code.and_then(char::from_u32)
        .map(String::from)
        .ok_or_else(|| ExtractError::Extraction(format!("Unknown entity &{};", name)))
}

fn create_docx(text: &str) -> Result<Vec<u8>, String> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", PACKAGE_RELS_XML.to_string()),
        (DOCUMENT_XML, document_xml(text)),
    ];

    for (name, content) in parts {
        writer
            .start_file(name, options)
            .map_err(|e| format!("Failed to add {}: {}", name, e))?;
        writer
            .write_all(content.as_bytes())
            .map_err(|e| format!("Failed to write {}: {}", name, e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| format!("Failed to finish DOCX: {}", e))?;
    Ok(cursor.into_inner())
}

fn document_xml(text: &str) -> String {
    let mut xml = String::from(DOCUMENT_HEADER);

    for line in text.lines() {
        if line.is_empty() {
            xml.push_str("<w:p/>");
            continue;
        }
        xml.push_str("<w:p><w:r><w:t xml:space=\"preserve\">");
        xml.push_str(&quick_xml::escape::escape(line));
        xml.push_str("</w:t></w:r></w:p>");
    }

    xml.push_str(DOCUMENT_FOOTER);
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_docx_format() {
        let extractor = DocxExtractor::new();
        assert!(extractor.supports(DocumentFormat::Docx));
        assert!(!extractor.supports(DocumentFormat::Pdf));
        assert!(!extractor.supports(DocumentFormat::Text));
    }

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:body>
                <w:p>
                    <w:r>
                        <w:t>Hello World</w:t>
                    </w:r>
                </w:p>
            </w:body>
        </w:document>"#;

        let text = parse_docx_xml(xml).unwrap();
        assert_eq!(text.trim(), "Hello World");
    }

    #[test]
    fn test_parse_runs_and_paragraphs() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>there</w:t></w:r></w:p><w:p><w:r><w:t>Next</w:t><w:tab/><w:t>col</w:t></w:r></w:p></w:body></w:document>"#;

        let text = parse_docx_xml(xml).unwrap();
        assert_eq!(text, "Hello there\nNext\tcol\n");
    }

    #[test]
    fn test_empty_document_is_extraction_error() {
        let extractor = DocxExtractor::new();
        let bytes = extractor.render("   ").unwrap();

        match extractor.extract(&bytes) {
            Err(ExtractError::Extraction(msg)) => assert!(msg.contains("no text")),
            other => panic!("Expected Extraction error, got {:?}", other),
        }
    }

    #[test]
    fn test_not_a_zip_is_extraction_error() {
        let extractor = DocxExtractor::new();
        let result = extractor.extract(b"definitely not a docx");
        assert!(matches!(result, Err(ExtractError::Extraction(_))));
    }

    #[test]
    fn test_render_escapes_markup() {
        let extractor = DocxExtractor::new();
        let bytes = extractor.render("Fish & <Chips> \"q\" 'a'").unwrap();

        let text = extractor.extract(&bytes).unwrap();
        assert_eq!(text, "Fish & <Chips> \"q\" 'a'\n");
    }

    #[test]
    fn test_parse_resolves_references() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>A &amp; B &lt;x&gt; &quot;y&quot; &apos;z&apos; &#233;&#x20AC;</w:t></w:r></w:p></w:body></w:document>"#;

        let text = parse_docx_xml(xml).unwrap();
        assert_eq!(text, "A & B <x> \"y\" 'z' \u{e9}\u{20ac}\n");
    }

    #[test]
    fn test_references_outside_text_ignored() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:instrText>&amp;</w:instrText><w:r><w:t>kept</w:t></w:r></w:p></w:body></w:document>"#;

        assert_eq!(parse_docx_xml(xml).unwrap(), "kept\n");
    }

    #[test]
    fn test_unknown_entity_rejected() {
        assert!(matches!(
            resolve_reference("nbsp"),
            Err(ExtractError::Extraction(_))
        ));
        assert_eq!(resolve_reference("#x41").unwrap(), "A");
    }
}
