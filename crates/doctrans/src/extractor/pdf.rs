use lopdf::{dictionary, Document, Object, Stream};

use crate::error::ExtractError;
use crate::extractor::ContentExtractor;
use crate::format::DocumentFormat;

const LINES_PER_PAGE: usize = 50;

/// Characters per rendered line before wrapping (Helvetica 11pt on Letter).
const MAX_LINE_CHARS: usize = 90;

const PAGE_TOP: i64 = 742;
const LINE_HEIGHT: i64 = 14;

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extractor.pdf").entered();

        let doc = Document::load_mem(bytes)
            .map_err(|e| ExtractError::Extraction(format!("Failed to load PDF: {}", e)))?;

        let text = extract_text_from_pdf(&doc);

        if text.trim().is_empty() {
            return Err(ExtractError::Extraction(
                "PDF has no extractable text layer".to_string(),
            ));
        }

        Ok(text)
    }

    fn render(&self, text: &str) -> Result<Vec<u8>, ExtractError> {
        create_text_pdf(text).map_err(|reason| ExtractError::Render {
            format: "pdf".to_string(),
            reason,
        })
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }
}

fn extract_text_from_pdf(doc: &Document) -> String {
    let mut text = String::new();

    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                if !page_text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Err(e) => log::debug!("Skipping unreadable PDF page {}: {}", page_num, e),
        }
    }

    text
}

fn create_text_pdf(text: &str) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.new_object_id();
    let resources_id = doc.new_object_id();

    doc.objects.insert(
        font_id,
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        }),
    );

    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        }),
    );

    let lines = wrap_lines(text, MAX_LINE_CHARS);
    let page_count = lines.len().div_ceil(LINES_PER_PAGE).max(1);

    let mut page_ids = Vec::with_capacity(page_count);

    for page_lines in lines
        .chunks(LINES_PER_PAGE)
        .chain(std::iter::once(&[][..]))
        .take(page_count)
    {
        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let content = format_page_content(page_lines);
        doc.objects.insert(
            content_id,
            Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
        );

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }),
        );

        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| e.to_string())?;

    Ok(buffer)
}

/// One text object per line so that text-layer extraction keeps line breaks.
fn format_page_content(lines: &[String]) -> String {
    let mut content = String::new();
    let mut y = PAGE_TOP;

    for line in lines {
        if !line.trim().is_empty() {
            content.push_str(&format!(
                "BT /F1 11 Tf 50 {} Td ({}) Tj ET\n",
                y,
                escape_pdf_string(line)
            ));
        }
        y -= LINE_HEIGHT;
    }

    content
}

fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        if paragraph.chars().count() <= width {
            lines.push(paragraph.to_string());
            continue;
        }

        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let needed = current.chars().count() + word.chars().count() + 1;
            if !current.is_empty() && needed > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Escapes a line for a PDF literal string in WinAnsiEncoding. Latin-1
/// characters are written as octal escapes; anything else becomes `?`.
fn escape_pdf_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());

    for c in s.chars() {
        match c {
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push(' '),
            c if c.is_ascii() && !c.is_ascii_control() => escaped.push(c),
            c if ('\u{A0}'..='\u{FF}').contains(&c) => {
                escaped.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => escaped.push('?'),
        }
    }

    escaped
}
