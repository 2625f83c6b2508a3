//! Plain-text extraction for uploaded document versions.
//!
//! The format is chosen by file extension: `.txt` and `.md` are read as
//! UTF-8, `.pdf` goes through `pdf-extract`, and `.docx` is unpacked with
//! `zip` and scanned with `quick-xml`. Paragraph boundaries in DOCX become
//! blank lines so the chunker can still prefer them.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Failure to turn a document into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("document is not valid UTF-8 text: {0}")]
    Encoding(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("extraction aborted: {0}")]
    Aborted(String),
}

/// Document formats accepted for `doc_v1` / `doc_v2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Detect the format from a file name's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" => Ok(DocumentFormat::Text),
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "" => Err(ExtractError::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(ExtractError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Read a document from disk and return its plain text.
pub fn load_document_text(path: &Path) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_text(&bytes, format)
}

/// Extract plain text from in-memory document bytes.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Text => String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractError::Encoding(e.to_string())),
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    docx_body_text(&doc_xml)
}

/// Collect `w:t` runs. `w:p` ends a paragraph, `w:tab` and `w:br` map to
/// tab and newline.
fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let paragraph = current.trim_end().to_string();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph);
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim_end().to_string());
    }
    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/B.TXT")).unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.md")).unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("x.pdf")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("x.docx")).unwrap(),
            DocumentFormat::Docx
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DocumentFormat::from_path(Path::new("sheet.xlsx")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
        let err = DocumentFormat::from_path(Path::new("README")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_text_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, "Привет, мир.\n\nSecond paragraph.").unwrap();
        let text = load_document_text(&path).unwrap();
        assert_eq!(text, "Привет, мир.\n\nSecond paragraph.");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_document_text(&tmp.path().join("gone.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00], DocumentFormat::Text).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", DocumentFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn test_docx_paragraphs_become_blank_lines() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Scope of</w:t></w:r><w:r><w:t xml:space="preserve"> work &amp; terms.</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t>Payment</w:t><w:tab/><w:t>30 days.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text(&docx_bytes(xml), DocumentFormat::Docx).unwrap();
        assert_eq!(text, "Scope of work & terms.\n\nPayment\t30 days.");
    }
}
