//! Content extraction: staged file → ordered topic sections.
//!
//! The [`Extractor`] trait is the seam the session manager depends on.
//! [`FileExtractor`] handles PDF (`pdf-extract`), DOCX (`zip` + `quick-xml`)
//! and plain text / Markdown, then cuts the text into sections with
//! [`paperlens_core::chunk::sectionize`].

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use paperlens_core::chunk::sectionize;
use paperlens_core::models::Section;
use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Turn a staged file into ordered `(topic, text)` sections.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fails if the file is unreadable or yields no text.
    async fn extract(&self, path: &Path) -> Result<Vec<Section>>;
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("text is not valid UTF-8")]
    NotUtf8,
}

/// Extracts by file extension and sections the result.
pub struct FileExtractor {
    max_tokens: usize,
}

impl FileExtractor {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<Section>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let max_tokens = self.max_tokens;

        // pdf-extract is CPU-bound and can take seconds on large papers.
        let sections = tokio::task::spawn_blocking(move || -> Result<Vec<Section>> {
            let text = extract_text(&bytes, &ext)?;
            Ok(sectionize(&text, max_tokens))
        })
        .await??;

        if sections.is_empty() {
            bail!("No text could be extracted from {}", path.display());
        }
        Ok(sections)
    }
}

/// Extract plain text from file bytes, dispatching on the file extension.
///
/// Files without an extension are sniffed: a `%PDF` header means PDF,
/// anything else is tried as UTF-8 text.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "txt" | "md" | "markdown" => extract_utf8(bytes),
        "" if bytes.starts_with(b"%PDF") => extract_pdf(bytes),
        "" => extract_utf8(bytes),
        other => Err(ExtractError::UnsupportedFileType(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8)
}

/// Reads `word/document.xml` and emits one line per `<w:p>` paragraph, so
/// heading paragraphs stay on their own line for sectioning.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraphs(&doc_xml)
}

fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_text(b"foo", "xlsx").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFileType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", "pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", "docx").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["Abstract", "We study widgets."]);
        let text = extract_text(&bytes, "docx").unwrap();
        assert_eq!(text, "Abstract\nWe study widgets.\n");
    }

    #[tokio::test]
    async fn text_file_is_sectioned() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("paper.md");
        std::fs::write(&path, "Abstract\nShort.\n\n1 Introduction\nLonger text.").unwrap();

        let sections = FileExtractor::new(700).extract(&path).await.unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].topic, "1 Introduction");
        assert_eq!(sections[1].text, "Longer text.");
    }

    #[tokio::test]
    async fn empty_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "   \n\n").unwrap();
        assert!(FileExtractor::new(700).extract(&path).await.is_err());
    }
}
