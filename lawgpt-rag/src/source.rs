//! Document sources feeding the ingest pipeline.
//!
//! [`DirectorySource`] extracts text from PDF files (`.pdf`, any case) page by
//! page and reads every other matched file as UTF-8 text.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::{RagError, Result};

/// A document that could not be read, with the reason.
#[derive(Debug)]
pub struct DocumentFailure {
    /// The storage path of the document.
    pub source_path: String,
    /// Why it was skipped, normally [`RagError::DocumentUnreadable`].
    pub error: RagError,
}

/// The outcome of reading a source: readable documents plus skipped ones.
#[derive(Debug, Default)]
pub struct SourceDocuments {
    /// Documents whose text was extracted.
    pub documents: Vec<Document>,
    /// Documents that were skipped.
    pub failures: Vec<DocumentFailure>,
}

/// Something that yields documents for ingestion.
///
/// Failures to read an individual document are reported in
/// [`SourceDocuments::failures`] and do not fail the whole load.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Read every document the source provides.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source as a whole cannot be enumerated.
    async fn load(&self) -> Result<SourceDocuments>;
}

/// Reads PDF and text files under a directory that match glob patterns.
///
/// Document IDs are the file paths relative to the root, with `/` separators.
/// A file matched by several patterns is read once.
///
/// # Example
///
/// ```rust,ignore
/// use lawgpt_rag::DirectorySource;
///
/// let source = DirectorySource::with_patterns("data", ["*.pdf", "*.txt"]);
/// let loaded = source.load().await?;
/// ```
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    patterns: Vec<String>,
}

impl DirectorySource {
    /// Match `pattern` (e.g. `*.pdf`, `**/*.txt`) relative to `root`.
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::with_patterns(root, [pattern])
    }

    /// Match any of `patterns` relative to `root`.
    pub fn with_patterns<I, P>(root: impl Into<PathBuf>, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self { root: root.into(), patterns: patterns.into_iter().map(Into::into).collect() }
    }

    fn matching_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(RagError::InvalidConfiguration(format!(
                "document directory {} does not exist",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        for pattern in &self.patterns {
            let full_pattern = self.root.join(pattern);
            let entries = glob::glob(&full_pattern.to_string_lossy()).map_err(|e| {
                RagError::InvalidConfiguration(format!("invalid glob '{pattern}': {e}"))
            })?;
            files.extend(entries.filter_map(std::result::Result::ok).filter(|p| p.is_file()));
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn document_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn load(&self) -> Result<SourceDocuments> {
        let mut loaded = SourceDocuments::default();

        for path in self.matching_files()? {
            let source_path = path.display().to_string();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(source = %source_path, error = %e, "skipping unreadable document");
                    loaded.failures.push(DocumentFailure {
                        error: RagError::DocumentUnreadable {
                            source_path: source_path.clone(),
                            message: e.to_string(),
                        },
                        source_path,
                    });
                    continue;
                }
            };

            let format = Format::of(&path);
            let extracted = match format {
                Format::Pdf => tokio::task::spawn_blocking(move || pdf_text(&bytes))
                    .await
                    .unwrap_or_else(|e| Err(format!("PDF extraction aborted: {e}"))),
                Format::Text => {
                    String::from_utf8(bytes).map_err(|e| format!("no extractable UTF-8 text: {e}"))
                }
            };

            match extracted {
                Ok(text) => {
                    debug!(source = %source_path, chars = text.len(), ?format, "loaded document");
                    let mut document = Document::new(self.document_id(&path), text, source_path);
                    if let Some(name) = path.file_name() {
                        document
                            .metadata
                            .insert("file_name".to_string(), name.to_string_lossy().into_owned());
                    }
                    document.metadata.insert("format".to_string(), format.as_str().to_string());
                    loaded.documents.push(document);
                }
                Err(message) => {
                    warn!(source = %source_path, error = %message, "skipping document");
                    loaded.failures.push(DocumentFailure {
                        error: RagError::DocumentUnreadable {
                            source_path: source_path.clone(),
                            message,
                        },
                        source_path,
                    });
                }
            }
        }

        Ok(loaded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    Text,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            _ => Self::Text,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
        }
    }
}

/// Extract the text of every page, pages separated by blank lines.
fn pdf_text(bytes: &[u8]) -> std::result::Result<String, String> {
    let pdf = lopdf::Document::load_mem(bytes).map_err(|e| format!("not a readable PDF: {e}"))?;
    let mut pages = Vec::new();
    for number in pdf.get_pages().into_keys() {
        let text = pdf
            .extract_text(&[number])
            .map_err(|e| format!("failed to extract text from page {number}: {e}"))?;
        let text = text.trim();
        if !text.is_empty() {
            pages.push(text.to_string());
        }
    }
    if pages.is_empty() {
        return Err("PDF contains no extractable text".to_string());
    }
    Ok(pages.join("\n\n"))
}
