use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// A collaborator that turns a file into plain text (OCR, PDF, DOCX, ...).
///
/// `None` or blank text means "no text available"; callers skip the source.
pub trait TextSource {
    /// Whether this source knows how to read `path`.
    fn accepts(&self, path: &Path) -> bool;

    fn extract(&self, path: &Path) -> Option<String>;
}

/// Reads UTF-8 text files as-is.
#[derive(Debug, Clone)]
pub struct PlainTextSource {
    extensions: Vec<String>,
}

impl Default for PlainTextSource {
    fn default() -> Self {
        Self {
            extensions: vec!["txt".to_string(), "md".to_string()],
        }
    }
}

impl PlainTextSource {
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl TextSource for PlainTextSource {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    fn extract(&self, path: &Path) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read text source");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub documents: Vec<ExtractedDocument>,
    /// Paths with no accepting source or no extractable text.
    pub skipped: Vec<PathBuf>,
}

/// Extract text from each path with the first source that accepts it.
///
/// Extraction failures are never fatal: the path lands in `skipped`.
pub fn extract_documents(sources: &[&dyn TextSource], paths: &[PathBuf]) -> ExtractionSummary {
    let mut summary = ExtractionSummary::default();
    for path in paths {
        let text = sources
            .iter()
            .find(|s| s.accepts(path))
            .and_then(|s| s.extract(path))
            .filter(|t| !t.trim().is_empty());
        match text {
            Some(text) => {
                debug!(path = %path.display(), chars = text.chars().count(), "extracted text");
                summary.documents.push(ExtractedDocument {
                    path: path.clone(),
                    text,
                });
            }
            None => {
                warn!(path = %path.display(), "no text available; source skipped");
                summary.skipped.push(path.clone());
            }
        }
    }
    info!(
        extracted = summary.documents.len(),
        skipped = summary.skipped.len(),
        "text extraction finished"
    );
    summary
}
