//! Retrieval subsystem — ranked text chunks for retrieval-augmented answers.
//!
//! Documents are split into overlapping character windows with
//! `text-splitter` and stored in an in-memory SQLite FTS5 table;
//! [`KeywordIndex::retrieve`] ranks the chunks against a query with BM25.
//! There are no embeddings and no vector index: ranking is purely lexical.
//!
//! Documents come from a directory of `.txt` / `.md` / `.pdf` files
//! ([`load_documents`]) or, when none is configured, from a small built-in
//! sample corpus ([`sample_documents`]). A PDF yields one document per page.

pub mod index;
mod pdf;

pub use index::KeywordIndex;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no readable documents in {0}")]
    NoDocuments(PathBuf),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },
    #[error("invalid chunking parameters: {0}")]
    Splitter(String),
    #[error("keyword index: {0}")]
    Index(String),
}

/// A source document before chunking.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    /// Where the text came from: file name, `file.pdf#page=N`, or a fixed label.
    pub source: String,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self { text: text.into(), source: source.into() }
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    /// BM25 score; higher is more relevant.
    pub score: f32,
}

/// Source of context chunks for a question.
///
/// Implementations rank by relevance and return at most `top_k` chunks.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Two short documents used when no documents directory is configured.
pub fn sample_documents() -> Vec<Document> {
    vec![
        Document::new("LangChain is a framework for building LLM apps.", "intro"),
        Document::new("Gemini is Google’s family of generative models.", "intro2"),
    ]
}

const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "pdf"];

/// Read every `.txt` / `.md` / `.pdf` file directly under `dir`, sorted by
/// file name. Empty files and text-less PDF pages are skipped; a directory
/// with nothing usable is an error.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>, RetrievalError> {
    let io_err = |source| RetrievalError::Io { path: dir.to_path_buf(), source };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| DOCUMENT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if is_pdf(&path) {
            let pages = pdf::load_pdf(&path, &source)?;
            debug!(path = %path.display(), pages = pages.len(), "pdf loaded");
            documents.extend(pages);
            continue;
        }

        let text = fs::read_to_string(&path)
            .map_err(|source| RetrievalError::Io { path: path.clone(), source })?;
        if text.trim().is_empty() {
            debug!(path = %path.display(), "skipping empty document");
            continue;
        }
        documents.push(Document { text, source });
    }

    if documents.is_empty() {
        return Err(RetrievalError::NoDocuments(dir.to_path_buf()));
    }
    info!(dir = %dir.display(), documents = documents.len(), "documents loaded");
    Ok(documents)
}

fn is_pdf(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Join chunk texts with blank lines for insertion into a prompt.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}
