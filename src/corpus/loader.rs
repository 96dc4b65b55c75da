//! Loads a directory of text documents into a [`MemoryStore`].
//!
//! Every `*.txt` / `*.md` file becomes one document keyed by its file stem.
//! An optional `<stem>.meta.json` sidecar overrides the derived title and
//! supplies authors, keywords and the abstract.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{Document, MemoryStore};
use crate::error::CorpusError;

/// File extensions treated as documents.
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Suffix of metadata sidecar files.
const META_SUFFIX: &str = ".meta.json";

/// Optional per-document metadata.
#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

/// Loads every document in `dir` (non-recursive).
///
/// # Errors
///
/// Returns [`CorpusError`] if the directory is missing, a file cannot be
/// read, or a sidecar is malformed.
pub fn load_dir(dir: &Path) -> Result<MemoryStore, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| CorpusError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_document(p))
        .collect();
    paths.sort();

    let mut store = MemoryStore::new();
    for path in paths {
        let document = load_document(&path)?;
        debug!(id = %document.id, path = %path.display(), "loaded document");
        store.insert(document)?;
    }

    info!(dir = %dir.display(), documents = store.iter().count(), "corpus loaded");
    Ok(store)
}

fn is_document(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with(META_SUFFIX) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn load_document(path: &Path) -> Result<Document, CorpusError> {
    let content = fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let sidecar = load_sidecar(&path.with_file_name(format!("{id}{META_SUFFIX}")))?;

    let title = sidecar
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| derive_title(&content))
        .unwrap_or_else(|| id.clone());
    let abstract_text = sidecar
        .abstract_text
        .filter(|a| !a.trim().is_empty())
        .or_else(|| extract_abstract(&content));

    Ok(Document {
        id,
        title,
        authors: sidecar.authors,
        keywords: sidecar.keywords,
        abstract_text,
        content,
    })
}

fn load_sidecar(path: &Path) -> Result<Sidecar, CorpusError> {
    if !path.is_file() {
        return Ok(Sidecar::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| CorpusError::Metadata {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// First non-blank line, without markdown heading markers.
fn derive_title(content: &str) -> Option<String> {
    content
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Finds the abstract paragraph in a document.
///
/// Recognizes a heading line reading `Abstract` (optionally with `#` markers
/// or a trailing colon) followed by a paragraph, or an inline
/// `Abstract: <text>` line that continues until the next blank line.
#[must_use]
pub fn extract_abstract(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let cleaned = line.trim().trim_start_matches('#').trim();
        let lower = cleaned.to_ascii_lowercase();
        if !lower.starts_with("abstract") {
            continue;
        }
        let rest = cleaned["abstract".len()..].trim_start();
        let inline = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('.'))
            .or_else(|| rest.strip_prefix('\u{2014}'))
            .map(str::trim);

        let mut paragraph: Vec<&str> = Vec::new();
        match inline {
            Some(text) if !text.is_empty() => paragraph.push(text),
            Some(_) => {}
            None if rest.is_empty() => {}
            None => continue,
        }

        let mut started = !paragraph.is_empty();
        for next in &lines[idx + 1..] {
            let trimmed = next.trim();
            if trimmed.is_empty() {
                if started {
                    break;
                }
                continue;
            }
            if trimmed.starts_with('#') {
                break;
            }
            started = true;
            paragraph.push(trimmed);
        }

        if !paragraph.is_empty() {
            return Some(paragraph.join(" "));
        }
    }
    None
}
