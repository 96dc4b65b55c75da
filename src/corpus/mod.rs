//! Document corpus collaborator.
//!
//! The question-answering core only ever reads documents. [`DocumentStore`]
//! is the read-only seam; [`MemoryStore`] is the bundled implementation,
//! filled either programmatically or from a directory via [`load_dir`].

pub mod loader;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;

pub use loader::{extract_abstract, load_dir};

/// A document in the user's corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque unique identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Author names.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Keywords supplied with the document.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Abstract, when one is known.
    #[serde(default)]
    pub abstract_text: Option<String>,
    /// Full text.
    pub content: String,
}

impl Document {
    /// Creates a document with only an ID, title and content.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            keywords: Vec::new(),
            abstract_text: None,
            content: content.into(),
        }
    }

    /// Sets the abstract.
    #[must_use]
    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    /// Sets the authors.
    #[must_use]
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the keywords.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Lightweight descriptor used in prompts instead of the full text.
    #[must_use]
    pub fn descriptor(&self) -> DocumentDescriptor {
        DocumentDescriptor {
            title: self.title.clone(),
            length: self.content.chars().count(),
            lines: self.content.lines().count(),
            authors: self.authors.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

/// What the model sees about a document before reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Display title.
    pub title: String,
    /// Length in characters.
    pub length: usize,
    /// Number of lines.
    pub lines: usize,
    /// Author names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Keywords.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Document ID → descriptor, ordered by ID.
pub type CorpusIndex = BTreeMap<String, DocumentDescriptor>;

/// Read-only access to the documents in scope for a question.
pub trait DocumentStore: Send + Sync {
    /// IDs of all documents, in a stable order.
    fn document_ids(&self) -> Vec<String>;

    /// Looks up a document by ID.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError`] if the backing store fails. A missing
    /// document is `Ok(None)`.
    fn document(&self, id: &str) -> Result<Option<Arc<Document>>, CorpusError>;

    /// Builds the corpus index from every document's descriptor.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from [`DocumentStore::document`].
    fn index(&self) -> Result<CorpusIndex, CorpusError> {
        let mut index = CorpusIndex::new();
        for id in self.document_ids() {
            if let Some(doc) = self.document(&id)? {
                index.insert(id, doc.descriptor());
            }
        }
        Ok(index)
    }

    /// Number of documents.
    fn len(&self) -> usize {
        self.document_ids().len()
    }

    /// Returns `true` if the store holds no documents.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: BTreeMap<String, Arc<Document>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::DuplicateDocument`] if the ID is taken.
    pub fn insert(&mut self, document: Document) -> Result<(), CorpusError> {
        if self.documents.contains_key(&document.id) {
            return Err(CorpusError::DuplicateDocument(document.id));
        }
        self.documents
            .insert(document.id.clone(), Arc::new(document));
        Ok(())
    }

    /// Iterates documents in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.documents.values()
    }
}

impl FromIterator<Document> for MemoryStore {
    /// Later documents with a duplicate ID replace earlier ones.
    fn from_iter<T: IntoIterator<Item = Document>>(iter: T) -> Self {
        Self {
            documents: iter
                .into_iter()
                .map(|d| (d.id.clone(), Arc::new(d)))
                .collect(),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn document_ids(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    fn document(&self, id: &str) -> Result<Option<Arc<Document>>, CorpusError> {
        Ok(self.documents.get(id).cloned())
    }

    fn len(&self) -> usize {
        self.documents.len()
    }
}
