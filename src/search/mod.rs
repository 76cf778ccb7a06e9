//! Search backend boundary.
//!
//! The numerical details of vector similarity search are out of scope for
//! this crate; the search backend is treated as an opaque external
//! collaborator: given a query string, top-k, and optional source filters,
//! it returns ranked documents with metadata, loaded once at startup.
//!
//! `SearchBackend` is that boundary. [`TrigramSearchBackend`] is the one
//! production-shaped implementation this crate carries — an in-process
//! inverted index over a corpus file — standing in for the real,
//! offline-built vector index the full system would load. It deliberately
//! does not do embeddings or vector similarity; it is here so the protocol
//! engine and tools have a real `dyn SearchBackend` to dispatch against.

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A single corpus document as exposed through the search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A ranked search hit: a document plus a relevance score and preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub source: String,
    pub preview: String,
    pub score: f32,
}

/// The opaque semantic-search capability consumed by tools.
///
/// Construction is synchronous-at-startup; the trait itself is async so
/// implementations backed by a real index service can do I/O per query.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Rank documents against `query`, restricted to `sources` when given,
    /// returning at most `top_k` hits.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<SearchHit>, SearchError>;

    /// Fetch a single document by id, or `None` if it doesn't exist.
    async fn get_document(&self, id: &str) -> Result<Option<Document>, SearchError>;

    /// The distinct source labels present in the corpus (for tool schemas
    /// and degraded-result reporting).
    fn sources(&self) -> Vec<String>;
}

/// An in-process inverted-index search backend over a JSON corpus file.
///
/// The index is built once at startup and handed out as an immutable,
/// thread-safe handle — no interior mutability at all, since the index
/// never changes after `open`.
pub struct TrigramSearchBackend {
    documents: Vec<Document>,
    /// trigram -> set of document indices containing it.
    index: HashMap<String, Vec<usize>>,
}

impl TrigramSearchBackend {
    /// Build an index over an in-memory document set. Exposed for tests and
    /// for callers that already have documents loaded (e.g. fixtures).
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (doc_idx, doc) in documents.iter().enumerate() {
            let haystack = format!("{} {}", doc.title, doc.body).to_lowercase();
            for trigram in trigrams(&haystack) {
                let postings = index.entry(trigram).or_default();
                if postings.last() != Some(&doc_idx) {
                    postings.push(doc_idx);
                }
            }
        }
        Self { documents, index }
    }

    /// Read and parse a corpus file at `path` (a JSON array of [`Document`])
    /// and build the index. This is the `SEARCH_INDEX_PATH`-driven startup
    /// path.
    pub fn open(path: &str) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(Path::new(path))
            .map_err(|e| SearchError::Unavailable(format!("reading {path}: {e}")))?;
        let documents: Vec<Document> = serde_json::from_str(&content)
            .map_err(|e| SearchError::Unavailable(format!("parsing {path}: {e}")))?;
        Ok(Self::from_documents(documents))
    }

    fn score(&self, query_trigrams: &[String], doc_idx: usize) -> f32 {
        if query_trigrams.is_empty() {
            return 0.0;
        }
        let matched = query_trigrams
            .iter()
            .filter(|t| {
                self.index
                    .get(*t)
                    .map(|postings| postings.binary_search(&doc_idx).is_ok())
                    .unwrap_or(false)
            })
            .count();
        matched as f32 / query_trigrams.len() as f32
    }

    fn preview(body: &str) -> String {
        const PREVIEW_CHARS: usize = 200;
        if body.len() <= PREVIEW_CHARS {
            body.to_string()
        } else {
            let mut end = PREVIEW_CHARS;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        }
    }
}

#[async_trait]
impl SearchBackend for TrigramSearchBackend {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        sources: Option<&[String]>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query must not be empty".into()));
        }

        let query_trigrams: Vec<String> = trigrams(&query.to_lowercase());
        let mut candidates: Vec<usize> = (0..self.documents.len()).collect();
        if let Some(sources) = sources {
            if !sources.is_empty() {
                candidates.retain(|&idx| sources.iter().any(|s| s == &self.documents[idx].source));
            }
        }

        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|idx| (idx, self.score(&query_trigrams, idx)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| {
                let doc = &self.documents[idx];
                SearchHit {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    source: doc.source.clone(),
                    preview: Self::preview(&doc.body),
                    score,
                }
            })
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, SearchError> {
        Ok(self.documents.iter().find(|d| d.id == id).cloned())
    }

    fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .documents
            .iter()
            .map(|d| d.source.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        sources.sort();
        sources
    }
}

/// Character trigrams of `text`, deduplicated, shorter inputs returned whole.
fn trigrams(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() < 3 {
        return if chars.is_empty() {
            Vec::new()
        } else {
            vec![chars.iter().collect()]
        };
    }
    let mut out: Vec<String> = chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> TrigramSearchBackend {
        TrigramSearchBackend::from_documents(vec![
            Document {
                id: "1".into(),
                title: "Rust ownership".into(),
                source: "book".into(),
                body: "Ownership is Rust's most unique feature.".into(),
                url: None,
            },
            Document {
                id: "2".into(),
                title: "Election results".into(),
                source: "news".into(),
                body: "The election results were announced today.".into(),
                url: None,
            },
        ])
    }

    #[tokio::test]
    async fn search_ranks_relevant_document_first() {
        let backend = fixture();
        let hits = backend.search("ownership", 5, None).await.unwrap();
        assert_eq!(hits.first().unwrap().id, "1");
    }

    #[tokio::test]
    async fn search_respects_source_filter() {
        let backend = fixture();
        let hits = backend
            .search("election", 5, Some(&["book".to_string()]))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let backend = fixture();
        assert!(backend.search("", 5, None).await.is_err());
    }

    #[tokio::test]
    async fn get_document_returns_none_for_unknown_id() {
        let backend = fixture();
        assert!(backend.get_document("missing").await.unwrap().is_none());
    }

    #[test]
    fn sources_are_deduplicated_and_sorted() {
        let backend = fixture();
        assert_eq!(backend.sources(), vec!["book".to_string(), "news".to_string()]);
    }
}
