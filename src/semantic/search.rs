//! Similarity search over one committed index version.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::articles::Article;
use crate::semantic::embeddings::{embed_checked, Embedder, EmbeddingError};
use crate::semantic::index::IndexError;
use crate::semantic::preprocess::{preprocess_text, DEFAULT_MAX_CHARS};
use crate::semantic::store::{IndexStore, StoreError};
use crate::semantic::versions::{Version, VersionError, VersionManager};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),
}

/// Optional candidate restrictions, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Inclusive `(start, end)` publication-date bounds
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Accepted source identifiers; `"unknown"` matches articles without one
    pub sources: Option<BTreeSet<String>>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none() && self.sources.is_none()
    }

    pub fn matches(&self, article: &Article) -> bool {
        if let Some((start, end)) = self.date_range {
            match article.date {
                Some(date) if date >= start && date <= end => {}
                _ => return false,
            }
        }

        if let Some(sources) = &self.sources {
            if !sources.contains(article.source_or_unknown()) {
                return false;
            }
        }

        true
    }
}

/// A stored article record with its raw inner-product score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredArticle {
    #[serde(flatten)]
    pub article: Article,
    pub similarity_score: f32,
}

/// The id-and-score projection handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleHit {
    pub article_id: i64,
    pub similarity_score: f32,
}

impl From<&ScoredArticle> for ArticleHit {
    fn from(scored: &ScoredArticle) -> Self {
        Self {
            article_id: scored.article.id,
            similarity_score: scored.similarity_score,
        }
    }
}

/// Read-only query side of the index. Each call loads fresh state from disk.
pub struct SimilaritySearch<'a> {
    embedder: &'a dyn Embedder,
    versions: &'a VersionManager,
    max_chars: usize,
}

impl<'a> SimilaritySearch<'a> {
    pub fn new(embedder: &'a dyn Embedder, versions: &'a VersionManager) -> Self {
        Self {
            embedder,
            versions,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Top `k` articles of `version` (default: latest) most similar to `query`.
    ///
    /// An empty candidate set or `k == 0` yields an empty list, not an error.
    pub fn search(
        &self,
        version: Option<Version>,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredArticle>, SearchError> {
        let version = match version {
            Some(version) => version,
            None => self.versions.latest_version()?,
        };
        let loaded = IndexStore::new(self.versions, version).load()?;

        if loaded.metadata.model_name != self.embedder.model_name() {
            log::warn!(
                "version {version} was built with '{}' but queries use '{}'",
                loaded.metadata.model_name,
                self.embedder.model_name()
            );
        }

        let positions: Vec<usize> = loaded
            .articles
            .iter()
            .enumerate()
            .filter(|(_, article)| filter.matches(article))
            .map(|(position, _)| position)
            .collect();

        if positions.is_empty() || k == 0 {
            log::debug!(
                "no candidates in version {version} ({} filtered, k={k})",
                positions.len()
            );
            return Ok(vec![]);
        }

        let candidates = if filter.is_empty() {
            loaded.index
        } else {
            loaded.index.subset(&positions)?
        };

        let text = preprocess_text(Some(query), self.max_chars);
        let query_vector = embed_checked(self.embedder, &[text])?
            .pop()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                got: 0,
            })?;

        let results = candidates.search(&query_vector, k)?;

        let mut articles: Vec<Option<Article>> = loaded.articles.into_iter().map(Some).collect();
        let scored = results
            .into_iter()
            .filter_map(|result| {
                let position = positions[result.position];
                articles[position].take().map(|article| ScoredArticle {
                    article,
                    similarity_score: result.score,
                })
            })
            .collect();

        Ok(scored)
    }

    /// Ranked hits for consumers that only need ids and scores.
    pub fn search_hits(
        &self,
        version: Option<Version>,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ArticleHit>, SearchError> {
        Ok(self
            .search(version, query, k, filter)?
            .iter()
            .map(ArticleHit::from)
            .collect())
    }

    /// Ranked article ids, best first.
    pub fn search_ids(
        &self,
        version: Option<Version>,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<i64>, SearchError> {
        Ok(self
            .search(version, query, k, filter)?
            .into_iter()
            .map(|scored| scored.article.id)
            .collect())
    }
}
