//! Full and incremental index builds.
//!
//! The indexer is the only writer of version artifacts. Nothing is persisted
//! until every batch has been embedded, so a provider failure leaves the
//! previously committed state untouched.

use std::collections::HashSet;
use std::fmt::Display;

use anyhow::Context;
use chrono::NaiveDate;
use indicatif::ProgressBar;
use serde::Serialize;

use crate::articles::{Article, ArticleSource};
use crate::semantic::embeddings::{embed_checked, Embedder, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::metadata::IndexMetadata;
use crate::semantic::preprocess::{preprocess_text, DEFAULT_MAX_CHARS};
use crate::semantic::store::{IndexStore, StoreError};
use crate::semantic::versions::{Version, VersionError, VersionManager};

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    Source(#[from] anyhow::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Version {version} was built with '{stored}', active model is '{active}'")]
    ModelMismatch {
        version: Version,
        stored: String,
        active: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Full,
    Incremental,
}

impl Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Full => write!(f, "full"),
            BuildMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub version: Version,
    pub mode: BuildMode,
    /// Eligible rows returned by the source
    pub fetched: usize,
    /// Rows embedded by this run
    pub added: usize,
    /// Articles in the version after the run
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Completed(BuildReport),
    /// The source returned no eligible rows; nothing was created.
    NothingToIndex,
}

pub struct Indexer<'a> {
    source: &'a dyn ArticleSource,
    embedder: &'a dyn Embedder,
    versions: &'a VersionManager,
    batch_size: usize,
    max_chars: usize,
    progress: ProgressBar,
}

impl<'a> Indexer<'a> {
    pub fn new(
        source: &'a dyn ArticleSource,
        embedder: &'a dyn Embedder,
        versions: &'a VersionManager,
    ) -> Self {
        Self {
            source,
            embedder,
            versions,
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Embed every eligible row into `target` (default: the next version) and
    /// record it as latest. An existing `target` is replaced on commit.
    pub fn full_rebuild(
        &self,
        date: Option<NaiveDate>,
        target: Option<Version>,
    ) -> Result<BuildOutcome, IndexerError> {
        let version = match target {
            Some(version) => version,
            None => self.versions.next_version()?,
        };
        let _span = tracing::info_span!("full_rebuild", %version).entered();

        let rows = self.fetch_eligible(date)?;
        if rows.is_empty() {
            log::info!("no eligible articles for {}, nothing to index", describe(date));
            return Ok(BuildOutcome::NothingToIndex);
        }

        log::info!(
            "building version {version} from {} articles with '{}'",
            rows.len(),
            self.embedder.model_name()
        );

        let mut index = VectorIndex::with_capacity(self.embedder.dimensions(), rows.len());
        index.add_all(&self.embed_rows(&rows)?)?;

        let fetched = rows.len();
        let metadata = self.commit(version, &index, &rows)?;
        self.versions
            .record_version(version, metadata.registry_entry())?;

        Ok(BuildOutcome::Completed(BuildReport {
            version,
            mode: BuildMode::Full,
            fetched,
            added: fetched,
            total: rows.len(),
        }))
    }

    /// Embed only rows missing from the latest version.
    ///
    /// With `new_version` the result goes to the next version id and is
    /// recorded as latest; otherwise the latest version is updated in place.
    pub fn incremental_update(
        &self,
        date: Option<NaiveDate>,
        new_version: bool,
    ) -> Result<BuildOutcome, IndexerError> {
        let current = self.versions.latest_version()?;
        let _span = tracing::info_span!("incremental_update", %current, new_version).entered();

        let rows = self.fetch_eligible(date)?;
        if rows.is_empty() {
            log::info!("no eligible articles for {}, nothing to index", describe(date));
            return Ok(BuildOutcome::NothingToIndex);
        }
        let fetched = rows.len();

        let store = IndexStore::new(self.versions, current);
        let existing_ids = store.existing_ids()?;
        let delta: Vec<Article> = rows
            .into_iter()
            .filter(|article| !existing_ids.contains(&article.id))
            .collect();

        if delta.is_empty() {
            log::info!("version {current} already holds all {fetched} articles");
            return Ok(BuildOutcome::Completed(BuildReport {
                version: current,
                mode: BuildMode::Incremental,
                fetched,
                added: 0,
                total: existing_ids.len(),
            }));
        }

        let bootstrap = !store.exists();
        let (mut index, mut articles) = if bootstrap {
            log::info!("version {current} has no committed index, starting empty");
            (VectorIndex::new(self.embedder.dimensions()), Vec::new())
        } else {
            let loaded = store.load()?;
            if loaded.metadata.model_name != self.embedder.model_name() {
                return Err(IndexerError::ModelMismatch {
                    version: current,
                    stored: loaded.metadata.model_name,
                    active: self.embedder.model_name().to_string(),
                });
            }
            (loaded.index, loaded.articles)
        };

        log::info!(
            "embedding {} new of {fetched} fetched articles for version {current}",
            delta.len()
        );
        index.add_all(&self.embed_rows(&delta)?)?;
        let added = delta.len();
        articles.extend(delta);

        let version = if new_version {
            self.versions.next_version()?
        } else {
            current
        };

        let metadata = self.commit(version, &index, &articles)?;
        if new_version || bootstrap {
            self.versions
                .record_version(version, metadata.registry_entry())?;
        }

        Ok(BuildOutcome::Completed(BuildReport {
            version,
            mode: BuildMode::Incremental,
            fetched,
            added,
            total: articles.len(),
        }))
    }

    /// Rows with a non-blank body, matching `date` exactly when given.
    /// Duplicate ids keep their first occurrence.
    fn fetch_eligible(&self, date: Option<NaiveDate>) -> Result<Vec<Article>, IndexerError> {
        let rows = self
            .source
            .fetch(date)
            .with_context(|| format!("failed to fetch articles for {}", describe(date)))?;

        let mut seen = HashSet::new();
        let eligible: Vec<Article> = rows
            .into_iter()
            .filter(|article| date.is_none() || article.date == date)
            .filter(Article::is_embeddable)
            .filter(|article| seen.insert(article.id))
            .collect();

        log::debug!("{} eligible articles for {}", eligible.len(), describe(date));
        Ok(eligible)
    }

    /// Preprocess and embed in batches, in row order.
    fn embed_rows(&self, rows: &[Article]) -> Result<Vec<Vec<f32>>, IndexerError> {
        let texts: Vec<String> = rows
            .iter()
            .map(|article| preprocess_text(article.body.as_deref(), self.max_chars))
            .collect();

        let batches = texts.len().div_ceil(self.batch_size);
        self.progress.set_length(texts.len() as u64);
        self.progress.set_position(0);

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            vectors.extend(embed_checked(self.embedder, batch)?);
            self.progress.inc(batch.len() as u64);
            log::info!(
                "embedded batch {}/{batches} ({}/{} articles)",
                i + 1,
                vectors.len(),
                texts.len()
            );
        }

        self.progress.finish_and_clear();
        Ok(vectors)
    }

    fn commit(
        &self,
        version: Version,
        index: &VectorIndex,
        articles: &[Article],
    ) -> Result<IndexMetadata, IndexerError> {
        let metadata = IndexMetadata::summarize(
            version,
            self.embedder.model_name(),
            self.embedder.model_version(),
            self.embedder.dimensions(),
            articles,
        );
        IndexStore::new(self.versions, version).save(index, articles, &metadata)?;
        Ok(metadata)
    }
}

fn describe(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.to_string(),
        None => "all dates".to_string(),
    }
}
