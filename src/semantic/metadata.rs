//! Per-version metadata summary (`metadata.json`).

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::articles::Article;
use crate::semantic::versions::{Version, VersionEntry};

/// Observed publication-date span; both ends are `None` when no article is dated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn of_articles(articles: &[Article]) -> Self {
        let dates = || articles.iter().filter_map(|article| article.date);
        Self {
            start: dates().min(),
            end: dates().max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub model_version: String,
    pub embedding_dimension: usize,
    pub total_articles: usize,
    pub date_range: DateRange,
    /// Deduplicated, sorted source identifiers; missing ones count as "unknown"
    pub sources: Vec<String>,
}

impl IndexMetadata {
    /// Summarize the full persisted article list of a version.
    pub fn summarize(
        version: Version,
        model_name: &str,
        model_version: &str,
        embedding_dimension: usize,
        articles: &[Article],
    ) -> Self {
        let sources: BTreeSet<&str> = articles
            .iter()
            .map(|article| article.source_or_unknown())
            .collect();

        Self {
            version,
            created_at: Utc::now(),
            model_name: model_name.to_string(),
            model_version: model_version.to_string(),
            embedding_dimension,
            total_articles: articles.len(),
            date_range: DateRange::of_articles(articles),
            sources: sources.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn registry_entry(&self) -> VersionEntry {
        VersionEntry {
            created_at: self.created_at,
            model_name: self.model_name.clone(),
            total_articles: self.total_articles,
            date_range: self.date_range,
            path: self.version.dir_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_range_min_max() {
        let articles = vec![
            Article::new(1, "a").with_date(date("2025-01-05")),
            Article::new(2, "b"),
            Article::new(3, "c").with_date(date("2025-01-01")),
            Article::new(4, "d").with_date(date("2025-01-03")),
        ];

        let range = DateRange::of_articles(&articles);
        assert_eq!(range.start, Some(date("2025-01-01")));
        assert_eq!(range.end, Some(date("2025-01-05")));
    }

    #[test]
    fn test_date_range_without_dates() {
        let range = DateRange::of_articles(&[Article::new(1, "a")]);
        assert_eq!(range, DateRange::default());
    }

    #[test]
    fn test_sources_deduplicated_with_unknown_placeholder() {
        let articles = vec![
            Article::new(1, "a").with_source("reuters.com"),
            Article::new(2, "b"),
            Article::new(3, "c").with_source("bbc.co.uk"),
            Article::new(4, "d").with_source("reuters.com"),
        ];

        let meta = IndexMetadata::summarize(Version::INITIAL, "m", "1", 3, &articles);
        assert_eq!(meta.sources, vec!["bbc.co.uk", "reuters.com", "unknown"]);
        assert_eq!(meta.total_articles, 4);
    }

    #[test]
    fn test_metadata_json_fields() {
        let articles = vec![Article::new(1, "a").with_date(date("2025-06-20"))];
        let meta = IndexMetadata::summarize(
            Version::new(1, 0, 2),
            "text-embedding-3-small",
            "1",
            1536,
            &articles,
        );

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["version"], "1.0.2");
        assert_eq!(json["model_name"], "text-embedding-3-small");
        assert_eq!(json["embedding_dimension"], 1536);
        assert_eq!(json["total_articles"], 1);
        assert_eq!(json["date_range"]["start"], "2025-06-20");
        assert_eq!(json["sources"][0], "unknown");
        assert!(json["created_at"].as_str().unwrap().contains('T'));

        let entry = meta.registry_entry();
        assert_eq!(entry.path, "v1.0.2");
        assert_eq!(entry.total_articles, 1);
    }
}
