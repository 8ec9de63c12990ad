//! Article records and the row-source contract.
//!
//! Articles are read-only input. Whatever the source attaches beyond the
//! known columns is carried in `extra` and persisted verbatim next to the
//! vector, so search results never need a second lookup.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder recorded for articles without a source identifier.
pub const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Article {
    pub fn new(id: i64, body: &str) -> Self {
        Self {
            id,
            title: None,
            body: Some(body.to_string()),
            url: None,
            source_uri: None,
            date: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source_uri = Some(source.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Only articles with a non-blank body are embedded.
    pub fn is_embeddable(&self) -> bool {
        self.body
            .as_deref()
            .map(|body| !body.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn source_or_unknown(&self) -> &str {
        match self.source_uri.as_deref() {
            Some(source) if !source.is_empty() => source,
            _ => UNKNOWN_SOURCE,
        }
    }
}

/// External collaborator producing article rows.
///
/// `date`, when given, restricts the rows to that exact publication date.
pub trait ArticleSource {
    fn fetch(&self, date: Option<NaiveDate>) -> anyhow::Result<Vec<Article>>;
}

impl ArticleSource for Vec<Article> {
    fn fetch(&self, date: Option<NaiveDate>) -> anyhow::Result<Vec<Article>> {
        Ok(self
            .iter()
            .filter(|article| date.is_none() || article.date == date)
            .cloned()
            .collect())
    }
}

/// Columns of the `articles` table that map onto named fields.
const ID_COLUMN: &str = "id";
const KNOWN_COLUMNS: [&str; 6] = ["id", "title", "body", "url", "source_uri", "date"];

/// Reads a CSV export of the `articles` table (header row required).
///
/// Unknown columns (`lang`, `sentiment`, `datatype`, ...) land in
/// `Article::extra` as the exact cell text.
#[derive(Debug, Clone)]
pub struct CsvArticleSource {
    path: PathBuf,
}

impl CsvArticleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_record(
        headers: &csv::StringRecord,
        record: &csv::StringRecord,
    ) -> anyhow::Result<Article> {
        let mut article = Article {
            id: 0,
            title: None,
            body: None,
            url: None,
            source_uri: None,
            date: None,
            extra: BTreeMap::new(),
        };
        let mut has_id = false;

        for (header, value) in headers.iter().zip(record.iter()) {
            if value.is_empty() {
                continue;
            }
            match header {
                ID_COLUMN => {
                    article.id = value
                        .trim()
                        .parse::<i64>()
                        .with_context(|| format!("invalid article id {value:?}"))?;
                    has_id = true;
                }
                "title" => article.title = Some(value.to_string()),
                "body" => article.body = Some(value.to_string()),
                "url" => article.url = Some(value.to_string()),
                "source_uri" => article.source_uri = Some(value.to_string()),
                "date" => article.date = Some(parse_date(value)?),
                other => {
                    let cell = serde_json::Value::String(value.to_string());
                    article.extra.insert(other.to_string(), cell);
                }
            }
        }

        if !has_id {
            return Err(anyhow!("couldnt get record id"));
        }

        Ok(article)
    }
}

impl ArticleSource for CsvArticleSource {
    fn fetch(&self, date: Option<NaiveDate>) -> anyhow::Result<Vec<Article>> {
        if let Err(err) = std::fs::metadata(&self.path) {
            return match err.kind() {
                ErrorKind::NotFound => Err(anyhow!(
                    "article export not found at {}",
                    self.path.display()
                )),
                _ => Err(err.into()),
            };
        }

        let now = Instant::now();
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let headers = reader.headers()?.clone();

        if !headers.iter().any(|h| h == ID_COLUMN) {
            return Err(anyhow!(
                "{} has no '{ID_COLUMN}' column (expected some of {:?})",
                self.path.display(),
                KNOWN_COLUMNS
            ));
        }

        let mut articles = vec![];
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let article = Self::parse_record(&headers, &record)
                .with_context(|| format!("bad article row {}", line + 2))?;

            if date.is_none() || article.date == date {
                articles.push(article);
            }
        }

        log::debug!(
            "took {}ms to read {} articles from csv",
            now.elapsed().as_micros() as f64 / 1000.0,
            articles.len()
        );

        Ok(articles)
    }
}

/// Accepts plain dates and timestamps that start with one (`2025-06-20 08:00:00`).
fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    let value = value.trim();
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .with_context(|| format!("invalid article date {value:?}"))
}
