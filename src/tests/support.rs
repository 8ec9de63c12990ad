use std::cell::{Cell, RefCell};

use chrono::NaiveDate;

use crate::articles::Article;
use crate::semantic::{Embedder, EmbeddingError};

pub const ONE_HOT_DIMS: usize = 26;

/// Deterministic provider: a one-hot vector keyed by the first character.
pub struct OneHotEmbedder {
    name: &'static str,
    pub calls: Cell<usize>,
    pub batch_sizes: RefCell<Vec<usize>>,
    /// Fail the Nth call (1-based) with a provider error
    pub fail_on_call: Option<usize>,
}

impl OneHotEmbedder {
    pub fn new() -> Self {
        Self::named("one-hot")
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            calls: Cell::new(0),
            batch_sizes: RefCell::new(vec![]),
            fail_on_call: None,
        }
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; ONE_HOT_DIMS];
        if let Some(c) = text.chars().next() {
            v[c.to_ascii_uppercase() as usize % ONE_HOT_DIMS] = 1.0;
        }
        v
    }
}

impl Embedder for OneHotEmbedder {
    fn model_name(&self) -> &str {
        self.name
    }

    fn model_version(&self) -> &str {
        "1"
    }

    fn dimensions(&self) -> usize {
        ONE_HOT_DIMS
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.batch_sizes.borrow_mut().push(texts.len());

        if self.fail_on_call == Some(call) {
            return Err(EmbeddingError::Provider {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }

        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn article(id: i64, body: &str, day: &str) -> Article {
    Article::new(id, body).with_date(date(day))
}

/// One article per day from 2025-01-01 to 2025-01-10, ids 1..=10.
pub fn ten_days() -> Vec<Article> {
    (1..=10)
        .map(|day| {
            let body = format!("{} news of day {day}", (b'A' + day as u8) as char);
            article(day, &body, &format!("2025-01-{day:02}"))
        })
        .collect()
}
