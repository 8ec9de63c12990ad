use std::collections::BTreeSet;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod articles;
mod cli;
mod config;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use articles::CsvArticleSource;
use config::Config;
use semantic::{
    embeddings, BuildOutcome, Indexer, SearchFilter, SimilaritySearch, Version, VersionManager,
};

fn parse_sources(sources: String) -> BTreeSet<String> {
    sources
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_version(version: Option<String>) -> anyhow::Result<Option<Version>> {
    version
        .map(|v| v.parse::<Version>())
        .transpose()
        .context("invalid --version")
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} embedding articles") {
        bar.set_style(style);
    }
    bar
}

fn print_outcome(outcome: BuildOutcome) -> anyhow::Result<()> {
    match outcome {
        BuildOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        BuildOutcome::NothingToIndex => println!("Nothing to index"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load()?;
    let versions = VersionManager::new(config.storage_path());

    match args.command {
        cli::Command::Build {
            date,
            version,
            articles,
        } => {
            let target = parse_version(version)?;
            let source = CsvArticleSource::new(articles.unwrap_or_else(|| config.articles_path()));
            let embedder = embeddings::from_config(&config.embedding_resolved())?;

            let outcome = Indexer::new(&source, embedder.as_ref(), &versions)
                .with_batch_size(config.embedding.batch_size)
                .with_max_chars(config.preprocess.max_chars)
                .with_progress(progress_bar())
                .full_rebuild(date, target)?;

            print_outcome(outcome)
        }

        cli::Command::Update {
            date,
            new_version,
            articles,
        } => {
            let source = CsvArticleSource::new(articles.unwrap_or_else(|| config.articles_path()));
            let embedder = embeddings::from_config(&config.embedding_resolved())?;

            let outcome = Indexer::new(&source, embedder.as_ref(), &versions)
                .with_batch_size(config.embedding.batch_size)
                .with_max_chars(config.preprocess.max_chars)
                .with_progress(progress_bar())
                .incremental_update(date, new_version)?;

            print_outcome(outcome)
        }

        cli::Command::Search {
            query,
            k,
            version,
            from,
            to,
            source,
            ids_only,
        } => {
            let date_range = match (from, to) {
                (None, None) => None,
                (from, to) => {
                    let start = from.unwrap_or(chrono::NaiveDate::MIN);
                    let end = to.unwrap_or(chrono::NaiveDate::MAX);
                    if start > end {
                        bail!("--from {start} is after --to {end}");
                    }
                    Some((start, end))
                }
            };
            let filter = SearchFilter {
                date_range,
                sources: source.map(parse_sources),
            };

            let embedder = embeddings::from_config(&config.embedding_resolved())?;
            let search = SimilaritySearch::new(embedder.as_ref(), &versions)
                .with_max_chars(config.preprocess.max_chars);
            let version = parse_version(version)?;

            if ids_only {
                let hits = search.search_hits(version, &query, k, &filter)?;
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                let results = search.search(version, &query, k, &filter)?;
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            Ok(())
        }

        cli::Command::Versions {} => {
            let listed = versions.list_versions()?;
            if listed.is_empty() {
                println!("No versions in {}", versions.root().display());
                return Ok(());
            }

            let latest = versions.latest_version()?;
            for (version, entry) in listed {
                let marker = if version == latest { "*" } else { " " };
                let range = match (entry.date_range.start, entry.date_range.end) {
                    (Some(start), Some(end)) => format!("{start}..{end}"),
                    _ => "undated".to_string(),
                };
                println!(
                    "{marker} {:<10} {:>7} articles  {range:<22}  {}  {}",
                    version.to_string(),
                    entry.total_articles,
                    entry.model_name,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }

        cli::Command::Prune { keep } => {
            let keep = keep.unwrap_or(config.retention.keep_latest);
            let removed = versions.prune(keep)?;

            if removed.is_empty() {
                println!("Nothing to prune");
            } else {
                for version in removed {
                    println!("removed {version}");
                }
            }
            Ok(())
        }
    }
}
