use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Versioned semantic index over news articles", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Embed every eligible article into a fresh version
    Build {
        /// Only articles published on this day (YYYY-MM-DD)
        #[clap(short, long)]
        date: Option<NaiveDate>,

        /// Target version (default: next version)
        #[clap(long)]
        version: Option<String>,

        /// Article CSV export (default: `articles_csv` from config)
        #[clap(short, long)]
        articles: Option<PathBuf>,
    },

    /// Embed only articles missing from the latest version
    Update {
        /// Only articles published on this day (YYYY-MM-DD)
        #[clap(short, long)]
        date: Option<NaiveDate>,

        /// Write the result as a new version instead of updating in place
        #[clap(long, default_value = "false")]
        new_version: bool,

        /// Article CSV export (default: `articles_csv` from config)
        #[clap(short, long)]
        articles: Option<PathBuf>,
    },

    /// Find articles similar to a free-text description
    Search {
        query: String,

        /// Number of results
        #[clap(short, default_value = "5")]
        k: usize,

        /// Version to search (default: latest)
        #[clap(long)]
        version: Option<String>,

        /// Earliest publication date, inclusive
        #[clap(long)]
        from: Option<NaiveDate>,

        /// Latest publication date, inclusive
        #[clap(long)]
        to: Option<NaiveDate>,

        /// Accepted sources, comma separated ("unknown" matches articles without one)
        #[clap(short, long)]
        source: Option<String>,

        /// Print only ranked ids with scores
        #[clap(long, default_value = "false")]
        ids_only: bool,
    },

    /// List registered versions
    Versions {},

    /// Delete all but the newest versions
    Prune {
        /// Versions to keep (default: `retention.keep_latest` from config)
        #[clap(long)]
        keep: Option<usize>,
    },
}
