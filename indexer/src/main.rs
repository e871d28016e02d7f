use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codelex::corpus::load_snippets;
use codelex::tokenizer::code_tokens;
use codelex::{search_ranked, BuildOptions, CorpusBuilder, ProgressSink, Snippet, SledTokenCache};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a BM25 index over code snippets and query it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index chunker output and run a query against it
    Search {
        /// Snippet file (JSON/JSONL) or a directory of them
        #[arg(long)]
        input: PathBuf,
        /// Repository root stripped from snippet paths
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        query: String,
        /// Number of results to print
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Persist tokenized documents in a sled cache at this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// JSON file of build options (`progress_every`, `parallel`)
        #[arg(long)]
        options: Option<PathBuf>,
        /// Tokenize documents in parallel, overriding the options file
        #[arg(long, default_value_t = false)]
        parallel: bool,
    },
    /// Print the token stream of a text
    Tokens {
        #[arg(long)]
        text: String,
    },
}

#[derive(Serialize)]
struct Hit<'a> {
    doc_id: &'a str,
    score: f64,
    path: Option<String>,
    start: Option<usize>,
    end: Option<usize>,
}

struct BarSink(ProgressBar);

impl ProgressSink for BarSink {
    fn report(&self, indexed: usize, total: usize) -> Result<()> {
        self.0.set_length(total as u64);
        self.0.set_position(indexed as u64);
        Ok(())
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search { input, root, query, top, cache_dir, options, parallel } => {
            let mut options = match &options {
                Some(path) => BuildOptions::from_json_file(path)
                    .with_context(|| format!("reading build options from {}", path.display()))?,
                None => BuildOptions::default(),
            };
            options.parallel |= parallel;
            run_search(&input, &root, &query, top, cache_dir.as_deref(), options)
        }
        Commands::Tokens { text } => {
            for token in code_tokens(&text) {
                println!("{}", serde_json::to_string(&token)?);
            }
            Ok(())
        }
    }
}

fn run_search(input: &Path, root: &Path, query: &str, top: usize, cache_dir: Option<&Path>, options: BuildOptions) -> Result<()> {
    let snippets = load_snippets(input).with_context(|| format!("loading snippets from {}", input.display()))?;
    let cache = cache_dir
        .map(|dir| SledTokenCache::open(dir).with_context(|| format!("opening token cache at {}", dir.display())))
        .transpose()?;

    let bar = ProgressBar::new(snippets.len() as u64);
    bar.set_style(ProgressStyle::with_template("{msg} {bar:40} {pos}/{len}")?);
    bar.set_message("tokenizing");
    let sink = BarSink(bar);

    let mut builder = CorpusBuilder::new(options).with_progress(&sink);
    if let Some(cache) = &cache {
        builder = builder.with_cache(cache);
    }
    let index = builder.build_snippets(&snippets, root);
    sink.0.finish_and_clear();
    if let Some(cache) = &cache {
        cache.flush()?;
    }

    let by_id: HashMap<String, &Snippet> = snippets.iter().map(|s| (s.denotation(root), s)).collect();
    let ranked = search_ranked(query, index.as_ref());
    tracing::info!(query, total_hits = ranked.len(), "query complete");
    for (doc_id, score) in ranked.iter().take(top) {
        let snippet = by_id.get(doc_id);
        let hit = Hit {
            doc_id,
            score: *score,
            path: snippet.map(|s| s.relative_path(root)),
            start: snippet.map(|s| s.start),
            end: snippet.map(|s| s.end),
        };
        println!("{}", serde_json::to_string(&hit)?);
    }
    Ok(())
}
