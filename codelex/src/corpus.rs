use crate::cache::{cached_document_tokens, TokenCache};
use crate::error::CorpusError;
use crate::index::{IndexBuilder, InvertedIndex, Metadata};
use crate::tokenizer::document_tokens;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// A line range of a source file, as produced by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub file_path: PathBuf,
    pub start: usize,
    pub end: usize,
    /// Full text of `file_path`. Read from disk when absent.
    #[serde(default)]
    pub content: Option<String>,
}

impl Snippet {
    /// Lines `start..end` (0-based, end-exclusive) joined with `\n`.
    pub fn text(&self) -> Result<String, CorpusError> {
        match &self.content {
            Some(content) => Ok(self.lines_of(content)),
            None => {
                let content = fs::read_to_string(&self.file_path).map_err(|e| CorpusError::io(&self.file_path, e))?;
                Ok(self.lines_of(&content))
            }
        }
    }

    fn lines_of(&self, content: &str) -> String {
        let lines: Vec<&str> = content.lines().skip(self.start).take(self.end.saturating_sub(self.start)).collect();
        lines.join("\n")
    }

    /// `file_path` relative to `root`, or unchanged when it lies outside of it.
    pub fn relative_path(&self, root: &Path) -> String {
        self.file_path.strip_prefix(root).unwrap_or(&self.file_path).to_string_lossy().into_owned()
    }

    /// Unique document id: `{relative_path}:{start}-{end}`.
    pub fn denotation(&self, root: &Path) -> String {
        format!("{}:{}-{}", self.relative_path(root), self.start, self.end)
    }
}

/// Source file texts shared by every snippet of a file, each read from disk once.
///
/// Failed reads are not remembered.
#[derive(Default)]
pub struct SourceFiles {
    files: Mutex<HashMap<PathBuf, Arc<Mutex<Option<Arc<str>>>>>>,
}

impl SourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full text of `path`.
    pub fn read(&self, path: &Path) -> Result<Arc<str>, CorpusError> {
        // Lock the file's own slot so concurrent snippets of one file wait for a single read.
        let slot = self.files.lock().entry(path.to_path_buf()).or_default().clone();
        let mut text = slot.lock();
        if let Some(text) = text.as_ref() {
            return Ok(text.clone());
        }
        let read: Arc<str> = fs::read_to_string(path).map_err(|e| CorpusError::io(path, e))?.into();
        *text = Some(read.clone());
        Ok(read)
    }

    /// Same as [`Snippet::text`], reading the file through this cache.
    pub fn snippet_text(&self, snippet: &Snippet) -> Result<String, CorpusError> {
        match &snippet.content {
            Some(content) => Ok(snippet.lines_of(content)),
            None => Ok(snippet.lines_of(&self.read(&snippet.file_path)?)),
        }
    }

    /// Number of files held.
    pub fn len(&self) -> usize {
        self.files.lock().values().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A snippet with its text loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub content: String,
    pub start: usize,
    pub end: usize,
}

pub fn snippets_to_docs(snippets: &[Snippet], root: &Path) -> Result<Vec<Document>, CorpusError> {
    snippets
        .iter()
        .map(|snippet| -> Result<Document, CorpusError> {
            Ok(Document {
                title: snippet.relative_path(root),
                content: snippet.text()?,
                start: snippet.start,
                end: snippet.end,
            })
        })
        .collect()
}

/// A page of documentation, indexed under its URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documentation {
    pub url: String,
    pub content: String,
}

/// Something the corpus builder can index.
pub trait CorpusEntry: Sync {
    fn doc_id(&self) -> String;
    fn content(&self) -> Result<Cow<'_, str>, CorpusError>;
    fn metadata(&self) -> Metadata { Metadata::new() }
}

fn line_range(start: usize, end: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("start".into(), start.into());
    metadata.insert("end".into(), end.into());
    metadata
}

impl CorpusEntry for Document {
    fn doc_id(&self) -> String { format!("{}:{}-{}", self.title, self.start, self.end) }

    fn content(&self) -> Result<Cow<'_, str>, CorpusError> { Ok(Cow::Borrowed(&self.content)) }

    fn metadata(&self) -> Metadata { line_range(self.start, self.end) }
}

impl CorpusEntry for Documentation {
    fn doc_id(&self) -> String { self.url.clone() }

    fn content(&self) -> Result<Cow<'_, str>, CorpusError> { Ok(Cow::Borrowed(&self.content)) }
}

/// A snippet whose text is only read when it is tokenized.
struct SnippetEntry<'a> {
    snippet: &'a Snippet,
    root: &'a Path,
    sources: &'a SourceFiles,
}

impl CorpusEntry for SnippetEntry<'_> {
    fn doc_id(&self) -> String { self.snippet.denotation(self.root) }

    fn content(&self) -> Result<Cow<'_, str>, CorpusError> { self.sources.snippet_text(self.snippet).map(Cow::Owned) }

    fn metadata(&self) -> Metadata { line_range(self.snippet.start, self.snippet.end) }
}

/// Receives `(tokenized_so_far, total)` updates during a build.
pub trait ProgressSink: Send + Sync {
    fn report(&self, indexed: usize, total: usize) -> anyhow::Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) -> anyhow::Result<()> + Send + Sync,
{
    fn report(&self, indexed: usize, total: usize) -> anyhow::Result<()> {
        self(indexed, total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Report progress every this many tokenized documents. 0 disables the cadence.
    pub progress_every: usize,
    /// Tokenize documents on the rayon pool.
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { progress_every: 200, parallel: false }
    }
}

impl BuildOptions {
    /// Read options from a JSON object. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| CorpusError::io(path, e))?;
        serde_json::from_reader(BufReader::new(f)).map_err(|source| CorpusError::Decode { path: path.to_path_buf(), source })
    }
}

/// Turns a corpus into a frozen [`InvertedIndex`].
///
/// Every document is tokenized first; postings are inserted in a second pass
/// in input order. If reading a document fails, the error is logged and only
/// the documents tokenized before it are indexed.
#[derive(Default)]
pub struct CorpusBuilder<'a> {
    options: BuildOptions,
    cache: Option<&'a dyn TokenCache>,
    progress: Option<&'a dyn ProgressSink>,
}

impl<'a> CorpusBuilder<'a> {
    pub fn new(options: BuildOptions) -> Self {
        Self { options, cache: None, progress: None }
    }

    pub fn with_cache(mut self, cache: &'a dyn TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns `None` for an empty corpus.
    pub fn build<E: CorpusEntry>(&self, entries: &[E]) -> Option<InvertedIndex> {
        if entries.is_empty() {
            return None;
        }
        let total = entries.len();
        self.report(0, total);

        let (all_tokens, failure) =
            if self.options.parallel { self.tokenize_parallel(entries) } else { self.tokenize_sequential(entries) };
        if let Some(err) = failure {
            tracing::error!(%err, tokenized = all_tokens.len(), total, "tokenization aborted, indexing the documents read so far");
        }

        let mut builder = IndexBuilder::new();
        for (entry, tokens) in entries.iter().zip(&all_tokens) {
            if let Err(err) = builder.add_document(&entry.doc_id(), tokens.as_slice(), entry.metadata()) {
                tracing::warn!(%err, "skipping document");
            }
        }
        let index = builder.finalize();
        tracing::info!(documents = index.len(), total, avg_doc_length = index.avg_doc_length(), "lexical index built");
        Some(index)
    }

    /// Index snippets under their `{relative_path}:{start}-{end}` denotation.
    pub fn build_snippets(&self, snippets: &[Snippet], root: &Path) -> Option<InvertedIndex> {
        self.build_snippets_from(snippets, root, &SourceFiles::new())
    }

    /// Like [`build_snippets`](Self::build_snippets), reading files through `sources`
    /// so the caller can reuse their texts afterwards.
    pub fn build_snippets_from(&self, snippets: &[Snippet], root: &Path, sources: &SourceFiles) -> Option<InvertedIndex> {
        let entries: Vec<SnippetEntry<'_>> =
            snippets.iter().map(|snippet| SnippetEntry { snippet, root, sources }).collect();
        self.build(&entries)
    }

    fn entry_tokens<E: CorpusEntry>(&self, entry: &E) -> Result<Vec<String>, CorpusError> {
        let content = entry.content()?;
        let tokens = match self.cache {
            Some(cache) => cached_document_tokens(cache, &content),
            None => document_tokens(&content),
        };
        tracing::debug!(doc_id = %entry.doc_id(), tokens = tokens.len(), "tokenized document");
        Ok(tokens)
    }

    fn tokenize_sequential<E: CorpusEntry>(&self, entries: &[E]) -> (Vec<Vec<String>>, Option<CorpusError>) {
        let total = entries.len();
        let mut all_tokens = Vec::with_capacity(total);
        for (i, entry) in entries.iter().enumerate() {
            match self.entry_tokens(entry) {
                Ok(tokens) => all_tokens.push(tokens),
                Err(err) => return (all_tokens, Some(err)),
            }
            self.tick(i + 1, total);
        }
        (all_tokens, None)
    }

    fn tokenize_parallel<E: CorpusEntry>(&self, entries: &[E]) -> (Vec<Vec<String>>, Option<CorpusError>) {
        let total = entries.len();
        let done = AtomicUsize::new(0);
        let results: Vec<Result<Vec<String>, CorpusError>> = entries
            .par_iter()
            .map(|entry| {
                let tokens = self.entry_tokens(entry);
                self.tick(done.fetch_add(1, Ordering::Relaxed) + 1, total);
                tokens
            })
            .collect();

        // Keep the prefix before the first failure, as the sequential pass would.
        let mut all_tokens = Vec::with_capacity(total);
        for result in results {
            match result {
                Ok(tokens) => all_tokens.push(tokens),
                Err(err) => return (all_tokens, Some(err)),
            }
        }
        (all_tokens, None)
    }

    fn tick(&self, done: usize, total: usize) {
        if self.options.progress_every > 0 && done % self.options.progress_every == 0 {
            self.report(done, total);
        }
    }

    fn report(&self, done: usize, total: usize) {
        if let Some(progress) = self.progress {
            if let Err(err) = progress.report(done, total) {
                tracing::warn!(%err, done, total, "progress report failed");
            }
        }
    }
}

/// Build an index over documents, reporting progress to `progress` if given.
pub fn build_index(documents: &[Document], progress: Option<&dyn ProgressSink>) -> Option<InvertedIndex> {
    let mut builder = CorpusBuilder::new(BuildOptions::default());
    if let Some(progress) = progress {
        builder = builder.with_progress(progress);
    }
    builder.build(documents)
}

/// Build an index over `(url, content)` pairs.
pub fn build_docs_index(docs: &[(String, String)]) -> Option<InvertedIndex> {
    let entries: Vec<Documentation> =
        docs.iter().map(|(url, content)| Documentation { url: url.clone(), content: content.clone() }).collect();
    CorpusBuilder::default().build(&entries)
}

/// Load chunker output: a JSON array, a single JSON object, or JSONL of
/// [`Snippet`]s. Directories are walked for `.json` and `.jsonl` files.
pub fn load_snippets<P: AsRef<Path>>(input: P) -> Result<Vec<Snippet>, CorpusError> {
    let input = input.as_ref();
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else {
        files.push(input.to_path_buf());
    }

    let mut snippets = Vec::new();
    for file in files {
        let f = File::open(&file).map_err(|e| CorpusError::io(&file, e))?;
        let reader = BufReader::new(f);
        let decode = |source: serde_json::Error| CorpusError::Decode { path: file.clone(), source };
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            for line in reader.lines() {
                let line = line.map_err(|e| CorpusError::io(&file, e))?;
                if line.trim().is_empty() { continue; }
                snippets.push(serde_json::from_str(&line).map_err(decode)?);
            }
        } else {
            let json: serde_json::Value = serde_json::from_reader(reader).map_err(decode)?;
            match json {
                serde_json::Value::Array(arr) => {
                    for v in arr {
                        snippets.push(serde_json::from_value(v).map_err(decode)?);
                    }
                }
                v @ serde_json::Value::Object(_) => snippets.push(serde_json::from_value(v).map_err(decode)?),
                _ => {}
            }
        }
    }
    tracing::info!(snippets = snippets.len(), input = %input.display(), "loaded snippets");
    Ok(snippets)
}
