//! Code-aware lexical search: identifier-splitting tokenizer, phrase n-grams,
//! an in-memory inverted index, and BM25 ranking.

pub mod cache;
pub mod corpus;
pub mod error;
pub mod index;
pub mod search;
pub mod tokenizer;

pub use cache::{CacheKey, MemoryTokenCache, SledTokenCache, TokenCache, CACHE_VERSION};
pub use corpus::{build_docs_index, build_index, BuildOptions, CorpusBuilder, Document, ProgressSink, Snippet, SourceFiles};
pub use error::{CacheError, CorpusError, IndexError};
pub use index::{DocId, IndexBuilder, InvertedIndex, Metadata, Posting, SearchHit, TermId};
pub use search::{search, search_ranked};
pub use tokenizer::Token;
