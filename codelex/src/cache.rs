use crate::error::CacheError;
use crate::tokenizer::document_tokens;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Part of every cache key. Bump whenever tokenization output changes so
/// token lists produced by older rules are never reused.
pub const CACHE_VERSION: &str = "codelex-tokens-v2";

/// Content-addressed key: hex SHA-1 over the cache version and the content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_content(content: &str) -> Self {
        Self::versioned(CACHE_VERSION, content)
    }

    pub fn versioned(version: &str, content: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(version.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

/// Memoizes [`document_tokens`] results.
pub trait TokenCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<String>>, CacheError>;
    fn put(&self, key: &CacheKey, tokens: &[String]) -> Result<(), CacheError>;
}

/// Tokens of `content`, served from `cache` when present.
///
/// Cache failures only cost a recomputation.
pub fn cached_document_tokens(cache: &dyn TokenCache, content: &str) -> Vec<String> {
    let key = CacheKey::for_content(content);
    match cache.get(&key) {
        Ok(Some(tokens)) => return tokens,
        Ok(None) => {}
        Err(err) => tracing::warn!(%err, key = key.as_str(), "token cache read failed"),
    }
    let tokens = document_tokens(content);
    if let Err(err) = cache.put(&key, &tokens) {
        tracing::warn!(%err, key = key.as_str(), "token cache write failed");
    }
    tokens
}

/// Process-local cache.
#[derive(Default)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<CacheKey, Vec<String>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoryTokenCache {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.lock().len() }

    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }

    pub fn hits(&self) -> usize { self.hits.load(Ordering::Relaxed) }

    pub fn misses(&self) -> usize { self.misses.load(Ordering::Relaxed) }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<String>>, CacheError> {
        let found = self.entries.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    fn put(&self, key: &CacheKey, tokens: &[String]) -> Result<(), CacheError> {
        self.entries.lock().insert(key.clone(), tokens.to_vec());
        Ok(())
    }
}

/// On-disk cache in a sled tree; token lists are bincode-encoded.
pub struct SledTokenCache {
    db: sled::Db,
}

impl SledTokenCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush()?;
        Ok(())
    }
}

impl TokenCache for SledTokenCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<String>>, CacheError> {
        match self.db.get(key.as_str())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, tokens: &[String]) -> Result<(), CacheError> {
        let bytes = bincode::serialize(tokens)?;
        self.db.insert(key.as_str(), bytes)?;
        Ok(())
    }
}
