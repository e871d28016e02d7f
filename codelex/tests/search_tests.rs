use codelex::corpus::{build_index, CorpusBuilder, Document};
use codelex::index::{IndexBuilder, Metadata};
use codelex::{search, BuildOptions, CacheKey, MemoryTokenCache, TokenCache};
use codelex::{CacheError, InvertedIndex};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;

fn doc(title: &str, content: &str) -> Document {
    Document { title: title.to_string(), content: content.to_string(), start: 0, end: 1 }
}

fn user_corpus() -> InvertedIndex {
    build_index(&[doc("a.py", "def getUserName(): pass"), doc("b.py", "def setUserName(x): pass")], None).unwrap()
}

#[test]
fn shared_words_score_both_documents_equally() {
    let index = user_corpus();
    let scores = search("user name", Some(&index));
    assert_eq!(scores.len(), 2);
    assert_eq!(scores["a.py:0-1"], 1.0);
    assert_eq!(scores["b.py:0-1"], 1.0);
}

#[test]
fn phrase_query_prefers_the_exact_identifier() {
    let index = user_corpus();
    let hits = index.search_index("get_user_name").unwrap();
    assert_eq!(hits[0].doc_id, "a.py:0-1");
    assert_eq!(hits[1].doc_id, "b.py:0-1");
    assert!(hits[0].score > hits[1].score);

    let scores = search("get_user_name", Some(&index));
    assert_eq!(scores["a.py:0-1"], 1.0);
    assert!(scores["b.py:0-1"] < 1.0);
}

#[test]
fn metadata_carries_line_range() {
    let index = build_index(&[Document { title: "lib.rs".into(), content: "fn parse() {}".into(), start: 10, end: 30 }], None).unwrap();
    let hits = index.search_index("parse").unwrap();
    assert_eq!(hits[0].doc_id, "lib.rs:10-30");
    assert_eq!(hits[0].metadata["start"], 10);
    assert_eq!(hits[0].metadata["end"], 30);
}

#[test]
fn empty_corpus_searches_to_nothing() {
    let index = build_index(&[], None);
    assert!(index.is_none());
    assert!(search("anything", index.as_ref()).is_empty());
}

#[test]
fn unmatched_query_is_empty() {
    let index = user_corpus();
    assert!(search("zebra", Some(&index)).is_empty());
}

#[derive(Default)]
struct CountingCache {
    entries: Mutex<HashMap<CacheKey, Vec<String>>>,
    gets: Mutex<usize>,
    puts: Mutex<usize>,
}

impl TokenCache for CountingCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<String>>, CacheError> {
        *self.gets.lock() += 1;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, tokens: &[String]) -> Result<(), CacheError> {
        *self.puts.lock() += 1;
        self.entries.lock().insert(key.clone(), tokens.to_vec());
        Ok(())
    }
}

#[test]
fn cache_avoids_recomputing_identical_content() {
    let docs = vec![doc("a.rs", "fn shared() {}"), doc("b.rs", "fn shared() {}"), doc("c.rs", "fn other() {}")];
    let cache = CountingCache::default();
    let index = CorpusBuilder::new(BuildOptions::default()).with_cache(&cache).build(&docs).unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(*cache.gets.lock(), 3);
    assert_eq!(*cache.puts.lock(), 2);

    CorpusBuilder::new(BuildOptions::default()).with_cache(&cache).build(&docs).unwrap();
    assert_eq!(*cache.gets.lock(), 6);
    assert_eq!(*cache.puts.lock(), 2);
}

#[test]
fn cached_and_uncached_builds_agree() {
    let docs = vec![doc("a.rs", "impl Parser { fn parseExpr() {} }"), doc("b.rs", "fn parse_stmt() {}")];
    let cache = MemoryTokenCache::new();
    let cached = CorpusBuilder::default().with_cache(&cache).build(&docs).unwrap();
    let plain = CorpusBuilder::default().build(&docs).unwrap();
    assert_eq!(search("parse expr", Some(&cached)), search("parse expr", Some(&plain)));
    assert_eq!(cache.misses(), 2);
}

/// A cache whose backend is always unavailable.
struct FailingCache {
    calls: Mutex<usize>,
}

impl TokenCache for FailingCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<Vec<String>>, CacheError> {
        *self.calls.lock() += 1;
        Err(CacheError::Codec(Box::new(bincode::ErrorKind::Custom("truncated entry".into()))))
    }

    fn put(&self, _key: &CacheKey, _tokens: &[String]) -> Result<(), CacheError> {
        *self.calls.lock() += 1;
        Err(CacheError::Codec(Box::new(bincode::ErrorKind::SizeLimit)))
    }
}

#[test]
fn failing_cache_falls_back_to_tokenizing() {
    let docs = vec![
        doc("a.rs", "impl Parser { fn parseExpr() {} }"),
        doc("b.rs", "fn parse_stmt(tokens: &[Token]) {}"),
        doc("c.rs", "fn parse_stmt(tokens: &[Token]) {}"),
    ];
    let cache = FailingCache { calls: Mutex::new(0) };
    let cached = CorpusBuilder::default().with_cache(&cache).build(&docs).unwrap();
    let plain = CorpusBuilder::default().build(&docs).unwrap();

    assert_eq!(cached.len(), 3);
    assert_eq!(*cache.calls.lock(), 6);
    for term in ["parse", "expr", "parse stmt", "tokens", "impl parser"] {
        assert_eq!(cached.document_frequency(term), plain.document_frequency(term));
    }
    for doc_id in ["a.rs:0-1", "b.rs:0-1", "c.rs:0-1"] {
        assert_eq!(cached.doc_length(doc_id), plain.doc_length(doc_id));
    }
    assert_eq!(search("parse stmt", Some(&cached)), search("parse stmt", Some(&plain)));
}

fn single_term_index(freq: usize, others: &[usize]) -> InvertedIndex {
    let mut builder = IndexBuilder::new();
    let target: Vec<&str> = std::iter::repeat("term").take(freq).chain(std::iter::once("pad")).collect();
    builder.add_document("target", &target, Metadata::new()).unwrap();
    for (i, len) in others.iter().enumerate() {
        let filler: Vec<&str> = std::iter::repeat("filler").take(*len).collect();
        builder.add_document(&format!("other{i}"), &filler, Metadata::new()).unwrap();
    }
    builder.finalize()
}

proptest! {
    #[test]
    fn bm25_increases_with_term_frequency(freq in 1u32..50, others in proptest::collection::vec(1usize..40, 0..6)) {
        let index = single_term_index(3, &others);
        let lower = index.bm25("target", "term", freq).unwrap();
        let higher = index.bm25("target", "term", freq + 1).unwrap();
        prop_assert!(higher > lower);
    }

    #[test]
    fn longer_documents_score_no_higher(freq in 1u32..10, extra in 1usize..200) {
        let mut builder = IndexBuilder::new();
        let short: Vec<&str> = vec!["term"];
        let long: Vec<&str> = std::iter::once("term").chain(std::iter::repeat("pad").take(extra)).collect();
        builder.add_document("short", &short, Metadata::new()).unwrap();
        builder.add_document("long", &long, Metadata::new()).unwrap();
        let index = builder.finalize();
        prop_assert!(index.bm25("long", "term", freq).unwrap() <= index.bm25("short", "term", freq).unwrap());
    }

    #[test]
    fn normalized_scores_stay_in_unit_range(contents in proptest::collection::vec("[a-zA-Z_ ]{0,40}", 1..12), query in "[a-zA-Z_ ]{0,20}") {
        let docs: Vec<Document> = contents.iter().enumerate().map(|(i, c)| doc(&format!("f{i}.rs"), c)).collect();
        let index = build_index(&docs, None).unwrap();
        let raw = index.search_index(&query).unwrap();
        let scores = search(&query, Some(&index));
        prop_assert_eq!(scores.len(), raw.len());
        for score in scores.values() {
            prop_assert!((0.0..=1.0).contains(score));
        }
        if let Some(top) = raw.first() {
            prop_assert_eq!(scores[&top.doc_id], 1.0);
        }
    }
}
