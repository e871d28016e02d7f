use crate::error::IndexError;
use crate::tokenizer::code_tokens;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

pub type TermId = u32;
pub type DocId = u32;

/// Caller-supplied document metadata, stored and returned untouched.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Term-frequency saturation.
pub const K1: f64 = 1.2;
/// Length normalization strength.
pub const B: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
}

#[derive(Debug, Clone)]
struct DocEntry {
    title: String,
    length: usize,
    metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    pub metadata: Metadata,
}

/// Load phase of an index. Documents are appended, never updated.
///
/// [`IndexBuilder::finalize`] freezes the builder into a queryable
/// [`InvertedIndex`], so scores are only ever computed against the
/// statistics of the whole corpus.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dictionary: HashMap<String, TermId>,
    postings: Vec<Vec<Posting>>, // indexed by TermId, in document insertion order
    docs: Vec<DocEntry>,         // indexed by DocId
    doc_id_map: HashMap<String, DocId>,
    total_length: usize,
    avg_doc_length: f64,
}

impl IndexBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    /// Add a document under `title`. A title can only be added once.
    pub fn add_document<S: AsRef<str>>(&mut self, title: &str, tokens: &[S], metadata: Metadata) -> Result<DocId, IndexError> {
        if self.doc_id_map.contains_key(title) {
            return Err(IndexError::DuplicateDocument(title.to_string()));
        }
        let doc_id = self.docs.len() as DocId;
        self.doc_id_map.insert(title.to_string(), doc_id);
        self.docs.push(DocEntry { title: title.to_string(), length: tokens.len(), metadata });
        self.total_length += tokens.len();
        self.avg_doc_length = self.total_length as f64 / self.docs.len() as f64;

        // Term frequencies in first-appearance order.
        let mut term_freq: Vec<(TermId, u32)> = Vec::new();
        let mut slots: HashMap<TermId, usize> = HashMap::new();
        for token in tokens {
            let tid = self.term_id(token.as_ref());
            match slots.entry(tid) {
                Entry::Occupied(slot) => term_freq[*slot.get()].1 += 1,
                Entry::Vacant(slot) => {
                    slot.insert(term_freq.len());
                    term_freq.push((tid, 1));
                }
            }
        }
        for (tid, freq) in term_freq {
            self.postings[tid as usize].push(Posting { doc_id, term_freq: freq });
        }
        Ok(doc_id)
    }

    fn term_id(&mut self, term: &str) -> TermId {
        if let Some(&tid) = self.dictionary.get(term) {
            return tid;
        }
        let tid = self.postings.len() as TermId;
        self.dictionary.insert(term.to_string(), tid);
        self.postings.push(Vec::new());
        tid
    }

    pub fn finalize(self) -> InvertedIndex {
        InvertedIndex {
            dictionary: self.dictionary,
            postings: self.postings,
            docs: self.docs,
            doc_id_map: self.doc_id_map,
            avg_doc_length: self.avg_doc_length,
        }
    }
}

/// Frozen, read-only inverted index scored with Okapi BM25.
#[derive(Debug)]
pub struct InvertedIndex {
    dictionary: HashMap<String, TermId>,
    postings: Vec<Vec<Posting>>,
    docs: Vec<DocEntry>,
    doc_id_map: HashMap<String, DocId>,
    avg_doc_length: f64,
}

impl InvertedIndex {
    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn avg_doc_length(&self) -> f64 { self.avg_doc_length }

    pub fn doc_length(&self, title: &str) -> Option<usize> {
        self.doc_id_map.get(title).map(|&id| self.docs[id as usize].length)
    }

    pub fn metadata(&self, title: &str) -> Option<&Metadata> {
        self.doc_id_map.get(title).map(|&id| &self.docs[id as usize].metadata)
    }

    /// Number of documents containing `term`.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.dictionary.get(term).map_or(0, |&tid| self.postings[tid as usize].len())
    }

    /// BM25 contribution of `term` occurring `term_freq` times in the document `title`.
    ///
    /// A term absent from the index has a document frequency of zero.
    pub fn bm25(&self, title: &str, term: &str, term_freq: u32) -> Result<f64, IndexError> {
        let doc_id = *self.doc_id_map.get(title).ok_or_else(|| IndexError::UnknownDocument(title.to_string()))?;
        self.score(doc_id, self.document_frequency(term), term, term_freq)
    }

    fn score(&self, doc_id: DocId, df: usize, term: &str, term_freq: u32) -> Result<f64, IndexError> {
        let num_docs = self.docs.len() as f64;
        let df = df as f64;
        let idf = ((num_docs - df + 0.5) / (df + 0.5) + 1.0).ln();

        let doc_length = self.docs[doc_id as usize].length as f64;
        let tf = term_freq as f64;
        let tf_component = ((K1 + 1.0) * tf) / (tf + K1 * (1.0 - B + B * (doc_length / self.avg_doc_length)));

        let score = idf * tf_component;
        if !score.is_finite() {
            return Err(IndexError::NonFiniteScore {
                doc_id: self.docs[doc_id as usize].title.clone(),
                term: term.to_string(),
            });
        }
        Ok(score)
    }

    /// Rank documents by the sum of BM25 contributions of every query token.
    ///
    /// The query goes through the same tokenizer as the documents. Equal
    /// scores keep document insertion order.
    pub fn search_index(&self, query: &str) -> Result<Vec<SearchHit>, IndexError> {
        let mut scores: HashMap<DocId, f64> = HashMap::new();
        for token in code_tokens(query) {
            let Some(&tid) = self.dictionary.get(&token.text) else { continue };
            let postings = &self.postings[tid as usize];
            for posting in postings {
                let contrib = self.score(posting.doc_id, postings.len(), &token.text, posting.term_freq)?;
                *scores.entry(posting.doc_id).or_insert(0.0) += contrib;
            }
        }

        let mut ranked: Vec<(DocId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        tracing::debug!(query, hits = ranked.len(), "searched lexical index");

        Ok(ranked
            .into_iter()
            .map(|(doc_id, score)| {
                let doc = &self.docs[doc_id as usize];
                SearchHit { doc_id: doc.title.clone(), score, metadata: doc.metadata.clone() }
            })
            .collect())
    }
}
