use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("valid regex");
    // Capitalized word, lowercase word, or an uppercase run that ends before another capital or at the end of the word.
    static ref CASE_PART: fancy_regex::Regex =
        fancy_regex::Regex::new(r"[A-Z][a-z]+|[a-z]+|[A-Z]+(?=[A-Z]|$)").expect("valid regex");
}

/// A search token. Offsets are byte offsets into the tokenized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Index among emitted tokens; dropped parts do not consume a slot.
    pub pos: usize,
    pub start_char: usize,
    pub end_char: usize,
}

fn is_valid(part: &str) -> bool {
    part.chars().nth(1).is_some()
}

/// Lazy stream of lower-cased unigram tokens.
///
/// Words are split on underscores (`MY_CONST` -> `my`, `const`) or, failing
/// that, on casing (`myVariableName` -> `my`, `variable`, `name`). Parts of
/// one character are dropped.
pub struct Tokens<'a> {
    words: regex::Matches<'static, 'a>,
    pending: VecDeque<(String, usize, usize)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { words: WORD.find_iter(text), pending: VecDeque::new(), pos: 0 }
    }

    fn push(&mut self, part: &str, start: usize) {
        self.pending.push_back((part.to_lowercase(), start, start + part.len()));
    }

    fn split_word(&mut self, word: &str, start: usize) {
        if word.contains('_') {
            let mut offset = 0;
            for part in word.split('_') {
                if is_valid(part) {
                    self.push(part, start + offset);
                }
                offset += part.len() + 1;
            }
            return;
        }

        let mut matched = false;
        for part in CASE_PART.find_iter(word) {
            match part {
                Ok(m) => {
                    matched = true;
                    if is_valid(m.as_str()) {
                        self.push(m.as_str(), start + m.start());
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, word, "case split failed");
                    break;
                }
            }
        }
        if !matched && is_valid(word) {
            self.push(word, start);
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some((text, start_char, end_char)) = self.pending.pop_front() {
                let token = Token { text, pos: self.pos, start_char, end_char };
                self.pos += 1;
                return Some(token);
            }
            let word = self.words.next()?;
            self.split_word(word.as_str(), word.start());
        }
    }
}

/// Tokenize text into unigrams. See [`Tokens`].
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens::new(text)
}

fn join(window: &[Token]) -> Token {
    let first = &window[0];
    let last = &window[window.len() - 1];
    let text = window.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join("_");
    Token { text, pos: first.pos, start_char: first.start_char, end_char: last.end_char }
}

/// Adjacent pairs joined with `_`, spanning both tokens.
pub fn bigrams(tokens: &[Token]) -> Vec<Token> {
    tokens.windows(2).map(join).collect()
}

/// Adjacent triples joined with `_`, spanning all three tokens.
pub fn trigrams(tokens: &[Token]) -> Vec<Token> {
    tokens.windows(3).map(join).collect()
}

/// Unigrams followed by their bigrams and trigrams.
///
/// This is the vocabulary used both when indexing and when querying, so a
/// query only matches documents tokenized by this same function.
pub fn code_tokens(text: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = tokenize(text).collect();
    let pairs = bigrams(&tokens);
    let triples = trigrams(&tokens);
    tokens.extend(pairs);
    tokens.extend(triples);
    tokens
}

/// Token texts of a document, in [`code_tokens`] order.
pub fn document_tokens(content: &str) -> Vec<String> {
    code_tokens(content).into_iter().map(|t| t.text).collect()
}
