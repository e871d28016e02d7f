use codelex::tokenizer::{code_tokens, document_tokens, tokenize};

fn words(text: &str) -> Vec<String> {
    tokenize(text).map(|t| t.text).collect()
}

#[test]
fn it_splits_identifiers_by_convention() {
    assert_eq!(words("myVariableName"), vec!["my", "variable", "name"]);
    assert_eq!(words("MY_CONST_VALUE"), vec!["my", "const", "value"]);
    assert_eq!(words("HTTPServer"), vec!["http", "server"]);
    assert_eq!(words("x1_y2"), vec!["x1", "y2"]);
    assert!(words("a").is_empty());
}

#[test]
fn it_tokenizes_source_lines() {
    let toks = words("def getUserName(self): return self.user_name");
    assert_eq!(toks, vec!["def", "get", "user", "name", "self", "return", "self", "user", "name"]);
}

#[test]
fn it_is_lazy() {
    let mut stream = tokenize("first second third");
    assert_eq!(stream.next().map(|t| t.text), Some("first".to_string()));
    assert_eq!(stream.next().map(|t| t.pos), Some(1));
    assert_eq!(stream.next().map(|t| t.text), Some("third".to_string()));
    assert!(stream.next().is_none());
}

#[test]
fn it_emits_n_plus_bigrams_plus_trigrams() {
    let n = tokenize("one two three four five").count();
    assert_eq!(n, 5);
    assert_eq!(code_tokens("one two three four five").len(), n + (n - 1) + (n - 2));
    assert_eq!(document_tokens("one").len(), 1);
    assert_eq!(document_tokens("").len(), 0);
}
