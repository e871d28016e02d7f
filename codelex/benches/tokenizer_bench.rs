use codelex::tokenizer::{code_tokens, tokenize};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_tokenize(c: &mut Criterion) {
    let text = include_str!("../src/index.rs");
    c.bench_function("tokenize_index_rs", |b| b.iter(|| tokenize(text).count()));
    c.bench_function("code_tokens_index_rs", |b| b.iter(|| code_tokens(text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
