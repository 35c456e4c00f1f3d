use criterion::{criterion_group, criterion_main, Criterion};
use wikirank_core::links::{clean_markup, LinkExtractor};
use wikirank_core::tokenizer::tokenize;

const PAGE: &str = "The '''Roman Empire''' was the post-Republican period of [[Ancient Rome]]. \
As a polity it included large territorial holdings around the [[Mediterranean Sea]] in \
[[Europe]], [[North Africa]], and [[Western Asia]], ruled by [[Roman emperor|emperors]]. \
{{cite web |url=https://example.org/rome |title=Rome}} [[File:Roman Empire Trajan.png|thumb]] \
[[Category:Former empires]] [[de:Römisches Reich]] <ref>Gibbon, 1776</ref>";

fn bench_tokenize(c: &mut Criterion) {
    let text = PAGE.repeat(50);
    c.bench_function("tokenize_page", |b| b.iter(|| tokenize(&text)));
    c.bench_function("clean_markup_page", |b| b.iter(|| clean_markup(&text)));
    let extractor = LinkExtractor::default();
    c.bench_function("extract_links_page", |b| b.iter(|| extractor.extract(&text, "Roman Empire")));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
