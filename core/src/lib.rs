//! Link-graph authority and query-relevance ranking over a wiki corpus.

use serde::{Deserialize, Serialize};

pub mod backend;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod expansion;
pub mod graph;
pub mod ground_truth;
pub mod index;
pub mod lexicon;
pub mod links;
pub mod pagerank;
pub mod persist;
pub mod retriever;
pub mod tokenizer;
pub mod wsd;

pub use error::Error;

pub type TermId = u32;
/// Page identifier. The same id keys the inverted index, the link graph and the rank table.
pub type DocId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Relative path to the stored full text for snippet extraction, e.g., texts/{doc_id}.txt
    pub text_path: Option<String>,
    /// Token counts per field, used for length normalization.
    pub title_len: u32,
    pub text_len: u32,
}

/// Raw per-field term frequencies of one term in one document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub title_tf: u32,
    pub text_tf: u32,
}
