use anyhow::Result;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::parse_or_default;
use crate::expansion::ExpandedQuery;
use crate::persist::{load_index_header, load_postings_for_term, IndexPaths};
use crate::tokenizer::{tokenize, words};
use crate::{DocId, DocMeta, Posting, TermId};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum WeightingModel {
    #[default]
    Bm25f,
    TfIdf,
}

impl FromStr for WeightingModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "bm25f" | "bm25" => Ok(Self::Bm25f),
            "tfidf" => Ok(Self::TfIdf),
            other => Err(format!("unknown weighting model {other:?}")),
        }
    }
}

impl From<String> for WeightingModel {
    fn from(s: String) -> Self { parse_or_default("weighting", Some(s.as_str())) }
}

/// How the user's own query terms are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum GroupOperator {
    #[default]
    And,
    Or,
}

impl FromStr for GroupOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(format!("unknown group operator {other:?}")),
        }
    }
}

impl From<String> for GroupOperator {
    fn from(s: String) -> Self { parse_or_default("group", Some(s.as_str())) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldBoosts {
    pub title: f32,
    pub text: f32,
}

impl Default for FieldBoosts {
    fn default() -> Self { Self { title: 1.0, text: 1.0 } }
}

impl FieldBoosts {
    /// Non-positive or non-finite boosts are replaced by 1.0.
    pub fn sanitized(self) -> Self {
        let fix = |b: f32| if b.is_finite() && b > 0.0 { b } else { 1.0 };
        Self { title: fix(self.title), text: fix(self.text) }
    }
}

pub struct BackendRequest<'a> {
    pub query: &'a ExpandedQuery,
    pub weighting: WeightingModel,
    pub group: GroupOperator,
    pub boosts: FieldBoosts,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendHit {
    pub doc_id: DocId,
    pub score: f32,
    pub title: String,
    pub url: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendResults {
    /// Best first, at most `limit` of them.
    pub hits: Vec<BackendHit>,
    /// Number of documents that matched before truncation.
    pub total_matches: usize,
}

/// Executes a query and scores documents with its own weighting model.
pub trait LexicalBackend: Send + Sync {
    fn search(&self, request: &BackendRequest<'_>) -> Result<BackendResults>;

    fn document(&self, doc_id: DocId) -> Option<&DocMeta>;

    /// Prefix turning a title into a page link, for documents without a stored url.
    fn base_url(&self) -> &str;
}

/// Searches the index persisted by [`crate::index::IndexBuilder`].
pub struct IndexSearcher {
    paths: IndexPaths,
    dictionary: HashMap<String, TermId>,
    df: Vec<u32>,
    docs: HashMap<DocId, DocMeta>,
    num_docs: u32,
    avg_title_len: f32,
    avg_text_len: f32,
    base_url: String,
}

#[derive(Default)]
struct DocScore {
    original_matched: usize,
    original: f32,
    expansion_matched: bool,
    expansion: f32,
}

impl IndexSearcher {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let paths = IndexPaths::new(root.into());
        let header = load_index_header(&paths)?;
        tracing::info!(num_docs = header.meta.num_docs, num_terms = header.dictionary.len(), "index opened");
        Ok(Self {
            paths,
            dictionary: header.dictionary,
            df: header.df,
            docs: header.docs,
            num_docs: header.meta.num_docs,
            avg_title_len: header.meta.avg_title_len,
            avg_text_len: header.meta.avg_text_len,
            base_url: header.meta.base_url,
        })
    }

    pub fn root(&self) -> &std::path::Path { &self.paths.root }

    fn idf(&self, tid: TermId, model: WeightingModel) -> f32 {
        let n = self.num_docs.max(1) as f32;
        let df = (*self.df.get(tid as usize).unwrap_or(&1)).max(1) as f32;
        match model {
            WeightingModel::Bm25f => (1.0 + (n - df + 0.5) / (df + 0.5)).ln(),
            WeightingModel::TfIdf => (1.0 + n / df).ln(),
        }
    }

    fn term_score(&self, p: &Posting, idf: f32, model: WeightingModel, boosts: FieldBoosts) -> f32 {
        let Some(meta) = self.docs.get(&p.doc_id) else { return 0.0 };
        match model {
            WeightingModel::Bm25f => {
                let norm = |len: u32, avg: f32| {
                    let avg = if avg > 0.0 { avg } else { 1.0 };
                    1.0 - BM25_B + BM25_B * len as f32 / avg
                };
                let tf = boosts.title * p.title_tf as f32 / norm(meta.title_len, self.avg_title_len)
                    + boosts.text * p.text_tf as f32 / norm(meta.text_len, self.avg_text_len);
                idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1)
            }
            WeightingModel::TfIdf => {
                let log_tf = |tf: u32| if tf > 0 { 1.0 + (tf as f32).ln() } else { 0.0 };
                idf * (boosts.title * log_tf(p.title_tf) + boosts.text * log_tf(p.text_tf))
            }
        }
    }

    /// Unique stems in first-seen order.
    fn stems<'a, I: IntoIterator<Item = &'a str>>(texts: I) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for text in texts {
            for (stem, _) in tokenize(text) {
                if !out.contains(&stem) {
                    out.push(stem);
                }
            }
        }
        out
    }

    fn postings(&self, term: &str) -> Option<(TermId, Vec<Posting>)> {
        let tid = *self.dictionary.get(term)?;
        match load_postings_for_term(&self.paths, tid) {
            Ok(p) => Some((tid, p)),
            Err(e) => {
                tracing::warn!(term, error = %e, "postings unreadable");
                None
            }
        }
    }

    fn snippet(&self, meta: &DocMeta, raw_terms: &[String]) -> Option<String> {
        let rel = meta.text_path.as_ref()?;
        let text = std::fs::read_to_string(self.paths.root.join(rel)).ok()?;
        Some(snippet_from_text(&text, raw_terms))
    }
}

impl LexicalBackend for IndexSearcher {
    fn search(&self, request: &BackendRequest<'_>) -> Result<BackendResults> {
        let boosts = request.boosts.sanitized();
        let original = Self::stems([request.query.original.as_str()]);
        let expansion: Vec<String> = Self::stems(request.query.terms.iter().map(String::as_str))
            .into_iter()
            .filter(|t| !original.contains(t))
            .collect();
        if original.is_empty() && expansion.is_empty() {
            return Ok(BackendResults::default());
        }

        let mut scores: HashMap<DocId, DocScore> = HashMap::new();
        for term in &original {
            let Some((tid, plist)) = self.postings(term) else { continue };
            let idf = self.idf(tid, request.weighting);
            for p in &plist {
                let entry = scores.entry(p.doc_id).or_default();
                entry.original_matched += 1;
                entry.original += self.term_score(p, idf, request.weighting, boosts);
            }
        }
        for term in &expansion {
            let Some((tid, plist)) = self.postings(term) else { continue };
            let idf = self.idf(tid, request.weighting);
            for p in &plist {
                let entry = scores.entry(p.doc_id).or_default();
                entry.expansion_matched = true;
                entry.expansion += self.term_score(p, idf, request.weighting, boosts);
            }
        }

        let required = match request.group {
            GroupOperator::And => original.len(),
            GroupOperator::Or => 1,
        };
        let boost = request.query.boost;
        let mut scored: Vec<(DocId, f32)> = scores
            .into_iter()
            .filter_map(|(doc_id, s)| {
                let group_hit = !original.is_empty() && s.original_matched >= required;
                if !group_hit && !s.expansion_matched {
                    return None;
                }
                let score = if group_hit { s.original } else { 0.0 } + if s.expansion_matched { boost * s.expansion } else { 0.0 };
                Some((doc_id, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let total_matches = scored.len();

        // Capture raw query terms for highlighting
        let mut raw_terms = words(&request.query.original);
        raw_terms.extend(request.query.terms.iter().cloned());
        let hits = scored
            .into_iter()
            .take(request.limit.max(1))
            .filter_map(|(doc_id, score)| {
                let meta = self.docs.get(&doc_id)?;
                Some(BackendHit {
                    doc_id,
                    score,
                    title: meta.title.clone(),
                    url: meta.url.clone(),
                    snippet: self.snippet(meta, &raw_terms),
                })
            })
            .collect();
        Ok(BackendResults { hits, total_matches })
    }

    fn document(&self, doc_id: DocId) -> Option<&DocMeta> { self.docs.get(&doc_id) }

    fn base_url(&self) -> &str { &self.base_url }
}

/// A window of text around the first matching term, with every term wrapped in `<em>`.
pub fn snippet_from_text(text: &str, raw_terms: &[String]) -> String {
    let alternation = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| regex::escape(t.trim()))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = if alternation.is_empty() {
        None
    } else {
        RegexBuilder::new(&format!(r"\b(?:{alternation})\b")).case_insensitive(true).build().ok()
    };

    let window = match pattern.as_ref().and_then(|re| re.find(text)) {
        Some(m) => {
            let start = floor_boundary(text, m.start().saturating_sub(SNIPPET_BEFORE));
            let end = floor_boundary(text, (m.start() + SNIPPET_AFTER).min(text.len()));
            &text[start..end]
        }
        None => &text[..floor_boundary(text, SNIPPET_AFTER.min(text.len()))],
    };
    match pattern {
        Some(re) => re.replace_all(window, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).into_owned(),
        None => window.to_string(),
    }
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
