use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{BackendRequest, LexicalBackend};
use crate::config::{parse_or_default, SearchSettings};
use crate::expansion::{ExpandedQuery, QueryExpander};
use crate::ground_truth::link_for_title;
use crate::pagerank::RankTable;
use crate::DocId;

/// How a hit's lexical score and its page rank become the final score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreCombination {
    LexicalOnly,
    #[default]
    Multiplicative,
    /// `lexical + weight * rank`
    Additive { weight: f64 },
}

impl ScoreCombination {
    /// Rank assumed for a page missing from the rank table: the value that leaves
    /// the lexical score unchanged.
    pub fn neutral_rank(self) -> f64 {
        match self {
            Self::LexicalOnly | Self::Multiplicative => 1.0,
            Self::Additive { .. } => 0.0,
        }
    }

    pub fn combine(self, lexical: f64, rank: f64) -> f64 {
        match self {
            Self::LexicalOnly => lexical,
            Self::Multiplicative => lexical * rank,
            Self::Additive { weight } => lexical + weight * rank,
        }
    }
}

impl FromStr for ScoreCombination {
    type Err = String;

    /// `lexical`, `multiplicative`, `additive` or `additive:<weight>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (s.as_str(), None),
        };
        match (name.replace('-', "_").as_str(), arg) {
            ("lexical" | "lexical_only" | "none", None) => Ok(Self::LexicalOnly),
            ("multiplicative" | "product", None) => Ok(Self::Multiplicative),
            ("additive" | "sum", None) => Ok(Self::Additive { weight: 1.0 }),
            ("additive" | "sum", Some(w)) => match w.parse::<f64>() {
                Ok(weight) if weight.is_finite() && weight >= 0.0 => Ok(Self::Additive { weight }),
                _ => Err(format!("invalid additive weight {w:?}")),
            },
            _ => Err(format!("unknown score combination {s:?}")),
        }
    }
}

/// Accepts the serialized `{"kind": .., "weight": ..}` form or a bare name, both through `FromStr`.
impl<'de> Deserialize<'de> for ScoreCombination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Tagged { kind: String, weight: Option<f64> },
        }
        let raw = match Repr::deserialize(deserializer)? {
            Repr::Name(name) => name,
            Repr::Tagged { kind, weight: Some(w) } => format!("{kind}:{w}"),
            Repr::Tagged { kind, weight: None } => kind,
        };
        Ok(parse_or_default("combination", Some(raw.as_str())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub title: String,
    pub link: String,
    /// Lexical score from the backend.
    pub score: f64,
    pub page_rank: f64,
    pub final_score: f64,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub expanded_query: String,
    pub expansion_terms: Vec<String>,
    pub took_s: f64,
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

/// Anything that answers a query with a ranked list; what the evaluator measures.
pub trait Retriever {
    fn retrieve(&self, text: &str, settings: &SearchSettings) -> Result<SearchResponse>;
}

pub struct RankedRetriever<B> {
    backend: B,
    expander: Option<QueryExpander>,
    ranks: Arc<RankTable>,
}

impl<B: LexicalBackend> RankedRetriever<B> {
    pub fn new(backend: B, ranks: Arc<RankTable>) -> Self {
        Self { backend, expander: None, ranks }
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn backend(&self) -> &B { &self.backend }

    pub fn ranks(&self) -> &RankTable { &self.ranks }

    pub fn search(&self, text: &str, settings: &SearchSettings) -> Result<SearchResponse> {
        let start = Instant::now();
        let query = match (&self.expander, settings.expand) {
            (Some(expander), true) => expander.expand(text),
            _ => ExpandedQuery::unexpanded(text),
        };
        let results = self.backend.search(&BackendRequest {
            query: &query,
            weighting: settings.weighting,
            group: settings.group,
            boosts: settings.boosts,
            limit: settings.limit,
        })?;

        let combination = settings.effective_combination();
        let mut hits: Vec<SearchHit> = results
            .hits
            .into_iter()
            .map(|hit| {
                let page_rank = self.ranks.get(hit.doc_id).unwrap_or_else(|| {
                    tracing::debug!(doc_id = hit.doc_id, "no page rank, using neutral value");
                    combination.neutral_rank()
                });
                let score = f64::from(hit.score);
                let link = hit.url.unwrap_or_else(|| link_for_title(self.backend.base_url(), &hit.title));
                SearchHit {
                    doc_id: hit.doc_id,
                    title: hit.title,
                    link,
                    score,
                    page_rank,
                    final_score: combination.combine(score, page_rank),
                    snippet: hit.snippet,
                }
            })
            .collect();
        if settings.page_rank {
            // sort_by is stable: equal scores keep backend order
            hits.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        }

        let took_s = start.elapsed().as_secs_f64();
        tracing::info!(query = text, hits = hits.len(), total = results.total_matches, took_s, "search");
        Ok(SearchResponse {
            query: text.to_string(),
            expanded_query: query.to_string(),
            expansion_terms: query.terms,
            took_s,
            total_hits: results.total_matches,
            hits,
        })
    }
}

impl<B: LexicalBackend> Retriever for RankedRetriever<B> {
    fn retrieve(&self, text: &str, settings: &SearchSettings) -> Result<SearchResponse> {
        self.search(text, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendHit, BackendResults};
    use crate::DocMeta;
    use std::collections::HashMap;

    struct FixedBackend(Vec<(DocId, f32)>);

    impl LexicalBackend for FixedBackend {
        fn search(&self, request: &BackendRequest<'_>) -> Result<BackendResults> {
            let hits = self
                .0
                .iter()
                .take(request.limit)
                .map(|&(doc_id, score)| BackendHit {
                    doc_id,
                    score,
                    title: format!("Page {doc_id}"),
                    url: None,
                    snippet: None,
                })
                .collect();
            Ok(BackendResults { hits, total_matches: self.0.len() })
        }

        fn document(&self, _doc_id: DocId) -> Option<&DocMeta> { None }

        fn base_url(&self) -> &str { "https://en.wikipedia.org/wiki/" }
    }

    fn retriever(hits: Vec<(DocId, f32)>, ranks: &[(DocId, f64)]) -> RankedRetriever<FixedBackend> {
        let table = RankTable::from_scores(ranks.iter().copied().collect::<HashMap<_, _>>());
        RankedRetriever::new(FixedBackend(hits), Arc::new(table))
    }

    fn ids(resp: &SearchResponse) -> Vec<DocId> { resp.hits.iter().map(|h| h.doc_id).collect() }

    #[test]
    fn page_rank_reorders_by_product() {
        let r = retriever(vec![(1, 2.0), (2, 1.5), (3, 1.0)], &[(1, 0.1), (2, 0.5), (3, 0.3)]);
        let resp = r.search("q", &SearchSettings::default()).unwrap();
        assert_eq!(ids(&resp), vec![2, 3, 1]);
        assert!((resp.hits[0].final_score - 0.75).abs() < 1e-9);
        assert_eq!(resp.hits[0].link, "https://en.wikipedia.org/wiki/Page_2");
    }

    #[test]
    fn without_page_rank_backend_order_is_kept() {
        let r = retriever(vec![(1, 2.0), (2, 1.5), (3, 1.0)], &[(1, 0.1), (2, 0.5), (3, 0.2)]);
        let settings = SearchSettings { page_rank: false, ..SearchSettings::default() };
        let resp = r.search("q", &settings).unwrap();
        assert_eq!(ids(&resp), vec![1, 2, 3]);
        assert!(resp.hits.iter().all(|h| h.final_score == h.score));
    }

    #[test]
    fn equal_combined_scores_keep_backend_order() {
        let r = retriever(vec![(9, 1.0), (4, 2.0), (7, 0.5)], &[(9, 0.5), (4, 0.25), (7, 1.0)]);
        let resp = r.search("q", &SearchSettings::default()).unwrap();
        assert_eq!(ids(&resp), vec![9, 4, 7]);
    }

    #[test]
    fn rank_miss_uses_neutral_value() {
        let r = retriever(vec![(1, 2.0), (5, 1.0)], &[(1, 0.25)]);
        let resp = r.search("q", &SearchSettings::default()).unwrap();
        assert_eq!(ids(&resp), vec![5, 1]);
        assert_eq!(resp.hits[0].page_rank, 1.0);

        let settings =
            SearchSettings { combination: ScoreCombination::Additive { weight: 4.0 }, ..SearchSettings::default() };
        let resp = r.search("q", &settings).unwrap();
        assert_eq!(ids(&resp), vec![1, 5]);
        assert_eq!(resp.hits[1].page_rank, 0.0);
        assert_eq!(resp.hits[1].final_score, 1.0);
    }

    #[test]
    fn combination_names_parse() {
        assert_eq!("additive:0.5".parse::<ScoreCombination>(), Ok(ScoreCombination::Additive { weight: 0.5 }));
        assert_eq!("lexical".parse::<ScoreCombination>(), Ok(ScoreCombination::LexicalOnly));
        assert!("additive:-1".parse::<ScoreCombination>().is_err());
        assert!("max".parse::<ScoreCombination>().is_err());
    }

    #[test]
    fn negative_additive_weight_is_rejected_when_loaded() {
        let c: ScoreCombination = serde_json::from_str(r#"{"kind": "additive", "weight": -1}"#).unwrap();
        assert_eq!(c, ScoreCombination::Multiplicative);
        let c: ScoreCombination = serde_json::from_str(r#"{"kind": "additive", "weight": 0.5}"#).unwrap();
        assert_eq!(c, ScoreCombination::Additive { weight: 0.5 });
        let c: ScoreCombination = serde_json::from_str(r#""lexical""#).unwrap();
        assert_eq!(c, ScoreCombination::LexicalOnly);
        // a higher rank never lowers the combined score
        assert!(c.combine(1.0, 0.9) >= c.combine(1.0, 0.1));
    }
}
