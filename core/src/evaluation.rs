use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::SearchSettings;
use crate::ground_truth::{canonical_link, RelevanceSet};
use crate::retriever::Retriever;
use crate::Error;

pub const DEFAULT_QUERIES: [&str; 30] = [
    "DNA",
    "Apple",
    "Epigenetics",
    "Hollywood",
    "Maya",
    "Microsoft",
    "Precision",
    "Tuscany",
    "99 balloons",
    "Computer Programming",
    "Financial meltdown",
    "Justin Timberlake",
    "Least Squares",
    "Mars robots",
    "Page six",
    "Roman Empire",
    "Solar energy",
    "Statistical Significance",
    "Steve Jobs",
    "The Maya",
    "Triple Cross",
    "US Constitution",
    "Eye of Horus",
    "Madam I’m Adam",
    "Mean Average Precision",
    "Physics Nobel Prizes",
    "Read the manual",
    "Spanish Civil War",
    "Do geese see god",
    "Much ado about nothing",
];

pub fn default_queries() -> Vec<String> { DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Result limit forced on the retriever under test.
    pub limit: usize,
    /// Number of ground-truth links per query treated as relevant.
    pub relevant: usize,
    pub recall_levels: usize,
    pub ndcg_rank: usize,
    pub r_precision_rank: usize,
    /// Cutoff rank for E- and F-measure.
    pub cutoff: usize,
    pub e_beta: f64,
    pub log_base: f64,
    /// Grade of the i-th reference link; positions past the end reuse the last grade.
    pub relevance_scale: Vec<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            relevant: 10,
            recall_levels: 10,
            ndcg_rank: 10,
            r_precision_rank: 10,
            cutoff: 10,
            e_beta: 1.5,
            log_base: 2.0,
            relevance_scale: vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecallPoint {
    pub level: usize,
    pub recall: f64,
    pub precision: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RPrecision {
    Value(f64),
    OutOfRange { r: usize, answers: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    pub ndcg: f64,
    pub r_precision: RPrecision,
    pub e_measure: f64,
    pub f_measure: f64,
    pub average_precision: f64,
    pub retrieved: usize,
    pub relevant_retrieved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub settings: SearchSettings,
    pub config: EvaluationConfig,
    pub map: f64,
    pub mean_ndcg: f64,
    pub precision_at_recall: Vec<RecallPoint>,
    pub queries: BTreeMap<String, QueryReport>,
}

impl EvaluationReport {
    /// Copy with every metric rounded to `decimals` places, for display.
    pub fn rounded(&self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        let round = |v: f64| (v * factor).round() / factor;
        let mut out = self.clone();
        out.map = round(out.map);
        out.mean_ndcg = round(out.mean_ndcg);
        for p in &mut out.precision_at_recall {
            p.recall = round(p.recall);
            p.precision = round(p.precision);
        }
        for q in out.queries.values_mut() {
            q.ndcg = round(q.ndcg);
            q.e_measure = round(q.e_measure);
            q.f_measure = round(q.f_measure);
            q.average_precision = round(q.average_precision);
            if let RPrecision::Value(v) = &mut q.r_precision {
                *v = round(*v);
            }
        }
        out
    }
}

pub struct EvaluationEngine {
    settings: SearchSettings,
    config: EvaluationConfig,
    queries: Vec<String>,
    reference: HashMap<String, Vec<String>>,
    answers: HashMap<String, Vec<String>>,
}

impl EvaluationEngine {
    /// Runs every query through `retriever` with the result limit forced to `config.limit`.
    pub fn new(
        retriever: &dyn Retriever,
        mut settings: SearchSettings,
        config: EvaluationConfig,
        queries: Vec<String>,
        reference: &RelevanceSet,
    ) -> Result<Self> {
        settings.limit = config.limit;
        let mut answers = HashMap::new();
        for query in &queries {
            let response = retriever.retrieve(query, &settings)?;
            let links: Vec<String> = response.hits.iter().map(|h| canonical_link(&h.link)).collect();
            tracing::debug!(query = query.as_str(), answers = links.len(), "answer set");
            answers.insert(query.clone(), links);
        }
        let reference = queries
            .iter()
            .map(|q| (q.clone(), reference.get(q).iter().take(config.relevant).map(|l| canonical_link(l)).collect()))
            .collect();
        Ok(Self { settings, config, queries, reference, answers })
    }

    /// An engine over precomputed answer sets.
    pub fn from_sets(
        config: EvaluationConfig,
        queries: Vec<String>,
        reference: &RelevanceSet,
        answers: HashMap<String, Vec<String>>,
    ) -> Self {
        let reference = queries
            .iter()
            .map(|q| (q.clone(), reference.get(q).iter().take(config.relevant).map(|l| canonical_link(l)).collect()))
            .collect();
        let answers = answers.into_iter().map(|(q, a)| (q, a.iter().map(|l| canonical_link(l)).collect())).collect();
        Self { settings: SearchSettings { limit: config.limit, ..SearchSettings::default() }, config, queries, reference, answers }
    }

    pub fn queries(&self) -> &[String] { &self.queries }

    pub fn reference(&self, query: &str) -> &[String] { self.reference.get(query).map(Vec::as_slice).unwrap_or(&[]) }

    pub fn answers(&self, query: &str) -> &[String] { self.answers.get(query).map(Vec::as_slice).unwrap_or(&[]) }

    /// Relevance flag for each answer; a link repeated in A counts only once.
    fn relevance_flags(&self, query: &str) -> Vec<bool> {
        let relevant: HashSet<&str> = self.reference(query).iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        self.answers(query).iter().map(|a| seen.insert(a.as_str()) && relevant.contains(a.as_str())).collect()
    }

    /// Precision at the rank where the `level`-th relevant document was found; 0 if never reached.
    pub fn precision_at_recall_level(&self, query: &str, level: usize) -> f64 {
        if level == 0 {
            return 0.0;
        }
        let mut found = 0;
        for (pos, relevant) in self.relevance_flags(query).into_iter().enumerate() {
            if relevant {
                found += 1;
                if found == level {
                    return found as f64 / (pos + 1) as f64;
                }
            }
        }
        0.0
    }

    /// Mean over levels `1..=min(recall_levels, |R|)` for one query; 0 for an empty R.
    pub fn average_precision(&self, query: &str) -> f64 {
        let levels = self.config.recall_levels.min(self.reference(query).len());
        if levels == 0 {
            return 0.0;
        }
        (1..=levels).map(|l| self.precision_at_recall_level(query, l)).sum::<f64>() / levels as f64
    }

    /// The precision-recall curve, averaged over all queries.
    pub fn average_precision_at_level(&self) -> Vec<RecallPoint> {
        let levels = self.config.recall_levels;
        (1..=levels)
            .map(|level| RecallPoint {
                level,
                recall: level as f64 / levels as f64,
                precision: self.mean_over_queries(|q| self.precision_at_recall_level(q, level)),
            })
            .collect()
    }

    pub fn map(&self) -> f64 { self.mean_over_queries(|q| self.average_precision(q)) }

    /// `|R ∩ A[..r]| / r`.
    pub fn r_precision(&self, query: &str, r: usize) -> Result<f64, Error> {
        let answers = self.answers(query).len();
        if r == 0 || r > answers {
            return Err(Error::RPrecisionOutOfRange { r, answers });
        }
        let hits = self.relevance_flags(query).into_iter().take(r).filter(|&f| f).count();
        Ok(hits as f64 / r as f64)
    }

    /// Precision and recall over the first `rank` answers.
    pub fn precision_recall(&self, query: &str, rank: usize) -> (f64, f64) {
        let flags = self.relevance_flags(query);
        let considered = rank.min(flags.len());
        let hits = flags.into_iter().take(considered).filter(|&f| f).count() as f64;
        let relevant = self.reference(query).len();
        let precision = if considered == 0 { 0.0 } else { hits / considered as f64 };
        let recall = if relevant == 0 { 0.0 } else { hits / relevant as f64 };
        (precision, recall)
    }

    /// `1 - (1 + b²)PR / (b²P + R)`, 0 when P or R is 0.
    pub fn e_measure(&self, query: &str, b: f64, rank: usize) -> f64 {
        let (p, r) = self.precision_recall(query, rank);
        if p == 0.0 || r == 0.0 {
            return 0.0;
        }
        let b2 = b * b;
        1.0 - (1.0 + b2) * p * r / (b2 * p + r)
    }

    /// `2PR / (P + R)`, 0 when P or R is 0.
    pub fn f_measure(&self, query: &str, rank: usize) -> f64 {
        let (p, r) = self.precision_recall(query, rank);
        if p == 0.0 || r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }

    fn grade(&self, position: usize) -> f64 {
        let scale = &self.config.relevance_scale;
        scale.get(position).or(scale.last()).copied().unwrap_or(1.0)
    }

    fn relevance_vector(&self, query: &str) -> Vec<f64> {
        let position: HashMap<&str, usize> =
            self.reference(query).iter().enumerate().rev().map(|(i, l)| (l.as_str(), i)).collect();
        let mut seen = HashSet::new();
        self.answers(query)
            .iter()
            .map(|a| match position.get(a.as_str()) {
                Some(&pos) if seen.insert(a.as_str()) => self.grade(pos),
                _ => 0.0,
            })
            .collect()
    }

    pub fn ndcg(&self, query: &str, rank: usize) -> f64 {
        let ideal: Vec<f64> = (0..self.reference(query).len()).map(|i| self.grade(i)).collect();
        let ideal_dcg = dcg(&ideal, rank, self.config.log_base);
        if ideal_dcg <= 0.0 {
            return 0.0;
        }
        dcg(&self.relevance_vector(query), rank, self.config.log_base) / ideal_dcg
    }

    fn mean_over_queries<F: Fn(&str) -> f64>(&self, f: F) -> f64 {
        if self.queries.is_empty() {
            return 0.0;
        }
        self.queries.iter().map(|q| f(q.as_str())).sum::<f64>() / self.queries.len() as f64
    }

    pub fn report(&self) -> EvaluationReport {
        let cfg = &self.config;
        let queries: BTreeMap<String, QueryReport> = self
            .queries
            .iter()
            .map(|q| {
                let r_precision = match self.r_precision(q, cfg.r_precision_rank) {
                    Ok(v) => RPrecision::Value(v),
                    Err(Error::RPrecisionOutOfRange { r, answers }) => RPrecision::OutOfRange { r, answers },
                    Err(e) => {
                        tracing::warn!(query = q.as_str(), error = %e, "r-precision unavailable");
                        RPrecision::OutOfRange { r: cfg.r_precision_rank, answers: self.answers(q).len() }
                    }
                };
                let report = QueryReport {
                    ndcg: self.ndcg(q, cfg.ndcg_rank),
                    r_precision,
                    e_measure: self.e_measure(q, cfg.e_beta, cfg.cutoff),
                    f_measure: self.f_measure(q, cfg.cutoff),
                    average_precision: self.average_precision(q),
                    retrieved: self.answers(q).len(),
                    relevant_retrieved: self.relevance_flags(q).into_iter().filter(|&f| f).count(),
                };
                (q.clone(), report)
            })
            .collect();
        let report = EvaluationReport {
            settings: self.settings.clone(),
            config: cfg.clone(),
            map: self.map(),
            mean_ndcg: self.mean_over_queries(|q| self.ndcg(q, cfg.ndcg_rank)),
            precision_at_recall: self.average_precision_at_level(),
            queries,
        };
        tracing::info!(queries = self.queries.len(), map = report.map, ndcg = report.mean_ndcg, "evaluation finished");
        report
    }
}

/// `rel[0] + Σ rel[i] / log_base(i + 1)` over the first `rank` positions.
pub fn dcg(relevance: &[f64], rank: usize, log_base: f64) -> f64 {
    let Some(&first) = relevance.first() else { return 0.0 };
    let base = if log_base > 1.0 { log_base } else { 2.0 };
    let rank = rank.clamp(1, relevance.len());
    first + relevance[1..rank].iter().enumerate().map(|(i, rel)| rel / ((i + 2) as f64).log(base)).sum::<f64>()
}
