//! Power-iteration PageRank, stopping on L1 distance below `epsilon` or at `max_iterations`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::parse_or_default;
use crate::graph::LinkGraph;
use crate::DocId;

/// What happens to the rank mass held by pages without outbound links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum DanglingPolicy {
    /// Spread it evenly over every page; scores keep summing to 1.
    #[default]
    Uniform,
    /// Discard it, then renormalize the vector to sum to 1.
    Drop,
}

impl FromStr for DanglingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown dangling policy {other:?}")),
        }
    }
}

impl From<String> for DanglingPolicy {
    fn from(s: String) -> Self { parse_or_default("dangling", Some(s.as_str())) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankConfig {
    pub damping: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
    pub dangling: DanglingPolicy,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self { damping: 0.85, epsilon: 1e-4, max_iterations: 100, dangling: DanglingPolicy::Uniform }
    }
}

/// Page id -> authority score. Read-only once computed.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankTable {
    scores: HashMap<DocId, f64>,
}

impl RankTable {
    pub fn from_scores(scores: HashMap<DocId, f64>) -> Self { Self { scores } }

    pub fn get(&self, id: DocId) -> Option<f64> { self.scores.get(&id).copied() }

    pub fn len(&self) -> usize { self.scores.len() }

    pub fn is_empty(&self) -> bool { self.scores.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, f64)> + '_ {
        self.scores.iter().map(|(id, s)| (*id, *s))
    }

    /// Ids ordered by descending score, ties by ascending id.
    pub fn ranked(&self) -> Vec<(DocId, f64)> {
        let mut v: Vec<_> = self.iter().collect();
        v.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        v
    }
}

#[derive(Debug, Clone)]
pub struct PageRankOutcome {
    pub table: RankTable,
    pub iterations: usize,
    pub converged: bool,
    /// L1 distance of the last iteration.
    pub delta: f64,
}

pub fn compute(graph: &LinkGraph, config: &PageRankConfig) -> PageRankOutcome {
    let ids: Vec<DocId> = graph.nodes().collect();
    let n = ids.len();
    if n == 0 {
        return PageRankOutcome { table: RankTable::default(), iterations: 0, converged: true, delta: 0.0 };
    }

    let position: HashMap<DocId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let out: Vec<Vec<usize>> = ids
        .iter()
        .map(|id| graph.successors(*id).filter_map(|t| position.get(&t).copied()).collect())
        .collect();

    let d = config.damping;
    let nf = n as f64;
    let mut ranks = vec![1.0 / nf; n];
    let mut next = vec![0.0; n];
    let mut iterations = 0;
    let mut delta = f64::INFINITY;

    while iterations < config.max_iterations {
        iterations += 1;
        let dangling: f64 = out.iter().zip(&ranks).filter(|(o, _)| o.is_empty()).map(|(_, r)| r).sum();
        let base = match config.dangling {
            DanglingPolicy::Uniform => (1.0 - d) / nf + d * dangling / nf,
            DanglingPolicy::Drop => (1.0 - d) / nf,
        };
        next.iter_mut().for_each(|v| *v = base);
        for (i, targets) in out.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = d * ranks[i] / targets.len() as f64;
            for &t in targets {
                next[t] += share;
            }
        }
        if config.dangling == DanglingPolicy::Drop {
            normalize(&mut next);
        }

        delta = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut ranks, &mut next);
        if delta < config.epsilon {
            break;
        }
    }

    let converged = delta < config.epsilon;
    tracing::info!(nodes = n, iterations, converged, delta, "pagerank computed");
    let scores = ids.into_iter().zip(ranks).collect();
    PageRankOutcome { table: RankTable::from_scores(scores), iterations, converged, delta }
}

fn normalize(ranks: &mut [f64]) {
    let total: f64 = ranks.iter().sum();
    if total > 0.0 {
        for r in ranks.iter_mut() {
            *r /= total;
        }
    }
}
