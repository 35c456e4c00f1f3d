//! Lexicon JSON: `{"synsets": [{"id", "lemmas", "gloss", "hypernyms"}]}`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sense {
    pub id: String,
    pub lemmas: Vec<String>,
    #[serde(default)]
    pub gloss: String,
    #[serde(default)]
    pub hypernyms: Vec<String>,
}

/// The lexical-relatedness oracle consulted by the disambiguators.
pub trait SenseInventory: Send + Sync {
    /// Senses of `term`, most frequent first. Empty if the term is unknown.
    fn senses(&self, term: &str) -> Vec<&Sense>;

    /// Semantic similarity in `[0, 1]`.
    fn similarity(&self, a: &Sense, b: &Sense) -> f64;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LexiconFile {
    synsets: Vec<Sense>,
}

#[derive(Debug, Default)]
pub struct Lexicon {
    senses: Vec<Sense>,
    by_id: HashMap<String, usize>,
    by_lemma: HashMap<String, Vec<usize>>,
    parents: Vec<Vec<usize>>,
    depth: Vec<usize>,
}

fn lemma_key(s: &str) -> String {
    s.replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl Lexicon {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: LexiconFile = serde_json::from_str(&raw)?;
        let lexicon = Self::from_senses(file.synsets);
        tracing::info!(senses = lexicon.len(), path = %path.display(), "lexicon loaded");
        Ok(lexicon)
    }

    pub fn from_senses(senses: Vec<Sense>) -> Self {
        let by_id: HashMap<String, usize> =
            senses.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();
        let mut by_lemma: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, s) in senses.iter().enumerate() {
            for l in &s.lemmas {
                let entry = by_lemma.entry(lemma_key(l)).or_default();
                if !entry.contains(&i) {
                    entry.push(i);
                }
            }
        }
        let parents: Vec<Vec<usize>> = senses
            .iter()
            .map(|s| s.hypernyms.iter().filter_map(|h| by_id.get(h).copied()).collect())
            .collect();
        let mut depth = vec![0; senses.len()];
        let mut visiting = HashSet::new();
        for i in 0..senses.len() {
            max_depth(i, &parents, &mut depth, &mut visiting);
        }
        Self { senses, by_id, by_lemma, parents, depth }
    }

    pub fn len(&self) -> usize { self.senses.len() }

    pub fn is_empty(&self) -> bool { self.senses.is_empty() }

    pub fn sense(&self, id: &str) -> Option<&Sense> { self.by_id.get(id).map(|&i| &self.senses[i]) }

    fn lookup(&self, term: &str) -> Option<&Vec<usize>> {
        let key = lemma_key(term);
        if let Some(found) = self.by_lemma.get(&key) {
            return Some(found);
        }
        // plural forms
        let candidates = [
            key.strip_suffix("ies").map(|s| format!("{s}y")),
            key.strip_suffix("es").map(str::to_string),
            key.strip_suffix('s').map(str::to_string),
        ];
        candidates.into_iter().flatten().find_map(|c| self.by_lemma.get(&c))
    }

    /// Minimum hop count from `start` to each of its ancestors (itself included at 0).
    fn ancestors(&self, start: usize) -> HashMap<usize, usize> {
        let mut dist = HashMap::from([(start, 0)]);
        let mut queue = VecDeque::from([start]);
        while let Some(cur) = queue.pop_front() {
            let d = dist[&cur];
            for &p in &self.parents[cur] {
                if !dist.contains_key(&p) {
                    dist.insert(p, d + 1);
                    queue.push_back(p);
                }
            }
        }
        dist
    }

    fn wu_palmer(&self, a: usize, b: usize) -> f64 {
        let up_a = self.ancestors(a);
        let up_b = self.ancestors(b);
        let lcs = up_a
            .keys()
            .filter(|k| up_b.contains_key(k))
            .max_by(|x, y| self.depth[**x].cmp(&self.depth[**y]).then(y.cmp(x)));
        let Some(&lcs) = lcs else { return 0.0 };
        let lcs_depth = self.depth[lcs] as f64;
        let len_a = up_a[&lcs] as f64 + lcs_depth;
        let len_b = up_b[&lcs] as f64 + lcs_depth;
        2.0 * lcs_depth / (len_a + len_b)
    }
}

/// Longest hypernym chain to a root, counting the root as depth 1.
fn max_depth(i: usize, parents: &[Vec<usize>], memo: &mut [usize], visiting: &mut HashSet<usize>) -> usize {
    if memo[i] > 0 {
        return memo[i];
    }
    if !visiting.insert(i) {
        return 0;
    }
    let best = parents[i].iter().map(|&p| max_depth(p, parents, memo, visiting)).max().unwrap_or(0);
    visiting.remove(&i);
    memo[i] = best + 1;
    memo[i]
}

impl SenseInventory for Lexicon {
    fn senses(&self, term: &str) -> Vec<&Sense> {
        self.lookup(term).map(|ids| ids.iter().map(|&i| &self.senses[i]).collect()).unwrap_or_default()
    }

    fn similarity(&self, a: &Sense, b: &Sense) -> f64 {
        match (self.by_id.get(&a.id), self.by_id.get(&b.id)) {
            (Some(&x), Some(&y)) => self.wu_palmer(x, y),
            _ => 0.0,
        }
    }
}
