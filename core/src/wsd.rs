use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::parse_or_default;
use crate::lexicon::{Sense, SenseInventory};
use crate::tokenizer;

/// Picks the sense of `target` that best fits the surrounding `context` words.
pub trait Disambiguator: Send + Sync {
    fn best_sense(&self, context: &[String], target: &str) -> Option<Sense>;
}

/// Scores each candidate sense by summing, over every other context word, its
/// best similarity to any sense of that word. Ties keep the earliest sense.
pub struct ContextOverlap {
    inventory: Arc<dyn SenseInventory>,
}

impl ContextOverlap {
    pub fn new(inventory: Arc<dyn SenseInventory>) -> Self { Self { inventory } }
}

impl Disambiguator for ContextOverlap {
    fn best_sense(&self, context: &[String], target: &str) -> Option<Sense> {
        let candidates = self.inventory.senses(target);
        let others: Vec<Vec<&Sense>> = context
            .iter()
            .filter(|w| w.as_str() != target)
            .map(|w| self.inventory.senses(w))
            .collect();

        let mut best = *candidates.first()?;
        let mut best_score = 0.0;
        for &candidate in &candidates {
            let score: f64 = others
                .iter()
                .map(|senses| {
                    senses.iter().map(|s| self.inventory.similarity(candidate, s)).fold(0.0, f64::max)
                })
                .sum();
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        Some(best.clone())
    }
}

/// Simplified Lesk: the sense whose gloss and lemmas share the most words with the context.
pub struct GlossOverlap {
    inventory: Arc<dyn SenseInventory>,
}

impl GlossOverlap {
    pub fn new(inventory: Arc<dyn SenseInventory>) -> Self { Self { inventory } }
}

impl Disambiguator for GlossOverlap {
    fn best_sense(&self, context: &[String], target: &str) -> Option<Sense> {
        let context: HashSet<&str> = context.iter().map(String::as_str).collect();
        let candidates = self.inventory.senses(target);
        let mut best = *candidates.first()?;
        let mut best_overlap = 0;
        for &candidate in &candidates {
            let mut signature: HashSet<String> = tokenizer::words(&candidate.gloss).into_iter().collect();
            signature.extend(candidate.lemmas.iter().flat_map(|l| tokenizer::words(&l.replace('_', " "))));
            let overlap = signature.iter().filter(|w| context.contains(w.as_str())).count();
            if overlap > best_overlap {
                best_overlap = overlap;
                best = candidate;
            }
        }
        Some(best.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum WsdStrategy {
    #[default]
    ContextOverlap,
    GlossOverlap,
}

impl FromStr for WsdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "context_overlap" | "noun_sense" => Ok(Self::ContextOverlap),
            "gloss_overlap" | "lesk" => Ok(Self::GlossOverlap),
            other => Err(format!("unknown disambiguation strategy {other:?}")),
        }
    }
}

impl From<String> for WsdStrategy {
    fn from(s: String) -> Self { parse_or_default("wsd", Some(s.as_str())) }
}

impl WsdStrategy {
    pub fn build(self, inventory: Arc<dyn SenseInventory>) -> Arc<dyn Disambiguator> {
        match self {
            Self::ContextOverlap => Arc::new(ContextOverlap::new(inventory)),
            Self::GlossOverlap => Arc::new(GlossOverlap::new(inventory)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::tests::small_lexicon;

    fn ctx(words: &[&str]) -> Vec<String> { words.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn context_picks_sense_closest_to_other_terms() {
        let d = ContextOverlap::new(Arc::new(small_lexicon()));
        let s = d.best_sense(&ctx(&["mouse", "computer"]), "mouse").unwrap();
        assert_eq!(s.id, "mouse.n.04");
        let s = d.best_sense(&ctx(&["mouse", "cat"]), "mouse").unwrap();
        assert_eq!(s.id, "mouse.n.01");
    }

    #[test]
    fn without_context_the_first_sense_wins() {
        let d = ContextOverlap::new(Arc::new(small_lexicon()));
        assert_eq!(d.best_sense(&ctx(&["mouse"]), "mouse").unwrap().id, "mouse.n.01");
    }

    #[test]
    fn unknown_terms_have_no_sense() {
        let lex: Arc<dyn SenseInventory> = Arc::new(small_lexicon());
        for strategy in [WsdStrategy::ContextOverlap, WsdStrategy::GlossOverlap] {
            assert!(strategy.build(lex.clone()).best_sense(&ctx(&["zyzzyva"]), "zyzzyva").is_none());
        }
    }

    #[test]
    fn gloss_overlap_uses_definitions() {
        let d = GlossOverlap::new(Arc::new(small_lexicon()));
        let s = d.best_sense(&ctx(&["mouse", "cursor", "hand"]), "mouse").unwrap();
        assert_eq!(s.id, "mouse.n.04");
        let s = d.best_sense(&ctx(&["mouse", "tail"]), "mouse").unwrap();
        assert_eq!(s.id, "mouse.n.01");
    }

    #[test]
    fn strategy_names() {
        assert_eq!("lesk".parse::<WsdStrategy>(), Ok(WsdStrategy::GlossOverlap));
        assert_eq!("context-overlap".parse::<WsdStrategy>(), Ok(WsdStrategy::ContextOverlap));
        let s: WsdStrategy = serde_json::from_str(r#""gloss_overlap""#).unwrap();
        assert_eq!(s, WsdStrategy::GlossOverlap);
        let s: WsdStrategy = serde_json::from_str(r#""random""#).unwrap();
        assert_eq!(s, WsdStrategy::ContextOverlap);
    }
}
