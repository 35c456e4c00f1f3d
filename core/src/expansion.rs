use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::tokenizer;
use crate::wsd::Disambiguator;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Upper bound on expansion terms contributed by one query token.
    pub max_terms_per_token: usize,
    /// Weight of the expansion group relative to the user's own terms, in (0, 1).
    pub boost: f32,
    /// Shorter expansion terms are discarded.
    pub min_term_chars: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { max_terms_per_token: 2, boost: 0.5, min_term_chars: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub original: String,
    pub terms: Vec<String>,
    pub boost: f32,
}

impl ExpandedQuery {
    /// A query that carries no expansion.
    pub fn unexpanded(text: &str) -> Self {
        Self { original: text.to_string(), terms: Vec::new(), boost: 1.0 }
    }

    pub fn is_expanded(&self) -> bool { !self.terms.is_empty() }
}

impl fmt::Display for ExpandedQuery {
    /// `( original ) OR ( a OR b )^boost`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {} )", self.original)?;
        if self.is_expanded() {
            write!(f, " OR ( {} )^{}", self.terms.join(" OR "), self.boost)?;
        }
        Ok(())
    }
}

pub struct QueryExpander {
    disambiguator: Arc<dyn Disambiguator>,
    config: ExpansionConfig,
}

impl QueryExpander {
    /// A boost outside (0, 1) is replaced by the default one.
    pub fn new(disambiguator: Arc<dyn Disambiguator>, mut config: ExpansionConfig) -> Self {
        if !(config.boost > 0.0 && config.boost < 1.0) {
            let fallback = ExpansionConfig::default().boost;
            tracing::warn!(boost = config.boost, fallback, "expansion boost must lie in (0, 1), using default");
            config.boost = fallback;
        }
        Self { disambiguator, config }
    }

    pub fn expand(&self, text: &str) -> ExpandedQuery {
        let tokens = tokenizer::remove_stopwords(tokenizer::words(text));
        let query_terms: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        let mut terms: Vec<String> = Vec::new();

        for token in &tokens {
            let Some(sense) = self.disambiguator.best_sense(&tokens, token) else {
                continue;
            };
            let mut added = 0;
            for lemma in &sense.lemmas {
                for candidate in split_lemma(lemma) {
                    if added == self.config.max_terms_per_token {
                        break;
                    }
                    if candidate.chars().count() < self.config.min_term_chars
                        || tokenizer::is_stopword(&candidate)
                        || query_terms.contains(candidate.as_str())
                        || terms.contains(&candidate)
                    {
                        continue;
                    }
                    terms.push(candidate);
                    added += 1;
                }
            }
        }

        tracing::debug!(query = text, expansion = ?terms, "query expanded");
        ExpandedQuery { original: text.to_string(), terms, boost: self.config.boost }
    }
}

/// `Canis_familiaris` -> `["canis", "familiaris"]`; punctuation and hyphens split words.
fn split_lemma(lemma: &str) -> Vec<String> {
    let spaced: String = lemma
        .chars()
        .map(|c| if c == '_' || c == '-' || (c.is_ascii_punctuation() && c != '\'') { ' ' } else { c })
        .collect();
    tokenizer::words(&spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::tests::small_lexicon;
    use crate::wsd::ContextOverlap;

    fn expander(max: usize) -> QueryExpander {
        let wsd = Arc::new(ContextOverlap::new(Arc::new(small_lexicon())));
        QueryExpander::new(wsd, ExpansionConfig { max_terms_per_token: max, ..Default::default() })
    }

    #[test]
    fn expands_with_disambiguated_synonyms() {
        let q = expander(4).expand("the computer mouse");
        assert!(q.terms.contains(&"computing".to_string()));
        assert!(!q.terms.contains(&"rodent".to_string()));
        assert_eq!(q.to_string(), format!("( the computer mouse ) OR ( {} )^0.5", q.terms.join(" OR ")));
    }

    #[test]
    fn boost_outside_unit_interval_falls_back() {
        let wsd = Arc::new(ContextOverlap::new(Arc::new(small_lexicon())));
        for boost in [2.0, 1.0, 0.0, -0.5, f32::NAN] {
            let q = QueryExpander::new(wsd.clone(), ExpansionConfig { boost, max_terms_per_token: 4, ..Default::default() })
                .expand("computer mouse");
            assert!(q.is_expanded());
            assert_eq!(q.boost, 0.5);
        }
        let q = QueryExpander::new(wsd, ExpansionConfig { boost: 0.2, max_terms_per_token: 4, ..Default::default() })
            .expand("computer mouse");
        assert_eq!(q.boost, 0.2);
    }

    #[test]
    fn never_repeats_query_terms_and_respects_cap() {
        let q = expander(1).expand("Dog computer");
        let lower: Vec<String> = q.terms.iter().map(|t| t.to_lowercase()).collect();
        assert!(!lower.contains(&"dog".to_string()));
        assert!(!lower.contains(&"computer".to_string()));
        assert!(q.terms.len() <= 2);
        assert_eq!(q.terms, vec!["domestic", "computing"]);
    }

    #[test]
    fn unknown_words_expand_to_nothing() {
        let q = expander(2).expand("zyzzyva quux");
        assert!(!q.is_expanded());
        assert_eq!(q.to_string(), "( zyzzyva quux )");
    }

    #[test]
    fn splits_multiword_lemmas() {
        assert_eq!(split_lemma("Canis_familiaris"), vec!["canis", "familiaris"]);
        assert_eq!(split_lemma("free-energy"), vec!["free", "energy"]);
    }
}
