use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::backend::{FieldBoosts, GroupOperator, WeightingModel};
use crate::retriever::ScoreCombination;

/// Parses a configuration value, falling back to the type's default on anything unrecognized.
pub fn parse_or_default<T>(name: &str, raw: Option<&str>) -> T
where
    T: FromStr + Default + std::fmt::Debug,
    T::Err: Display,
{
    match raw.map(str::parse::<T>) {
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            let fallback = T::default();
            tracing::warn!(setting = name, error = %e, ?fallback, "unrecognized setting, using default");
            fallback
        }
        None => T::default(),
    }
}

/// Everything `RankedRetriever::search` needs besides the query text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub limit: usize,
    pub weighting: WeightingModel,
    pub group: GroupOperator,
    pub boosts: FieldBoosts,
    pub expand: bool,
    pub page_rank: bool,
    /// Combination applied when `page_rank` is on.
    pub combination: ScoreCombination,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            limit: 10,
            weighting: WeightingModel::default(),
            group: GroupOperator::default(),
            boosts: FieldBoosts::default(),
            expand: true,
            page_rank: true,
            combination: ScoreCombination::default(),
        }
    }
}

impl SearchSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The combination actually applied to hits.
    pub fn effective_combination(&self) -> ScoreCombination {
        if self.page_rank { self.combination } else { ScoreCombination::LexicalOnly }
    }
}
