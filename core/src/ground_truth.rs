use anyhow::Result;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::{Position, Url};

use crate::links::{normalize_title, LinkExtractor};
use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org/wiki/";

/// Link of the page titled `title` under `base`, e.g. `.../wiki/Roman_Empire`.
pub fn link_for_title(base: &str, title: &str) -> String {
    format!("{base}{}", normalize_title(title).replace(' ', "_"))
}

/// Fragment removed, path percent-decoded, spaces as underscores.
pub fn canonical_link(link: &str) -> String {
    let link = link.trim();
    let Ok(mut url) = Url::parse(link) else {
        let no_fragment = link.split('#').next().unwrap_or("");
        return percent_decode_str(no_fragment).decode_utf8_lossy().replace(' ', "_");
    };
    url.set_fragment(None);
    let path = percent_decode_str(url.path()).decode_utf8_lossy().replace(' ', "_");
    let mut out = format!("{}{path}", &url[..Position::BeforePath]);
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// Decides whether a harvested link names an article of the corpus.
pub struct LinkValidator {
    base_url: String,
    extractor: LinkExtractor,
}

impl LinkValidator {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.to_string(), extractor: LinkExtractor::default() }
    }

    /// The canonical form of `raw` if it is acceptable and not already in `accepted`.
    pub fn accept(&self, raw: &str, accepted: &[String]) -> Option<String> {
        let link = canonical_link(raw);
        let rest = link.strip_prefix(self.base_url.as_str())?;
        if rest.is_empty() || link.contains("Wiktionary:") {
            return None;
        }
        if let Some((prefix, _)) = rest.trim_start_matches(':').split_once(':') {
            if self.extractor.is_foreign_prefix(prefix) {
                return None;
            }
        }
        if accepted.contains(&link) {
            return None;
        }
        Some(link)
    }
}

/// Supplies the ordered relevant links for each query.
pub trait GroundTruthProvider {
    fn fetch(&self, queries: &[String], per_query: usize) -> Result<BTreeMap<String, Vec<String>>>;
}

/// Reads raw search-engine results harvested offline (a JSON object: query -> links)
/// and keeps the first `per_query` valid links of each query.
pub struct HarvestFileProvider {
    path: PathBuf,
    validator: LinkValidator,
}

impl HarvestFileProvider {
    pub fn new(path: impl Into<PathBuf>, base_url: &str) -> Self {
        Self { path: path.into(), validator: LinkValidator::new(base_url) }
    }
}

impl GroundTruthProvider for HarvestFileProvider {
    fn fetch(&self, queries: &[String], per_query: usize) -> Result<BTreeMap<String, Vec<String>>> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::GroundTruthUnavailable(format!("{}: {e}", self.path.display())))?;
        let harvested: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw)
            .map_err(|e| Error::GroundTruthUnavailable(format!("{}: {e}", self.path.display())))?;

        let mut out = BTreeMap::new();
        for query in queries {
            let candidates = harvested
                .get(query)
                .ok_or_else(|| Error::GroundTruthUnavailable(format!("no harvested results for {query:?}")))?;
            let mut accepted: Vec<String> = Vec::new();
            for link in candidates {
                if accepted.len() == per_query {
                    break;
                }
                if let Some(link) = self.validator.accept(link, &accepted) {
                    accepted.push(link);
                }
            }
            tracing::debug!(query = query.as_str(), kept = accepted.len(), seen = candidates.len(), "ground truth filtered");
            out.insert(query.clone(), accepted);
        }
        Ok(out)
    }
}

/// The reference set R: ordered relevant links per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelevanceSet {
    sets: BTreeMap<String, Vec<String>>,
}

impl RelevanceSet {
    pub fn from_map(sets: BTreeMap<String, Vec<String>>) -> Self { Self { sets } }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Loads `cache` when present; otherwise asks `provider` and writes the cache first.
    /// Every list is then cut to its first `relevant_cap` links.
    pub fn load_or_fetch(
        cache: &Path,
        queries: &[String],
        provider: &dyn GroundTruthProvider,
        per_query: usize,
        relevant_cap: usize,
    ) -> Result<Self> {
        let full = if cache.exists() {
            tracing::info!(cache = %cache.display(), "loading ground truth cache");
            Self::load(cache)?
        } else {
            tracing::info!(queries = queries.len(), per_query, "fetching ground truth");
            let fetched = Self::from_map(provider.fetch(queries, per_query)?);
            fetched.save(cache)?;
            fetched
        };
        for q in queries.iter().filter(|q| !full.sets.contains_key(q.as_str())) {
            tracing::warn!(query = q.as_str(), "no ground truth for query");
        }
        Ok(full.capped(relevant_cap))
    }

    pub fn capped(&self, n: usize) -> Self {
        Self { sets: self.sets.iter().map(|(q, links)| (q.clone(), links.iter().take(n).cloned().collect())).collect() }
    }

    /// Relevant links of `query`, empty when unknown.
    pub fn get(&self, query: &str) -> &[String] {
        self.sets.get(query).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize { self.sets.len() }

    pub fn is_empty(&self) -> bool { self.sets.is_empty() }
}
