//! Internal-link extraction and markup cleanup for wiki page bodies.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref LINK: Regex = Regex::new(r"\[\[([^\]]+?)\]\]").expect("valid regex");
    static ref PREFIX: Regex = Regex::new(r"^:?([^:]+?):").expect("valid regex");
    static ref CLEANUP: Vec<(Regex, &'static str)> = [
        (r"(?s)\{\{[^}{]*?url=.*?\}\}", ""),
        (r"(?s)\{\{[^}{]*?lang.*?\}\}", ""),
        (r"(?s)\{\{[^}{]*?reflist.*?\}\}", ""),
        (r"(?s)\{\{[^}{]*?commons.*?\}\}", ""),
        (r"(?s)\{\{[^}{]*?coord.*?\}\}", ""),
        (r"(?s)\[http.+?\]", ""),
        (r"(?s)\shttp.+?\s", " "),
        (r"\s[^\s]+\.(com|org|it|en)\s?", " "),
        (r"(?s)<gallery.*?</gallery>", ""),
        (r"\[\[(File|Media|Image):.*?\]\]", ""),
        (r"(?s)<[^<]*?>", ""),
        (r"[\[\]{}/*]", ""),
        (r"[:|=]", " "),
    ]
    .iter()
    .map(|(p, r)| (Regex::new(p).expect("valid regex"), *r))
    .collect();
}

/// Namespaces whose pages are never part of the article corpus.
const EXCLUDED_NAMESPACES: &[&str] = &[
    "user", "wikipedia", "wp", "project", "file", "image", "mediawiki", "template", "help",
    "category", "portal", "draft", "timedtext", "module", "book", "special", "media", "talk",
    "gadget", "education program",
];

const DROPPED_PREFIXES: &[&str] = &["{{", "Image:", "File:", "Media:", "Manual:", "Extension:"];

const DEFAULT_INTERWIKI: &[&str] = &[
    "w", "wikt", "wiktionary", "commons", "meta", "m", "q", "wikiquote", "s", "wikisource", "b",
    "wikibooks", "n", "wikinews", "v", "wikiversity", "voy", "wikivoyage", "d", "wikidata",
    "species", "wikispecies", "mw", "mediawikiwiki", "phab", "foundation", "wmf", "incubator",
    "c", "google", "imdbtitle", "imdbname", "doi", "arxiv", "rfc", "en", "de", "fr", "it", "es",
    "pt", "nl", "pl", "ru", "ja", "zh", "sv", "uk", "ar", "fa", "ko", "fi", "no", "cs", "hu", "he",
];

/// Links found in one page body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageLinks {
    pub links: Vec<String>,
    pub categories: Vec<String>,
}

/// Canonical page title: underscores as spaces, single spaces, upper-case first letter.
pub fn normalize_title(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strips templates, external links, html and markup punctuation, keeping link text.
pub fn clean_markup(text: &str) -> String {
    let mut out = text.to_string();
    for (re, rep) in CLEANUP.iter() {
        out = re.replace_all(&out, *rep).into_owned();
    }
    out
}

pub struct LinkExtractor {
    interwiki: HashSet<String>,
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::with_interwiki(DEFAULT_INTERWIKI.iter().map(|s| s.to_string()))
    }
}

impl LinkExtractor {
    pub fn with_interwiki<I: IntoIterator<Item = String>>(prefixes: I) -> Self {
        Self { interwiki: prefixes.into_iter().map(|p| p.to_lowercase()).collect() }
    }

    /// True if `prefix` names an interwiki target or an excluded namespace.
    pub fn is_foreign_prefix(&self, prefix: &str) -> bool {
        let p = prefix.trim().replace('_', " ").to_lowercase();
        self.interwiki.contains(&p)
            || EXCLUDED_NAMESPACES.contains(&p.as_str())
            || p.ends_with(" talk")
    }

    /// Internal article links and categories of the page titled `title`.
    /// Targets are normalized; duplicates are kept in first-seen order only once.
    pub fn extract(&self, text: &str, title: &str) -> PageLinks {
        let mut out = PageLinks::default();
        let mut seen = HashSet::new();
        for cap in LINK.captures_iter(text) {
            let target = cap[1].split('|').next().unwrap_or("").trim();
            if target.starts_with('#') || target == title {
                continue;
            }
            match self.resolve(target, title) {
                Some(Resolved::Link(t)) if !t.is_empty() && seen.insert(t.clone()) => out.links.push(t),
                Some(Resolved::Category(c)) if !c.is_empty() => out.categories.push(c),
                _ => {}
            }
        }
        out
    }

    fn resolve(&self, target: &str, title: &str) -> Option<Resolved> {
        if DROPPED_PREFIXES.iter().any(|p| target.starts_with(p)) {
            return None;
        }
        let target = target.split('#').next().unwrap_or("");
        let target = target.trim_end().trim_end_matches('/');

        if let Some(sub) = target.strip_prefix("../") {
            let parent = title.rsplit_once('/').map(|(p, _)| p).unwrap_or(title);
            return Some(Resolved::Link(normalize_title(&format!("{parent}/{sub}"))));
        }
        if target.starts_with('/') {
            return Some(Resolved::Link(normalize_title(&format!("{title}{target}"))));
        }
        if let Some(cat) = target.strip_prefix("Category:") {
            return Some(Resolved::Category(normalize_title(cat)));
        }
        if let Some(cap) = PREFIX.captures(target) {
            if self.is_foreign_prefix(&cap[1]) {
                return None;
            }
        }
        Some(Resolved::Link(normalize_title(target.trim_start_matches(':'))))
    }
}

enum Resolved {
    Link(String),
    Category(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_titles() {
        assert_eq!(normalize_title("steve_jobs"), "Steve jobs");
        assert_eq!(normalize_title("  Roman   Empire "), "Roman Empire");
        assert_eq!(normalize_title(""), "");
    }

    #[test]
    fn extracts_internal_links() {
        let text = "See [[Apple Inc.|Apple]], [[Steve_Jobs#Early life]], [[#History]], \
                    [[Category:Companies]], [[wikt:apple]], [[Talk:Apple]], [[File:Logo.png]], \
                    [[:Macintosh]] and [[Apple Inc.]] again.";
        let links = LinkExtractor::default().extract(text, "Apple");
        assert_eq!(links.links, vec!["Apple Inc.", "Steve Jobs", "Macintosh"]);
        assert_eq!(links.categories, vec!["Companies"]);
    }

    #[test]
    fn resolves_subpages() {
        let ex = LinkExtractor::default();
        let links = ex.extract("[[/Archive]] and [[../Sibling]]", "Guide/Part one");
        assert_eq!(links.links, vec!["Guide/Part one/Archive", "Guide/Sibling"]);
    }

    #[test]
    fn link_to_own_title_is_ignored() {
        let links = LinkExtractor::default().extract("[[Apple]] is bold", "Apple");
        assert!(links.links.is_empty());
    }

    #[test]
    fn cleans_markup() {
        let cleaned = clean_markup("An <b>apple</b> [[Fruit|fruit]] {{cite web|url=http://x.org}} tree");
        assert!(cleaned.contains("apple"));
        assert!(cleaned.contains("Fruit"));
        assert!(!cleaned.contains('<'));
        assert!(!cleaned.contains("url"));
    }
}
