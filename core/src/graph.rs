//! Page link graph; staged titles are resolved once every page is known.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::links::normalize_title;
use crate::{DocId, Error};

/// Bidirectional title <-> page id map owned by the graph builder.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TitleTable {
    by_title: HashMap<String, DocId>,
    by_id: HashMap<DocId, String>,
}

impl TitleTable {
    /// Returns false, leaving the table untouched, if either side is already mapped.
    pub fn insert(&mut self, id: DocId, title: String) -> bool {
        if self.by_id.contains_key(&id) || self.by_title.contains_key(&title) {
            return false;
        }
        self.by_title.insert(title.clone(), id);
        self.by_id.insert(id, title);
        true
    }

    pub fn id(&self, title: &str) -> Option<DocId> { self.by_title.get(title).copied() }

    pub fn title(&self, id: DocId) -> Option<&str> { self.by_id.get(&id).map(String::as_str) }

    pub fn len(&self) -> usize { self.by_id.len() }

    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }
}

/// Directed graph of page ids. Adjacency sets collapse duplicate edges.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkGraph {
    adjacency: BTreeMap<DocId, BTreeSet<DocId>>,
}

impl LinkGraph {
    pub fn new() -> Self { Self::default() }

    /// Builds a graph from explicit nodes and edges; edges touching unknown nodes are ignored.
    pub fn from_edges(nodes: &[DocId], edges: &[(DocId, DocId)]) -> Self {
        let mut g = Self::new();
        for &n in nodes {
            g.add_node(n);
        }
        for &(a, b) in edges {
            g.add_edge(a, b);
        }
        g
    }

    pub fn add_node(&mut self, id: DocId) { self.adjacency.entry(id).or_default(); }

    /// Inserts `from -> to` if both nodes exist. Returns whether a new edge was added.
    pub fn add_edge(&mut self, from: DocId, to: DocId) -> bool {
        if !self.adjacency.contains_key(&to) {
            return false;
        }
        match self.adjacency.get_mut(&from) {
            Some(out) => out.insert(to),
            None => false,
        }
    }

    pub fn contains(&self, id: DocId) -> bool { self.adjacency.contains_key(&id) }

    pub fn node_count(&self) -> usize { self.adjacency.len() }

    pub fn edge_count(&self) -> usize { self.adjacency.values().map(BTreeSet::len).sum() }

    pub fn out_degree(&self, id: DocId) -> usize { self.adjacency.get(&id).map_or(0, BTreeSet::len) }

    /// Node ids in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = DocId> + '_ { self.adjacency.keys().copied() }

    pub fn successors(&self, id: DocId) -> impl Iterator<Item = DocId> + '_ {
        self.adjacency.get(&id).into_iter().flat_map(|s| s.iter().copied())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EdgeStats {
    pub resolved: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct GraphStore {
    titles: TitleTable,
    /// title -> (page id, outbound link titles), discarded by `compute_edges`.
    staging: HashMap<String, (DocId, BTreeSet<String>)>,
    graph: LinkGraph,
    finalized: bool,
}

impl GraphStore {
    pub fn new() -> Self { Self::default() }

    /// Registers a page and stages its outbound titles without resolving them.
    pub fn add_page<I, S>(&mut self, id: DocId, title: &str, outbound: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.finalized {
            return Err(Error::EdgesAlreadyComputed);
        }
        let title = normalize_title(title);
        if !self.titles.insert(id, title.clone()) {
            tracing::warn!(id, %title, "duplicate page ignored");
            return Err(Error::DuplicatePage { id, title });
        }
        let targets = outbound
            .into_iter()
            .map(|t| normalize_title(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        self.graph.add_node(id);
        self.staging.insert(title, (id, targets));
        Ok(())
    }

    /// Resolves every staged title against the known pages. Must run exactly once.
    pub fn compute_edges(&mut self) -> Result<EdgeStats, Error> {
        if self.finalized {
            return Err(Error::EdgesAlreadyComputed);
        }
        let mut stats = EdgeStats::default();
        for (_, (id, targets)) in self.staging.drain() {
            for target in targets {
                match self.titles.id(&target) {
                    Some(to) => {
                        self.graph.add_edge(id, to);
                        stats.resolved += 1;
                    }
                    None => stats.dropped += 1,
                }
            }
        }
        self.finalized = true;
        tracing::debug!(resolved = stats.resolved, dropped = stats.dropped, "edges computed");
        Ok(stats)
    }

    pub fn graph(&self) -> &LinkGraph { &self.graph }

    pub fn titles(&self) -> &TitleTable { &self.titles }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_references_resolve_after_all_pages_are_known() {
        let mut store = GraphStore::new();
        store.add_page(0, "Alpha", ["Beta", "Gamma"]).unwrap();
        store.add_page(1, "Beta", ["Alpha"]).unwrap();
        store.add_page(2, "Gamma", Vec::<String>::new()).unwrap();
        assert_eq!(store.graph().edge_count(), 0);

        let stats = store.compute_edges().unwrap();
        assert_eq!(stats, EdgeStats { resolved: 3, dropped: 0 });
        let succ: Vec<_> = store.graph().successors(0).collect();
        assert_eq!(succ, vec![1, 2]);
    }

    #[test]
    fn missing_targets_are_dropped_without_phantom_nodes() {
        let mut store = GraphStore::new();
        store.add_page(0, "Alpha", ["Nowhere", "Beta"]).unwrap();
        store.add_page(1, "Beta", Vec::<&str>::new()).unwrap();
        let stats = store.compute_edges().unwrap();
        assert_eq!(stats.dropped, 1);
        assert_eq!(store.graph().node_count(), 2);
        assert_eq!(store.graph().edge_count(), 1);
    }

    #[test]
    fn duplicates_are_rejected_without_corrupting_state() {
        let mut store = GraphStore::new();
        store.add_page(0, "Alpha", ["Beta"]).unwrap();
        let err = store.add_page(0, "Other", ["Alpha"]).unwrap_err();
        assert!(matches!(err, Error::DuplicatePage { id: 0, .. }));
        assert!(store.add_page(5, "alpha", ["Beta"]).is_err());
        assert_eq!(store.titles().len(), 1);
        assert_eq!(store.titles().title(0), Some("Alpha"));
    }

    #[test]
    fn self_links_after_normalization_become_self_loops() {
        let mut store = GraphStore::new();
        store.add_page(3, "Solar energy", ["solar_energy"]).unwrap();
        store.compute_edges().unwrap();
        assert_eq!(store.graph().successors(3).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn edges_are_computed_once() {
        let mut store = GraphStore::new();
        store.add_page(0, "Alpha", ["Alpha", "Alpha"]).unwrap();
        store.compute_edges().unwrap();
        assert_eq!(store.graph().edge_count(), 1);
        assert!(matches!(store.compute_edges(), Err(Error::EdgesAlreadyComputed)));
        assert!(store.add_page(1, "Beta", ["Alpha"]).is_err());
    }
}
