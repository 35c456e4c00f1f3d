use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use wikirank_core::backend::{GroupOperator, IndexSearcher, LexicalBackend, WeightingModel};
use wikirank_core::config::SearchSettings;
use wikirank_core::evaluation::{EvaluationConfig, EvaluationEngine};
use wikirank_core::expansion::{ExpansionConfig, QueryExpander};
use wikirank_core::graph::GraphStore;
use wikirank_core::ground_truth::{link_for_title, RelevanceSet, DEFAULT_BASE_URL};
use wikirank_core::index::{IndexBuilder, IndexDocument};
use wikirank_core::lexicon::{Lexicon, Sense};
use wikirank_core::links::{clean_markup, LinkExtractor};
use wikirank_core::pagerank::{compute, PageRankConfig, RankTable};
use wikirank_core::persist::{load_rank_table, save_graph, save_rank_table, save_titles, IndexPaths};
use wikirank_core::retriever::RankedRetriever;
use wikirank_core::wsd::WsdStrategy;

const PAGES: &[(u32, &str, &str)] = &[
    (1, "Roman Empire", "The Roman Empire ruled the Mediterranean. See [[Julius Caesar]] and [[Rome|the city]]."),
    (2, "Rome", "Rome is the capital of Italy and the heart of the [[Roman Empire]]."),
    (3, "Julius Caesar", "Julius Caesar was a Roman general of the [[Roman Empire]], born in [[Rome]]."),
    (4, "Byzantine Empire", "The eastern Roman Empire lasted for centuries around [[Constantinople]]."),
    (5, "Metropolis", "A metropolis is a large city, often a [[Rome|capital]]."),
];

/// One corpus pass: index every page and stage its links, then resolve and rank.
fn build(dir: &Path) -> RankTable {
    let paths = IndexPaths::new(dir);
    let mut builder = IndexBuilder::create(paths.clone(), DEFAULT_BASE_URL).unwrap();
    let mut store = GraphStore::new();
    let extractor = LinkExtractor::default();
    for &(id, title, body) in PAGES {
        let links = extractor.extract(body, title);
        store.add_page(id, title, &links.links).unwrap();
        let text = clean_markup(body);
        builder
            .add_document(IndexDocument { doc_id: id, external_id: title, title, body: &text, url: None })
            .unwrap();
    }
    builder.finish().unwrap();
    let stats = store.compute_edges().unwrap();
    assert_eq!(stats.dropped, 1);
    let out = compute(store.graph(), &PageRankConfig::default());
    save_titles(&paths, store.titles()).unwrap();
    save_graph(&paths, store.graph()).unwrap();
    save_rank_table(&paths, &out.table).unwrap();
    out.table
}

fn retriever(dir: &Path) -> RankedRetriever<IndexSearcher> {
    let ranks = load_rank_table(&IndexPaths::new(dir)).unwrap();
    RankedRetriever::new(IndexSearcher::open(dir).unwrap(), Arc::new(ranks))
}

#[test]
fn linked_pages_outrank_unlinked_ones() {
    let dir = tempfile::tempdir().unwrap();
    let table = build(dir.path());
    let rank = |id: u32| table.get(id).unwrap();
    assert!(rank(1) > rank(3));
    assert!(rank(2) > rank(3));
    assert!(rank(3) > rank(4));
    assert_eq!(rank(4), rank(5));
}

#[test]
fn search_combines_lexical_score_with_page_rank() {
    let dir = tempfile::tempdir().unwrap();
    let table = build(dir.path());
    let r = retriever(dir.path());

    let resp = r.search("roman empire", &SearchSettings::default()).unwrap();
    assert_eq!(resp.total_hits, 4);
    for pair in resp.hits.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
    for hit in &resp.hits {
        assert_eq!(Some(hit.page_rank), table.get(hit.doc_id));
        assert!((hit.final_score - hit.score * hit.page_rank).abs() < 1e-9);
        assert_eq!(hit.link, link_for_title(DEFAULT_BASE_URL, &hit.title));
    }
    let top = &resp.hits[0];
    assert!(top.snippet.as_deref().unwrap_or("").contains("<em>"));

    let lexical = r
        .search("roman empire", &SearchSettings { page_rank: false, ..SearchSettings::default() })
        .unwrap();
    for pair in lexical.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn group_operator_controls_matching() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path());
    let r = retriever(dir.path());

    let and = r.search("rome capital", &SearchSettings::default()).unwrap();
    let ids: Vec<u32> = and.hits.iter().map(|h| h.doc_id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&2) && ids.contains(&5));

    let or = SearchSettings { group: GroupOperator::Or, ..SearchSettings::default() };
    assert!(r.search("rome capital", &or).unwrap().total_hits > and.total_hits);

    let tfidf = SearchSettings { weighting: WeightingModel::TfIdf, ..SearchSettings::default() };
    assert_eq!(r.search("rome capital", &tfidf).unwrap().total_hits, 2);
}

#[test]
fn expansion_reaches_documents_without_query_terms() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path());
    let lexicon = Lexicon::from_senses(vec![Sense {
        id: "general.n.01".into(),
        lemmas: vec!["general".into(), "full_general".into(), "commander".into()],
        gloss: "a general officer of the highest rank".into(),
        hypernyms: vec![],
    }]);
    let expander = QueryExpander::new(WsdStrategy::default().build(Arc::new(lexicon)), ExpansionConfig::default());
    let r = retriever(dir.path()).with_expander(expander);

    let resp = r.search("commander", &SearchSettings::default()).unwrap();
    assert_eq!(resp.expansion_terms, vec!["general", "full"]);
    assert_eq!(resp.expanded_query, "( commander ) OR ( general OR full )^0.5");
    assert_eq!(resp.hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![3]);

    let plain = r.search("commander", &SearchSettings { expand: false, ..SearchSettings::default() }).unwrap();
    assert!(plain.hits.is_empty());
    assert!(plain.expansion_terms.is_empty());
}

#[test]
fn evaluation_over_a_built_index() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path());
    let r = retriever(dir.path());
    let query = "Roman Empire".to_string();
    let reference = RelevanceSet::from_map(BTreeMap::from([(
        query.clone(),
        vec![link_for_title(DEFAULT_BASE_URL, "Roman Empire"), link_for_title(DEFAULT_BASE_URL, "Rome")],
    )]));

    let engine =
        EvaluationEngine::new(&r, SearchSettings::default(), EvaluationConfig::default(), vec![query.clone()], &reference)
            .unwrap();
    assert_eq!(engine.answers(&query).len(), 4);
    let report = engine.report();
    let q = &report.queries[&query];
    assert_eq!(q.relevant_retrieved, 2);
    assert!(q.ndcg > 0.0 && q.ndcg <= 1.0);
    assert_eq!(report.settings.limit, 10);
    assert!(r.backend().document(2).is_some());
}
