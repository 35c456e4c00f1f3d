use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;
use wikirank_core::graph::GraphStore;
use wikirank_core::ground_truth::DEFAULT_BASE_URL;
use wikirank_core::index::{IndexBuilder, IndexDocument};
use wikirank_core::pagerank::{compute, PageRankConfig};
use wikirank_core::persist::{save_graph, save_rank_table, save_titles, IndexPaths};
use wikirank_server::{build_app, ServerConfig};

/// Two pages about rust; "Rust" is linked from both others so it carries more rank.
fn build_tiny_index(dir: &std::path::Path) {
    let paths = IndexPaths::new(dir);
    let pages: [(u32, &str, &str, &[&str]); 3] = [
        (0, "Rust", "Rust is great. rust systems programming.", &[]),
        (1, "Cargo", "Learning rust with cargo. Rust rust rust.", &["Rust"]),
        (2, "Ferris", "The crab mascot.", &["Rust"]),
    ];
    let mut builder = IndexBuilder::create(paths.clone(), DEFAULT_BASE_URL).unwrap();
    let mut store = GraphStore::new();
    for (id, title, body, links) in pages {
        store.add_page(id, title, links.iter()).unwrap();
        builder
            .add_document(IndexDocument { doc_id: id, external_id: title, title, body, url: None })
            .unwrap();
    }
    builder.finish().unwrap();
    store.compute_edges().unwrap();
    let out = compute(store.graph(), &PageRankConfig::default());
    save_titles(&paths, store.titles()).unwrap();
    save_graph(&paths, store.graph()).unwrap();
    save_rank_table(&paths, &out.table).unwrap();
}

async fn call(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn doc_ids(json: &Value) -> Vec<u64> {
    json["results"].as_array().unwrap().iter().map(|h| h["doc_id"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = build_app(ServerConfig::new(dir.path())).unwrap();

    let (status, body) = call(app.clone(), "/search?q=rust&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_hits"].as_u64(), Some(2));
    assert_eq!(json["expanded_query"].as_str(), Some("( rust )"));
    assert_eq!(doc_ids(&json), vec![0, 1]);
    let top = &json["results"][0];
    assert_eq!(top["link"].as_str(), Some("https://en.wikipedia.org/wiki/Rust"));
    assert!(top["snippet"].as_str().unwrap().contains("<em>Rust</em>"));
    assert!(top["page_rank"].as_f64().unwrap() > json["results"][1]["page_rank"].as_f64().unwrap());

    // unknown names fall back to defaults instead of failing
    let (status, _) = call(app, "/search?q=rust&weighting=PL2&group=xor&combination=max").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn pagerank_can_be_switched_off() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = build_app(ServerConfig::new(dir.path())).unwrap();

    let (_, body) = call(app, "/search?q=rust&pagerank=false&weighting=tf_idf").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    let hits = json["results"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    for h in hits {
        assert_eq!(h["score"], h["final_score"]);
    }
}

#[tokio::test]
async fn doc_endpoint_reports_rank_and_links() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = build_app(ServerConfig::new(dir.path())).unwrap();

    let (status, body) = call(app.clone(), "/doc/1").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["title"].as_str(), Some("Cargo"));
    assert_eq!(json["out_degree"].as_u64(), Some(1));
    assert!(json["page_rank"].as_f64().unwrap() > 0.0);
    assert!(json["text"].as_str().unwrap().starts_with("Learning rust"));

    let (status, _) = call(app, "/doc/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn missing_rank_table_is_fatal() {
    let dir = tempdir().unwrap();
    assert!(build_app(ServerConfig::new(dir.path())).is_err());
}
