use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;
use wikirank_core::backend::{FieldBoosts, GroupOperator, IndexSearcher, LexicalBackend, WeightingModel};
use wikirank_core::config::{parse_or_default, SearchSettings};
use wikirank_core::expansion::{ExpansionConfig, QueryExpander};
use wikirank_core::graph::LinkGraph;
use wikirank_core::lexicon::Lexicon;
use wikirank_core::persist::{load_graph, load_rank_table, IndexPaths};
use wikirank_core::retriever::{RankedRetriever, ScoreCombination, SearchHit, SearchResponse};
use wikirank_core::wsd::WsdStrategy;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    pub weighting: Option<String>,
    pub group: Option<String>,
    pub title_boost: Option<f32>,
    pub text_boost: Option<f32>,
    pub expand: Option<bool>,
    pub pagerank: Option<bool>,
    pub combination: Option<String>,
}
fn default_k() -> usize { 10 }

impl SearchParams {
    /// Unknown names fall back to their defaults rather than failing the request.
    fn settings(&self) -> SearchSettings {
        let defaults = SearchSettings::default();
        SearchSettings {
            limit: self.k.clamp(1, 100),
            weighting: parse_or_default::<WeightingModel>("weighting", self.weighting.as_deref()),
            group: parse_or_default::<GroupOperator>("group", self.group.as_deref()),
            boosts: FieldBoosts {
                title: self.title_boost.unwrap_or(defaults.boosts.title),
                text: self.text_boost.unwrap_or(defaults.boosts.text),
            },
            expand: self.expand.unwrap_or(defaults.expand),
            page_rank: self.pagerank.unwrap_or(defaults.page_rank),
            combination: parse_or_default::<ScoreCombination>("combination", self.combination.as_deref()),
        }
    }
}

#[derive(Serialize)]
pub struct SearchReply {
    pub query: String,
    pub expanded_query: String,
    pub expansion_terms: Vec<String>,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

impl From<SearchResponse> for SearchReply {
    fn from(r: SearchResponse) -> Self {
        Self {
            query: r.query,
            expanded_query: r.expanded_query,
            expansion_terms: r.expansion_terms,
            took_s: r.took_s,
            total_hits: r.total_hits,
            results: r.hits,
        }
    }
}

/// Loaded once at startup; shared read-only by every request.
#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<RankedRetriever<IndexSearcher>>,
    pub graph: Arc<LinkGraph>,
}

pub struct ServerConfig {
    pub index_dir: PathBuf,
    /// Without a lexicon queries are never expanded.
    pub lexicon: Option<PathBuf>,
    pub wsd: WsdStrategy,
    pub expansion: ExpansionConfig,
}

impl ServerConfig {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self { index_dir: index_dir.into(), lexicon: None, wsd: WsdStrategy::default(), expansion: ExpansionConfig::default() }
    }
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    // Load index, link graph and ranks at startup
    let index_paths = IndexPaths::new(&config.index_dir);
    let ranks = load_rank_table(&index_paths)?;
    let graph = load_graph(&index_paths)?;
    let mut retriever = RankedRetriever::new(IndexSearcher::open(&config.index_dir)?, Arc::new(ranks));
    if let Some(path) = &config.lexicon {
        let lexicon = Lexicon::load(path)?;
        retriever = retriever.with_expander(QueryExpander::new(config.wsd.build(Arc::new(lexicon)), config.expansion));
    }
    let app_state = AppState { retriever: Arc::new(retriever), graph: Arc::new(graph) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchReply>, (StatusCode, String)> {
    let settings = params.settings();
    match state.retriever.search(&params.q, &settings) {
        Ok(resp) => Ok(Json(resp.into())),
        Err(e) => {
            tracing::error!(query = %params.q, error = %e, "search failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<u32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let backend = state.retriever.backend();
    let Some(meta) = backend.document(doc_id) else {
        return Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" }))));
    };
    let mut obj = serde_json::json!({
        "doc_id": doc_id,
        "external_id": meta.external_id,
        "title": meta.title,
        "url": meta.url,
        "page_rank": state.retriever.ranks().get(doc_id),
        "out_degree": state.graph.out_degree(doc_id),
    });
    if let Some(rel) = &meta.text_path {
        if let Ok(text) = std::fs::read_to_string(backend.root().join(rel)) {
            obj["text"] = serde_json::Value::String(text);
        }
    }
    Ok(Json(obj))
}
