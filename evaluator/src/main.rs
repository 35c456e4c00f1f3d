use anyhow::Result;
use clap::Parser;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};
use wikirank_core::backend::{GroupOperator, IndexSearcher, LexicalBackend, WeightingModel};
use wikirank_core::config::{parse_or_default, SearchSettings};
use wikirank_core::evaluation::{default_queries, EvaluationConfig, EvaluationEngine, EvaluationReport, RPrecision};
use wikirank_core::expansion::{ExpansionConfig, QueryExpander};
use wikirank_core::ground_truth::{GroundTruthProvider, HarvestFileProvider, RelevanceSet};
use wikirank_core::lexicon::Lexicon;
use wikirank_core::persist::{load_rank_table, IndexPaths};
use wikirank_core::retriever::{RankedRetriever, ScoreCombination};
use wikirank_core::wsd::WsdStrategy;
use wikirank_core::Error;

#[derive(Parser)]
#[command(name = "wikirank-eval")]
#[command(about = "Measure retrieval quality against a reference relevance set", long_about = None)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Ground-truth cache (query -> relevant links); written on first run
    #[arg(long, default_value = "ground_truth.json")]
    ground_truth: PathBuf,
    /// Harvested search results used to fill a missing cache
    #[arg(long)]
    harvest: Option<PathBuf>,
    /// One query per line; the built-in benchmark when absent
    #[arg(long)]
    queries: Option<PathBuf>,
    /// Lexicon JSON used for query expansion
    #[arg(long)]
    lexicon: Option<PathBuf>,
    #[arg(long, default_value = "context_overlap")]
    wsd: String,
    /// SearchSettings JSON; the flags below override it
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    weighting: Option<String>,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    title_boost: Option<f32>,
    #[arg(long)]
    text_boost: Option<f32>,
    #[arg(long)]
    expand: Option<bool>,
    #[arg(long)]
    pagerank: Option<bool>,
    #[arg(long)]
    combination: Option<String>,
    /// Result limit forced on every query
    #[arg(long, default_value_t = 10)]
    limit: usize,
    /// Ground-truth links per query treated as relevant
    #[arg(long, default_value_t = 10)]
    relevant: usize,
    /// Links kept per query when filling the cache
    #[arg(long, default_value_t = 30)]
    per_query: usize,
    #[arg(long, default_value_t = 10)]
    recall_levels: usize,
    #[arg(long, default_value_t = 10)]
    ndcg_rank: usize,
    #[arg(long, default_value_t = 10)]
    r_precision_rank: usize,
    #[arg(long, default_value_t = 10)]
    cutoff: usize,
    #[arg(long, default_value_t = 1.5)]
    e_beta: f64,
    #[arg(long, default_value_t = 2.0)]
    log_base: f64,
    /// Decimal places shown
    #[arg(long, default_value_t = 3)]
    precision: u32,
    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Args {
    fn search_settings(&self) -> Result<SearchSettings> {
        let mut s = match &self.settings {
            Some(path) => SearchSettings::load(path)?,
            None => SearchSettings::default(),
        };
        if self.weighting.is_some() {
            s.weighting = parse_or_default::<WeightingModel>("weighting", self.weighting.as_deref());
        }
        if self.group.is_some() {
            s.group = parse_or_default::<GroupOperator>("group", self.group.as_deref());
        }
        if self.combination.is_some() {
            s.combination = parse_or_default::<ScoreCombination>("combination", self.combination.as_deref());
        }
        s.boosts.title = self.title_boost.unwrap_or(s.boosts.title);
        s.boosts.text = self.text_boost.unwrap_or(s.boosts.text);
        s.expand = self.expand.unwrap_or(s.expand);
        s.page_rank = self.pagerank.unwrap_or(s.page_rank);
        Ok(s)
    }

    fn evaluation_config(&self) -> EvaluationConfig {
        EvaluationConfig {
            limit: self.limit,
            relevant: self.relevant,
            recall_levels: self.recall_levels,
            ndcg_rank: self.ndcg_rank,
            r_precision_rank: self.r_precision_rank,
            cutoff: self.cutoff,
            e_beta: self.e_beta,
            log_base: self.log_base,
            ..EvaluationConfig::default()
        }
    }
}

/// Stands in for a provider when no harvest file was given.
struct NoProvider;

impl GroundTruthProvider for NoProvider {
    fn fetch(&self, _queries: &[String], _per_query: usize) -> Result<BTreeMap<String, Vec<String>>> {
        Err(Error::GroundTruthUnavailable("no cache and no --harvest file".into()).into())
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let searcher = IndexSearcher::open(&args.index)?;
    let base_url = searcher.base_url().to_string();
    let ranks = load_rank_table(&IndexPaths::new(&args.index))?;
    let mut retriever = RankedRetriever::new(searcher, Arc::new(ranks));
    if let Some(path) = &args.lexicon {
        let wsd = parse_or_default::<WsdStrategy>("wsd", Some(args.wsd.as_str()));
        let lexicon = Lexicon::load(path)?;
        retriever = retriever.with_expander(QueryExpander::new(wsd.build(Arc::new(lexicon)), ExpansionConfig::default()));
    }

    let queries = load_queries(args.queries.as_deref())?;
    let reference = match &args.harvest {
        Some(harvest) => {
            let provider = HarvestFileProvider::new(harvest, &base_url);
            RelevanceSet::load_or_fetch(&args.ground_truth, &queries, &provider, args.per_query, args.relevant)?
        }
        None => RelevanceSet::load_or_fetch(&args.ground_truth, &queries, &NoProvider, args.per_query, args.relevant)?,
    };

    let engine = EvaluationEngine::new(&retriever, args.search_settings()?, args.evaluation_config(), queries, &reference)?;
    let report = engine.report().rounded(args.precision);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn load_queries(path: Option<&Path>) -> Result<Vec<String>> {
    let Some(path) = path else { return Ok(default_queries()) };
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

fn render_report(report: &EvaluationReport) -> String {
    let mut out = String::new();
    let width = report.queries.keys().map(|q| q.chars().count()).max().unwrap_or(5).max(5);
    let _ = writeln!(out, "{:<width$}  {:>8}  {:>11}  {:>9}  {:>9}", "Query", "NDCG", "R-PRECISION", "E-MEASURE", "F-MEASURE");
    for (query, q) in &report.queries {
        let r_prec = match q.r_precision {
            RPrecision::Value(v) => v.to_string(),
            RPrecision::OutOfRange { r, answers } => format!("n/a ({answers}<{r})"),
        };
        let _ = writeln!(out, "{:<width$}  {:>8}  {:>11}  {:>9}  {:>9}", query, q.ndcg, r_prec, q.e_measure, q.f_measure);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "MAP: {}", report.map);
    let _ = writeln!(out, "Mean NDCG: {}", report.mean_ndcg);
    let _ = writeln!(out, "Average precision at recall levels:");
    for p in &report.precision_at_recall {
        let _ = writeln!(out, "  recall {:>5}  precision {}", p.recall, p.precision);
    }
    out
}
