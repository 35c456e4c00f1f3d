use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;
use wikirank_core::config::parse_or_default;
use wikirank_core::graph::GraphStore;
use wikirank_core::ground_truth::DEFAULT_BASE_URL;
use wikirank_core::index::{IndexBuilder, IndexDocument};
use wikirank_core::links::{clean_markup, LinkExtractor};
use wikirank_core::pagerank::{self, DanglingPolicy, PageRankConfig, RankTable};
use wikirank_core::persist::{
    load_doc_id_map, load_graph, load_titles, save_graph, save_rank_table, save_titles, IndexPaths,
};
use wikirank_core::DocId;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One page of the corpus. `id` may be a string or a number; `links` overrides
/// the links found in `body` markup.
#[derive(Debug, Deserialize)]
struct InputDoc {
    id: serde_json::Value,
    title: String,
    body: String,
    url: Option<String>,
    #[serde(default)]
    links: Option<Vec<String>>,
}

#[derive(Parser)]
#[command(name = "wikirank-indexer")]
#[command(about = "Build the inverted index, link graph and PageRank table of a wiki corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build everything from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Prefix that turns a page title into its link
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
        #[command(flatten)]
        rank: RankArgs,
    },
    /// Recompute pagerank.bin from a persisted link graph
    Rank {
        /// Index directory
        #[arg(long)]
        index: String,
        #[command(flatten)]
        rank: RankArgs,
        /// Highest-ranked pages to log afterwards
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Args)]
struct RankArgs {
    #[arg(long, default_value_t = 0.85)]
    damping: f64,
    #[arg(long, default_value_t = 1e-4)]
    epsilon: f64,
    #[arg(long, default_value_t = 100)]
    max_iterations: usize,
    /// uniform | drop
    #[arg(long, default_value = "uniform")]
    dangling: String,
}

impl RankArgs {
    fn config(&self) -> PageRankConfig {
        PageRankConfig {
            damping: self.damping,
            epsilon: self.epsilon,
            max_iterations: self.max_iterations,
            dangling: parse_or_default::<DanglingPolicy>("dangling", Some(self.dangling.as_str())),
        }
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, base_url, rank } => build_index(&input, &output, &base_url, &rank.config()),
        Commands::Rank { index, rank, top } => rank_index(&index, &rank.config(), top),
    }
}

/// Pages seen in the single corpus pass, fed to both the index and the graph.
struct Ingest {
    builder: IndexBuilder,
    store: GraphStore,
    extractor: LinkExtractor,
    next_doc_id: DocId,
    skipped: usize,
}

impl Ingest {
    fn ingest(&mut self, doc: InputDoc) -> Result<()> {
        let doc_id = self.next_doc_id;
        let links = match doc.links {
            Some(links) => links,
            None => self.extractor.extract(&doc.body, &doc.title).links,
        };
        // duplicate titles are logged by the store and skipped here
        if self.store.add_page(doc_id, &doc.title, &links).is_err() {
            self.skipped += 1;
            return Ok(());
        }
        self.next_doc_id += 1;

        let external_id = match &doc.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let text = clean_markup(&doc.body);
        self.builder.add_document(IndexDocument {
            doc_id,
            external_id: &external_id,
            title: &doc.title,
            body: &text,
            url: doc.url.as_deref(),
        })
    }
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn build_index(input: &str, output: &str, base_url: &str, rank: &PageRankConfig) -> Result<()> {
    let out_paths = IndexPaths::new(output);
    let mut ingest = Ingest {
        builder: IndexBuilder::create(out_paths.clone(), base_url)?,
        store: GraphStore::new(),
        extractor: LinkExtractor::default(),
        next_doc_id: 0,
        skipped: 0,
    };

    for file in input_files(Path::new(input)) {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            index_jsonl(&file, &mut ingest)?;
        } else {
            index_json(&file, &mut ingest)?;
        }
    }
    tracing::info!(num_docs = ingest.next_doc_id, skipped = ingest.skipped, "ingested documents");

    let Ingest { builder, mut store, .. } = ingest;
    builder.finish()?;
    let stats = store.compute_edges()?;
    tracing::info!(edges = store.graph().edge_count(), resolved = stats.resolved, dropped = stats.dropped, "link graph built");

    let outcome = pagerank::compute(store.graph(), rank);
    save_titles(&out_paths, store.titles())?;
    save_graph(&out_paths, store.graph())?;
    save_rank_table(&out_paths, &outcome.table)?;

    tracing::info!(output, iterations = outcome.iterations, converged = outcome.converged, "index build complete");
    Ok(())
}

fn rank_index(index: &str, rank: &PageRankConfig, top: usize) -> Result<()> {
    let paths = IndexPaths::new(index);
    let graph = load_graph(&paths)?;
    let outcome = pagerank::compute(&graph, rank);
    save_rank_table(&paths, &outcome.table)?;
    tracing::info!(index, nodes = graph.node_count(), iterations = outcome.iterations, converged = outcome.converged, "page rank recomputed");
    for page in top_pages(&paths, &outcome.table, top)? {
        tracing::info!(doc_id = page.doc_id, external_id = %page.external_id, title = %page.title, score = page.score, "top page");
    }
    Ok(())
}

struct TopPage {
    doc_id: DocId,
    external_id: String,
    title: String,
    score: f64,
}

fn top_pages(paths: &IndexPaths, table: &RankTable, n: usize) -> Result<Vec<TopPage>> {
    let titles = load_titles(paths)?;
    let external: HashMap<DocId, String> = load_doc_id_map(paths)?.into_iter().map(|(ext, id)| (id, ext)).collect();
    Ok(table
        .ranked()
        .into_iter()
        .take(n)
        .map(|(doc_id, score)| TopPage {
            doc_id,
            external_id: external.get(&doc_id).cloned().unwrap_or_default(),
            title: titles.title(doc_id).unwrap_or_default().to_string(),
            score,
        })
        .collect())
}

fn index_jsonl(file: &Path, ingest: &mut Ingest) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)?;
        ingest.ingest(doc)?;
    }
    Ok(())
}

fn index_json(file: &Path, ingest: &mut Ingest) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                ingest.ingest(doc)?;
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            ingest.ingest(doc)?;
        }
        _ => tracing::warn!(file = %file.display(), "expected a JSON object or array, skipped"),
    }
    Ok(())
}
