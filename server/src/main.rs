use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use wikirank_core::config::parse_or_default;
use wikirank_core::expansion::ExpansionConfig;
use wikirank_core::wsd::WsdStrategy;
use wikirank_server::{build_app, ServerConfig};
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Lexicon JSON used for query expansion
    #[arg(long)]
    lexicon: Option<PathBuf>,
    /// context_overlap | gloss_overlap
    #[arg(long, default_value = "context_overlap")]
    wsd: String,
    /// Maximum expansion terms per query word
    #[arg(long, default_value_t = 2)]
    expansion_terms: usize,
    /// Weight of expansion terms relative to the query's own
    #[arg(long, default_value_t = 0.5)]
    expansion_boost: f32,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig {
        index_dir: args.index.clone(),
        lexicon: args.lexicon.clone(),
        wsd: parse_or_default::<WsdStrategy>("wsd", Some(args.wsd.as_str())),
        expansion: ExpansionConfig {
            max_terms_per_token: args.expansion_terms,
            boost: args.expansion_boost,
            ..ExpansionConfig::default()
        },
    };
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
