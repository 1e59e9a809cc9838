use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use clausematch_cli::{init_tracing, load_settings, open_registry, standard_index};
use clausematch_core::types::Query;
use clausematch_hybrid::aggregate::{ArticleAggregator, ReductionPolicy};
use clausematch_hybrid::{HybridRetriever, QueryVectors};

/// Runs one hybrid query against the standard index and prints the score
/// breakdown per chunk and per article.
#[derive(Parser)]
#[command(name = "clausematch-search")]
struct Args {
    /// Body query text
    body: String,
    /// Title query text
    #[arg(long, default_value = "")]
    title: String,
    #[arg(short, long, default_value_t = 10)]
    k: usize,
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let settings = load_settings(args.config_dir.as_deref())?;
    let registry = open_registry(&settings)?;
    let index = standard_index(&registry)?;

    let retriever = HybridRetriever::from_settings(&settings)?;
    let query = Query { body_query: args.body.clone(), title_query: args.title.clone() };
    let candidates = retriever.retrieve(&index, &query, QueryVectors::default())?;

    println!("🔍 clausematch-search\n====================");
    println!("Body: {}", args.body);
    println!("Title: {}", if args.title.is_empty() { "-" } else { &args.title });
    println!("\nFound {} chunks", candidates.len());
    for (i, c) in candidates.iter().take(args.k).enumerate() {
        println!(
            "  {:>2}. {:<24} article={:<12} fused={:.4}  dense={:.4}  sparse={:.4}  body={:.4}  title={:.4}",
            i + 1,
            c.chunk_id,
            c.article_id,
            c.fused_score.value(),
            c.dense_score.value(),
            c.sparse_score.value(),
            c.body_score.value(),
            c.title_score.value()
        );
    }

    let aggregator = ArticleAggregator::new(ReductionPolicy::from_settings(&settings.aggregation)?);
    let articles = aggregator.aggregate(&candidates, index.corpus());
    println!("\nArticles:");
    for (i, a) in articles.iter().take(args.k).enumerate() {
        println!(
            "  {:>2}. {:<12} {:.4}  chunks={}  {}",
            i + 1,
            a.article_id,
            a.representative_score.value(),
            a.supporting_chunks.len(),
            a.title
        );
    }
    Ok(())
}
