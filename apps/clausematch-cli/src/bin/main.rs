use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use clausematch_cli::{index_dir, init_tracing, load_settings, open_registry, standard_index, STANDARD_INDEX};
use clausematch_core::config::{expand_path, EngineSettings};
use clausematch_core::corpus::{load_contract, Corpus};
use clausematch_core::traits::Adjudicator;
use clausematch_core::types::{ClauseStatus, MatchMap};
use clausematch_embed::get_default_embedder;
use clausematch_hybrid::{CorpusIndex, MatchEngine, ScoreAdjudicator};
use clausematch_llm::LlmAdjudicator;
use clausematch_vector::EmbeddingCache;

#[derive(Parser)]
#[command(name = "clausematch", about = "Match contract clauses against a standard contract")]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the sparse and dense indexes for the standard corpus
    Index {
        /// Chunk file or directory of chunk files (defaults to data.chunks_path)
        chunks: Option<PathBuf>,
        #[arg(long)]
        no_progress: bool,
    },
    /// Match a submitted contract and write its match map
    Match {
        contract: PathBuf,
        /// Decide by retrieval score instead of calling the LLM
        #[arg(long)]
        offline: bool,
        /// Output directory (defaults to data.output_dir)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print a stored match map
    Inspect { map: PathBuf },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.config_dir.as_deref())?;
    match cli.command {
        Command::Index { chunks, no_progress } => run_index(&settings, chunks, !no_progress),
        Command::Match { contract, offline, output } => run_match(&settings, contract, offline, output),
        Command::Inspect { map } => {
            print_map(&MatchMap::read_json(&map)?);
            Ok(())
        }
    }
}

fn run_index(settings: &EngineSettings, chunks: Option<PathBuf>, show_progress: bool) -> Result<()> {
    let chunks_path = chunks.unwrap_or_else(|| expand_path(&settings.data.chunks_path));
    let dir = index_dir(settings);
    println!("Clause index builder\n====================");
    println!("Chunks: {}", chunks_path.display());
    println!("Index directory: {}", dir.display());

    let corpus = Corpus::load(&chunks_path)?;
    let embedder = get_default_embedder(&settings.embedding)?;
    let mut cache = EmbeddingCache::open(&expand_path(&settings.data.cache_path))?;
    let index = CorpusIndex::build_on_disk(
        STANDARD_INDEX,
        corpus,
        &dir,
        embedder,
        settings.retrieval.sparse_normalization,
        &mut cache,
        show_progress,
    )?;
    cache.save()?;

    println!("\n✅ Indexed {} chunks in {} articles", index.corpus().len(), index.corpus().articles().len());
    println!("💡 To match a contract, use: clausematch match <contract.json>");
    Ok(())
}

fn run_match(settings: &EngineSettings, contract_path: PathBuf, offline: bool, output: Option<PathBuf>) -> Result<()> {
    let contract = load_contract(&contract_path)?;
    let registry = open_registry(settings)?;
    let standard = standard_index(&registry)?;

    let adjudicator: Arc<dyn Adjudicator> = if offline {
        Arc::new(ScoreAdjudicator::new(settings.adjudication.min_confidence))
    } else {
        Arc::new(LlmAdjudicator::from_settings(&settings.llm, Duration::from_millis(settings.adjudication.call_timeout_ms))?)
    };
    let engine = MatchEngine::new(settings.clone(), standard, adjudicator)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    spinner.set_message(format!("matching {} clauses", contract.clauses.len()));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let run = tokio::runtime::Runtime::new()?.block_on(engine.match_contract(&contract));
    spinner.finish_and_clear();
    let run = run?;

    let out_dir = output.unwrap_or_else(|| expand_path(&settings.data.output_dir));
    std::fs::create_dir_all(&out_dir)?;
    let out_path = out_dir.join(format!("{}.json", run.map.contract_id));
    run.map.write_json(&out_path)?;

    for r in &run.results {
        let label = match &r.status {
            ClauseStatus::Matched => "matched",
            ClauseStatus::Unmatched => "unmatched",
            ClauseStatus::Novel => "novel",
            ClauseStatus::Unresolved(_) => "unresolved",
        };
        let top = r.candidate_articles.first().map(|c| format!("{} ({:.3})", c.article_id, c.score.value()));
        println!(
            "  clause {:>3}  {:<10}  special={:<5}  top={}",
            r.clause_number,
            label,
            r.is_special,
            top.unwrap_or_else(|| "-".into())
        );
    }
    print_map(&run.map);
    println!("\n✅ Match map written to {}", out_path.display());
    Ok(())
}

fn print_map(map: &MatchMap) {
    println!("\nMatch map {} ({}) version {}", map.contract_id, map.contract_type, map.version);
    println!("Created: {}", map.created_at.to_rfc3339());
    println!("\n📊 Mappings: {}", map.mappings.len());
    for m in &map.mappings {
        let arts: Vec<String> = m
            .matched_articles
            .iter()
            .map(|a| format!("{} {:.3} {:?}", a.article_id, a.score.value(), a.match_source))
            .collect();
        println!("  clause {:>3} -> {}", m.clause_number, arts.join(", "));
    }
    println!("📊 Unmatched clauses: {}", map.unmatched_clauses.len());
    for c in &map.unmatched_clauses {
        println!("  clause {:>3}{}", c.clause_number, if c.is_special { "  (special)" } else { "" });
    }
    println!("📊 Unmatched standard articles: {}", map.unmatched_articles.len());
    for a in &map.unmatched_articles {
        println!("  {}  {}", a.article_id, a.title);
    }
    if !map.unresolved_clauses.is_empty() {
        println!("⚠️  Unresolved clauses: {}", map.unresolved_clauses.len());
        for u in &map.unresolved_clauses {
            println!("  clause {:>3}  {:?}  candidates: {}", u.clause_number, u.reason, u.candidate_article_ids.join(", "));
        }
    }
}
