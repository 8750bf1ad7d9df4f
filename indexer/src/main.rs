use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recipe_core::document::read_documents;
use recipe_core::error::{FilterSyntaxError, IndexLoadError, SearchError};
use recipe_core::executor::QueryRequest;
use recipe_core::index::{Field, Index};
use recipe_core::linker::{link_all, write_links_jsonl};
use recipe_core::persist::{load_index, read_current, save_index, IndexPaths};
use recipe_core::{EntityMatcher, Gazetteer, IndexBuilder, Metric, SearchConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, inspect and query the recipe index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index generation from JSON/JSONL recipe files
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Index root directory
        #[arg(long)]
        output: PathBuf,
        /// Gazetteer TSV; enables the entities field
        #[arg(long)]
        gazetteer: Option<PathBuf>,
        /// Search config JSON (field weights, BM25 parameters)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Build threads (defaults to available cores)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Write gazetteer entity links for every recipe as JSONL
    Link {
        #[arg(long)]
        gazetteer: PathBuf,
        #[arg(long)]
        input: PathBuf,
        /// Output JSONL file
        #[arg(long)]
        output: PathBuf,
    },
    /// Run one query against the published index
    Search {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = Metric::Bm25)]
        metric: Metric,
        /// Results per page (defaults to the config's default_top_k)
        #[arg(long)]
        k: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Filter object, e.g. '{"max_total_minutes":30}'
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print index statistics
    Stats {
        #[arg(long)]
        index: PathBuf,
    },
}

fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { input, output, gazetteer, config, workers } => {
            build_index(&input, &output, gazetteer.as_deref(), config.as_deref(), workers)
        }
        Commands::Link { gazetteer, input, output } => link(&gazetteer, &input, &output),
        Commands::Search { index, q, metric, k, offset, filter, config } => {
            search(&index, q, metric, k, offset, filter.as_deref(), config.as_deref())
        }
        Commands::Stats { index } => stats(&index),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 2: no index published, 3: filter rejected, 1: anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    if matches!(err.downcast_ref::<IndexLoadError>(), Some(IndexLoadError::NotBuilt(_)))
        || matches!(err.downcast_ref::<SearchError>(), Some(SearchError::IndexNotBuilt))
    {
        2
    } else if err.downcast_ref::<FilterSyntaxError>().is_some()
        || matches!(err.downcast_ref::<SearchError>(), Some(SearchError::Filter(_)))
    {
        3
    } else {
        1
    }
}

fn load_matcher(path: &Path) -> Result<EntityMatcher> {
    let gazetteer = Gazetteer::load_tsv(path).with_context(|| format!("loading gazetteer {}", path.display()))?;
    Ok(EntityMatcher::new(gazetteer))
}

fn build_index(
    input: &Path,
    output: &Path,
    gazetteer: Option<&Path>,
    config: Option<&Path>,
    workers: Option<usize>,
) -> Result<()> {
    let config = SearchConfig::load_or_default(config)?;
    let ingest = read_documents(input)?;
    tracing::info!(documents = ingest.documents.len(), skipped = ingest.skipped.len(), "ingested documents");

    let matcher = gazetteer.map(load_matcher).transpose()?;
    let workers = workers
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1);
    let mut builder = IndexBuilder::new(config.field_weights).workers(workers);
    if let Some(m) = &matcher {
        builder = builder.with_entity_matcher(m);
    }
    let index = builder.build(ingest.documents);

    let paths = IndexPaths::new(output);
    let generation = save_index(&paths, &index).with_context(|| format!("writing index to {}", output.display()))?;
    println!(
        "built generation {generation}: {} docs, {} terms, {} postings ({} records skipped)",
        index.num_docs(),
        index.num_terms(),
        index.num_postings(),
        ingest.skipped.len()
    );
    Ok(())
}

fn link(gazetteer: &Path, input: &Path, output: &Path) -> Result<()> {
    let matcher = load_matcher(gazetteer)?;
    let ingest = read_documents(input)?;
    let links = link_all(&matcher, &ingest.documents);
    let written = write_links_jsonl(output, links.iter().flatten())
        .with_context(|| format!("writing links to {}", output.display()))?;
    println!("wrote {written} links for {} documents to {}", ingest.documents.len(), output.display());
    Ok(())
}

fn search(
    index_dir: &Path,
    q: String,
    metric: Metric,
    k: Option<usize>,
    offset: usize,
    filter: Option<&str>,
    config: Option<&Path>,
) -> Result<()> {
    let config = SearchConfig::load_or_default(config)?;
    let top_k = k.unwrap_or(config.default_top_k);
    let mut request = QueryRequest::new(q).metric(metric).top_k(top_k).offset(offset);
    if let Some(text) = filter {
        request = request.filter_json(text)?;
    }
    let index = load_index(&IndexPaths::new(index_dir))?;
    let executor = config.executor();
    executor.swap(index);
    let results = executor.execute(&request)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[derive(Serialize)]
struct Stats<'a> {
    generation: Option<u64>,
    num_docs: u32,
    num_terms: usize,
    num_postings: usize,
    avg_field_len: Vec<(Field, f64)>,
    field_weights: Vec<(Field, f64)>,
    top_terms: Vec<(&'a str, u32)>,
}

fn stats(index_dir: &Path) -> Result<()> {
    let paths = IndexPaths::new(index_dir);
    let index: Index = load_index(&paths)?;
    let mut top_terms: Vec<(&str, u32)> = index.terms().map(|(t, s)| (t, s.df)).collect();
    top_terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    top_terms.truncate(20);
    let stats = Stats {
        generation: read_current(&paths)?,
        num_docs: index.num_docs(),
        num_terms: index.num_terms(),
        num_postings: index.num_postings(),
        avg_field_len: Field::ALL.iter().map(|&f| (f, index.avg_field_len(f))).collect(),
        field_weights: Field::ALL.iter().map(|&f| (f, index.field_weights().get(f))).collect(),
        top_terms,
    };
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
