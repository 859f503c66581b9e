use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragguard_core::batch::for_each_batch;
use ragguard_core::config::{resolve_with_base, Config, Settings};
use ragguard_core::filter::Filter;
use ragguard_embed::get_default_embedder;
use ragguard_engine::{EvalConfig, GuardrailEngine, SignatureSet};
use ragguard_index::SimilarityIndex;

const USAGE: &str = "Usage: ragguard ask [<batch-path>] \"<query>\" [--filter key=value]... [--k N] [--min-score X] [--max-context N] [--embedding file.json]
       ragguard scan \"<query>\"";

#[derive(Debug, Default, PartialEq)]
struct AskArgs {
    batch_path: Option<PathBuf>,
    query: String,
    filters: Vec<String>,
    k: Option<usize>,
    min_score: Option<f32>,
    max_context: Option<usize>,
    embedding: Option<PathBuf>,
}

fn value_of<'a>(args: &'a [String], i: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    args.get(*i).map(String::as_str).with_context(|| format!("{} requires a value", flag))
}

fn parse_ask(args: &[String]) -> anyhow::Result<AskArgs> {
    let mut out = AskArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--filter" | "-f" => out.filters.push(value_of(args, &mut i, flag)?.to_string()),
            "--k" | "-k" => {
                out.k = Some(value_of(args, &mut i, flag)?.parse().context("--k requires a number")?)
            }
            "--min-score" => {
                out.min_score = Some(value_of(args, &mut i, flag)?.parse().context("--min-score requires a number")?)
            }
            "--max-context" => {
                out.max_context = Some(value_of(args, &mut i, flag)?.parse().context("--max-context requires a number")?)
            }
            "--embedding" => out.embedding = Some(PathBuf::from(value_of(args, &mut i, flag)?)),
            _ if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }
    match positional.as_slice() {
        [query] => out.query = query.clone(),
        [batch, query] => {
            out.batch_path = Some(PathBuf::from(batch));
            out.query = query.clone();
        }
        _ => bail!("{}", USAGE),
    }
    Ok(out)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_index(settings: &Settings, path: &Path) -> anyhow::Result<Arc<SimilarityIndex>> {
    let index = Arc::new(SimilarityIndex::from_settings(&settings.index)?);
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")?
            .progress_chars("#>-"),
    );
    let loaded = for_each_batch(path, |file, chunks| {
        pb.set_length(file.total as u64);
        pb.set_message(file.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
        index.insert_batch(chunks)?;
        pb.inc(1);
        Ok(())
    })
    .with_context(|| format!("Failed to ingest batches from {}", path.display()));
    pb.finish_and_clear();
    let loaded = loaded?;
    info!(chunks = loaded, indexed = index.len(), "index ready");
    Ok(index)
}

fn read_embedding(path: &Path) -> anyhow::Result<Vec<f32>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} must hold a JSON array of numbers", path.display()))
}

fn ask(settings: &Settings, args: AskArgs) -> anyhow::Result<()> {
    let batch_path = match args.batch_path {
        Some(path) => path,
        None => settings
            .ingest
            .batch_path
            .as_deref()
            .map(|p| resolve_with_base(Path::new("."), p))
            .context("No batch path given and ingest.batch_path is not configured")?,
    };
    let index = load_index(settings, &batch_path)?;
    let engine = GuardrailEngine::new(index, settings)?.with_embedder(get_default_embedder(settings.index.dimension)?)?;

    let filter = if args.filters.is_empty() { None } else { Some(Filter::from_assignments(&args.filters)?) };
    let mut config = EvalConfig::from_settings(settings);
    if let Some(k) = args.k {
        config = config.with_top_k(k);
    }
    if let Some(min_score) = args.min_score {
        config = config.with_min_score(min_score);
    }
    if let Some(budget) = args.max_context {
        config = config.with_max_context_length(budget);
    }

    let decision = match &args.embedding {
        Some(path) => engine.evaluate(&args.query, &read_embedding(path)?, filter.as_ref(), &config)?,
        None => engine.evaluate_text(&args.query, filter.as_ref(), &config)?,
    };
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn scan(settings: &Settings, query: &str) -> anyhow::Result<()> {
    let signatures = SignatureSet::from_specs(&settings.guardrail.extra_signatures)?;
    let matches = signatures.scan(query);
    let report = serde_json::json!({
        "version": signatures.version(),
        "injection_detected": !matches.is_empty(),
        "matches": matches,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    match cmd.as_str() {
        "ask" => ask(&settings, parse_ask(&args)?),
        "scan" => match args.as_slice() {
            [query] => scan(&settings, query),
            _ => bail!("{}", USAGE),
        },
        _ => {
            eprintln!("Unknown command: {}\n{}", cmd, USAGE);
            std::process::exit(1);
        }
    }
}
