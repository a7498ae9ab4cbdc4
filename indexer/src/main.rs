use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use simdex::{EngineConfig, ModelKind, SearchEngine};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    #[serde(default)]
    features: Vec<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query similarity search snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a snapshot from TSV/JSON/JSONL files, a directory of them, or another snapshot
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output snapshot file
        #[arg(long)]
        output: String,
        /// Cap on every posting list (0 = unbounded)
        #[arg(long, default_value_t = simdex::config::DEFAULT_MAX_POSTING)]
        max_posting: usize,
        /// Corpus capacity, oldest documents are evicted first (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        max_documents: usize,
        #[arg(long, default_value_t = ModelKind::InnerProduct)]
        model: ModelKind,
        /// Input is a snapshot rather than text
        #[arg(long, default_value_t = false)]
        binary: bool,
    },
    /// Load a corpus and answer tab-separated queries read from stdin
    Search {
        #[arg(long)]
        input: String,
        #[arg(long, default_value_t = false)]
        binary: bool,
        /// Treat queries as feature strings instead of document ids
        #[arg(long, default_value_t = false)]
        by_feature: bool,
        #[arg(long, default_value_t = 20)]
        max: usize,
        #[arg(long, default_value_t = ModelKind::InnerProduct)]
        model: ModelKind,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, max_posting, max_documents, model, binary } => {
            let config = EngineConfig::default()
                .with_model(model)
                .with_max_posting(max_posting)
                .with_max_documents(max_documents);
            build_index(&input, &output, config, binary)
        }
        Commands::Search { input, binary, by_feature, max, model } => {
            let mut engine = SearchEngine::new(EngineConfig::default().with_model(model));
            load_input(&mut engine, Path::new(&input), binary)?;
            run_queries(&engine, by_feature, max)
        }
    }
}

fn build_index(input: &str, output: &str, config: EngineConfig, binary: bool) -> Result<()> {
    let mut engine = SearchEngine::new(config);
    load_input(&mut engine, Path::new(input), binary)?;
    engine.save(output).with_context(|| format!("writing snapshot {output}"))?;
    tracing::info!(output, documents = engine.size(), "index build complete");
    Ok(())
}

fn load_input(engine: &mut SearchEngine, input: &Path, binary: bool) -> Result<()> {
    if binary {
        engine.load(input).with_context(|| format!("loading snapshot {}", input.display()))?;
        return Ok(());
    }

    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl" | "tsv")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        anyhow::bail!("input {} does not exist", input.display());
    }

    let started = Instant::now();
    for file in files {
        let added = match extension(&file) {
            Some("jsonl") => index_jsonl(engine, &file),
            Some("json") => index_json(engine, &file),
            _ => index_tsv(engine, &file),
        }
        .with_context(|| format!("reading {}", file.display()))?;
        tracing::debug!(file = %file.display(), added, "ingested file");
    }
    tracing::info!(documents = engine.size(), took_s = started.elapsed().as_secs_f64(), "ingested documents");
    Ok(())
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}

fn index_tsv(engine: &mut SearchEngine, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    Ok(engine.read_tsv(reader)?)
}

fn index_jsonl(engine: &mut SearchEngine, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    let mut added = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)?;
        added += ingest_doc(engine, doc);
    }
    Ok(added)
}

fn index_json(engine: &mut SearchEngine, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let mut added = 0;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                added += ingest_doc(engine, doc);
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            added += ingest_doc(engine, doc);
        }
        _ => {}
    }
    Ok(added)
}

fn ingest_doc(engine: &mut SearchEngine, doc: InputDoc) -> usize {
    if doc.id.is_empty() || doc.features.iter().all(|f| f.is_empty()) {
        return 0;
    }
    engine.add_document(&doc.id, &doc.features);
    1
}

fn run_queries(engine: &SearchEngine, by_feature: bool, max: usize) -> Result<()> {
    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let queries: Vec<&str> = line.split('\t').filter(|q| !q.is_empty()).collect();
        if queries.is_empty() { continue; }
        let started = Instant::now();
        let results = if by_feature {
            engine.search_by_feature(&queries, max)
        } else {
            engine.search_by_document(&queries, max)
        };
        let took = started.elapsed();
        for (id, score) in &results {
            writeln!(out, "{id}\t{score}")?;
        }
        writeln!(out, "# {} results in {:.6}s", results.len(), took.as_secs_f64())?;
        out.flush()?;
    }
    Ok(())
}
