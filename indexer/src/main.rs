use anyhow::{bail, Context, Result};
use arrowreg_core::chunker::chunk_source;
use arrowreg_core::embedder::EmbedderSet;
use arrowreg_core::persist::{read_document, save_embedding_file, save_meta, CorpusPaths, EmbeddingFileRecord, MetaFile};
use arrowreg_core::{RetrievalConfig, SourceInfo};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Chunk regulation text and precompute section embeddings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk every input document and write `<id>.embeddings.json` per document
    Build {
        /// Input path (file or directory of .md/.txt files); defaults to the
        /// config's source list
        #[arg(long)]
        input: Option<String>,
        /// Output directory
        #[arg(long)]
        output: String,
        /// JSON retrieval config; selects the two embedding procedures
        #[arg(long)]
        config: Option<String>,
        /// Document id for a single-file input; defaults to the file stem.
        /// Must match the id the service loads the document under.
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Print the sections a document chunks into, without embedding
    Chunk {
        #[arg(long)]
        input: String,
        /// Document id; defaults to the file stem
        #[arg(long)]
        document_id: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, document_id } => {
            let cfg = match config {
                Some(path) => RetrievalConfig::from_json_file(Path::new(&path))?,
                None => RetrievalConfig::default(),
            };
            let jobs = match input {
                Some(input) => input_jobs(Path::new(&input), document_id)?,
                None if document_id.is_some() => bail!("--document-id requires --input"),
                None => config_jobs(&cfg, Path::new(&output))?,
            };
            build_corpus(&jobs, Path::new(&output), &cfg)
        }
        Commands::Chunk { input, document_id } => print_chunks(Path::new(&input), document_id),
    }
}

fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("md" | "txt")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files.sort();
    files
}

fn document_id_for(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// One document to embed: where to read it, its id and where its records go.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildJob {
    pub path: PathBuf,
    pub document_id: String,
    /// `None` writes `<output>/<document_id>.embeddings.json`.
    pub embeddings: Option<PathBuf>,
}

fn input_jobs(input: &Path, document_id: Option<String>) -> Result<Vec<BuildJob>> {
    let files = collect_inputs(input);
    if let Some(id) = document_id {
        if !input.is_file() {
            bail!("--document-id needs a single input file, got {}", input.display());
        }
        return Ok(files.into_iter().map(|path| BuildJob { path, document_id: id.clone(), embeddings: None }).collect());
    }
    Ok(files
        .into_iter()
        .map(|path| BuildJob { document_id: document_id_for(&path), path, embeddings: None })
        .collect())
}

/// Jobs for every configured source, keeping its configured id and
/// embeddings path so the service finds matching records.
fn config_jobs(cfg: &RetrievalConfig, output: &Path) -> Result<Vec<BuildJob>> {
    if cfg.sources.is_empty() {
        bail!("no --input given and the config lists no sources");
    }
    let out_paths = CorpusPaths::new(output);
    Ok(cfg
        .sources
        .iter()
        .map(|spec| {
            let document_id = spec.document_id();
            let embeddings = Some(spec.embeddings.clone().unwrap_or_else(|| out_paths.embeddings(&document_id)));
            BuildJob { path: spec.path.clone(), document_id, embeddings }
        })
        .collect())
}

pub fn build_corpus(jobs: &[BuildJob], output: &Path, cfg: &RetrievalConfig) -> Result<()> {
    let out_paths = CorpusPaths::new(output);
    let embedders = EmbedderSet::from_config(&cfg.embedding);
    let (name_a, name_b) = embedders.names();

    let mut num_documents = 0u32;
    let mut num_sections = 0u32;
    for job in jobs {
        let text = match read_document(&job.path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %job.path.display(), error = %e, "skipping unreadable input");
                continue;
            }
        };
        let document_id = &job.document_id;
        let source = SourceInfo::resolve(document_id, None);
        let sections = chunk_source(&text, &source);
        let texts: Vec<String> = sections.iter().map(|s| format!("{} {}", s.heading, s.text)).collect();
        let (vectors_a, vectors_b) = embedders
            .embed_sections(&texts)
            .with_context(|| format!("embedding {}", job.path.display()))?;

        let records: Vec<EmbeddingFileRecord> = sections
            .into_iter()
            .zip(vectors_a.into_iter().zip(vectors_b))
            .map(|(s, (vector_a, vector_b))| EmbeddingFileRecord {
                id: s.id,
                title: s.title,
                part: s.part,
                subpart: s.subpart,
                section: s.section,
                text: s.text,
                vector_a,
                vector_b,
            })
            .collect();

        let target = job.embeddings.clone().unwrap_or_else(|| out_paths.embeddings(document_id));
        save_embedding_file(&target, &records)?;
        tracing::info!(document_id = %document_id, sections = records.len(), "wrote embeddings");
        num_documents += 1;
        num_sections += records.len() as u32;
    }

    let meta = MetaFile {
        num_documents,
        num_sections,
        embedder_a: name_a.to_string(),
        embedder_b: name_b.to_string(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
        version: 1,
    };
    save_meta(&out_paths, &meta)?;

    tracing::info!(output = %output.display(), num_documents, num_sections, "corpus build complete");
    Ok(())
}

fn print_chunks(input: &Path, document_id: Option<String>) -> Result<()> {
    let text = read_document(input)?;
    let document_id = document_id.unwrap_or_else(|| document_id_for(input));
    let source = SourceInfo::resolve(&document_id, None);
    for s in chunk_source(&text, &source) {
        let locator = s.locator.map(|l| l.to_string()).unwrap_or_default();
        println!("{}\t{}\tpart={} subpart={} section={}\ttokens={}\t{}", s.id, locator, s.part, s.subpart, s.section, s.token_length, s.heading);
    }
    Ok(())
}
