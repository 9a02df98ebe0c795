use crate::error::{Result, RetrievalError};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One section as written by the preprocessing tool and read by the
/// embedding store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingFileRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub subpart: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub text: String,
    pub vector_a: Vec<f32>,
    pub vector_b: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_documents: u32,
    pub num_sections: u32,
    pub embedder_a: String,
    pub embedder_b: String,
    pub created_at: String,
    pub version: u32,
}

pub struct CorpusPaths {
    pub root: PathBuf,
}

impl CorpusPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn embeddings(&self, document_id: &str) -> PathBuf {
        self.root.join(format!("{document_id}.embeddings.json"))
    }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// `<dir>/<stem>.embeddings.json` next to a source document.
pub fn sibling_embeddings_path(source: &Path) -> Option<PathBuf> {
    let stem = source.file_stem()?.to_str()?;
    Some(source.with_file_name(format!("{stem}.embeddings.json")))
}

pub fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| RetrievalError::Io { path: path.to_path_buf(), source })
}

pub fn load_embedding_file(path: &Path) -> Result<Vec<EmbeddingFileRecord>> {
    let f = File::open(path).map_err(|source| RetrievalError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_reader(BufReader::new(f)).map_err(|source| RetrievalError::Json { path: path.to_path_buf(), source })
}

pub fn save_embedding_file(path: &Path, records: &[EmbeddingFileRecord]) -> Result<()> {
    let io_err = |source: std::io::Error| RetrievalError::Io { path: path.to_path_buf(), source };
    if let Some(dir) = path.parent() {
        create_dir_all(dir).map_err(io_err)?;
    }
    let mut w = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer(&mut w, records).map_err(|source| RetrievalError::Json { path: path.to_path_buf(), source })?;
    w.flush().map_err(io_err)
}

pub fn save_meta(paths: &CorpusPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta();
    let io_err = |source: std::io::Error| RetrievalError::Io { path: path.clone(), source };
    create_dir_all(&paths.root).map_err(io_err)?;
    let json = serde_json::to_string_pretty(meta).map_err(|source| RetrievalError::Json { path: path.clone(), source })?;
    std::fs::write(&path, json).map_err(io_err)
}

pub fn load_meta(paths: &CorpusPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let buf = read_document(&path)?;
    serde_json::from_str(&buf).map_err(|source| RetrievalError::Json { path, source })
}
