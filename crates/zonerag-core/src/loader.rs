use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::MalformedInputError;
use crate::types::{normalize_city, ParsedDocument};

/// Documents read from a parsed-output directory, plus the files that could
/// not be used.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub documents: Vec<ParsedDocument>,
    pub skipped: Vec<MalformedInputError>,
}

/// Read every `*.json` file under `dir` (sorted by path) as a
/// [`ParsedDocument`]. Unreadable or invalid files are logged and skipped,
/// as is any file repeating a `(city, document_id)` pair seen earlier.
pub fn load_parsed_dir(dir: &Path) -> Result<LoadedCorpus> {
    if !dir.is_dir() {
        anyhow::bail!("parsed directory {} does not exist", dir.display());
    }
    let mut corpus = LoadedCorpus::default();
    let mut seen = HashSet::new();
    for path in list_json_files(dir) {
        match load_parsed_file(&path) {
            Ok(doc) if !seen.insert((normalize_city(&doc.city), doc.document_id.trim().to_string())) => {
                tracing::warn!(
                    target: "chunker",
                    "skipping {}: duplicate document {} for {}",
                    path.display(),
                    doc.document_id,
                    doc.city
                );
                corpus.skipped.push(MalformedInputError::new(
                    path.display().to_string(),
                    format!("duplicate document_id {} for city {}", doc.document_id, doc.city),
                ));
            }
            Ok(doc) => corpus.documents.push(doc),
            Err(e) => {
                tracing::warn!(target: "chunker", "skipping {}: {e:#}", path.display());
                corpus.skipped.push(MalformedInputError::new(path.display().to_string(), format!("{e:#}")));
            }
        }
    }
    tracing::info!(
        target: "chunker",
        "loaded {} documents from {} ({} skipped)",
        corpus.documents.len(),
        dir.display(),
        corpus.skipped.len()
    );
    Ok(corpus)
}

pub fn load_parsed_file(path: &Path) -> Result<ParsedDocument> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: ParsedDocument = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    doc.validate()?;
    Ok(doc)
}

fn list_json_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();
    files
}
