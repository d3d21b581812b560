//! Versioned single-file index artifact.
//!
//! Layout (little-endian):
//!
//! ```text
//! magic      4 bytes  "ZRIX"
//! version    u32      1
//! dimension  u32
//! count      u32
//! meta_len   u64
//! metadata   meta_len bytes of JSON {header, chunks}
//! vectors    count * dimension f32
//! digest     32 bytes blake3 of everything above
//! ```
//!
//! Files are written to a temp file in the target directory and renamed into
//! place, so a reader sees either the old artifact or the new one.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use zonerag_core::types::Chunk;

use crate::error::ArtifactError;
use crate::index::{IndexHeader, VectorIndex};

pub const MAGIC: &[u8; 4] = b"ZRIX";
pub const FORMAT_VERSION: u32 = 1;

const PREAMBLE_LEN: usize = 4 + 4 + 4 + 4 + 8;
const DIGEST_LEN: usize = 32;

#[derive(Serialize, Deserialize)]
struct Metadata {
    header: IndexHeader,
    chunks: Vec<Chunk>,
}

#[derive(Serialize)]
struct MetadataRef<'a> {
    header: &'a IndexHeader,
    chunks: &'a [Chunk],
}

pub fn encode(index: &VectorIndex) -> Result<Vec<u8>, ArtifactError> {
    let metadata = serde_json::to_vec(&MetadataRef { header: index.header(), chunks: index.chunks() })?;
    let dim = u32::try_from(index.dim()).map_err(|_| ArtifactError::Inconsistent("dimension exceeds u32".into()))?;
    let count = u32::try_from(index.len()).map_err(|_| ArtifactError::Inconsistent("count exceeds u32".into()))?;

    let vectors = index.raw_vectors();
    let mut buf = Vec::with_capacity(PREAMBLE_LEN + metadata.len() + vectors.len() * 4 + DIGEST_LEN);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&dim.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(&(metadata.len() as u64).to_le_bytes());
    buf.extend_from_slice(&metadata);
    for x in vectors {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    let digest = blake3::hash(&buf);
    buf.extend_from_slice(digest.as_bytes());
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<VectorIndex, ArtifactError> {
    if bytes.len() < 4 || &bytes[..4] != MAGIC {
        return Err(ArtifactError::BadMagic);
    }
    if bytes.len() < PREAMBLE_LEN + DIGEST_LEN {
        return Err(ArtifactError::Truncated(format!("{} bytes", bytes.len())));
    }
    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    let version = read_u32(body, 4);
    if version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion(version));
    }
    if blake3::hash(body).as_bytes() != digest {
        return Err(ArtifactError::ChecksumMismatch);
    }
    let dim = read_u32(body, 8) as usize;
    let count = read_u32(body, 12) as usize;
    let meta_len = usize::try_from(read_u64(body, 16))
        .map_err(|_| ArtifactError::Inconsistent("metadata length overflows".into()))?;

    let meta_end = PREAMBLE_LEN
        .checked_add(meta_len)
        .filter(|end| *end <= body.len())
        .ok_or_else(|| ArtifactError::Truncated("metadata".into()))?;
    let metadata: Metadata = serde_json::from_slice(&body[PREAMBLE_LEN..meta_end])?;
    if metadata.chunks.len() != count {
        return Err(ArtifactError::Inconsistent(format!("{} chunks in metadata, header says {count}", metadata.chunks.len())));
    }

    let vector_bytes = &body[meta_end..];
    if vector_bytes.len() != count * dim * 4 {
        return Err(ArtifactError::Truncated(format!(
            "vector block is {} bytes, expected {}",
            vector_bytes.len(),
            count * dim * 4
        )));
    }
    let vectors: Vec<f32> = vector_bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(VectorIndex::from_parts(metadata.header, dim, metadata.chunks, vectors))
}

/// Write `index` to `path`, replacing any existing artifact atomically.
pub fn save(index: &VectorIndex, path: &Path) -> Result<(), ArtifactError> {
    let bytes = encode(index)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(dir, e))?;
    tmp.write_all(&bytes).map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ArtifactError::io(path, e.error))?;
    tracing::info!(target: "vector", "wrote index artifact {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub fn load(path: &Path) -> Result<VectorIndex, ArtifactError> {
    let bytes = fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
    let index = decode(&bytes)?;
    tracing::info!(target: "vector", "loaded index artifact {}: {} entries, d={}", path.display(), index.len(), index.dim());
    Ok(index)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use zonerag_core::types::LineRange;

    fn sample() -> VectorIndex {
        let entries = (0..3)
            .map(|i| IndexEntry {
                chunk: Chunk {
                    id: format!("c{i}"),
                    text: format!("chunk {i}"),
                    token_count: 2,
                    city: "Oakland".into(),
                    zoning_label: Some("RM-1".into()),
                    source_document_id: "oak_adu".into(),
                    page_number: i + 1,
                    line_range: LineRange { start: 1, end: 2 },
                    byte_range: (0, 7),
                    chunk_index: 0,
                },
                vector: vec![1.0, i as f32, 0.5],
            })
            .collect();
        VectorIndex::build("fake:d3", entries).expect("build")
    }

    #[test]
    fn corrupted_bytes_are_detected() {
        let mut bytes = encode(&sample()).expect("encode");
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(ArtifactError::ChecksumMismatch)));
    }

    #[test]
    fn truncated_and_foreign_files_are_rejected() {
        let bytes = encode(&sample()).expect("encode");
        assert!(decode(&bytes[..bytes.len() - 40]).is_err());
        assert!(matches!(decode(b"PK\x03\x04 not an index at all"), Err(ArtifactError::BadMagic)));
    }

    #[test]
    fn decoded_index_matches_original() {
        let index = sample();
        let back = decode(&encode(&index).expect("encode")).expect("decode");
        assert_eq!(back.header(), index.header());
        assert_eq!(back.chunks(), index.chunks());
        assert_eq!(back.raw_vectors(), index.raw_vectors());
    }
}
