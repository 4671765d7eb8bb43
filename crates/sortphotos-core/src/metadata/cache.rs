use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{MetadataSource, MetadataTable, TagFilter};
use crate::error::MetadataError;

const ARTIFACT_VERSION: u32 = 1;

/// On-disk snapshot of one directory's metadata table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub version: u32,
    pub directory: PathBuf,
    pub created: DateTime<Utc>,
    pub table: MetadataTable,
}

/// Per-directory metadata lookup. Each call extracts afresh; the resulting
/// table is handed to the caller and optionally mirrored to disk.
pub struct MetadataCache<'a> {
    source: &'a dyn MetadataSource,
    filter: TagFilter,
    artifact_dir: Option<PathBuf>,
}

impl<'a> MetadataCache<'a> {
    pub fn new(source: &'a dyn MetadataSource, filter: TagFilter, artifact_dir: Option<PathBuf>) -> Self {
        Self {
            source,
            filter,
            artifact_dir,
        }
    }

    /// Extract the table for `files` in `dir` with a single source call.
    pub fn load_directory(&self, dir: &Path, files: &[PathBuf]) -> Result<MetadataTable, MetadataError> {
        let table = self.source.extract(dir, files, &self.filter)?;
        log::debug!("{} metadata records for {}", table.len(), dir.display());

        if let Some(cache_dir) = &self.artifact_dir {
            match save_artifact(cache_dir, dir, &table) {
                Ok(path) => log::debug!("metadata for {} written to {}", dir.display(), path.display()),
                Err(e) => log::warn!("could not write metadata cache for {}: {:#}", dir.display(), e),
            }
        }

        Ok(table)
    }
}

/// Artifact location for `dir`: one file per directory, named by a digest of its path.
pub fn artifact_path(cache_dir: &Path, dir: &Path) -> PathBuf {
    let digest = hex::encode(Sha256::digest(dir.to_string_lossy().as_bytes()));
    cache_dir.join(format!("metadata-{}.json", &digest[..16]))
}

/// Write the table for `dir` into `cache_dir`.
pub fn save_artifact(cache_dir: &Path, dir: &Path, table: &MetadataTable) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(cache_dir)?;
    let path = artifact_path(cache_dir, dir);
    let temp_path = path.with_extension("tmp");

    let artifact = Artifact {
        version: ARTIFACT_VERSION,
        directory: dir.to_path_buf(),
        created: Utc::now(),
        table: table.clone(),
    };

    // Write to temp file first, then rename so a reader never sees half a file
    let writer = BufWriter::new(File::create(&temp_path)?);
    serde_json::to_writer_pretty(writer, &artifact)?;
    fs::rename(&temp_path, &path)?;

    Ok(path)
}

/// Read back the artifact for `dir`, if one exists and matches this format.
pub fn load_artifact(cache_dir: &Path, dir: &Path) -> anyhow::Result<Option<Artifact>> {
    let path = artifact_path(cache_dir, dir);
    if !path.exists() {
        return Ok(None);
    }

    let artifact: Artifact = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
    if artifact.version != ARTIFACT_VERSION || artifact.directory != dir {
        return Ok(None);
    }
    Ok(Some(artifact))
}
