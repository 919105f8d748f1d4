pub mod types;

pub use types::{
    ApplyOutcome, AuditEntry, Classification, Impact, IssueRecord, IssueType, Metadata,
    MetadataPatch, ProposedLabels, ReviewStatus, Severity, Triage,
};

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

const ISSUES_FILE: &str = "issues.jsonl";
const METADATA_FILE: &str = "metadata.json";
const AUDIT_FILE: &str = "audit.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed entry in {path} at line {line}: {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Flat-file record store rooted at a data directory.
///
/// Records are JSON lines rewritten in full on every save, the audit log is
/// append-only JSON lines, metadata is a single JSON document. Nothing here
/// locks: one pipeline command at a time per directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn issues_path(&self) -> PathBuf {
        self.root.join(ISSUES_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    fn audit_path(&self) -> PathBuf {
        self.root.join(AUDIT_FILE)
    }

    /// Load every record in stored (canonical) order. Empty if nothing was ingested yet.
    #[instrument(skip(self))]
    pub fn load_all(&self) -> Result<Vec<IssueRecord>, StoreError> {
        let records = read_lines(&self.issues_path())?;
        debug!(count = records.len(), "loaded issue records");
        Ok(records)
    }

    /// Overwrite the whole record collection.
    ///
    /// Writes to a sibling temp file first and renames it over the target, so a
    /// crash mid-write leaves the previous collection intact.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub fn save_all(&self, records: &[IssueRecord]) -> Result<(), StoreError> {
        let path = self.issues_path();
        let tmp = path.with_extension("jsonl.tmp");

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        fs::write(&tmp, buf).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("saved issue records");
        Ok(())
    }

    /// Append a single audit entry without touching earlier lines.
    pub fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let path = self.audit_path();
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{}", line).map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }

    pub fn load_audit(&self) -> Result<Vec<AuditEntry>, StoreError> {
        read_lines(&self.audit_path())
    }

    /// Load the metadata document, or defaults if none has been written.
    pub fn load_metadata(&self) -> Result<Metadata, StoreError> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(Metadata::default());
        }
        let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Decode {
            path,
            line: 1,
            source,
        })
    }

    pub fn save_metadata(&self, meta: &Metadata) -> Result<(), StoreError> {
        let path = self.metadata_path();
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&path, json).map_err(|source| StoreError::Io { path, source })
    }

    /// Shallow-merge `patch` into the stored metadata and persist the result.
    pub fn patch_metadata(&self, patch: MetadataPatch) -> Result<Metadata, StoreError> {
        let mut meta = self.load_metadata()?;
        patch.merge_into(&mut meta);
        self.save_metadata(&meta)?;
        Ok(meta)
    }
}

fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut items = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        items.push(item);
    }
    Ok(items)
}
