//! Append-only JSON Lines log of translation records.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub index: usize,
    pub query: String,
    pub query_digest: String,
    pub examples: String,
    pub rank: u64,
    pub codes: Vec<u32>,
    pub text: String,
    pub anomaly_score: f64,
    pub combined_score: f64,
    #[serde(flatten)]
    pub status: RecordStatus,
}

impl TranslationRecord {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }
}

/// Hex SHA-256 of the query text.
pub fn query_digest(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

pub struct RecordLog {
    path: PathBuf,
    file: File,
    written: usize,
}

impl RecordLog {
    /// Starts a fresh log, truncating any previous content.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path).with_context(|| format!("create records: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    /// Keeps the records for queries `0..resume_from`, drops everything after,
    /// and positions the log for appending query `resume_from`.
    ///
    /// Fails when a kept record is missing or no longer matches its prompt.
    pub fn open_for_resume<S: AsRef<str>>(
        path: &Path,
        resume_from: usize,
        prompts: &[S],
    ) -> anyhow::Result<Self> {
        if resume_from == 0 {
            return Self::create(path);
        }
        let existing = read_records(path)?;
        let mut kept: Vec<TranslationRecord> = Vec::with_capacity(resume_from);
        for rec in existing {
            if rec.index >= resume_from {
                continue;
            }
            if rec.index != kept.len() {
                bail!(
                    "records file {} is out of order: expected index {}, found {}",
                    path.display(),
                    kept.len(),
                    rec.index
                );
            }
            let expected = prompts
                .get(rec.index)
                .map(|p| query_digest(p.as_ref()))
                .unwrap_or_default();
            if rec.query_digest != expected {
                bail!(
                    "record {} in {} does not match the current prompt list",
                    rec.index,
                    path.display()
                );
            }
            kept.push(rec);
        }
        if kept.len() < resume_from {
            bail!(
                "cannot resume at {}: {} only holds records 0..{}",
                resume_from,
                path.display(),
                kept.len()
            );
        }

        rewrite_atomically(path, &kept)?;
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("open records: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: kept.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in the log, including the kept prefix of a resumed run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.written
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn append(&mut self, record: &TranslationRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record).context("serialize record")?;
        writeln!(self.file, "{line}")
            .and_then(|_| self.file.flush())
            .with_context(|| format!("append record: {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }
}

pub fn read_records(path: &Path) -> anyhow::Result<Vec<TranslationRecord>> {
    let file = File::open(path).with_context(|| format!("open records: {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read records: {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: TranslationRecord = serde_json::from_str(&line)
            .with_context(|| format!("parse record at {}:{}", path.display(), n + 1))?;
        out.push(rec);
    }
    Ok(out)
}

fn rewrite_atomically(path: &Path, records: &[TranslationRecord]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    for rec in records {
        let line = serde_json::to_string(rec).context("serialize record")?;
        writeln!(tmp, "{line}").context("write temp records")?;
    }
    tmp.flush().context("flush temp records")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace records: {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
    }
    Ok(())
}
