//! Append-only repair journal.
//!
//! Every mutation the repair tools attempt (or plan, in dry-run) is written as
//! one JSON line. Lines form a SHA-256 hash chain: each entry carries the hash
//! of its predecessor and its own hash, so a deleted or edited line is
//! detected by [`verify_hash_chain`].
//!
//! The audit report itself is never rewritten; the journal sits next to it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const JOURNAL_SUFFIX: &str = ".journal.jsonl";

/// Default journal location for a report: `<report_path>.journal.jsonl`.
pub fn journal_path_for(report_path: &Path) -> PathBuf {
    let mut s: OsString = report_path.as_os_str().to_owned();
    s.push(JOURNAL_SUFFIX);
    PathBuf::from(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalAction {
    UpdateModified,
    UpdateFrozen,
    /// Modified and frozen together, in one catalog request.
    UpdateTimestamps,
    DeleteCacheRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalOutcome {
    /// The store accepted the mutation.
    Applied,
    /// Dry run: the mutation was planned but not issued.
    Planned,
    /// The store rejected the mutation or could not be reached.
    Failed,
    /// The node did not qualify for this action.
    Refused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub tool: String,
    pub action: JournalAction,
    pub path: String,
    pub store: Option<String>,
    pub outcome: JournalOutcome,
    pub detail: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// The part of an entry supplied by the caller.
#[derive(Debug, Clone)]
pub struct JournalRecord<'a> {
    pub action: JournalAction,
    pub path: &'a str,
    pub store: Option<&'a str>,
    pub outcome: JournalOutcome,
    pub detail: Value,
}

/// Hash-chained JSON-Lines writer.
pub struct RepairJournal {
    path: PathBuf,
    tool: String,
    run_id: Uuid,
    last_hash: Option<String>,
    /// Entries already in the file; next entry's sequence number.
    seq: u64,
}

impl RepairJournal {
    /// Open (or create) the journal at `path`.
    ///
    /// An existing journal is verified first and the chain is continued from
    /// its last entry; a broken chain refuses to open.
    pub fn open(path: impl AsRef<Path>, tool: &str, run_id: Uuid) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let mut last_hash = None;
        let mut seq = 0u64;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("read repair journal {:?}", path))?;
            match verify_hash_chain_str(&content)? {
                VerifyResult::Valid { lines } => seq = lines as u64,
                VerifyResult::Broken { line, reason } => anyhow::bail!(
                    "JOURNAL_CHAIN_BROKEN {:?} line={}: {}",
                    path,
                    line,
                    reason
                ),
            }
            if let Some(last) = content.lines().rev().find(|l| !l.trim().is_empty()) {
                let ev: JournalEntry =
                    serde_json::from_str(last.trim()).context("parse last journal entry")?;
                last_hash = ev.hash_self;
            }
        }

        Ok(Self {
            path,
            tool: tool.to_string(),
            run_id,
            last_hash,
            seq,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of entries in the journal, including those from earlier runs.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn append(&mut self, rec: JournalRecord<'_>) -> Result<JournalEntry> {
        let event_id = derive_event_id(self.last_hash.as_deref(), self.seq);
        self.seq += 1;

        let mut ev = JournalEntry {
            event_id,
            run_id: self.run_id,
            ts_utc: Utc::now(),
            tool: self.tool.clone(),
            action: rec.action,
            path: rec.path.to_string(),
            store: rec.store.map(str::to_string),
            outcome: rec.outcome,
            detail: rec.detail,
            hash_prev: self.last_hash.clone(),
            hash_self: None,
        };
        let self_hash = compute_entry_hash(&ev)?;
        ev.hash_self = Some(self_hash.clone());
        self.last_hash = Some(self_hash);

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;
        Ok(ev)
    }
}

/// Event ids are derived from chain position, not drawn at random, so a
/// journal replayed from the same inputs yields the same ids.
fn derive_event_id(prev_hash: Option<&str>, seq: u64) -> Uuid {
    let name = format!("{}:{}", prev_hash.unwrap_or("GENESIS"), seq);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open repair journal {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write journal line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Sorted keys, compact JSON, one entry per line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize journal entry failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical entry with `hash_self` cleared.
pub fn compute_entry_hash(ev: &JournalEntry) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read repair journal {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: JournalEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse journal entry at line {}", i + 1))?;
        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        let Some(claimed) = ev.hash_self.as_deref() else {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: "hash_self missing".to_string(),
            });
        };
        let recomputed = compute_entry_hash(&ev)?;
        if claimed != recomputed {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_self mismatch: claimed {}, recomputed {}",
                    claimed, recomputed
                ),
            });
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}
