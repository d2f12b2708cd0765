//! End-to-end audit runs over in-memory stores
//!
//! GREEN when:
//! - A project whose four stores agree produces invalidNodeCount = 0 and no
//!   invalidNodes field.
//! - Size and timestamp drift is reported per store pair without a checksum tag.
//! - Frozen-timestamp drift alone yields exactly one tag.
//! - A registry record with a replication timestamp and no replica yields
//!   "Node does not exist in replication" and no replication block.
//! - A filesystem file whose mtime equals the cut-off never reaches the table.
//! - Identical inputs produce byte-identical reports.

use anyhow::Result;
use ida_auditor::{Auditor, Collector, FilesystemSource, ReplicaProbe};
use ida_fs::FilesystemCollector;
use ida_reconcile::{
    CompareOptions, Cutoff, EntryRecord, ErrorTag, IdaRecord, MetaxRecord, NodePath, NodeType,
    PathLayout, Source, SourceRecord, Store, Timestamp,
};
use std::collections::BTreeSet;

struct Memory {
    source: Source,
    records: Vec<(NodePath, SourceRecord)>,
}

#[async_trait::async_trait]
impl Collector for Memory {
    fn source(&self) -> Source {
        self.source
    }

    async fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, SourceRecord)>> {
        Ok(self
            .records
            .iter()
            .filter(|(_, r)| recorded_at(r).map_or(true, |t| cutoff.admits(t)))
            .cloned()
            .collect())
    }
}

fn recorded_at(r: &SourceRecord) -> Option<Timestamp> {
    match r {
        SourceRecord::Filesystem(e) | SourceRecord::Nextcloud(e) => e.modified,
        SourceRecord::Ida(i) => Some(i.frozen),
        SourceRecord::Metax(m) => m.frozen.or(m.modified),
    }
}

struct Replicas(Vec<(NodePath, EntryRecord)>);

impl ReplicaProbe for Replicas {
    fn probe(&self, path: &NodePath) -> Result<Option<EntryRecord>> {
        Ok(self
            .0
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, r)| r.clone()))
    }
}

fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

fn path(s: &str) -> NodePath {
    NodePath::parse(s).unwrap()
}

fn cutoff() -> Cutoff {
    Cutoff::parse("2024-01-01T00:00:00Z").unwrap()
}

fn fixed_end() -> Timestamp {
    Timestamp::parse("2024-01-01T00:07:12Z").unwrap()
}

fn ida(size: u64, modified: &str, frozen: &str, replicated: Option<&str>) -> IdaRecord {
    IdaRecord {
        node_type: NodeType::File,
        size: Some(size),
        pid: "pid-a".to_string(),
        checksum: Some("ab".to_string()),
        modified: Some(ts(modified)),
        frozen: ts(frozen),
        replicated: replicated.map(ts),
    }
}

fn metax(size: u64, modified: &str, frozen: &str) -> MetaxRecord {
    MetaxRecord {
        node_type: NodeType::File,
        size: Some(size),
        pid: "pid-a".to_string(),
        checksum: Some("ab".to_string()),
        modified: Some(ts(modified)),
        frozen: Some(ts(frozen)),
    }
}

struct Stores {
    fs: Vec<(NodePath, SourceRecord)>,
    wc: Vec<(NodePath, SourceRecord)>,
    reg: Vec<(NodePath, SourceRecord)>,
    cat: Vec<(NodePath, SourceRecord)>,
    replicas: Vec<(NodePath, EntryRecord)>,
}

impl Stores {
    fn empty() -> Self {
        Self {
            fs: vec![],
            wc: vec![],
            reg: vec![],
            cat: vec![],
            replicas: vec![],
        }
    }

    /// One frozen file with `fs` / `wc` sizes and mtimes and matching
    /// registry and catalog records.
    fn frozen_file(
        p: &str,
        fs: (u64, &str),
        wc: (u64, &str),
        reg: IdaRecord,
        cat: MetaxRecord,
    ) -> Self {
        Self {
            fs: vec![(path(p), SourceRecord::Filesystem(EntryRecord::file(fs.0, ts(fs.1))))],
            wc: vec![(path(p), SourceRecord::Nextcloud(EntryRecord::file(wc.0, ts(wc.1))))],
            reg: vec![(path(p), SourceRecord::Ida(reg))],
            cat: vec![(path(p), SourceRecord::Metax(cat))],
            replicas: vec![],
        }
    }

    fn auditor(self) -> Auditor {
        Auditor::new("2000123", Box::new(Replicas(self.replicas)))
            .with_clock(fixed_end)
            .with_collector(Box::new(Memory {
                source: Source::Filesystem,
                records: self.fs,
            }))
            .with_collector(Box::new(Memory {
                source: Source::Nextcloud,
                records: self.wc,
            }))
            .with_collector(Box::new(Memory {
                source: Source::Ida,
                records: self.reg,
            }))
            .with_collector(Box::new(Memory {
                source: Source::Metax,
                records: self.cat,
            }))
    }
}

const JUNE1: &str = "2023-06-01T00:00:00Z";
const JUNE2: &str = "2023-06-02T00:00:00Z";

#[tokio::test]
async fn clean_project_has_no_invalid_nodes() {
    let stores = Stores::frozen_file(
        "frozen/a.dat",
        (10, JUNE1),
        (10, JUNE1),
        ida(10, JUNE1, JUNE1, None),
        metax(10, JUNE1, JUNE1),
    );
    let report = stores
        .auditor()
        .run(cutoff(), CompareOptions::default())
        .await
        .unwrap();

    assert_eq!(report.invalid_node_count, 0);
    assert_eq!(report.filesystem_node_count, 1);
    assert_eq!(report.metax_node_count, 1);
    assert_eq!(report.start.to_string(), "2024-01-01T00:00:00Z");
    assert_eq!(report.end.to_string(), "2024-01-01T00:07:12Z");
    assert!(!report.to_json().unwrap().contains("invalidNodes"));
}

#[tokio::test]
async fn size_and_timestamp_drift() {
    let stores = Stores::frozen_file(
        "frozen/a.dat",
        (100, JUNE1),
        (100, JUNE2),
        ida(99, JUNE1, JUNE1, None),
        metax(99, JUNE1, JUNE1),
    );
    let report = stores
        .auditor()
        .run(cutoff(), CompareOptions::default())
        .await
        .unwrap();

    let errors = &report.invalid_nodes[&path("frozen/a.dat")].errors;
    for tag in [
        ErrorTag::size(Store::Filesystem, Store::Ida).unwrap(),
        ErrorTag::size(Store::Nextcloud, Store::Ida).unwrap(),
        ErrorTag::modified(Store::Filesystem, Store::Nextcloud).unwrap(),
    ] {
        assert!(errors.contains(&tag), "missing {tag}");
    }
    assert!(!errors.contains(&ErrorTag::ChecksumMismatch));

    let ignoring = Stores::frozen_file(
        "frozen/a.dat",
        (100, JUNE1),
        (100, JUNE2),
        ida(99, JUNE1, JUNE1, None),
        metax(99, JUNE1, JUNE1),
    )
    .auditor()
    .run(cutoff(), CompareOptions::ignoring_timestamps())
    .await
    .unwrap();
    let errors = &ignoring.invalid_nodes[&path("frozen/a.dat")].errors;
    assert!(errors.iter().all(|t| !t.is_timestamp()));
    assert!(ignoring.ignore_timestamps);
}

#[tokio::test]
async fn frozen_timestamp_drift_only() {
    let stores = Stores::frozen_file(
        "frozen/a.dat",
        (10, JUNE1),
        (10, JUNE1),
        ida(10, JUNE1, JUNE1, None),
        metax(10, JUNE1, JUNE2),
    );
    let report = stores
        .auditor()
        .run(cutoff(), CompareOptions::default())
        .await
        .unwrap();

    let errors = &report.invalid_nodes[&path("frozen/a.dat")].errors;
    assert_eq!(errors, &BTreeSet::from([ErrorTag::FrozenMismatch]));
    assert_eq!(
        ErrorTag::FrozenMismatch.to_string(),
        "Node frozen timestamp different for IDA and Metax"
    );
}

#[tokio::test]
async fn missing_replica_and_present_replica() {
    let mut stores = Stores::frozen_file(
        "frozen/r.dat",
        (10, JUNE1),
        (10, JUNE1),
        ida(10, JUNE1, JUNE1, Some(JUNE2)),
        metax(10, JUNE1, JUNE1),
    );
    let ok = Stores::frozen_file(
        "frozen/s.dat",
        (10, JUNE1),
        (10, JUNE1),
        ida(10, JUNE1, JUNE1, Some(JUNE2)),
        metax(10, JUNE1, JUNE1),
    );
    stores.fs.extend(ok.fs);
    stores.wc.extend(ok.wc);
    stores.reg.extend(ok.reg);
    stores.cat.extend(ok.cat);
    stores
        .replicas
        .push((path("frozen/s.dat"), EntryRecord::file(10, ts(JUNE2))));

    let report = stores
        .auditor()
        .run(cutoff(), CompareOptions::default())
        .await
        .unwrap();

    assert_eq!(report.invalid_node_count, 1);
    let node = &report.invalid_nodes[&path("frozen/r.dat")];
    assert_eq!(
        node.errors,
        BTreeSet::from([ErrorTag::Missing(Store::Replication)])
    );
    assert!(node.replication.is_none());
}

#[tokio::test]
async fn file_at_cutoff_is_excluded_from_the_walk() {
    let dir = tempfile::tempdir().unwrap();
    let frozen = dir.path().join("PSO_2000123/files/2000123");
    std::fs::create_dir_all(&frozen).unwrap();
    let file = frozen.join("a.dat");
    std::fs::write(&file, b"0123456789").unwrap();
    let mtime = std::fs::metadata(&file).unwrap().modified().unwrap();
    let at = Cutoff::new(Timestamp::from_datetime(&chrono::DateTime::<chrono::Utc>::from(
        mtime,
    )));

    let fs = FilesystemCollector::new(
        dir.path(),
        "PSO_2000123",
        PathLayout::new("2000123", "+"),
    );
    let report = Auditor::new("2000123", Box::new(Replicas(vec![])))
        .with_collector(Box::new(FilesystemSource::new(fs)))
        .run(at, CompareOptions::default())
        .await
        .unwrap();

    assert_eq!(report.filesystem_node_count, 0);
    assert_eq!(report.invalid_node_count, 0);
}

#[tokio::test]
async fn identical_inputs_serialize_identically() {
    let build = || {
        let mut s = Stores::frozen_file(
            "frozen/a.dat",
            (100, JUNE1),
            (100, JUNE2),
            ida(99, JUNE1, JUNE1, None),
            metax(99, JUNE1, JUNE1),
        );
        s.wc.push((
            path("staging/x.dat"),
            SourceRecord::Nextcloud(EntryRecord::file(4, ts("2023-01-01T00:00:00Z"))),
        ));
        s.auditor()
    };
    let a = build().run(cutoff(), CompareOptions::default()).await.unwrap();
    let b = build().run(cutoff(), CompareOptions::default()).await.unwrap();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());

    let keys: Vec<&str> = a.invalid_nodes.keys().map(|p| p.as_str()).collect();
    assert_eq!(keys, vec!["frozen/a.dat", "staging/x.dat"]);
}
