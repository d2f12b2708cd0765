//! Rule-based comparator.
//!
//! Pure function from one merged entry to its ordered set of error tags.
//! Rules fire independently; every applicable tag is reported and the
//! resulting set is ordered by [`ErrorTag`]'s contract ordering.
//!
//! Rule groups, in order of application:
//! 1. cross-store existence between filesystem and Nextcloud (always)
//! 2. file/file agreement between filesystem and Nextcloud
//! 3. frozen-area rules (registry, catalog and every file pair)
//! 4. replication rules (registry record with a `replicated` instant)

use std::collections::BTreeSet;

use crate::path::NodePath;
use crate::tags::{ErrorTag, Store};
use crate::timestamp::Timestamp;
use crate::types::{EntryRecord, Node};

/// Comparator switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompareOptions {
    /// Compare modification and frozen timestamps. On by default;
    /// `--ignore-timestamps` turns it off.
    pub compare_timestamps: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            compare_timestamps: true,
        }
    }
}

impl CompareOptions {
    pub fn ignoring_timestamps() -> Self {
        Self {
            compare_timestamps: false,
        }
    }
}

/// File-typed view of one store's record used for pairwise agreement checks.
struct FileView {
    store: Store,
    size: Option<u64>,
    modified: Option<Timestamp>,
}

fn entry_file_view(store: Store, rec: Option<&EntryRecord>) -> Option<FileView> {
    rec.filter(|r| r.is_file()).map(|r| FileView {
        store,
        size: r.size,
        modified: r.modified,
    })
}

fn differ<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

fn push(errors: &mut BTreeSet<ErrorTag>, tag: Option<ErrorTag>) {
    if let Some(t) = tag {
        errors.insert(t);
    }
}

/// Apply every comparator rule to one merged entry.
///
/// The node's existing `errors` are ignored; the result depends only on
/// `path`, the per-source records and `opts`.
pub fn compare(path: &NodePath, node: &Node, opts: CompareOptions) -> BTreeSet<ErrorTag> {
    let mut errors: BTreeSet<ErrorTag> = BTreeSet::new();

    let fs = node.filesystem.as_ref();
    let wc = node.nextcloud.as_ref();
    let reg = node.ida.as_ref();
    let cat = node.metax.as_ref();

    // 1) Cross-store existence.
    if fs.is_some() && wc.is_none() {
        errors.insert(ErrorTag::Missing(Store::Nextcloud));
    }
    if wc.is_some() && fs.is_none() {
        errors.insert(ErrorTag::Missing(Store::Filesystem));
    }
    if let (Some(f), Some(w)) = (fs, wc) {
        if f.node_type != w.node_type {
            push(&mut errors, ErrorTag::node_type(Store::Filesystem, Store::Nextcloud));
        }
    }

    let fs_file = entry_file_view(Store::Filesystem, fs);
    let wc_file = entry_file_view(Store::Nextcloud, wc);

    // 2) File/file agreement.
    if let (Some(f), Some(w)) = (&fs_file, &wc_file) {
        if differ(f.size, w.size) {
            push(&mut errors, ErrorTag::size(Store::Filesystem, Store::Nextcloud));
        }
        if opts.compare_timestamps && differ(f.modified, w.modified) {
            push(&mut errors, ErrorTag::modified(Store::Filesystem, Store::Nextcloud));
        }
    }

    // 3) Frozen area.
    let frozen_evidence =
        reg.is_some() || cat.is_some() || fs_file.is_some() || wc_file.is_some();
    if path.is_frozen() && frozen_evidence {
        if reg.is_none() {
            errors.insert(ErrorTag::Missing(Store::Ida));
        }
        if cat.is_none() {
            errors.insert(ErrorTag::Missing(Store::Metax));
        }
        if fs.is_none() && wc.is_none() {
            errors.insert(ErrorTag::Missing(Store::Filesystem));
            errors.insert(ErrorTag::Missing(Store::Nextcloud));
        }

        let frozen_stores = [
            (Store::Ida, reg.is_some()),
            (Store::Metax, cat.is_some()),
        ];
        let entry_stores = [(Store::Filesystem, fs), (Store::Nextcloud, wc)];
        for (x, x_present) in frozen_stores {
            if !x_present {
                continue;
            }
            for (y, rec) in entry_stores {
                if rec.is_some_and(|r| !r.is_file()) {
                    push(&mut errors, ErrorTag::node_type(y, x));
                }
            }
        }

        let mut files: Vec<FileView> = Vec::with_capacity(4);
        if let Some(r) = reg {
            files.push(FileView {
                store: Store::Ida,
                size: r.size,
                modified: r.modified,
            });
        }
        if let Some(c) = cat {
            files.push(FileView {
                store: Store::Metax,
                size: c.size,
                modified: c.modified,
            });
        }
        files.extend(fs_file);
        files.extend(wc_file);

        for (i, a) in files.iter().enumerate() {
            for b in &files[i + 1..] {
                if differ(a.size, b.size) {
                    push(&mut errors, ErrorTag::size(a.store, b.store));
                }
                if opts.compare_timestamps && differ(a.modified, b.modified) {
                    push(&mut errors, ErrorTag::modified(a.store, b.store));
                }
            }
        }

        if let (Some(r), Some(c)) = (reg, cat) {
            if opts.compare_timestamps && Some(r.frozen) != c.frozen {
                errors.insert(ErrorTag::FrozenMismatch);
            }
            if r.checksum != c.checksum {
                errors.insert(ErrorTag::ChecksumMismatch);
            }
            if r.pid != c.pid {
                errors.insert(ErrorTag::PidMismatch);
            }
        }
    }

    // 4) Replication.
    if let Some(r) = reg.filter(|r| r.replicated.is_some()) {
        match node.replication.as_ref() {
            None => {
                errors.insert(ErrorTag::Missing(Store::Replication));
            }
            Some(rep) if !rep.is_file() => {
                push(&mut errors, ErrorTag::node_type(Store::Replication, Store::Ida));
            }
            Some(rep) => {
                if r.size != rep.size {
                    push(&mut errors, ErrorTag::size(Store::Replication, Store::Ida));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdaRecord, MetaxRecord, NodeType};

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn texts(errors: &BTreeSet<ErrorTag>) -> Vec<String> {
        errors.iter().map(|t| t.to_string()).collect()
    }

    fn ida(size: u64, modified: &str, frozen: &str) -> IdaRecord {
        IdaRecord {
            node_type: NodeType::File,
            size: Some(size),
            pid: "pid-1".to_string(),
            checksum: Some("abc".to_string()),
            modified: Some(ts(modified)),
            frozen: ts(frozen),
            replicated: None,
        }
    }

    fn metax(size: u64, modified: &str, frozen: &str) -> MetaxRecord {
        MetaxRecord {
            node_type: NodeType::File,
            size: Some(size),
            pid: "pid-1".to_string(),
            checksum: Some("abc".to_string()),
            modified: Some(ts(modified)),
            frozen: Some(ts(frozen)),
        }
    }

    #[test]
    fn fs_only_staging_file_reports_missing_nextcloud() {
        let node = Node {
            filesystem: Some(EntryRecord::file(1, ts("2023-01-01"))),
            ..Node::default()
        };
        let p = NodePath::parse("staging/a").unwrap();
        assert_eq!(
            texts(&compare(&p, &node, CompareOptions::default())),
            vec!["Node does not exist in Nextcloud"]
        );
    }

    #[test]
    fn fs_only_frozen_file_reports_ida_metax_nextcloud() {
        let node = Node {
            filesystem: Some(EntryRecord::file(1, ts("2023-01-01"))),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/a").unwrap();
        assert_eq!(
            texts(&compare(&p, &node, CompareOptions::default())),
            vec![
                "Node does not exist in IDA",
                "Node does not exist in Metax",
                "Node does not exist in Nextcloud",
            ]
        );
    }

    #[test]
    fn matching_frozen_folders_are_clean() {
        let node = Node {
            filesystem: Some(EntryRecord::folder(ts("2023-01-01"))),
            nextcloud: Some(EntryRecord::folder(ts("2023-01-01"))),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/dir").unwrap();
        assert!(compare(&p, &node, CompareOptions::default()).is_empty());
    }

    #[test]
    fn folder_where_registry_has_a_file() {
        let node = Node {
            filesystem: Some(EntryRecord::folder(ts("2023-06-01"))),
            nextcloud: Some(EntryRecord::folder(ts("2023-06-01"))),
            ida: Some(ida(5, "2023-06-01", "2023-06-02")),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/x").unwrap();
        let got = texts(&compare(&p, &node, CompareOptions::default()));
        assert_eq!(
            got,
            vec![
                "Node does not exist in Metax",
                "Node type different for Nextcloud and IDA",
                "Node type different for filesystem and IDA",
            ]
        );
    }

    #[test]
    fn fs_webstore_type_mismatch() {
        let node = Node {
            filesystem: Some(EntryRecord::folder(ts("2023-06-01"))),
            nextcloud: Some(EntryRecord::file(3, ts("2023-06-01"))),
            ..Node::default()
        };
        let p = NodePath::parse("staging/x").unwrap();
        assert_eq!(
            texts(&compare(&p, &node, CompareOptions::default())),
            vec!["Node type different for filesystem and Nextcloud"]
        );
    }

    #[test]
    fn ignoring_timestamps_suppresses_timestamp_tags_only() {
        let node = Node {
            filesystem: Some(EntryRecord::file(10, ts("2023-06-01"))),
            nextcloud: Some(EntryRecord::file(10, ts("2023-06-02"))),
            ida: Some(ida(10, "2023-06-01", "2023-06-01")),
            metax: Some(metax(10, "2023-06-01", "2023-06-03")),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/a").unwrap();
        assert!(compare(&p, &node, CompareOptions::ignoring_timestamps()).is_empty());
        let with = compare(&p, &node, CompareOptions::default());
        assert!(with.iter().all(|t| t.is_timestamp()));
        assert!(with.contains(&ErrorTag::FrozenMismatch));
    }

    #[test]
    fn checksum_and_pid_mismatch() {
        let mut m = metax(10, "2023-06-01", "2023-06-01");
        m.checksum = Some("def".to_string());
        m.pid = "pid-2".to_string();
        let node = Node {
            filesystem: Some(EntryRecord::file(10, ts("2023-06-01"))),
            nextcloud: Some(EntryRecord::file(10, ts("2023-06-01"))),
            ida: Some(ida(10, "2023-06-01", "2023-06-01")),
            metax: Some(m),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/a").unwrap();
        assert_eq!(
            texts(&compare(&p, &node, CompareOptions::default())),
            vec![
                "Node checksum different for IDA and Metax",
                "Node pid different for IDA and Metax",
            ]
        );
    }

    #[test]
    fn replicated_but_replica_is_a_folder() {
        let mut r = ida(10, "2023-06-01", "2023-06-01");
        r.replicated = Some(ts("2023-06-02"));
        let node = Node {
            filesystem: Some(EntryRecord::file(10, ts("2023-06-01"))),
            nextcloud: Some(EntryRecord::file(10, ts("2023-06-01"))),
            ida: Some(r),
            metax: Some(metax(10, "2023-06-01", "2023-06-01")),
            replication: Some(EntryRecord {
                node_type: NodeType::Folder,
                size: None,
                modified: None,
            }),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/a").unwrap();
        assert_eq!(
            texts(&compare(&p, &node, CompareOptions::default())),
            vec!["Node type different for replication and IDA"]
        );
    }

    #[test]
    fn replica_size_drift() {
        let mut r = ida(10, "2023-06-01", "2023-06-01");
        r.replicated = Some(ts("2023-06-02"));
        let node = Node {
            filesystem: Some(EntryRecord::file(10, ts("2023-06-01"))),
            nextcloud: Some(EntryRecord::file(10, ts("2023-06-01"))),
            ida: Some(r),
            metax: Some(metax(10, "2023-06-01", "2023-06-01")),
            replication: Some(EntryRecord::file(9, ts("2023-06-02"))),
            ..Node::default()
        };
        let p = NodePath::parse("frozen/a").unwrap();
        assert_eq!(
            texts(&compare(&p, &node, CompareOptions::default())),
            vec!["Node size different for replication and IDA"]
        );
    }
}
