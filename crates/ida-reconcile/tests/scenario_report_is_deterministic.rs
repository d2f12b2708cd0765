//! Report determinism and idempotence
//!
//! GREEN when:
//! - A clean project produces invalidNodeCount = 0 and no invalidNodes field.
//! - Insertion order of collector output does not change the serialized bytes.
//! - Invalid nodes are listed in ascending path order.
//! - Every source record survives serialization verbatim.
//! - Re-running the comparator on the parsed report yields the same tags.

use ida_reconcile::*;

fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

fn p(s: &str) -> NodePath {
    NodePath::parse(s).unwrap()
}

fn registry(size: u64) -> IdaRecord {
    IdaRecord {
        node_type: NodeType::File,
        size: Some(size),
        pid: "pid-a".to_string(),
        checksum: Some("ab12".to_string()),
        modified: Some(ts("2023-06-01T00:00:00Z")),
        frozen: ts("2023-06-01T00:00:00Z"),
        replicated: None,
    }
}

fn catalog(size: u64) -> MetaxRecord {
    MetaxRecord {
        node_type: NodeType::File,
        size: Some(size),
        pid: "pid-a".to_string(),
        checksum: Some("ab12".to_string()),
        modified: Some(ts("2023-06-01T00:00:00Z")),
        frozen: Some(ts("2023-06-01T00:00:00Z")),
    }
}

fn records() -> Vec<(NodePath, SourceRecord)> {
    let mtime = ts("2023-06-01T00:00:00Z");
    vec![
        // clean frozen file
        (p("frozen/a.dat"), SourceRecord::Filesystem(EntryRecord::file(10, mtime))),
        (p("frozen/a.dat"), SourceRecord::Nextcloud(EntryRecord::file(10, mtime))),
        (p("frozen/a.dat"), SourceRecord::Ida(registry(10))),
        (p("frozen/a.dat"), SourceRecord::Metax(catalog(10))),
        // orphan cache row
        (p("staging/x.dat"), SourceRecord::Nextcloud(EntryRecord::file(4, ts("2023-01-01")))),
        // size drift
        (p("frozen/b.dat"), SourceRecord::Filesystem(EntryRecord::file(100, mtime))),
        (p("frozen/b.dat"), SourceRecord::Nextcloud(EntryRecord::file(100, mtime))),
        (p("frozen/b.dat"), SourceRecord::Ida(registry(99))),
        (p("frozen/b.dat"), SourceRecord::Metax(catalog(99))),
    ]
}

fn build(records: Vec<(NodePath, SourceRecord)>) -> AuditReport {
    let mut table = MergedTable::new();
    table.extend(records).unwrap();
    AuditReport::build(
        "2000123",
        Cutoff::parse("2024-01-01T00:00:00Z").unwrap(),
        CompareOptions::default(),
        ts("2024-01-01T00:07:12Z"),
        table,
    )
}

#[test]
fn clean_project_has_no_invalid_nodes() {
    let clean: Vec<_> = records()
        .into_iter()
        .filter(|(path, _)| path.as_str() == "frozen/a.dat")
        .collect();
    let report = build(clean);
    assert_eq!(report.invalid_node_count, 0);
    assert_eq!(report.filesystem_node_count, 1);
    assert_eq!(report.metax_node_count, 1);
    assert!(!report.to_json().unwrap().contains("invalidNodes"));
}

#[test]
fn serialization_ignores_collection_order() {
    let forward = build(records()).to_json().unwrap();
    let mut reversed_input = records();
    reversed_input.reverse();
    let reversed = build(reversed_input).to_json().unwrap();
    assert_eq!(forward, reversed);
}

#[test]
fn invalid_nodes_are_sorted_and_records_kept_verbatim() {
    let report = build(records());
    let paths: Vec<&str> = report.invalid_nodes.keys().map(|k| k.as_str()).collect();
    assert_eq!(paths, vec!["frozen/b.dat", "staging/x.dat"]);

    let b = &report.invalid_nodes[&p("frozen/b.dat")];
    assert_eq!(b.ida, Some(registry(99)));
    assert_eq!(b.metax, Some(catalog(99)));

    let json = report.to_json().unwrap();
    let b_pos = json.find("\"frozen/b.dat\"").unwrap();
    let x_pos = json.find("\"staging/x.dat\"").unwrap();
    assert!(b_pos < x_pos);
    assert!(json.contains("\"checksum\": \"ab12\""));
    assert!(json.contains("\"frozen\": \"2023-06-01T00:00:00Z\""));
}

#[test]
fn comparator_is_idempotent_over_parsed_report() {
    let report = build(records());
    let parsed = AuditReport::from_json(&report.to_json().unwrap()).unwrap();
    for (path, tags) in parsed.recompute_errors() {
        assert_eq!(tags, report.invalid_nodes[&path].errors, "{path}");
    }
    assert_eq!(parsed.to_json().unwrap(), report.to_json().unwrap());
}
