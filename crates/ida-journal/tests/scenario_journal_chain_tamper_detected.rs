//! Repair journal hash chain
//!
//! GREEN when:
//! - Entries appended across two runs form one verifiable chain.
//! - Editing an entry's outcome is detected at that line (hash_self).
//! - Deleting an entry is detected on the following line (hash_prev).
//! - A tampered journal refuses to be reopened for appending.

use ida_journal::{
    verify_hash_chain, JournalAction, JournalOutcome, JournalRecord, RepairJournal, VerifyResult,
};
use serde_json::json;
use uuid::Uuid;

fn write_entries(journal: &mut RepairJournal, n: usize) {
    for i in 0..n {
        let path = format!("frozen/file_{i}.dat");
        journal
            .append(JournalRecord {
                action: JournalAction::UpdateModified,
                path: &path,
                store: Some("metax"),
                outcome: JournalOutcome::Applied,
                detail: json!({"modified": "2023-06-01T00:00:00Z"}),
            })
            .unwrap();
    }
}

#[test]
fn chain_continues_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json.journal.jsonl");

    let mut first = RepairJournal::open(&path, "ida-repair-timestamps", Uuid::new_v4()).unwrap();
    write_entries(&mut first, 3);
    let last = first.last_hash().map(str::to_string);
    drop(first);

    let mut second = RepairJournal::open(&path, "ida-purge-orphans", Uuid::new_v4()).unwrap();
    assert_eq!(second.seq(), 3);
    assert_eq!(second.last_hash().map(str::to_string), last);
    write_entries(&mut second, 2);

    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 5 }
    );
}

#[test]
fn edited_outcome_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("j.jsonl");
    let mut journal = RepairJournal::open(&path, "ida-repair-timestamps", Uuid::new_v4()).unwrap();
    write_entries(&mut journal, 4);

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut ev: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    ev["outcome"] = json!("FAILED");
    lines[1] = serde_json::to_string(&ev).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("hash_self mismatch"), "{reason}");
        }
        other => panic!("tamper not detected: {other:?}"),
    }

    let reopen = RepairJournal::open(&path, "ida-repair-timestamps", Uuid::new_v4());
    assert!(reopen.is_err());
}

#[test]
fn deleted_entry_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("j.jsonl");
    let mut journal = RepairJournal::open(&path, "ida-purge-orphans", Uuid::new_v4()).unwrap();
    write_entries(&mut journal, 4);

    let content = std::fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, l)| l)
        .collect();
    std::fs::write(&path, kept.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("hash_prev mismatch"), "{reason}");
        }
        other => panic!("deletion not detected: {other:?}"),
    }
}
