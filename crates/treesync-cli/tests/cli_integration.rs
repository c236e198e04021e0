//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! They test the "wiring" between the CLI and the core library.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const TREE_JSON: &str = r#"[
  {
    "name": "docs",
    "kind": "directory",
    "level": "collection",
    "children": [
      { "name": "intro", "kind": "file", "level": "module", "content": "hello" },
      { "name": "guides", "kind": "directory", "level": "module", "children": [] }
    ]
  },
  {
    "name": "notes",
    "kind": "directory",
    "level": "collection",
    "children": [{ "name": "todo", "kind": "file", "level": "module" }]
  }
]"#;

/// Create a CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    cli_cmd_with_remote(data_dir, &data_dir.path().join("remote"))
}

/// Same as [`cli_cmd`] but publishing somewhere else
fn cli_cmd_with_remote(data_dir: &TempDir, remote: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("treesync").expect("Failed to find treesync binary");
    cmd.arg("--data-dir").arg(data_dir.path().join("data"));
    cmd.arg("--remote").arg(remote);
    cmd
}

/// Create a data directory seeded with the sample tree
fn seeded() -> TempDir {
    let data_dir = TempDir::new().unwrap();
    let file = data_dir.path().join("tree.json");
    std::fs::write(&file, TREE_JSON).unwrap();

    cli_cmd(&data_dir)
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 5 nodes"));
    data_dir
}

// ============================================================================
// Tree Commands
// ============================================================================

#[test]
fn test_show_empty_tree() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("(empty tree)"))
        .stdout(predicate::str::contains("Status: Idle"));
}

#[test]
fn test_import_then_show() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("docs/ [collection] (1 files, 1 dirs)"))
        .stdout(predicate::str::contains("  intro [module]"))
        .stdout(predicate::str::contains("Status: Idle"));
}

#[test]
fn test_import_rejects_malformed_json() {
    let data_dir = TempDir::new().unwrap();
    let file = data_dir.path().join("bad.json");
    std::fs::write(&file, "{not json").unwrap();

    cli_cmd(&data_dir)
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Serialization error"));
}

#[test]
fn test_move_queues_one_record() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["mv", "docs/intro", "--to", "docs/guides"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 1 node(s) to docs/guides"))
        .stdout(predicate::str::contains("Status: Pending (1 changes)"));

    cli_cmd(&data_dir)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("move"))
        .stdout(predicate::str::contains("docs/intro"));

    cli_cmd(&data_dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("    intro [module]"));
}

#[test]
fn test_move_into_own_subtree_fails() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["mv", "docs", "--to", "docs/guides"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("own subtree"));

    cli_cmd(&data_dir)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("No queued changes"));
}

#[test]
fn test_delete_counts_descendants() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["rm", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 3 node(s)"))
        .stdout(predicate::str::contains("Status: Pending (3 changes)"));
}

#[test]
fn test_delete_unknown_node_fails() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["rm", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Node not found: nope"));
}

#[test]
fn test_new_with_generated_name() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["new", "--parent", "notes", "--kind", "dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ID: notes/untitled-"));
}

#[test]
fn test_new_under_file_fails() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["new", "--parent", "notes/todo", "--name", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

// ============================================================================
// Rename Modes
// ============================================================================

#[test]
fn test_strict_rename_changes_id() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["rename", "docs", "manual"])
        .assert()
        .success();

    cli_cmd(&data_dir).args(["rm", "docs"]).assert().failure();
    cli_cmd(&data_dir)
        .args(["rm", "manual/intro"])
        .assert()
        .success();
}

#[test]
fn test_loose_rename_keeps_id() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["--loose-rename", "rename", "docs", "manual"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("manual/ [collection]"));
    cli_cmd(&data_dir)
        .args(["rm", "docs/intro"])
        .assert()
        .success();
}

// ============================================================================
// Publish Commands
// ============================================================================

#[test]
fn test_publish_writes_outbox_and_index() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["mv", "notes/todo", "--to", "docs"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .arg("publish")
        .assert()
        .success()
        .stdout(predicate::str::contains("Published 1 changes"));

    let remote = data_dir.path().join("remote");
    let outbox = std::fs::read_to_string(remote.join("outbox.jsonl")).unwrap();
    assert_eq!(outbox.lines().count(), 1);
    let line: serde_json::Value = serde_json::from_str(outbox.trim()).unwrap();
    assert_eq!(line["kind"], "move");
    assert_eq!(line["dest_path"], "docs/todo");

    let index: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(remote.join("index.json")).unwrap()).unwrap();
    assert_eq!(index["notes/todo"]["change"], "moved");

    cli_cmd(&data_dir)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("No queued changes"));
}

#[test]
fn test_publish_with_nothing_queued() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .arg("publish")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to publish"));
}

#[test]
fn test_failed_publish_keeps_changes() {
    let data_dir = seeded();
    let blocker = data_dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();

    cli_cmd(&data_dir)
        .args(["rename", "notes", "journal"])
        .assert()
        .success();

    cli_cmd_with_remote(&data_dir, &blocker)
        .arg("publish")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Publish failed for 1 changes"))
        .stderr(predicate::str::contains("kept for the next publish"));

    cli_cmd(&data_dir)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("(retries: 1)"))
        .stdout(predicate::str::contains("Status: Pending (1 changes)"));

    cli_cmd(&data_dir)
        .arg("publish")
        .assert()
        .success()
        .stdout(predicate::str::contains("Published 1 changes"));
}

#[test]
fn test_discard_drops_pending() {
    let data_dir = seeded();

    cli_cmd(&data_dir)
        .args(["rm", "notes"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .arg("discard")
        .assert()
        .success()
        .stdout(predicate::str::contains("Discarded 2 changes"));

    cli_cmd(&data_dir)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("No queued changes"));

    // The local tree keeps the edit
    cli_cmd(&data_dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("notes").not());
}
