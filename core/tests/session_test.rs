use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use stigforge_core::catalog::{Catalog, FixRef};
use stigforge_core::query::Category;
use stigforge_core::session::{
    AssembleError, OutputDocument, SelectionSet, Session, SessionError,
};
use tempfile::TempDir;

const TEMPLATE: &str = "---\n- hosts: all\n  tasks:\n";

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Catalog with three fixes backed by real content files:
/// 1: SSH CAT 1, 2: DNS CAT 2, 3: SSH CAT 3.
fn fixture(dir: &TempDir) -> Catalog {
    let catalog = Catalog::open_in_memory().unwrap();
    let f1 = write_file(dir, "ssh_root.yaml", "  - name: ssh root\n");
    let f2 = write_file(dir, "dns_resolver.yaml", "  - name: dns resolver\n");
    let f3 = write_file(dir, "ssh_ciphers.yaml", "  - name: ssh ciphers\n");
    catalog.insert_fix(1, Category::Ssh, 1, f1.to_str().unwrap()).unwrap();
    catalog.insert_fix(2, Category::Dns, 2, f2.to_str().unwrap()).unwrap();
    catalog.insert_fix(3, Category::Ssh, 3, f3.to_str().unwrap()).unwrap();
    catalog
}

fn new_document(dir: &TempDir, name: &str) -> OutputDocument {
    let template = write_file(dir, "template.yaml", TEMPLATE);
    OutputDocument::create(&dir.path().join(name), &template).unwrap()
}

/// Drive a whole session from a scripted input, returning the rendered
/// output and the final playbook contents.
fn run_script(dir: &TempDir, catalog: &Catalog, script: &str) -> (String, String) {
    let document = new_document(dir, "playbook.yaml");
    let path = document.path().to_path_buf();
    let mut session = Session::new(catalog, document);
    let mut input = Cursor::new(script.as_bytes());
    let mut out = Vec::new();
    session.run(&mut input, &mut out).unwrap();
    (String::from_utf8(out).unwrap(), fs::read_to_string(path).unwrap())
}

// ---------------------------------------------------------------------------
// 1. Selection set
// ---------------------------------------------------------------------------
#[test]
fn test_admit_filters_duplicates_across_calls() {
    let mut set = SelectionSet::new();
    let fix = |id: i64| FixRef {
        group_id: id,
        content_path: format!("f{id}.yaml"),
    };

    let first = set.admit(vec![fix(1), fix(2)]);
    assert_eq!(first.len(), 2);

    // Overlapping later query: only the unseen id comes back
    let second = set.admit(vec![fix(2), fix(3)]);
    let ids: Vec<i64> = second.iter().map(|f| f.group_id).collect();
    assert_eq!(ids, vec![3]);

    // Fully seen query admits nothing
    assert!(set.admit(vec![fix(1), fix(3)]).is_empty());
    assert_eq!(set.len(), 3);
    assert!(set.contains(2));
}

#[test]
fn test_admit_preserves_candidate_order() {
    let mut set = SelectionSet::new();
    let candidates: Vec<FixRef> = [5, 2, 9]
        .into_iter()
        .map(|id| FixRef {
            group_id: id,
            content_path: String::new(),
        })
        .collect();
    let admitted = set.admit(candidates);
    let ids: Vec<i64> = admitted.iter().map(|f| f.group_id).collect();
    assert_eq!(ids, vec![5, 2, 9]);
}

// ---------------------------------------------------------------------------
// 2. Output document
// ---------------------------------------------------------------------------
#[test]
fn test_create_seeds_from_template() {
    let dir = TempDir::new().unwrap();
    let document = new_document(&dir, "out.yaml");
    assert_eq!(fs::read_to_string(document.path()).unwrap(), TEMPLATE);
}

#[test]
fn test_create_refuses_existing_file() {
    let dir = TempDir::new().unwrap();
    let template = write_file(&dir, "template.yaml", TEMPLATE);
    let existing = write_file(&dir, "out.yaml", "already here");
    assert!(OutputDocument::create(&existing, &template).is_err());
    // Original contents untouched
    assert_eq!(fs::read_to_string(&existing).unwrap(), "already here");
}

#[test]
fn test_append_is_verbatim_concatenation() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a.yaml", "  - a\n");
    let b = write_file(&dir, "b.yaml", "  - b\n");
    let mut document = new_document(&dir, "out.yaml");

    document
        .append_fixes(&[
            FixRef { group_id: 1, content_path: a.to_str().unwrap().into() },
            FixRef { group_id: 2, content_path: b.to_str().unwrap().into() },
        ])
        .unwrap();

    // No delimiters, appended in the given order
    let expected = format!("{TEMPLATE}  - a\n  - b\n");
    assert_eq!(fs::read_to_string(document.path()).unwrap(), expected);
}

#[test]
fn test_missing_content_is_an_integrity_error() {
    let dir = TempDir::new().unwrap();
    let mut document = new_document(&dir, "out.yaml");

    let err = document
        .append_fixes(&[FixRef {
            group_id: 42,
            content_path: dir.path().join("gone.yaml").to_str().unwrap().into(),
        }])
        .unwrap_err();
    assert!(
        matches!(err, AssembleError::MissingContent { group_id: 42, .. }),
        "got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// 3. Session loop, end to end
// ---------------------------------------------------------------------------
#[test]
fn test_category_query_appends_matches_in_catalog_order() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (_, playbook) = run_script(&dir, &catalog, "CATEGORY = SSH\nq\n");
    let expected = format!("{TEMPLATE}  - name: ssh root\n  - name: ssh ciphers\n");
    assert_eq!(playbook, expected);
}

#[test]
fn test_duplicate_group_id_across_queries_appends_once() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (out, playbook) = run_script(&dir, &catalog, "GROUP_ID = 2\nGROUP_ID = 2\nq\n");
    let expected = format!("{TEMPLATE}  - name: dns resolver\n");
    assert_eq!(playbook, expected);
    assert!(out.contains("No new fixes matched GROUP_ID = 2"));
}

#[test]
fn test_overlapping_queries_never_duplicate_a_fix() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    // GROUP_ID = 3 admits fix 3; CATEGORY = SSH then only admits fix 1
    let (_, playbook) = run_script(&dir, &catalog, "GROUP_ID = 3\nCATEGORY = SSH\nq\n");
    let expected = format!("{TEMPLATE}  - name: ssh ciphers\n  - name: ssh root\n");
    assert_eq!(playbook, expected);
}

#[test]
fn test_cross_query_order_follows_submission_order() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (_, playbook) = run_script(&dir, &catalog, "GROUP_ID = 2\nCATEGORY = SSH\nq\n");
    let expected =
        format!("{TEMPLATE}  - name: dns resolver\n  - name: ssh root\n  - name: ssh ciphers\n");
    assert_eq!(playbook, expected);
}

#[test]
fn test_rating_query_end_to_end() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (_, playbook) = run_script(&dir, &catalog, "CAT_RATING >= 2\nq\n");
    let expected = format!("{TEMPLATE}  - name: dns resolver\n  - name: ssh ciphers\n");
    assert_eq!(playbook, expected);
}

#[test]
fn test_malformed_query_is_reported_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (out, playbook) = run_script(&dir, &catalog, "CATEGORY =\nq\n");
    assert!(out.contains("Invalid query"), "got: {out}");
    assert_eq!(playbook, TEMPLATE, "document must stay template-only");
}

#[test]
fn test_unknown_category_is_recoverable() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    // Session keeps running after the rejected query
    let (out, playbook) = run_script(&dir, &catalog, "CATEGORY = FIREWALL\nGROUP_ID = 1\nq\n");
    assert!(out.contains("Invalid query"));
    let expected = format!("{TEMPLATE}  - name: ssh root\n");
    assert_eq!(playbook, expected);
}

#[test]
fn test_info_commands_do_not_change_the_document() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (out, playbook) = run_script(&dir, &catalog, "--categories\n--lang\n--list\nq\n");
    assert!(out.contains("Categories: AUDIT"));
    assert!(out.contains("CAT_RATING"));
    assert!(out.contains("dns_resolver.yaml"));
    assert_eq!(playbook, TEMPLATE);
}

#[test]
fn test_eof_terminates_the_session() {
    let dir = TempDir::new().unwrap();
    let catalog = fixture(&dir);
    let (_, playbook) = run_script(&dir, &catalog, "GROUP_ID = 1\n");
    let expected = format!("{TEMPLATE}  - name: ssh root\n");
    assert_eq!(playbook, expected);
}

#[test]
fn test_unreadable_content_ends_the_session_fatally() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::open_in_memory().unwrap();
    let f1 = write_file(&dir, "ok.yaml", "  - ok\n");
    catalog.insert_fix(1, Category::Ssh, 1, f1.to_str().unwrap()).unwrap();
    catalog
        .insert_fix(3, Category::Ssh, 2, dir.path().join("gone.yaml").to_str().unwrap())
        .unwrap();

    let document = new_document(&dir, "playbook.yaml");
    let path = document.path().to_path_buf();
    let mut session = Session::new(&catalog, document);
    let mut input = Cursor::new(b"CATEGORY = SSH\nq\n".as_slice());
    let mut out = Vec::new();

    let err = session.run(&mut input, &mut out).unwrap_err();
    assert!(
        matches!(
            err,
            SessionError::Assemble(AssembleError::MissingContent { group_id: 3, .. })
        ),
        "got {err:?}"
    );
    // The batch was partially appended: fix 1 made it in before the failure.
    let expected = format!("{TEMPLATE}  - ok\n");
    assert_eq!(fs::read_to_string(path).unwrap(), expected);
}
