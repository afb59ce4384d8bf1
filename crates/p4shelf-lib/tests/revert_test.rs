mod common;

use common::StubVcs;
use p4shelf_lib::revert::{self, RevertError, SubmittedFile};
use p4shelf_lib::{Config, FileAction, Record, Session};

fn describe(files: &[(&str, &str, u32)]) -> Record {
    let mut record = Record::new().with("change", "77");
    for (i, (path, action, rev)) in files.iter().enumerate() {
        record.insert(format!("depotFile{}", i), *path);
        record.insert(format!("action{}", i), *action);
        record.insert(format!("rev{}", i), rev.to_string());
    }
    record
}

fn head(vcs: StubVcs, path: &str, rev: u32) -> StubVcs {
    vcs.respond(
        &format!("fstat {}", path),
        Record::new().with("depotFile", path).with("headRev", rev.to_string()),
    )
}

fn previous_action(vcs: StubVcs, path: &str, rev: u32, action: &str) -> StubVcs {
    vcs.respond(
        &format!("fstat {}#{}", path, rev),
        Record::new().with("depotFile", path).with("headAction", action),
    )
}

#[test]
fn test_describe_reads_indexed_fields() {
    let vcs = StubVcs::new().respond(
        "describe -s 77",
        describe(&[("//depot/a.c", "add", 1), ("//depot/b.c", "edit", 4)]),
    );
    let session = Session::new(&vcs, Config::default());

    let files = revert::describe_change(&session, 77).unwrap();
    assert_eq!(
        files,
        vec![
            SubmittedFile {
                depot_path: "//depot/a.c".to_string(),
                action: FileAction::Add,
                revision: 1,
            },
            SubmittedFile {
                depot_path: "//depot/b.c".to_string(),
                action: FileAction::Edit,
                revision: 4,
            },
        ]
    );
}

#[test]
fn test_describe_with_multi_paragraph_description() {
    let vcs = StubVcs::new().respond_tagged(
        "describe -s 77",
        "\
... change 77
... user jim
... desc Fix the build

Also the tests.

... status submitted
... depotFile0 //depot/a.c
... action0 add
... rev0 1
... depotFile1 //depot/b.c
... action1 edit
... rev1 4
",
    );
    let session = Session::new(&vcs, Config::default());

    let files = revert::describe_change(&session, 77).unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.depot_path.as_str()).collect();
    assert_eq!(paths, vec!["//depot/a.c", "//depot/b.c"]);
    assert_eq!(files[1].revision, 4);
}

#[test]
fn test_every_action_is_inverted() {
    let mut vcs = StubVcs::new().respond(
        "describe -s 77",
        describe(&[
            ("//depot/a.c", "add", 1),
            ("//depot/b.c", "edit", 4),
            ("//depot/c.c", "delete", 3),
            ("//depot/d.c", "branch", 1),
            ("//depot/e.c", "integrate", 2),
        ]),
    );
    vcs = previous_action(vcs, "//depot/b.c", 3, "edit");
    vcs = previous_action(vcs, "//depot/e.c", 1, "add");
    vcs = head(vcs, "//depot/b.c", 4);
    vcs = head(vcs, "//depot/c.c", 3);
    vcs = head(vcs, "//depot/e.c", 2);
    let session = Session::new(&vcs, Config::default());

    let report = revert::revert_change(&session, 77).unwrap();

    assert!(report.failures.is_empty());
    assert!(report.ambiguous.is_empty());
    assert_eq!(
        vcs.mutations(),
        vec![
            "delete //depot/a.c",
            "sync //depot/b.c#3",
            "edit //depot/b.c",
            "sync //depot/b.c",
            "resolve -ay //depot/b.c",
            "sync //depot/c.c#2",
            "add //depot/c.c",
            "sync //depot/c.c",
            "resolve -ay //depot/c.c",
            "delete //depot/d.c",
            "sync //depot/e.c#1",
            "edit //depot/e.c",
            "sync //depot/e.c",
            "resolve -ay //depot/e.c",
        ]
    );
    assert_eq!(report.steps.len(), vcs.mutations().len());
}

#[test]
fn test_step_back_onto_deleted_revision_deletes() {
    let mut vcs = StubVcs::new().respond("describe -s 77", describe(&[("//depot/b.c", "edit", 4)]));
    vcs = previous_action(vcs, "//depot/b.c", 3, "delete");
    vcs = head(vcs, "//depot/b.c", 4);
    let session = Session::new(&vcs, Config::default());

    revert::revert_change(&session, 77).unwrap();
    assert_eq!(vcs.mutations(), vec!["delete //depot/b.c"]);
}

#[test]
fn test_later_revision_skips_resolve_unless_forced() {
    let build = || {
        let mut vcs =
            StubVcs::new().respond("describe -s 77", describe(&[("//depot/b.c", "edit", 4)]));
        vcs = previous_action(vcs, "//depot/b.c", 3, "edit");
        head(vcs, "//depot/b.c", 6)
    };

    let vcs = build();
    let session = Session::new(&vcs, Config::default());
    let report = revert::revert_change(&session, 77).unwrap();
    assert_eq!(report.ambiguous.len(), 1);
    assert_eq!(report.ambiguous[0].head, 6);
    assert!(!vcs.mutations().contains(&"resolve -ay //depot/b.c".to_string()));

    let vcs = build();
    let session = Session::new(&vcs, Config::default().with_force(true));
    let report = revert::revert_change(&session, 77).unwrap();
    assert!(report.ambiguous.is_empty());
    assert!(vcs.mutations().contains(&"resolve -ay //depot/b.c".to_string()));
}

#[test]
fn test_dry_run_plans_without_mutating() {
    let mut vcs = StubVcs::new().respond(
        "describe -s 77",
        describe(&[("//depot/a.c", "add", 1), ("//depot/c.c", "delete", 3)]),
    );
    vcs = head(vcs, "//depot/c.c", 3);
    let session = Session::new(&vcs, Config::default().with_dry_run(true));

    let report = revert::revert_change(&session, 77).unwrap();

    assert!(vcs.mutations().is_empty());
    let planned: Vec<String> = report.steps.iter().map(|c| c.line()).collect();
    assert_eq!(
        planned,
        vec![
            "delete //depot/a.c",
            "sync //depot/c.c#2",
            "add //depot/c.c",
            "sync //depot/c.c",
            "resolve -ay //depot/c.c",
        ]
    );
}

#[test]
fn test_failing_file_does_not_stop_the_rest() {
    let vcs = StubVcs::new()
        .respond(
            "describe -s 77",
            describe(&[("//depot/a.c", "add", 1), ("//depot/d.c", "branch", 1)]),
        )
        .fail("delete //depot/a.c");
    let session = Session::new(&vcs, Config::default());

    let report = revert::revert_change(&session, 77).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "//depot/a.c");
    assert!(vcs.mutations().contains(&"delete //depot/d.c".to_string()));
}

#[test]
fn test_pending_resolves_are_reported() {
    let vcs = StubVcs::new()
        .respond("describe -s 77", describe(&[("//depot/a.c", "add", 1)]))
        .respond(
            "resolve -n",
            Record::new()
                .with("clientFile", "/ws/b.c")
                .with("fromFile", "//depot/b.c"),
        );
    let session = Session::new(&vcs, Config::default());

    let report = revert::revert_change(&session, 77).unwrap();
    assert_eq!(report.pending_resolve, vec!["/ws/b.c"]);
}

#[test]
fn test_failed_resolve_listing_means_nothing_pending() {
    let vcs = StubVcs::new()
        .respond("describe -s 77", describe(&[("//depot/a.c", "add", 1)]))
        .fail("resolve -n");
    let session = Session::new(&vcs, Config::default());

    let report = revert::revert_change(&session, 77).unwrap();
    assert!(report.pending_resolve.is_empty());
}

#[test]
fn test_unsupported_action_aborts_before_changes() {
    let vcs = StubVcs::new().respond(
        "describe -s 77",
        describe(&[("//depot/a.c", "add", 1), ("//depot/p.c", "purge", 2)]),
    );
    let session = Session::new(&vcs, Config::default());

    let err = revert::revert_change(&session, 77).unwrap_err();
    assert!(matches!(
        err,
        RevertError::UnsupportedAction { action, .. } if action == "purge"
    ));
    assert!(vcs.mutations().is_empty());
}

#[test]
fn test_empty_change_is_an_error() {
    let vcs = StubVcs::new().respond("describe -s 77", Record::new().with("change", "77"));
    let session = Session::new(&vcs, Config::default());

    assert!(matches!(
        revert::revert_change(&session, 77),
        Err(RevertError::EmptyChange(77))
    ));
}
