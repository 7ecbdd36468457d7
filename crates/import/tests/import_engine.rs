//! End-to-end orchestrator runs against the in-memory collaborators.

mod common;

use common::{document, relationship, twin, Harness, JOB_ID, ROOM_MODEL, SPACE_MODEL};
use twingraph_core::checkpoint::ImportJobCheckpoint;
use twingraph_core::options::ImportJobOptions;
use twingraph_core::section::Section;
use twingraph_core::status::ImportJobStatus;
use twingraph_import::store::{CheckpointStore, ImportJobStore};

fn options(continue_on_failure: bool) -> ImportJobOptions {
    ImportJobOptions {
        batch_size: 2,
        continue_on_failure,
        ..ImportJobOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Test: the reference scenario ends partially succeeded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_model_two_twins_one_malformed_line() {
    let h = Harness::new();
    let doc = document(
        &[SPACE_MODEL],
        &[
            r#"{"$dtId":"a"}"#,
            r#"{"$dtId":"b"}"#,
            r#"{"$dtId": "broken""#,
        ],
        &[],
    );
    let job = h.create_job(&doc, options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::PartiallySucceeded);
    assert_eq!(outcome.counters.models_created, 1);
    assert_eq!(outcome.counters.twins_created, 2);
    assert_eq!(outcome.counters.relationships_created, 0);
    assert_eq!(outcome.counters.error_count, 1);

    let record = h.jobs.get(JOB_ID).await.unwrap().unwrap();
    assert_eq!(record.status, ImportJobStatus::PartiallySucceeded);
    assert_eq!(record.error_count, 1);
    assert!(record.error.is_none());
    assert!(h.checkpoints.load(JOB_ID).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Test: errors plus successes account for every data line
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_success_accounts_for_every_data_line() {
    let h = Harness::new();
    let twins = [
        twin("r1"),
        twin("r2"),
        r#"{"name":"no id"}"#.to_string(),
        "not json at all".to_string(),
        twin("r3"),
    ];
    let rels = [
        relationship("r1", "e1", "r2"),
        relationship("r1", "e2", "missing"),
        r#"{"$dtId":"r2","$targetId":"r3"}"#.to_string(),
    ];
    let twin_refs: Vec<&str> = twins.iter().map(String::as_str).collect();
    let rel_refs: Vec<&str> = rels.iter().map(String::as_str).collect();
    let doc = document(&[ROOM_MODEL, SPACE_MODEL], &twin_refs, &rel_refs);
    let job = h.create_job(&doc, options(true)).await;

    let outcome = h.run(&job).await;
    let c = outcome.counters;

    assert_eq!(outcome.status, ImportJobStatus::PartiallySucceeded);
    assert_eq!((c.models_created, c.twins_created, c.relationships_created), (2, 3, 1));
    assert_eq!(c.error_count, 4);
    assert_eq!(c.error_count + c.total_created(), 2 + 5 + 3);

    let errors: Vec<_> = h
        .log_lines()
        .into_iter()
        .filter(|l| l["logType"] == "Error")
        .collect();
    assert_eq!(errors.len(), 4);
    assert!(errors.iter().all(|l| l["details"]["lineNumber"].is_u64()));
}

// ---------------------------------------------------------------------------
// Test: models are applied dependencies first, twins see them
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_import_succeeds() {
    let h = Harness::new();
    let doc = document(
        &[ROOM_MODEL, SPACE_MODEL],
        &[&twin("r1"), &twin("r2")],
        &[&relationship("r1", "e1", "r2")],
    );
    let job = h.create_job(&doc, options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Succeeded);
    assert_eq!(h.graph.model_ids(), vec!["dtmi:test:Room;1", "dtmi:test:Space;1"]);
    assert_eq!(h.graph.twin_count(), 2);
    assert_eq!(h.graph.relationship_count(), 1);

    let log = h.log_lines();
    assert_eq!(log.first().unwrap()["details"]["status"], "started");
    assert_eq!(log.last().unwrap()["details"]["status"], "succeeded");
    assert!(log.iter().all(|l| l["jobId"] == JOB_ID && l["jobType"] == "Import"));
}

// ---------------------------------------------------------------------------
// Test: header gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn header_gate_fails_regardless_of_continue_on_failure() {
    let cases = [
        ("{\"Section\":\"Models\"}\n{\"@id\":\"dtmi:x:A;1\"}\n", "MissingHeader"),
        (
            "{\"Section\":\"Header\"}\n{\"fileVersion\":\"2.0.0\"}\n{\"Section\":\"Twins\"}\n{\"$dtId\":\"a\"}\n",
            "UnsupportedFileVersion",
        ),
    ];
    for (input, code) in cases {
        for continue_on_failure in [true, false] {
            let h = Harness::new();
            let job = h.create_job(input, options(continue_on_failure)).await;
            let outcome = h.run(&job).await;

            assert_eq!(outcome.status, ImportJobStatus::Failed, "{code}");
            assert_eq!(outcome.error.as_ref().unwrap().code, code);
            assert_eq!(h.graph.twin_count(), 0);
            let record = h.jobs.get(JOB_ID).await.unwrap().unwrap();
            assert_eq!(record.error.unwrap().code, code);
        }
    }
}

#[tokio::test]
async fn empty_input_fails_with_empty_input_error() {
    let h = Harness::new();
    let job = h.create_job("", options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Failed);
    assert_eq!(outcome.error.unwrap().code, "EmptyInput");
    let record = h.jobs.get(JOB_ID).await.unwrap().unwrap();
    assert_eq!(record.counters().total_created(), 0);
    assert_eq!(record.error_count, 0);
}

// ---------------------------------------------------------------------------
// Test: continueOnFailure = false
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_item_failure_fails_job_without_continue() {
    let h = Harness::new();
    let doc = document(&[], &[r#"{"$dtId":"a"}"#, r#"{"nope":1}"#, r#"{"$dtId":"c"}"#], &[]);
    let job = h.create_job(&doc, options(false)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.code, "ItemFailed");
    assert!(error.message.starts_with("Line 5:"), "{}", error.message);
    assert_eq!(h.graph.twin("c"), None);

    let record = h.jobs.get(JOB_ID).await.unwrap().unwrap();
    assert_eq!(record.status, ImportJobStatus::Failed);
    assert_eq!(record.error_count, 1);
    assert!(h.checkpoints.load(JOB_ID).await.unwrap().is_some());
}

#[tokio::test]
async fn all_items_failing_is_failed_not_partial() {
    let h = Harness::new();
    let doc = document(&[], &["{}", "[]"], &[]);
    let job = h.create_job(&doc, options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Failed);
    assert_eq!(outcome.counters.error_count, 2);
    assert!(outcome.error.is_none());
}

// ---------------------------------------------------------------------------
// Test: model batch is one unit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresolvable_model_batch_counts_one_error() {
    let h = Harness::new();
    let doc = document(
        &[ROOM_MODEL, r#"{"@id":"dtmi:test:Floor;1","extends":"dtmi:test:Nowhere;1"}"#],
        &[r#"{"$dtId":"plain"}"#],
        &[],
    );
    let job = h.create_job(&doc, options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::PartiallySucceeded);
    assert_eq!(outcome.counters.models_created, 0);
    assert_eq!(outcome.counters.error_count, 1);
    assert!(h.graph.model_ids().is_empty());
}

// ---------------------------------------------------------------------------
// Test: completed sections are skipped on resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_skips_completed_section() {
    let h = Harness::new();
    let doc = document(&[SPACE_MODEL], &[r#"{"$dtId":"a"}"#], &[]);
    let job = h.create_job(&doc, options(true)).await;

    let mut cp = ImportJobCheckpoint::new(JOB_ID);
    cp.current_section = Section::Header;
    cp.line_number = 2;
    cp.models_completed = true;
    cp.models_processed = 1;
    h.checkpoints.put(cp);

    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Succeeded);
    assert_eq!(outcome.counters.models_created, 1);
    assert_eq!(outcome.counters.twins_created, 1);
    assert!(h.graph.model_ids().is_empty());
    assert!(h
        .log_lines()
        .iter()
        .any(|l| l["details"]["status"] == "sectionSkipped" && l["details"]["section"] == "Models"));
}

// ---------------------------------------------------------------------------
// Test: checkpoint cadence and transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkpoints_follow_transitions_and_cadence() {
    let h = Harness::new();
    let twins: Vec<String> = (0..120).map(|i| format!(r#"{{"$dtId":"t{i}"}}"#)).collect();
    let refs: Vec<&str> = twins.iter().map(String::as_str).collect();
    let doc = document(&[], &refs, &[]);
    let job = h
        .create_job(
            &doc,
            ImportJobOptions {
                batch_size: 10,
                ..ImportJobOptions::default()
            },
        )
        .await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.counters.twins_created, 120);
    // header, Twins marker, two cadence saves, final
    assert_eq!(h.checkpoints.save_count(), 5);
}

#[tokio::test]
async fn checkpoint_failures_do_not_abort() {
    let h = Harness::new();
    h.checkpoints.set_fail_saves(true);
    let doc = document(&[SPACE_MODEL], &[r#"{"$dtId":"a"}"#], &[]);
    let job = h.create_job(&doc, options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Succeeded);
    assert_eq!(outcome.counters.twins_created, 1);
}

// ---------------------------------------------------------------------------
// Test: lines that are not UTF-8
// ---------------------------------------------------------------------------

fn document_with_bytes(twin_lines: &[&[u8]]) -> Vec<u8> {
    let mut doc = document(&[], &[], &[]).into_bytes();
    doc.extend_from_slice(b"{\"Section\":\"Twins\"}\n");
    for line in twin_lines {
        doc.extend_from_slice(line);
        doc.push(b'\n');
    }
    doc
}

#[tokio::test]
async fn invalid_utf8_line_is_an_item_error() {
    let h = Harness::new();
    let job = h.create_job("", options(true)).await;
    h.blobs.put(
        common::INPUT,
        document_with_bytes(&[&b"{\"$dtId\":\"r\xff1\"}"[..], &b"{\"$dtId\":\"r2\"}"[..]]),
    );
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::PartiallySucceeded);
    assert_eq!(outcome.counters.twins_created, 1);
    assert_eq!(outcome.counters.error_count, 1);
    assert_eq!(h.graph.twin_count(), 1);

    let logs = h.log_lines();
    let error = logs
        .iter()
        .find(|l| l["logType"] == "Error" && l["details"]["lineNumber"] == 4)
        .expect("error entry for line 4");
    assert!(error["details"]["message"]
        .as_str()
        .unwrap()
        .contains("not valid UTF-8"));
}

#[tokio::test]
async fn invalid_utf8_line_fails_job_without_continue() {
    let h = Harness::new();
    let job = h.create_job("", options(false)).await;
    h.blobs.put(
        common::INPUT,
        document_with_bytes(&[&b"{\"$dtId\":\"r1\"}"[..], &b"{\"$dtId\":\"\xc3\x28\"}"[..]]),
    );
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Failed);
    assert_eq!(outcome.counters.twins_created, 1);
    assert_eq!(outcome.error.unwrap().code, "ItemFailed");
}

// ---------------------------------------------------------------------------
// Test: a section repeated after it completed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_section_lines_are_skipped_one_warning_each() {
    let h = Harness::new();
    let mut doc = document(
        &[],
        &[r#"{"$dtId":"a"}"#, r#"{"$dtId":"z"}"#],
        &[&relationship("a", "e1", "z")],
    );
    doc.push_str("{\"Section\":\"Twins\"}\n{\"$dtId\":\"b\"}\n{\"$dtId\":\"c\"}\n");
    let job = h.create_job(&doc, options(true)).await;
    let outcome = h.run(&job).await;

    assert_eq!(outcome.status, ImportJobStatus::Succeeded);
    assert_eq!(outcome.counters.twins_created, 2);
    assert_eq!(outcome.counters.relationships_created, 1);
    assert_eq!(h.graph.twin_count(), 2);

    let skipped: Vec<u64> = h
        .log_lines()
        .iter()
        .filter(|l| {
            l["logType"] == "Warning"
                && l["details"]["message"] == "Section already completed, line skipped"
        })
        .map(|l| l["details"]["lineNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(skipped, vec![9, 10]);
}
