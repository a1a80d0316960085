mod common;

use std::{
    thread,
    time::{Duration, Instant},
};

use common::{REFERENCE_CSV, RULES_JSON, TestWorkspace, generated_input, parse_rows};
use rulecast::{
    error::EngineError,
    jobs::{Dispatcher, JobRequest, JobResult, JobState},
    pipeline::PipelineOptions,
};

fn request(workspace: &TestWorkspace, rows: usize) -> JobRequest {
    JobRequest::new(
        workspace.write("1234_input.csv", &generated_input(rows)),
        workspace.write("reference.csv", REFERENCE_CSV),
        workspace.write("rules.json", RULES_JSON),
    )
}

#[test]
fn submitted_job_completes_with_output_beside_input() {
    let workspace = TestWorkspace::new();
    let dispatcher = Dispatcher::new(PipelineOptions::default());
    let id = dispatcher.submit(request(&workspace, 50)).expect("submit");

    let status = dispatcher.wait(id).expect("known job");
    let expected = workspace.join("1234_output.csv");
    assert_eq!(
        status.state,
        JobState::Completed {
            output: expected.clone(),
            rows: 50
        }
    );
    assert!(status.finished_at.is_some());
    assert_eq!(dispatcher.result(id), Some(JobResult::Ready(expected.clone())));
    assert_eq!(parse_rows(&workspace.read(&expected)).len(), 51);
}

#[test]
fn failing_job_reports_its_error() {
    let workspace = TestWorkspace::new();
    let dispatcher = Dispatcher::new(PipelineOptions::default());
    let mut job = request(&workspace, 5);
    job.rules = workspace.write("rules.txt", "not rules");
    let id = dispatcher.submit(job).expect("submit");

    let status = dispatcher.wait(id).expect("known job");
    assert_eq!(status.state.as_str(), "failed");
    match dispatcher.result(id) {
        Some(JobResult::Failed(message)) => {
            assert!(message.contains("Unsupported rule file format"), "{message}")
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn output_path_is_free_again_after_completion() {
    let workspace = TestWorkspace::new();
    let dispatcher = Dispatcher::new(PipelineOptions::default());
    let first = dispatcher.submit(request(&workspace, 10)).expect("first");
    dispatcher.wait(first);

    let second = dispatcher.submit(request(&workspace, 10)).expect("second");
    dispatcher.wait(second);
    assert_eq!(dispatcher.jobs().len(), 2);
    assert!(dispatcher.jobs().iter().all(|job| job.state.is_terminal()));
}

#[test]
fn concurrent_job_on_same_output_is_refused() {
    let workspace = TestWorkspace::new();
    let dispatcher = Dispatcher::new(PipelineOptions::default().with_batch_size(100));
    let job = request(&workspace, 200_000);
    let first = dispatcher.submit(job.clone()).expect("first");

    match dispatcher.submit(job) {
        Err(EngineError::OutputBusy { job, .. }) => assert_eq!(job, first.as_uuid()),
        Ok(second) => {
            // The first job had already finished; nothing was shared.
            assert!(
                dispatcher
                    .status(first)
                    .is_some_and(|status| status.state.is_terminal())
            );
            dispatcher.wait(second);
        }
        Err(other) => panic!("unexpected error {other}"),
    }
    let status = dispatcher.wait(first).expect("known job");
    assert!(matches!(status.state, JobState::Completed { rows: 200_000, .. }));
}

#[test]
fn polling_alone_releases_finished_workers() {
    let workspace = TestWorkspace::new();
    let dispatcher = Dispatcher::new(PipelineOptions::default());
    let id = dispatcher.submit(request(&workspace, 20)).expect("submit");

    let deadline = Instant::now() + Duration::from_secs(30);
    while dispatcher.active_workers() > 0 {
        assert!(Instant::now() < deadline, "worker never finished");
        thread::sleep(Duration::from_millis(10));
    }
    let status = dispatcher.status(id).expect("known job");
    assert!(status.state.is_terminal());
    assert!(matches!(dispatcher.result(id), Some(JobResult::Ready(_))));
}
