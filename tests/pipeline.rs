mod common;

use std::fs;

use common::{REFERENCE_CSV, RULES_JSON, TestWorkspace, generated_input, parse_rows};
use encoding_rs::WINDOWS_1252;
use rulecast::{
    engine::TransformationEngine,
    error::EngineError,
    pipeline::{self, PipelineOptions},
    reference::DuplicateKeyPolicy,
};

fn engine(workspace: &TestWorkspace) -> TransformationEngine {
    TransformationEngine::from_path(&workspace.write("rules.json", RULES_JSON)).expect("rules")
}

#[test]
fn output_is_identical_across_batch_sizes() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(25_000));
    let reference = workspace.write("reference.csv", REFERENCE_CSV);

    let mut outputs = Vec::new();
    for batch_size in [1_000, 10_000, 25_000, 100_000] {
        let output = workspace.join(&format!("output_{batch_size}.csv"));
        let options = PipelineOptions::default().with_batch_size(batch_size);
        let summary =
            pipeline::process(&engine, &input, &reference, &output, &options).expect("process");
        assert_eq!(summary.rows, 25_000);
        assert_eq!(summary.batches, 25_000usize.div_ceil(batch_size));
        outputs.push(fs::read(&output).unwrap());
    }
    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));

    let rows = parse_rows(&String::from_utf8(outputs.remove(0)).unwrap());
    assert_eq!(rows.len(), 25_001);
    assert_eq!(rows[0], vec!["label", "pair", "total", "peak"]);
    assert_eq!(rows.iter().filter(|row| row[0] == "label").count(), 1);
}

#[test]
fn rows_join_by_primary_then_secondary_key() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(3));
    let reference = workspace.write("reference.csv", REFERENCE_CSV);
    let output = workspace.join("output.csv");

    pipeline::process(&engine, &input, &reference, &output, &PipelineOptions::default())
        .expect("process");
    let rows = parse_rows(&workspace.read(&output));
    // row0: K1 matched, field3=0, field5=0
    assert_eq!(rows[1], vec!["alpha", "betagamma", "4.5", "0"]);
    // row1: S2 matched, field3=1, field5=7
    assert_eq!(rows[2], vec!["delta", "epsilonzeta", "12", "7"]);
    // row2: unmatched, field3=2, field5=1
    assert_eq!(
        rows[3],
        vec!["MISSING_refdata1", "MISSING_refdata2MISSING_refdata3", "4", "2"]
    );
}

#[test]
fn rerun_replaces_previous_output() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(5));
    let reference = workspace.write("reference.csv", REFERENCE_CSV);
    let output = workspace.write("output.csv", "old data\nmore old data\n");

    pipeline::process(&engine, &input, &reference, &output, &PipelineOptions::default())
        .expect("first run");
    let first = workspace.read(&output);
    assert!(!first.contains("old data"));

    pipeline::process(&engine, &input, &reference, &output, &PipelineOptions::default())
        .expect("second run");
    assert_eq!(workspace.read(&output), first);
    assert_eq!(parse_rows(&first).len(), 6);
}

#[test]
fn failed_reference_load_keeps_existing_output() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(5));
    let output = workspace.write("output.csv", "previous report\n");

    let err = pipeline::process(
        &engine,
        &input,
        &workspace.join("absent.csv"),
        &output,
        &PipelineOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }));
    assert_eq!(workspace.read(&output), "previous report\n");
}

#[test]
fn rejected_duplicate_keys_fail_before_writing() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(5));
    let reference = workspace.write(
        "reference.csv",
        "refkey1,refkey2,refdata1\nK1,S1,a\nK1,S2,b\n",
    );
    let output = workspace.join("output.csv");

    let mut options = PipelineOptions::default();
    options.reference.duplicate_keys = DuplicateKeyPolicy::Reject;
    let err = pipeline::process(&engine, &input, &reference, &output, &options).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateReferenceKey { .. }));
    assert!(!output.exists());

    options.reference.duplicate_keys = DuplicateKeyPolicy::FirstWins;
    pipeline::process(&engine, &input, &reference, &output, &options).expect("first wins");
    let rows = parse_rows(&workspace.read(&output));
    assert_eq!(rows[1][0], "a");
}

#[test]
fn empty_input_writes_header_only() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", "refkey1,refkey2,field1,field3,field5\n");
    let reference = workspace.write("reference.csv", REFERENCE_CSV);
    let output = workspace.join("output.csv");

    let summary =
        pipeline::process(&engine, &input, &reference, &output, &PipelineOptions::default())
            .expect("process");
    assert_eq!(summary.rows, 0);
    assert_eq!(summary.batches, 0);
    assert_eq!(parse_rows(&workspace.read(&output)).len(), 1);
}

#[test]
fn zero_batch_size_is_rejected() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(1));
    let reference = workspace.write("reference.csv", REFERENCE_CSV);
    let err = pipeline::process(
        &engine,
        &input,
        &reference,
        &workspace.join("output.csv"),
        &PipelineOptions::default().with_batch_size(0),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[test]
fn tsv_input_and_latin1_output() {
    let workspace = TestWorkspace::new();
    let engine = TransformationEngine::from_path(&workspace.write(
        "rules.yaml",
        "- output: name\n  formula: field1 + refdata1\n",
    ))
    .unwrap();
    let input = workspace.write("input.tsv", "refkey1\trefkey2\tfield1\nK1\tx\tcaf\n");
    let reference = workspace.write("reference.tsv", "refkey1\trefkey2\trefdata1\nK1\tS1\té\n");
    let output = workspace.join("output.csv");

    let options = PipelineOptions {
        output_encoding: WINDOWS_1252,
        ..PipelineOptions::default()
    };
    pipeline::process(&engine, &input, &reference, &output, &options).expect("process");
    let bytes = fs::read(&output).unwrap();
    assert_eq!(bytes, b"\"name\"\n\"caf\xE9\"\n");
}

#[test]
fn preview_without_reference_uses_defaults() {
    let workspace = TestWorkspace::new();
    let engine = engine(&workspace);
    let input = workspace.write("input.csv", &generated_input(10));

    let rows = pipeline::preview(&engine, &input, None, 2, &PipelineOptions::default())
        .expect("preview");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].cell("label").unwrap(), "MISSING_refdata1");
    assert_eq!(rows[1].cell("total").unwrap(), "2");
}
