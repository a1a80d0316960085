use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rulecast::engine::TransformationEngine;
use rulecast::pipeline::{self, PipelineOptions};
use rulecast::rules::{Rule, Ruleset};
use tempfile::TempDir;

const ROWS: usize = 50_000;

fn generate_tables(rows: usize) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let input_path = temp_dir.path().join("input.csv");
    let mut input = File::create(&input_path).expect("create input");
    writeln!(input, "refkey1,refkey2,field1,field2,field3,field5").expect("header");
    for i in 0..rows {
        writeln!(
            input,
            "K{},S{},A{i},B{i},{},{}",
            i % 500,
            (i * 7) % 700,
            i % 1000,
            i as f64 * 1.1
        )
        .expect("row");
    }

    let reference_path = temp_dir.path().join("reference.csv");
    let mut reference = File::create(&reference_path).expect("create reference");
    writeln!(reference, "refkey1,refkey2,refdata1,refdata2,refdata3,refdata4").expect("header");
    for i in 0..500 {
        writeln!(reference, "K{i},S{i},D{i},E{i},F{i},{}", i % 50).expect("row");
    }
    (temp_dir, input_path, reference_path)
}

fn standard_engine() -> TransformationEngine {
    TransformationEngine::new(Ruleset::new(vec![
        Rule::new("outfield1", "field1 + field2"),
        Rule::new("outfield2", "refdata1"),
        Rule::new("outfield3", "refdata2 + refdata3"),
        Rule::new("outfield4", "field3 * max(field5, refdata4)"),
        Rule::new("outfield5", "max(field5, refdata4)"),
    ]))
}

fn run(
    engine: &TransformationEngine,
    input: &Path,
    reference: &Path,
    output: &Path,
    batch_size: usize,
) {
    let options = PipelineOptions::default().with_batch_size(batch_size);
    pipeline::process(engine, input, reference, output, &options).expect("process");
}

fn batch_size_benchmark(c: &mut Criterion) {
    let (temp_dir, input, reference) = generate_tables(ROWS);
    let engine = standard_engine();
    let output = temp_dir.path().join("output.csv");

    let mut group = c.benchmark_group("transform_batch_size");
    group.sample_size(10);
    for batch_size in [500usize, 10_000, ROWS] {
        group.bench_function(format!("batch_{batch_size}"), |b| {
            b.iter_batched(
                || (),
                |_| run(&engine, &input, &reference, &output, batch_size),
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, batch_size_benchmark);
criterion_main!(benches);
