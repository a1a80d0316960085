pub mod cli;
pub mod config;
pub mod data;
pub mod document;
pub mod engine;
pub mod error;
pub mod expr;
pub mod io_utils;
pub mod jobs;
pub mod pipeline;
pub mod reference;
pub mod rules;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{CheckArgs, Cli, Commands, EngineArgs, RulesAction, TransformArgs},
    config::EngineConfig,
    engine::TransformationEngine,
    expr::Formula,
    pipeline::PipelineOptions,
    rules::Ruleset,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("rulecast", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Transform(args) => handle_transform(&args),
        Commands::Rules(args) => match args.action {
            RulesAction::Show { rules } => handle_rules_show(&rules),
            RulesAction::Convert { rules, output } => handle_rules_convert(&rules, &output),
        },
        Commands::Check(args) => handle_check(&args),
    }
}

/// Config file first, then command-line overrides on top.
fn pipeline_options(args: &EngineArgs) -> Result<PipelineOptions> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Loading engine configuration from {path:?}"))?,
        None => EngineConfig::default(),
    };
    let mut options = PipelineOptions::from_config(&config);
    if let Some(batch_size) = args.batch_size {
        options = options.with_batch_size(batch_size);
    }
    if let Some(policy) = args.duplicate_keys {
        options.reference.duplicate_keys = policy;
    }
    options.delimiter = args.delimiter;
    options.input_encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())
        .context("Resolving input encoding")?;
    debug!("Pipeline options: {options:?}");
    Ok(options)
}

fn handle_transform(args: &TransformArgs) -> Result<()> {
    let mut options = pipeline_options(&args.engine)?;
    options.output_delimiter = args.output_delimiter;
    options.output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())
        .context("Resolving output encoding")?;

    let engine = TransformationEngine::from_path(&args.rules)
        .with_context(|| format!("Loading rules from {:?}", args.rules))?;
    let summary = pipeline::process(
        &engine,
        &args.input,
        &args.reference,
        &args.output,
        &options,
    )
    .with_context(|| format!("Transforming {:?} into {:?}", args.input, args.output))?;
    info!(
        "Transform complete: {} row(s), {} column(s), {} field error(s)",
        summary.rows,
        engine.columns().len(),
        summary.field_errors
    );
    Ok(())
}

fn handle_rules_show(path: &std::path::Path) -> Result<()> {
    let ruleset =
        Ruleset::load(path).with_context(|| format!("Loading rules from {path:?}"))?;
    let headers = ["output", "formula", "reads", "status"].map(String::from);
    let rows: Vec<Vec<String>> = ruleset
        .iter()
        .map(|rule| match Formula::compile(&rule.formula) {
            Ok(formula) => vec![
                rule.output.clone(),
                rule.formula.clone(),
                formula.free_variables().join(", "),
                "ok".to_string(),
            ],
            Err(err) => vec![
                rule.output.clone(),
                rule.formula.clone(),
                String::new(),
                err.to_string(),
            ],
        })
        .collect();
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_rules_convert(source: &std::path::Path, target: &std::path::Path) -> Result<()> {
    let ruleset =
        Ruleset::load(source).with_context(|| format!("Loading rules from {source:?}"))?;
    ruleset
        .save(target)
        .with_context(|| format!("Writing rules to {target:?}"))?;
    info!(
        "Converted {} rule(s) from {:?} to {:?}",
        ruleset.len(),
        source,
        target
    );
    Ok(())
}

fn handle_check(args: &CheckArgs) -> Result<()> {
    let options = pipeline_options(&args.engine)?;
    let engine = TransformationEngine::from_path(&args.rules)
        .with_context(|| format!("Loading rules from {:?}", args.rules))?;
    if args.reference.is_none() {
        warn!("No reference file given; every reference field takes its default");
    }
    let rows = pipeline::preview(
        &engine,
        &args.input,
        args.reference.as_deref(),
        args.rows,
        &options,
    )
    .with_context(|| format!("Evaluating rules against {:?}", args.input))?;
    let columns = engine.columns();
    let rendered: Vec<Vec<String>> = rows.iter().map(|row| row.render(columns)).collect();
    table::print_table(columns, &rendered);
    let errors: usize = rows.iter().map(|row| row.error_count()).sum();
    info!(
        "Evaluated {} row(s); {} field error(s)",
        rows.len(),
        errors
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
