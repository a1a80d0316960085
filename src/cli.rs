use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::reference::DuplicateKeyPolicy;

#[derive(Debug, Parser)]
#[command(author, version, about = "Rule-driven CSV report generation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Join input rows against a reference table and write one output column per rule
    Transform(TransformArgs),
    /// Inspect or convert a rule file
    Rules(RulesArgs),
    /// Evaluate the first rows of an input and print them as a table
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct TransformArgs {
    /// Input CSV file (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Reference CSV file, loaded fully into memory
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,
    /// Rule file (.json, .yaml or .yml)
    #[arg(short = 'R', long = "rules")]
    pub rules: PathBuf,
    /// Output CSV file; replaced if it already exists
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Delimiter to use for output (defaults to the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the output file (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

/// Settings shared by every command that evaluates rules.
#[derive(Debug, Args)]
pub struct EngineArgs {
    /// Engine configuration file (.json, .yaml or .yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Number of input rows processed and flushed together
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// How repeated reference keys are resolved
    #[arg(long = "duplicate-keys", value_enum)]
    pub duplicate_keys: Option<DuplicateKeyPolicy>,
    /// CSV delimiter character for inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    /// Print each rule with the names its formula reads
    Show {
        /// Rule file (.json, .yaml or .yml)
        #[arg(short = 'R', long = "rules")]
        rules: PathBuf,
    },
    /// Rewrite a rule file in the format implied by the target extension
    Convert {
        /// Source rule file
        #[arg(short = 'R', long = "rules")]
        rules: PathBuf,
        /// Destination rule file
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Input CSV file (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Optional reference CSV file; without it every reference field takes its default
    #[arg(short = 'r', long = "reference")]
    pub reference: Option<PathBuf>,
    /// Rule file (.json, .yaml or .yml)
    #[arg(short = 'R', long = "rules")]
    pub rules: PathBuf,
    /// Number of rows to evaluate
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    #[command(flatten)]
    pub engine: EngineArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
