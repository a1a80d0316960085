#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const REFERENCE_CSV: &str = "\
refkey1,refkey2,refdata1,refdata2,refdata3,refdata4
K1,S1,alpha,beta,gamma,4.5
K2,S2,delta,epsilon,zeta,10
";

pub const RULES_JSON: &str = r#"[
  {"output": "label", "formula": "refdata1"},
  {"output": "pair", "formula": "refdata2 + refdata3"},
  {"output": "total", "formula": "field3 * 2 + refdata4"},
  {"output": "peak", "formula": "max(field3, field5)"}
]"#;

/// Scratch directory that removes its files on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).expect("read output file")
    }
}

/// An input table of `rows` rows cycling through matched, secondary-only and
/// unmatched reference keys.
pub fn generated_input(rows: usize) -> String {
    let mut contents = String::from("refkey1,refkey2,field1,field3,field5\n");
    for i in 0..rows {
        let (primary, secondary) = match i % 3 {
            0 => ("K1", "none"),
            1 => ("missing", "S2"),
            _ => ("missing", "missing"),
        };
        contents.push_str(&format!(
            "{primary},{secondary},row{i},{},{}\n",
            i % 97,
            (i * 7) % 13
        ));
    }
    contents
}

/// Parses CSV output, header included, into rows of cells.
pub fn parse_rows(contents: &str) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(contents.as_bytes());
    reader
        .records()
        .map(|record| {
            record
                .expect("csv record")
                .iter()
                .map(|cell| cell.to_string())
                .collect()
        })
        .collect()
}
