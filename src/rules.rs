use std::{fmt, path::Path};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{document, error::Result};

const RULE_FILE: &str = "rule file";

/// A named formula producing one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub output: String,
    #[serde(deserialize_with = "scalar_text")]
    pub formula: String,
}

impl Rule {
    pub fn new(output: impl Into<String>, formula: impl Into<String>) -> Self {
        Rule {
            output: output.into(),
            formula: formula.into(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.output, self.formula)
    }
}

/// Ordered rules loaded for a run. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ruleset {
    rules: Vec<Rule>,
}

impl Ruleset {
    pub fn new(rules: Vec<Rule>) -> Self {
        Ruleset { rules }
    }

    /// Loads a `.json`, `.yaml` or `.yml` rule file. Formula text is not
    /// inspected here.
    pub fn load(path: &Path) -> Result<Self> {
        let ruleset: Ruleset = document::load(path, RULE_FILE)?;
        debug!("Loaded {} rule(s) from {path:?}", ruleset.len());
        Ok(ruleset)
    }

    /// Writes the ruleset in the format implied by the target extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        document::save(path, self, RULE_FILE)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct output names in declared order. A repeated name keeps the
    /// position of its first declaration.
    pub fn output_names(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|rule| rule.output.clone())
            .unique()
            .collect()
    }
}

impl<'a> IntoIterator for &'a Ruleset {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// YAML happily types `formula: 42` as an integer; keep it as formula text.
fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(i64),
        Float(f64),
        Boolean(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => text,
        Scalar::Integer(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Boolean(b) => b.to_string(),
    })
}
