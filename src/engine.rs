use std::{collections::HashMap, fmt, path::Path};

use itertools::Itertools;
use log::info;

use crate::{
    data::{Record, Value},
    error::Result,
    expr::{EvalError, Formula, Scope, SyntaxError},
    rules::{Rule, Ruleset},
};

/// Per-record evaluation namespace: input fields, then reference fields over
/// them, with text values coerced to numbers where they parse. The four
/// builtin functions are resolved by the formula evaluator itself.
#[derive(Debug, Clone, Default)]
pub struct JoinedContext {
    values: HashMap<String, Value>,
}

impl JoinedContext {
    pub fn build(input: &Record, reference: &Record) -> Self {
        let mut values = HashMap::with_capacity(input.len() + reference.len());
        for (name, value) in input.iter().chain(reference.iter()) {
            values.insert(name.clone(), value.clone().coerced());
        }
        JoinedContext { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Scope for JoinedContext {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Why one output cell has no value, with the context it was evaluated in.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiagnostic {
    pub formula: String,
    pub error: EvalError,
    /// The formula's free variables and what the context held for each.
    pub values: Vec<(String, Option<Value>)>,
}

impl fmt::Display for FieldDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .values
            .iter()
            .map(|(name, value)| match value {
                Some(Value::Text(text)) => format!("{name}={text:?}"),
                Some(number) => format!("{name}={number}"),
                None => format!("{name}=<undefined>"),
            })
            .join(", ");
        write!(
            f,
            "ERROR in '{}': {} | Values: {{{values}}}",
            self.formula, self.error
        )
    }
}

pub type FieldOutcome = std::result::Result<Value, FieldDiagnostic>;

/// One output row: every rule's output name with its value or diagnostic,
/// in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRecord {
    fields: Vec<(String, FieldOutcome)>,
}

impl OutputRecord {
    fn set(&mut self, name: &str, outcome: FieldOutcome) {
        match self.fields.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = outcome,
            None => self.fields.push((name.to_string(), outcome)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldOutcome> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, outcome)| outcome)
    }

    /// Rendered cell text: the value, or the diagnostic string.
    pub fn cell(&self, name: &str) -> Option<String> {
        self.get(name).map(render_outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldOutcome)> {
        self.fields.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .count()
    }

    /// Cells in `columns` order, blank for any column this record lacks.
    pub fn render(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.cell(column).unwrap_or_default())
            .collect()
    }
}

fn render_outcome(outcome: &FieldOutcome) -> String {
    match outcome {
        Ok(value) => value.as_display(),
        Err(diagnostic) => diagnostic.to_string(),
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    formula: std::result::Result<Formula, SyntaxError>,
}

/// Evaluates a fixed ruleset against joined input/reference records.
#[derive(Debug, Clone)]
pub struct TransformationEngine {
    ruleset: Ruleset,
    compiled: Vec<CompiledRule>,
    columns: Vec<String>,
}

impl TransformationEngine {
    /// Formulas are compiled up front; one that does not parse is kept and
    /// reported in its output cell on every row.
    pub fn new(ruleset: Ruleset) -> Self {
        let compiled = ruleset
            .iter()
            .map(|rule| CompiledRule {
                rule: rule.clone(),
                formula: Formula::compile(&rule.formula),
            })
            .collect();
        let columns = ruleset.output_names();
        TransformationEngine {
            ruleset,
            compiled,
            columns,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ruleset = Ruleset::load(path)?;
        info!("Loaded {} rule(s) from {:?}", ruleset.len(), path);
        Ok(Self::new(ruleset))
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Output column names in declared order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn apply(&self, input: &Record, reference: &Record) -> OutputRecord {
        let context = JoinedContext::build(input, reference);
        self.apply_context(&context)
    }

    pub fn apply_context(&self, context: &JoinedContext) -> OutputRecord {
        let mut output = OutputRecord::default();
        for compiled in &self.compiled {
            let outcome = evaluate_rule(compiled, context);
            output.set(&compiled.rule.output, outcome);
        }
        output
    }
}

fn evaluate_rule(compiled: &CompiledRule, context: &JoinedContext) -> FieldOutcome {
    let formula = match &compiled.formula {
        Ok(formula) => formula,
        Err(syntax) => {
            return Err(FieldDiagnostic {
                formula: compiled.rule.formula.clone(),
                error: EvalError::Syntax(syntax.clone()),
                values: Vec::new(),
            });
        }
    };
    formula.evaluate(context).map_err(|error| FieldDiagnostic {
        formula: compiled.rule.formula.clone(),
        error,
        values: formula
            .free_variables()
            .into_iter()
            .map(|name| (name.to_string(), context.get(name).cloned()))
            .collect(),
    })
}
