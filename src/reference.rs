use std::collections::{HashMap, hash_map::Entry};

use clap::ValueEnum;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::{Record, Value},
    error::{EngineError, Result},
};

/// What to do when a key value appears in more than one reference row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum DuplicateKeyPolicy {
    /// The later row replaces the earlier one.
    #[default]
    LastWins,
    /// The first row seen is kept.
    FirstWins,
    /// Building the index fails.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultKind {
    Numeric,
    Text,
}

/// Default injected for one expected reference field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefault {
    pub field: String,
    pub kind: DefaultKind,
}

impl FieldDefault {
    pub fn new(field: impl Into<String>, kind: DefaultKind) -> Self {
        FieldDefault {
            field: field.into(),
            kind,
        }
    }

    pub fn value(&self) -> Value {
        match self.kind {
            DefaultKind::Numeric => Value::Number(0.0),
            DefaultKind::Text => Value::Text(format!("MISSING_{}", self.field)),
        }
    }
}

/// The declared table of expected reference fields and their sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceDefaults(Vec<FieldDefault>);

impl ReferenceDefaults {
    pub fn new(defaults: Vec<FieldDefault>) -> Self {
        ReferenceDefaults(defaults)
    }

    pub fn fields(&self) -> &[FieldDefault] {
        &self.0
    }

    /// Injects every expected field still absent from `record`.
    pub fn fill(&self, record: &mut Record) {
        for default in &self.0 {
            if !record.contains(&default.field) {
                record.insert(default.field.clone(), default.value());
            }
        }
    }
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        ReferenceDefaults(vec![
            FieldDefault::new("refdata1", DefaultKind::Text),
            FieldDefault::new("refdata2", DefaultKind::Text),
            FieldDefault::new("refdata3", DefaultKind::Text),
            FieldDefault::new("refdata4", DefaultKind::Numeric),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReferenceSettings {
    pub primary_key: String,
    pub secondary_key: String,
    pub duplicate_keys: DuplicateKeyPolicy,
    pub defaults: ReferenceDefaults,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        ReferenceSettings {
            primary_key: "refkey1".to_string(),
            secondary_key: "refkey2".to_string(),
            duplicate_keys: DuplicateKeyPolicy::default(),
            defaults: ReferenceDefaults::default(),
        }
    }
}

/// Dual lookup over a fully loaded reference table. Immutable once built.
#[derive(Debug, Clone)]
pub struct ReferenceIndex {
    rows: Vec<Record>,
    by_primary: HashMap<String, usize>,
    by_secondary: HashMap<String, usize>,
    settings: ReferenceSettings,
}

impl ReferenceIndex {
    pub fn build(rows: Vec<Record>, settings: &ReferenceSettings) -> Result<Self> {
        let mut by_primary = HashMap::new();
        let mut by_secondary = HashMap::new();
        let mut duplicates = 0usize;

        for column in [&settings.primary_key, &settings.secondary_key] {
            if rows.first().is_some_and(|row| !row.contains(column)) {
                warn!("Reference table has no '{column}' column; lookups by it will never match");
            }
        }

        for (row_idx, row) in rows.iter().enumerate() {
            if let Some(key) = row.key(&settings.primary_key) {
                duplicates += insert_key(
                    &mut by_primary,
                    &settings.primary_key,
                    key,
                    row_idx,
                    settings.duplicate_keys,
                )?;
            }
            if let Some(key) = row.key(&settings.secondary_key) {
                duplicates += insert_key(
                    &mut by_secondary,
                    &settings.secondary_key,
                    key,
                    row_idx,
                    settings.duplicate_keys,
                )?;
            }
        }

        if duplicates > 0 {
            warn!(
                "Reference table contains {duplicates} duplicate key(s); resolved with {:?}",
                settings.duplicate_keys
            );
        }

        Ok(ReferenceIndex {
            rows,
            by_primary,
            by_secondary,
            settings: settings.clone(),
        })
    }

    /// Joins `input` against both indices. A secondary-key match overrides
    /// fields from the primary-key match; declared defaults fill the gaps.
    ///
    /// Each matched row contributes every field except the key column it was
    /// found by, so `refkey2` comes from the primary-key row and `refkey1`
    /// from the secondary-key row.
    pub fn resolve(&self, input: &Record) -> Record {
        let mut resolved = Record::new();
        if let Some(row) = self.lookup_primary(input) {
            resolved.merge_except(row, &self.settings.primary_key);
        }
        if let Some(row) = self.lookup_secondary(input) {
            resolved.merge_except(row, &self.settings.secondary_key);
        }
        self.settings.defaults.fill(&mut resolved);
        resolved
    }

    pub fn lookup_primary(&self, input: &Record) -> Option<&Record> {
        let key = input.key(&self.settings.primary_key)?;
        self.by_primary.get(&key).map(|idx| &self.rows[*idx])
    }

    pub fn lookup_secondary(&self, input: &Record) -> Option<&Record> {
        let key = input.key(&self.settings.secondary_key)?;
        self.by_secondary.get(&key).map(|idx| &self.rows[*idx])
    }

    pub fn settings(&self) -> &ReferenceSettings {
        &self.settings
    }

    /// Number of reference rows held.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn key_counts(&self) -> (usize, usize) {
        (self.by_primary.len(), self.by_secondary.len())
    }
}

fn insert_key(
    index: &mut HashMap<String, usize>,
    column: &str,
    key: String,
    row_idx: usize,
    policy: DuplicateKeyPolicy,
) -> Result<usize> {
    match index.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(row_idx);
            Ok(0)
        }
        Entry::Occupied(mut slot) => {
            debug!(
                "Duplicate {column} '{}' at reference row {} ({policy:?})",
                slot.key(),
                row_idx + 2
            );
            match policy {
                DuplicateKeyPolicy::LastWins => {
                    slot.insert(row_idx);
                }
                DuplicateKeyPolicy::FirstWins => {}
                DuplicateKeyPolicy::Reject => {
                    return Err(EngineError::DuplicateReferenceKey {
                        column: column.to_string(),
                        key: slot.key().clone(),
                    });
                }
            }
            Ok(1)
        }
    }
}
