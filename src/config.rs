use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    document,
    error::{EngineError, Result},
    reference::ReferenceSettings,
};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Engine settings, loadable from a `.json`/`.yaml`/`.yml` file. Every key is
/// optional; absent keys keep their defaults.
///
/// ```yaml
/// batch-size: 5000
/// reference:
///   primary-key: refkey1
///   secondary-key: refkey2
///   duplicate-keys: first-wins
///   defaults:
///     - field: refdata1
///       kind: text
///     - field: refdata4
///       kind: numeric
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub reference: ReferenceSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            reference: ReferenceSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: EngineConfig = document::load(path, "config file")?;
        config.validate()?;
        debug!("Loaded engine configuration from {path:?}: {config:?}");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch-size must be at least 1".to_string(),
            ));
        }
        let reference = &self.reference;
        if reference.primary_key.trim().is_empty() || reference.secondary_key.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "reference key column names cannot be empty".to_string(),
            ));
        }
        if let Some(blank) = reference
            .defaults
            .fields()
            .iter()
            .find(|default| default.field.trim().is_empty())
        {
            return Err(EngineError::InvalidConfig(format!(
                "reference default with empty field name ({:?})",
                blank.kind
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{DefaultKind, DuplicateKeyPolicy, FieldDefault};

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("batch-size: 250\n").unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.reference, ReferenceSettings::default());
    }

    #[test]
    fn reference_section_parses_kebab_case() {
        let raw = r#"{
            "reference": {
                "secondary-key": "alt",
                "duplicate-keys": "reject",
                "defaults": [{"field": "rate", "kind": "numeric"}]
            }
        }"#;
        let config: EngineConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.reference.primary_key, "refkey1");
        assert_eq!(config.reference.secondary_key, "alt");
        assert_eq!(config.reference.duplicate_keys, DuplicateKeyPolicy::Reject);
        assert_eq!(
            config.reference.defaults.fields(),
            &[FieldDefault::new("rate", DefaultKind::Numeric)]
        );
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let config = EngineConfig {
            batch_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(serde_yaml::from_str::<EngineConfig>("batch_size: 5\n").is_err());
    }
}
