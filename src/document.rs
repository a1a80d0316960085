//! Structured document I/O shared by rule files and engine configuration.
//!
//! The format is picked purely from the file extension: `.json` is read with
//! `serde_json`, `.yaml`/`.yml` with `serde_yaml`. Any other extension is
//! rejected before the file is opened.

use std::{fs, path::Path};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub const EXTENSIONS: &'static [&'static str] = &["json", "yaml", "yml"];

    pub fn from_path(path: &Path, kind: &'static str) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(DocumentFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Ok(DocumentFormat::Yaml)
            }
            _ => Err(EngineError::UnsupportedFormat {
                kind,
                path: path.to_path_buf(),
            }),
        }
    }

    fn parse<T: DeserializeOwned>(self, raw: &str) -> std::result::Result<T, String> {
        match self {
            DocumentFormat::Json => serde_json::from_str(raw).map_err(|err| err.to_string()),
            DocumentFormat::Yaml => serde_yaml::from_str(raw).map_err(|err| err.to_string()),
        }
    }

    fn render<T: Serialize>(self, value: &T) -> std::result::Result<String, String> {
        match self {
            DocumentFormat::Json => {
                serde_json::to_string_pretty(value).map_err(|err| err.to_string())
            }
            DocumentFormat::Yaml => serde_yaml::to_string(value).map_err(|err| err.to_string()),
        }
    }
}

pub fn load<T: DeserializeOwned>(path: &Path, kind: &'static str) -> Result<T> {
    let format = DocumentFormat::from_path(path, kind)?;
    let raw = fs::read_to_string(path).map_err(|err| EngineError::io(path, err))?;
    format
        .parse(&raw)
        .map_err(|detail| EngineError::InvalidDocument {
            kind,
            path: path.to_path_buf(),
            detail,
        })
}

pub fn save<T: Serialize>(path: &Path, value: &T, kind: &'static str) -> Result<()> {
    let format = DocumentFormat::from_path(path, kind)?;
    let mut rendered = format
        .render(value)
        .map_err(|detail| EngineError::InvalidDocument {
            kind,
            path: path.to_path_buf(),
            detail,
        })?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| EngineError::io(parent, err))?;
    }
    fs::write(path, rendered).map_err(|err| EngineError::io(path, err))
}
