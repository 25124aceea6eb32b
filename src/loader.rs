//! Spec loading: accept a parsed mapping, YAML text or a path to a YAML file.

use crate::error::{FigspecError, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a spec comes from.
#[derive(Debug, Clone)]
pub enum SpecSource {
    Mapping(Mapping),
    Text(String),
    Path(PathBuf),
}

impl From<Mapping> for SpecSource {
    fn from(mapping: Mapping) -> Self {
        SpecSource::Mapping(mapping)
    }
}

impl From<&Path> for SpecSource {
    fn from(path: &Path) -> Self {
        SpecSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for SpecSource {
    fn from(path: PathBuf) -> Self {
        SpecSource::Path(path)
    }
}

/// Produce an ordered mapping from any spec source.
pub fn load(source: &SpecSource) -> Result<Mapping> {
    match source {
        SpecSource::Mapping(mapping) => Ok(mapping.clone()),
        SpecSource::Text(text) => parse_document(text),
        SpecSource::Path(path) => {
            debug!(path = %path.display(), "reading spec");
            let text = std::fs::read_to_string(path).map_err(|source| FigspecError::SpecSource {
                path: path.clone(),
                source,
            })?;
            parse_document(&text)
        }
    }
}

/// Parse a YAML document whose root must be a mapping. An empty document is
/// an empty mapping.
pub fn parse_document(text: &str) -> Result<Mapping> {
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| FigspecError::SpecParse(e.to_string()))?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(FigspecError::SpecParse(format!(
            "document root must be a mapping, found {}",
            crate::merge::type_name(&other)
        ))),
    }
}
