//! Error types shared by every stage of the figure pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T, E = FigspecError> = std::result::Result<T, E>;

/// Failures raised while loading, expanding, resolving or drawing a spec.
#[derive(Debug, Error)]
pub enum FigspecError {
    /// The spec source could not be read.
    #[error("cannot read spec '{}': {source}", path.display())]
    SpecSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The spec source is not a valid YAML mapping.
    #[error("invalid spec document: {0}")]
    SpecParse(String),

    /// A mapping was expected at an indexed entry.
    #[error("expected a mapping at '{path}', found {found}")]
    SpecShape { path: String, found: String },

    /// A preset referenced a preset that does not exist.
    #[error("unknown preset '{name}' (referenced by {referenced_by})")]
    UnknownPreset { name: String, referenced_by: String },

    /// `extends`/`inherits` chain loops back on itself.
    #[error("preset cycle detected: {}", chain.join(" -> "))]
    PresetCycle { chain: Vec<String> },

    /// A drawing routine received arguments it cannot use.
    #[error("invalid arguments for {routine}: {message}")]
    Argument { routine: String, message: String },

    /// Writing a figure to its destination failed.
    #[error("cannot write '{}': {message}", path.display())]
    Output { path: PathBuf, message: String },

    /// The drawing backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl FigspecError {
    pub(crate) fn shape(path: impl Into<String>, value: &serde_yaml::Value) -> Self {
        FigspecError::SpecShape {
            path: path.into(),
            found: crate::merge::type_name(value).to_string(),
        }
    }

    pub(crate) fn argument(routine: &str, message: impl std::fmt::Display) -> Self {
        FigspecError::Argument {
            routine: routine.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        FigspecError::Output {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for failures that stop a whole report rather than one figure.
    pub fn aborts_run(&self) -> bool {
        !matches!(
            self,
            FigspecError::Output { .. } | FigspecError::Argument { .. } | FigspecError::Backend(_)
        )
    }

    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            FigspecError::SpecSource { .. } | FigspecError::SpecParse(_) => 1,
            FigspecError::SpecShape { .. } => 2,
            FigspecError::Output { .. }
            | FigspecError::Argument { .. }
            | FigspecError::Backend(_) => 3,
            FigspecError::UnknownPreset { .. } | FigspecError::PresetCycle { .. } => 4,
        }
    }
}

impl From<anyhow::Error> for FigspecError {
    fn from(err: anyhow::Error) -> Self {
        FigspecError::Backend(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(FigspecError::SpecParse("bad".into()).exit_code(), 1);
        assert_eq!(
            FigspecError::SpecShape { path: "figures.0".into(), found: "string".into() }.exit_code(),
            2
        );
        assert_eq!(FigspecError::output("/tmp/x.png", "disk full").exit_code(), 3);
        assert_eq!(
            FigspecError::PresetCycle { chain: vec!["a".into(), "b".into(), "a".into()] }.exit_code(),
            4
        );
    }

    #[test]
    fn test_cycle_message() {
        let err = FigspecError::PresetCycle { chain: vec!["a".into(), "b".into(), "a".into()] };
        assert_eq!(err.to_string(), "preset cycle detected: a -> b -> a");
    }

    #[test]
    fn test_aborts_run() {
        assert!(FigspecError::SpecShape { path: "figures".into(), found: "sequence".into() }.aborts_run());
        assert!(FigspecError::UnknownPreset { name: "x".into(), referenced_by: "figures.0".into() }.aborts_run());
        assert!(!FigspecError::argument("draw_dataset", "bad y").aborts_run());
        assert!(!FigspecError::Backend("font".into()).aborts_run());
    }
}
