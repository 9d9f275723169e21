use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ModuleId;

#[derive(Error, Debug, Clone)]
pub enum ModrulesError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Parsing Error in {0}: {1}")]
    ParseError(&'static str, String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Descriptor Error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for ModrulesError {
    fn from(err: std::io::Error) -> Self {
        ModrulesError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for ModrulesError {
    fn from(err: serde_json::Error) -> Self {
        ModrulesError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for ModrulesError {
    fn from(err: toml::de::Error) -> Self {
        ModrulesError::Toml(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ModrulesError>;

/// What went wrong with a single module's descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DescriptorErrorKind {
    /// Identifier listed as both a public and a private dependency.
    DuplicateVisibility,
    /// Module lists itself in one of its dependency sets.
    SelfDependency,
    /// Conditional rule predicate does not parse.
    MalformedPredicate,
    /// Empty module identifier, either the module's own name or a dependency.
    EmptyIdentifier,
    /// Identifier would be both linked and loaded at runtime.
    DynamicConflict,
    /// A conditional rule flipped visibility while the reject policy was active.
    ConflictingVisibility,
    /// Two descriptors in one collection share a name.
    DuplicateModule,
    /// The module's resolution job stopped without producing a result.
    Aborted,
}

impl fmt::Display for DescriptorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DuplicateVisibility => "duplicate visibility",
            Self::SelfDependency => "self dependency",
            Self::MalformedPredicate => "malformed predicate",
            Self::EmptyIdentifier => "empty identifier",
            Self::DynamicConflict => "linked and dynamic",
            Self::ConflictingVisibility => "conflicting visibility",
            Self::DuplicateModule => "duplicate module",
            Self::Aborted => "resolution aborted",
        };
        f.write_str(label)
    }
}

/// A validation or resolution failure for one module.
///
/// `subject` is the offending module identifier, or the predicate text for
/// `MalformedPredicate`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[error("module '{module}': {kind} ({subject}){}", detail_suffix(.detail))]
pub struct DescriptorError {
    pub module: ModuleId,
    pub kind: DescriptorErrorKind,
    pub subject: String,
    pub detail: Option<String>,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

impl DescriptorError {
    pub fn new(module: &ModuleId, kind: DescriptorErrorKind, subject: impl Into<String>) -> Self {
        Self {
            module: module.clone(),
            kind,
            subject: subject.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_error_display_names_module_and_subject() {
        let err = DescriptorError::new(
            &ModuleId::from("AssetDump"),
            DescriptorErrorKind::DuplicateVisibility,
            "Json",
        );
        assert_eq!(
            err.to_string(),
            "module 'AssetDump': duplicate visibility (Json)"
        );
    }

    #[test]
    fn descriptor_error_display_appends_detail() {
        let err = DescriptorError::new(
            &ModuleId::from("AssetDump"),
            DescriptorErrorKind::MalformedPredicate,
            "editorBuild ==",
        )
        .with_detail("expected a value at offset 14");
        assert!(err.to_string().ends_with(": expected a value at offset 14"));
    }

    #[test]
    fn io_errors_convert_into_crate_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ModrulesError = io.into();
        assert!(matches!(err, ModrulesError::Io(_)));
    }
}
