//! Export error type.

use b4w_bake_core::BakeError;

/// Errors that abort an export. Non-fatal problems are collected as
/// [`crate::messages::ExportMessage`]s instead.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ExportError {
    /// A datablock is malformed or references something that does not exist.
    #[error("Component '{component}': {reason}")]
    Component { component: String, reason: String },

    /// Reading or writing an export file failed.
    #[error("File error ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A resource path cannot be expressed relative to the export file.
    #[error("{0}")]
    Path(String),

    /// A resource the HTML bundle requires resolved to nothing.
    #[error("Missing resource: {path}")]
    MissingResource { path: String },

    /// Template substitution failed.
    #[error("Template error: {0}")]
    Template(String),

    /// Strict mode was requested and the export produced messages.
    #[error("Strict mode: export blocked by {warnings} warning(s) and {errors} error(s)")]
    Strict { warnings: usize, errors: usize },

    /// The scene description contains no exportable scene.
    #[error("No exported scene found. Can't perform export.")]
    NothingToExport,

    /// A manifest document failed validation.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Bake(#[from] BakeError),
}

impl ExportError {
    pub fn component(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
