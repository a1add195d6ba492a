//! Error types for the font pipeline
//!
//! Every core stage returns a [`PipelineResult`]. Errors abort the run at the
//! stage boundary; nothing downstream attempts recovery or partial output.
//! Only [`PipelineError::ExternalToolFailure`] is considered retryable, and
//! only by the orchestration layer.

use crate::library::{LibraryKind, Placeholder};
use crate::verify::Origin;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{} requested character(s) missing from the atlas: {}", .missing.len(), describe_chars(.missing))]
    MissingGlyph { missing: Vec<char> },

    #[error("reference template does not match the {kind} library shape: expected {expected}")]
    TemplateShapeMismatch { kind: LibraryKind, expected: String },

    #[error("corrupt reference template {}: {reason}", .file.display())]
    CorruptTemplate { file: PathBuf, reason: String },

    #[error("merge integrity violation: {0}")]
    MergeIntegrity(#[from] IntegrityViolation),

    #[error("{} character(s) not found in {origin} libraries: {}", .missing.len(), describe_chars(.missing))]
    CharacterNotFound { origin: Origin, missing: Vec<char> },

    #[error("{tool} failed: {reason}")]
    ExternalToolFailure { tool: String, reason: String },

    #[error("invalid atlas metadata {}: {reason}", .file.display())]
    AtlasParse { file: PathBuf, reason: String },

    #[error("failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled before {stage}")]
    Cancelled { stage: &'static str },
}

impl PipelineError {
    /// Transient process or file-lock failures may succeed on a second attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::ExternalToolFailure { .. })
    }
}

/// The offending entry of a failed merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLabel {
    pub tag: String,
    pub id: Option<String>,
}

impl std::fmt::Display for EntryLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "<{} id=\"{}\">", self.tag, id),
            None => write!(f, "<{}>", self.tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("{entry} declares placeholder {placeholder} which was already allocated")]
    DuplicatePlaceholder {
        entry: EntryLabel,
        placeholder: Placeholder,
    },

    #[error("{entry} reuses id \"{id}\"")]
    DuplicateId { entry: EntryLabel, id: String },

    #[error("{entry} field {field} references unallocated placeholder {target}")]
    DanglingPlaceholder {
        entry: EntryLabel,
        field: String,
        target: Placeholder,
    },

    #[error("{entry} field {field} references missing id \"{target}\"")]
    DanglingReference {
        entry: EntryLabel,
        field: String,
        target: String,
    },

    #[error("{entry} lacks required reference field {field}")]
    MissingReference { entry: EntryLabel, field: String },

    #[error("{kind} library fragment is missing or empty")]
    MissingFragment { kind: LibraryKind },

    #[error("node library has no render node for U+{:04X}", *.character as u32)]
    MissingGlyphNode { character: char },

    #[error("{entry} is not attached to the root node")]
    UnattachedNode { entry: EntryLabel },

    #[error("no serial left to give {entry}")]
    IdSpaceExhausted { entry: EntryLabel },
}

/// Attach the operation and path to IO errors
pub trait FileContext<T> {
    fn with_file_context(self, operation: &'static str, path: &Path) -> PipelineResult<T>;
}

impl<T> FileContext<T> for Result<T, std::io::Error> {
    fn with_file_context(self, operation: &'static str, path: &Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Render characters for error messages, e.g. `'A' (U+0041), '가' (U+AC00)`
pub fn describe_chars(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| format!("{:?} (U+{:04X})", c, *c as u32))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_tool_failures_are_retryable() {
        let tool = PipelineError::ExternalToolFailure {
            tool: "texconv".to_string(),
            reason: "exit code 1".to_string(),
        };
        assert!(tool.is_retryable());

        let missing = PipelineError::MissingGlyph {
            missing: vec!['A'],
        };
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_missing_glyph_message_lists_every_character() {
        let err = PipelineError::MissingGlyph {
            missing: vec!['A', '가'],
        };
        let message = err.to_string();
        assert!(message.starts_with("2 requested"));
        assert!(message.contains("U+0041"));
        assert!(message.contains("U+AC00"));
    }

    #[test]
    fn test_file_context_keeps_path() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result
            .with_file_context("read", Path::new("font-atlas.json"))
            .unwrap_err();
        assert!(err.to_string().contains("font-atlas.json"));
    }
}
