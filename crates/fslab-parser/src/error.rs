use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Conditions that abort a single trial's record.
///
/// Experimental outcomes (out of memory, invalid plan, ...) are never errors;
/// they are classified into [`crate::ErrorKind`] and returned as data.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A mandatory rule found nothing. The artifact is truncated or malformed.
    #[error("mandatory rule '{rule}' found no match in {artifact}")]
    MissingMandatory {
        rule: &'static str,
        artifact: &'static str,
    },

    #[error("mandatory rule '{rule}' captured undecodable value {raw:?} for '{attribute}'")]
    BadCapture {
        rule: &'static str,
        attribute: &'static str,
        raw: String,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The trial parsed but its properties file could not be produced.
    #[error("cannot write properties for {path}: {reason}")]
    WriteProperties { path: PathBuf, reason: String },
}

impl ParseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error describes a broken artifact rather than an
    /// environment problem (unreadable file, bad configuration).
    pub fn is_artifact_defect(&self) -> bool {
        matches!(
            self,
            ParseError::MissingMandatory { .. } | ParseError::BadCapture { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::MissingMandatory { .. } | ParseError::BadCapture { .. } => "artifact",
            ParseError::Io { .. } => "io",
            ParseError::Config(_) => "config",
            ParseError::WriteProperties { .. } => "write",
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::WriteProperties {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_separate_artifact_defects_from_environment_problems() {
        let missing = ParseError::MissingMandatory {
            rule: "node",
            artifact: "driver_log",
        };
        assert_eq!(missing.kind(), "artifact");
        assert!(missing.is_artifact_defect());

        let write = ParseError::write("runs/00001/properties", "disk full");
        assert_eq!(write.kind(), "write");
        assert!(!write.is_artifact_defect());
        assert_eq!(
            write.to_string(),
            "cannot write properties for runs/00001/properties: disk full"
        );
    }
}
