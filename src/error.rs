use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Broad error classes used for exit codes and abort decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Data,
    Integrity,
    Other,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CuffError {
    #[error("unknown track kind: {0}")]
    #[diagnostic(help("valid track kinds are gene, tss, isoform and cds"))]
    UnknownTrack(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("{track} {role} file is missing: {path}")]
    MissingRequiredFile {
        track: String,
        role: String,
        path: PathBuf,
    },

    #[error("input directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("column `{column}` is missing from {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed row at {path}:{line}: {message}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("unknown field `{field}` for {entity}")]
    UnknownField { entity: String, field: String },

    #[error("invalid lookup expression: {0}")]
    InvalidLookup(String),

    #[error("integrity error during {stage} ({file}): {message}")]
    Integrity {
        stage: String,
        file: String,
        message: String,
    },

    #[error("experiment not found: {0}")]
    ExperimentNotFound(i64),

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CuffError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CuffError::UnknownTrack(_)
            | CuffError::UnknownEntity(_)
            | CuffError::MissingRequiredFile { .. }
            | CuffError::MissingDirectory(_)
            | CuffError::MissingColumn { .. }
            | CuffError::ConfigRead(_)
            | CuffError::ConfigParse(_)
            | CuffError::InvalidArgument(_)
            | CuffError::UnknownField { .. }
            | CuffError::InvalidLookup(_) => ErrorClass::Configuration,
            CuffError::MalformedRow { .. } | CuffError::InvalidIdentifier(_) => ErrorClass::Data,
            CuffError::Integrity { .. } => ErrorClass::Integrity,
            CuffError::ExperimentNotFound(_)
            | CuffError::Read { .. }
            | CuffError::Database(_)
            | CuffError::Filesystem(_) => ErrorClass::Other,
        }
    }

    /// Names the import stage and input file on integrity errors.
    pub fn in_stage(self, stage: &str, file: &str) -> Self {
        match self {
            CuffError::Integrity { message, .. } => CuffError::Integrity {
                stage: stage.to_string(),
                file: file.to_string(),
                message,
            },
            other => other,
        }
    }
}

impl From<rusqlite::Error> for CuffError {
    fn from(err: rusqlite::Error) -> Self {
        CuffError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(
            CuffError::UnknownTrack("exon".to_string()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            CuffError::InvalidIdentifier("-".to_string()).class(),
            ErrorClass::Data
        );
        let err = CuffError::Integrity {
            stage: "gene track".to_string(),
            file: "genes.fpkm_tracking".to_string(),
            message: "UNIQUE constraint failed".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::Integrity);
        assert!(err.to_string().contains("genes.fpkm_tracking"));
    }
}
