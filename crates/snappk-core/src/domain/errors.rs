use crate::domain::Species;
use std::path::PathBuf;
use thiserror::Error;

pub type PkResult<T> = Result<T, PkError>;

/// Broad failure classes with stable process exit codes, mirrored by the
/// CLI front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkErrorCategory {
    InputValidation,
    IoSystem,
    Computation,
}

impl PkErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation => 2,
            Self::IoSystem => 3,
            Self::Computation => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "InputValidationError",
            Self::IoSystem => "IoSystemError",
            Self::Computation => "ComputationError",
        }
    }
}

#[derive(Debug, Error)]
pub enum PkError {
    #[error("unknown species selector '{selector}'")]
    InvalidSpecies { selector: String },

    #[error(
        "species {species} carries no mass data: header mass table entry is zero \
         and the snapshot has no MASS block for it"
    )]
    MissingMassData { species: Species },

    #[error("zero density weight: cannot normalize {context}")]
    DivideByZero { context: String },

    #[error("snapshot '{path}': {reason}")]
    SnapshotFormat { path: PathBuf, reason: String },

    #[error("spectrum table '{path}': {reason}")]
    TableFormat { path: PathBuf, reason: String },

    #[error("failed to {action} '{path}'")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("estimator rejected input: {reason}")]
    EstimatorInput { reason: String },
}

impl PkError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn snapshot_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SnapshotFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub const fn category(&self) -> PkErrorCategory {
        match self {
            Self::InvalidSpecies { .. } | Self::MissingMassData { .. } => {
                PkErrorCategory::InputValidation
            }
            Self::SnapshotFormat { .. } | Self::TableFormat { .. } | Self::Io { .. } => {
                PkErrorCategory::IoSystem
            }
            Self::DivideByZero { .. } | Self::EstimatorInput { .. } => PkErrorCategory::Computation,
        }
    }

    pub const fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.category().as_str(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::{PkError, PkErrorCategory};
    use crate::domain::Species;

    #[test]
    fn categories_map_to_stable_exit_codes() {
        let invalid = PkError::InvalidSpecies {
            selector: "plasma".to_string(),
        };
        assert_eq!(invalid.category(), PkErrorCategory::InputValidation);
        assert_eq!(invalid.exit_code(), 2);

        let format = PkError::snapshot_format("snap_000", "truncated record");
        assert_eq!(format.category(), PkErrorCategory::IoSystem);
        assert_eq!(format.exit_code(), 3);

        let degenerate = PkError::DivideByZero {
            context: "combined matter field".to_string(),
        };
        assert_eq!(degenerate.category(), PkErrorCategory::Computation);
        assert_eq!(degenerate.exit_code(), 4);
    }

    #[test]
    fn diagnostic_line_names_category_and_message() {
        let error = PkError::MissingMassData {
            species: Species::Gas,
        };
        let line = error.diagnostic_line();
        assert!(line.starts_with("ERROR: [InputValidationError]"));
        assert!(line.contains("GAS"));
    }
}
