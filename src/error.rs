use std::path::PathBuf;
use thiserror::Error;

/// Placeholder shown instead of a chart or export when the simulation has not
/// produced the requested output yet.
pub const WARM_UP_MESSAGE: &str = "Running the simulation for a warm-up period!";

/// Failure reading one of the project's text inputs or simulation outputs.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("{}:{line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("output not available yet in {}: {reason}", path.display())]
    NotReady { path: PathBuf, reason: String },

    #[error("column '{column}' not found in {}", path.display())]
    UnknownColumn { path: PathBuf, column: String },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReadError {
    pub fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        ReadError::Malformed {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn not_ready(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReadError::NotReady {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps an io error to `Missing` when the file does not exist.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            ReadError::Missing { path }
        } else {
            ReadError::Io { path, source }
        }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, ReadError::NotReady { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ReadError::Missing { .. })
    }
}

/// Failure of the subbasin/grid linking step.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Layer(#[from] ReadError),

    #[error("no valid geometry in layer '{layer}'")]
    NoValidGeometry { layer: String },

    #[error("linkage store error")]
    Store(#[from] rusqlite::Error),

    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_missing() {
        let err = ReadError::from_io(
            "APEXCONT.DAT",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_missing());
        assert!(!err.is_not_ready());
    }

    #[test]
    fn other_io_errors_are_kept() {
        let err = ReadError::from_io(
            "APEXCONT.DAT",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, ReadError::Io { .. }));
    }
}
