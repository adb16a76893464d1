use std::path::PathBuf;
use thiserror::Error;

/// Failures of the catalog scan and the registry store.
///
/// Every registry operation returns one of these instead of panicking,
/// so callers decide whether to log, retry, or exit.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The folder handed to a scan or init is not a directory.
    #[error("not a directory: {0}")]
    InvalidFolder(PathBuf),

    /// A data operation was attempted while no database is open.
    #[error("no database open")]
    NotOpen,

    /// SQLite rejected a statement, commit, or connection.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure while touching the backing file.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
