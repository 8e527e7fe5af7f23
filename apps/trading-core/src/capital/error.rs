//! Error types for the capital ledger.

use std::path::PathBuf;

/// Errors from loading or persisting the capital ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Reading or writing the ledger file failed.
    #[error("Ledger I/O error at '{}': {source}", path.display())]
    Io {
        /// Ledger file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The ledger file exists but is not a valid ledger.
    #[error("Corrupt ledger file '{}': {source}", path.display())]
    Corrupt {
        /// Ledger file path.
        path: PathBuf,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The ledger could not be serialized.
    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),
}
