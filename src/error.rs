use crate::arena::AllocError;
use crate::driver::DriverError;

/// Error types for sqlx-named-stmt
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A quoted region was still open when the SQL template ended
    #[error("Failed to parse SQL template: quote opened at byte {offset} is never closed")]
    UnterminatedQuote { offset: usize },

    /// The SQL template ended right after an escape character
    #[error("Failed to parse SQL template: escape at byte {offset} has nothing to escape")]
    TrailingEscape { offset: usize },

    /// An arena tier or the system allocator could not satisfy a request
    #[error("Allocation failed: {0}")]
    Allocation(#[from] AllocError),

    /// The native statement layer reported a failure
    #[error("Database error: {0}")]
    Protocol(#[from] DriverError),

    /// Placeholder was referenced but never bound before execution
    #[error("Placeholder '{0}' was not bound before execute")]
    UnboundPlaceholder(String),

    /// `bind` named a parameter that the prepared query does not contain
    #[error("Query has no parameter named '{0}'")]
    UnknownParameter(String),

    /// Operation needs a prepared query
    #[error("Statement has not been prepared")]
    NotPrepared,

    /// Fetch was attempted before a successful execute
    #[error("Statement has not been executed")]
    NotExecuted,

    /// Invalid statement configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for sqlx-named-stmt operations
pub type Result<T> = std::result::Result<T, Error>;
