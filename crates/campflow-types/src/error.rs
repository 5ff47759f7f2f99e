use thiserror::Error;
use uuid::Uuid;

/// Errors from repository operations (used by trait definitions in campflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The collection version changed between read and conditional write.
    #[error("concurrency conflict on '{field}' of {entity_id} (expected version {expected})")]
    ConcurrencyConflict {
        entity_id: Uuid,
        field: String,
        expected: u64,
    },

    /// The backing schema has no column for a field the snapshot tried to write.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

impl RepositoryError {
    /// Whether this is an optimistic-lock mismatch (retryable by the caller).
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, RepositoryError::ConcurrencyConflict { .. })
    }
}

/// Substrings that mark an error description as transient.
const TRANSIENT_INDICATORS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "temporary",
    "temporarily",
    "503",
    "502",
    "504",
    "429",
    "rate limit",
    "socket",
    "dns",
    "ssl",
    "tls",
    "certificate",
];

/// Heuristic transience check on an error's textual description.
///
/// Case-insensitive substring match against known transient signatures
/// (timeouts, connection resets, gateway and rate-limit statuses, DNS/TLS).
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

/// Errors from external calls (generator, analyzer, lookups, blob storage, publisher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("call timed out after {0}ms")]
    Timeout(u64),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("rate limit exceeded: maximum retries ({0}) reached")]
    RateLimitExhausted(u32),

    #[error("gateway error: HTTP {0}")]
    Gateway(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// Whether retrying the call may succeed.
    ///
    /// Typed transient variants are always retryable; malformed responses,
    /// configuration errors and exhausted rate limits never are. Untyped
    /// errors fall back to [`is_transient_message`].
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Timeout(_)
            | CallError::Connection(_)
            | CallError::RateLimited { .. }
            | CallError::Gateway(_) => true,
            CallError::Malformed(_)
            | CallError::InvalidConfig(_)
            | CallError::RateLimitExhausted(_) => false,
            CallError::Other(message) => is_transient_message(message),
        }
    }
}
