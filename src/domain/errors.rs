//! Error taxonomy shared by every component (spec §7).
//!
//! The HTTP surface is the only layer that maps these to status codes;
//! nothing below it knows about HTTP.

use thiserror::Error;

/// Cross-component error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, missing required field, disallowed instrument,
    /// invalid type/price, bad webhook secret. Never persists an order.
    #[error("{0}")]
    ClientError(String),

    /// The broker accepted the request but refused the order (margin,
    /// price away, unknown symbol). Persists as `REJECTED_BY_BROKER`.
    #[error("broker refused order: {0}")]
    BrokerRefusal(String),

    /// Network/timeout reaching the broker. Persists as
    /// `ERROR_SUBMITTING`.
    #[error("broker transport error: {0}")]
    Transport(String),

    /// Persistence error. If a broker reply was already obtained, the
    /// operator must reconcile manually.
    #[error("order store unavailable: {0}")]
    StoreUnavailable(String),

    /// Attempted transition out of a terminal state, or reassignment of
    /// `broker_order_id`. The existing record is preserved.
    #[error("conflicting update rejected: {0}")]
    Conflict(String),

    /// No record found for the given id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything uncategorized.
    #[error("internal error: {0}")]
    Internal(String),
}
