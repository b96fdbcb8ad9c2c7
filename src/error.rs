//! Error taxonomy for the question-answering pipeline.
//!
//! Two layers, deliberately separate:
//!
//! - [`QaError`] — the caller-facing rejections. Only invalid input, unknown
//!   documents, and questions against an in-flight ingestion propagate out of
//!   `ingest`/`ask`.
//! - [`ProviderError`] — embedding/generation backend failures. These are
//!   always absorbed into a fallback branch and logged; they never surface to
//!   the end user as a hard failure. `Timeout` is kept distinct from
//!   `Unavailable` purely for operational visibility — both take the same
//!   fallback path.
//!
//! "No grounding found" is intentionally absent here: an answer of "I cannot
//! find this information" is a valid [`crate::models::ConversationTurn`], not
//! an error.

use thiserror::Error;

/// Rejections surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum QaError {
    /// The caller supplied invalid input (e.g. an empty question). Not
    /// retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The document id is unknown — evicted or never ingested. Distinct from
    /// "no answer found in document".
    #[error("document not found: {0}")]
    NotFound(String),

    /// The document's ingestion has not finished; questions are rejected
    /// rather than served from a partial index.
    #[error("document {0} is still processing")]
    StillProcessing(String),

    /// Ingestion was cancelled before completion — session teardown or
    /// capacity eviction removed the document's slot mid-flight.
    #[error("ingestion of document {0} was cancelled")]
    Cancelled(String),
}

/// Failures from an embedding or generation backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Backend down, misconfigured, or missing credentials.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its hard timeout.
    #[error("provider timed out after {0}s")]
    Timeout(u64),

    /// The backend responded, but the payload could not be interpreted.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}
