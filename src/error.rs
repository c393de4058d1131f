use thiserror::Error;

use crate::terminology::TerminologyError;
use crate::transport::TransportError;

/// Engine-level errors. Check logic converts these to `Fail` outcomes at
/// the check boundary; they never cross between independent checks.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A rule table failed load-time validation.
    #[error("Invalid profile rules: {0}")]
    InvalidRules(String),

    /// The server returned a body the engine could not interpret (e.g. a
    /// client error without a machine-readable problem report).
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A status-qualified retry during the sweep drew a client error. Every
    /// swept search must succeed once the status value is supplied.
    #[error("Status-qualified search failed: {0}")]
    StatusSearchFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Terminology(#[from] TerminologyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
