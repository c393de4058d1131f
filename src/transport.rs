//! External collaborator interfaces.
//!
//! The engine never performs HTTP itself. Search and read execution, server
//! capability discovery, and session state all sit behind traits supplied by
//! the host harness. Traits are async because real implementations block on
//! the network; the engine awaits them sequentially and spawns nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by the search/read transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not complete the request at all.
    #[error("Transport failure: {message}")]
    Failure { message: String },

    /// The server answered with a status the engine has no handling for
    /// (anything that is neither success nor a client error).
    #[error("Unexpected response status {status} from {resource_type} {interaction}")]
    UnexpectedStatus {
        status: u16,
        resource_type: String,
        interaction: String,
    },
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Outcome of one search request.
///
/// A success carries the resources from the returned bundle's entries, page
/// handling already done by the transport. A client error carries the raw
/// body so the engine can check it is a machine-readable problem report.
#[derive(Debug, Clone)]
pub enum SearchResponse {
    Success { entries: Vec<Value> },
    ClientError { status: u16, body: String },
}

/// Executes searches against the server under test.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    /// Run a search for `resource_type` with the given ordered query
    /// parameters.
    async fn search(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> TransportResult<SearchResponse>;
}

/// Executes reads against the server under test.
#[async_trait]
pub trait ReadExecutor: Send + Sync {
    /// Fetch a single resource by type and id. `Ok(None)` means not found.
    async fn read(&self, resource_type: &str, id: &str) -> TransportResult<Option<Value>>;
}

/// Read-side view of the server's self-description.
///
/// Used only to decide whether an observed behavior deserves a warning;
/// never to gate check execution.
pub trait CapabilityView: Send + Sync {
    fn search_documented(&self, resource_type: &str) -> bool;
    fn read_documented(&self, resource_type: &str) -> bool;
    fn search_param_documented(&self, resource_type: &str, param: &str) -> bool;
}

/// A type+id pair discovered by an earlier phase of the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub resource_type: String,
    pub id: String,
}

impl ResourceReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// Session state persisted by the host between test phases. The engine only
/// reads it.
pub trait SessionState: Send + Sync {
    /// Resource references discovered by prior searches, across all types.
    fn resource_references(&self) -> Vec<ResourceReference>;

    /// Patient ids the run is scoped to.
    fn patient_ids(&self) -> Vec<String>;
}

/// In-memory session state, for tests and embedding hosts without
/// persistence.
#[derive(Debug, Default, Clone)]
pub struct InMemorySession {
    references: Vec<ResourceReference>,
    patients: Vec<String>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_references(mut self, references: Vec<ResourceReference>) -> Self {
        self.references = references;
        self
    }

    pub fn with_patient_ids(mut self, patients: Vec<String>) -> Self {
        self.patients = patients;
        self
    }
}

impl SessionState for InMemorySession {
    fn resource_references(&self) -> Vec<ResourceReference> {
        self.references.clone()
    }

    fn patient_ids(&self) -> Vec<String> {
        self.patients.clone()
    }
}

/// Capability view that documents everything. Useful for tests and for
/// servers whose CapabilityStatement has not been fetched.
#[derive(Debug, Default, Clone)]
pub struct PermissiveCapabilityView;

impl CapabilityView for PermissiveCapabilityView {
    fn search_documented(&self, _resource_type: &str) -> bool {
        true
    }

    fn read_documented(&self, _resource_type: &str) -> bool {
        true
    }

    fn search_param_documented(&self, _resource_type: &str, _param: &str) -> bool {
        true
    }
}
