//! fhir-conformance - profile conformance checking engine for FHIR servers.
//!
//! This crate supplies the validation logic used by a conformance-testing
//! harness to decide whether a clinical-data server's API responses satisfy
//! an interoperability profile (e.g. US Core). The harness owns transport,
//! test registration and reporting; this engine owns the checks:
//!
//! - matching returned resources against the search filter that produced
//!   them ([`search`])
//! - sweeping the status value domain for servers that require a status
//!   parameter ([`sweep`])
//! - terminology binding validation with graceful degradation
//!   ([`terminology`])
//! - must-support element coverage across a resource collection
//!   ([`must_support`])
//! - bounded, cycle-safe reference resolution ([`reference`])
//!
//! # Quick Start
//!
//! ```ignore
//! use fhir_conformance::{ConformanceSequence, us_core_encounter};
//! use std::sync::Arc;
//!
//! let sequence = ConformanceSequence::new(
//!     us_core_encounter(),
//!     search_executor,
//!     read_executor,
//!     terminology,
//!     capability,
//!     session,
//! )?;
//! let report = sequence.run_all().await;
//! println!("{}", report.status());
//! ```
//!
//! # Module Organization
//!
//! - [`path`] - element path resolution over raw resource trees
//! - [`search`] - search parameter matching
//! - [`sweep`] - status sweep search
//! - [`terminology`] - binding validation and the terminology collaborator
//! - [`must_support`] - must-support coverage
//! - [`reference`] - reference integrity checking
//! - [`profile`] - rule tables, including the bundled US Core Encounter set
//! - [`sequence`] - check orchestration
//! - [`transport`] - collaborator interfaces supplied by the host

pub mod absent;
pub mod collection;
pub mod error;
pub mod must_support;
pub mod outcome;
pub mod path;
pub mod profile;
pub mod reference;
pub mod search;
pub mod sequence;
pub mod sweep;
pub mod terminology;
pub mod transport;

// Error exports
pub use error::{EngineError, Result};

// Outcome exports
pub use outcome::{CheckOutcome, CheckReport, RunReport};

// Path exports
pub use path::{collect_path, resolve_path};

// Search exports
pub use search::{MatchKind, SearchParamSpec, match_resource, split_param_values};

// Sweep exports
pub use sweep::{SweepOutcome, search_with_status_sweep};

// Terminology exports
pub use terminology::{
    BindingDefinition, BindingStrength, BindingValidator, CodedType, InMemoryTerminology,
    TerminologyError, TerminologyErrorCode, TerminologyResult, TerminologyService,
};

// Must-support exports
pub use must_support::{MustSupportElement, check_must_support, missing_must_support};

// Reference exports
pub use reference::{DEFAULT_RESOLUTION_BUDGET, ReferenceIntegrityChecker};

// Absence capability exports
pub use absent::{AbsenceChecker, DataAbsentReasonChecker, NoAbsenceChecker};

// Collection exports
pub use collection::ResourceCollection;

// Profile exports
pub use profile::{ProfileRules, us_core_encounter};

// Sequence exports
pub use sequence::ConformanceSequence;

// Transport exports
pub use transport::{
    CapabilityView, InMemorySession, PermissiveCapabilityView, ReadExecutor, ResourceReference,
    SearchExecutor, SearchResponse, SessionState, TransportError, TransportResult,
};
