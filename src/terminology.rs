//! Terminology binding validation.
//!
//! Coded elements are checked against the valueset named by their binding
//! through an external [`TerminologyService`]. Required bindings hard-fail on
//! violations; extensible bindings fall back to raw code-system membership
//! and at worst produce warnings. Unknown valuesets or code systems degrade
//! to a warning naming the missing terminology resource - never a false
//! pass, never a hard failure, since terminology content may be incomplete
//! or unlicensed in the validating environment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::absent::AbsenceChecker;
use crate::outcome::CheckOutcome;
use crate::path::collect_path;
use crate::collection::ResourceCollection;

/// Error codes for terminology lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminologyErrorCode {
    /// VS1001: Value set not known to the service
    UnknownValueSet = 1001,
    /// VS1002: Code system not known to the service
    UnknownCodeSystem = 1002,
    /// VS1003: Service unavailable
    ServiceUnavailable = 1003,
}

impl std::fmt::Display for TerminologyErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VS{:04}", *self as u32)
    }
}

/// Errors raised by a terminology service. Unknown-valueset and
/// unknown-code-system are distinct from a plain membership failure, which
/// is an `Ok(false)` answer rather than an error.
#[derive(Debug, Error)]
pub enum TerminologyError {
    #[error("Value set not known to the terminology service: {url}")]
    UnknownValueSet { url: String },

    #[error("Code system not known to the terminology service: {url}")]
    UnknownCodeSystem { url: String },

    #[error("Terminology service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl TerminologyError {
    pub fn code(&self) -> TerminologyErrorCode {
        match self {
            TerminologyError::UnknownValueSet { .. } => TerminologyErrorCode::UnknownValueSet,
            TerminologyError::UnknownCodeSystem { .. } => TerminologyErrorCode::UnknownCodeSystem,
            TerminologyError::ServiceUnavailable { .. } => TerminologyErrorCode::ServiceUnavailable,
        }
    }
}

/// Result type for terminology operations.
pub type TerminologyResult<T> = Result<T, TerminologyError>;

/// External terminology lookup collaborator.
#[async_trait]
pub trait TerminologyService: Send + Sync {
    /// Is `code` (optionally qualified by `system`) a member of the value
    /// set? `Ok(false)` is a plain non-membership answer.
    async fn code_in_value_set(
        &self,
        value_set_url: &str,
        code: &str,
        system: Option<&str>,
    ) -> TerminologyResult<bool>;

    /// Is `code` defined by the code system at all? Used as the weaker
    /// fallback check for extensible bindings.
    async fn code_in_system(&self, system_url: &str, code: &str) -> TerminologyResult<bool>;
}

/// How strictly a coded element must draw from its bound valueset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    /// Violations are hard failures.
    Required,
    /// Violations degrade to warnings after a code-system-only fallback.
    Extensible,
}

/// Shape of the coded element at the binding's path, driving code
/// extraction from each leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodedType {
    #[serde(rename = "code")]
    Code,
    Coding,
    CodeableConcept,
}

/// One terminology binding from the profile's rule tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDefinition {
    #[serde(rename = "type")]
    pub element_type: CodedType,
    pub strength: BindingStrength,
    /// Canonical URL of the bound valueset.
    pub value_set: String,
    pub path: String,
}

/// One code found outside its binding, with enough context for a readable
/// report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingViolation {
    pub resource_type: String,
    pub resource_id: String,
    pub code: String,
    pub system: Option<String>,
}

impl BindingViolation {
    fn message(&self, scope: &str) -> String {
        format!(
            "{}/{} has code '{}' (system: {}) which is not in {}",
            self.resource_type,
            self.resource_id,
            self.code,
            self.system.as_deref().unwrap_or("none"),
            scope
        )
    }
}

/// Pull (code, system) pairs out of a leaf according to the declared
/// element type. Shapes that do not match yield nothing.
fn extract_codes(element_type: CodedType, leaf: &Value) -> Vec<(String, Option<String>)> {
    let mut codes = Vec::new();
    match element_type {
        CodedType::Code => {
            if let Some(code) = leaf.as_str() {
                codes.push((code.to_string(), None));
            }
        }
        CodedType::Coding => {
            if let Some(code) = leaf.get("code").and_then(Value::as_str) {
                let system = leaf.get("system").and_then(Value::as_str).map(String::from);
                codes.push((code.to_string(), system));
            }
        }
        CodedType::CodeableConcept => {
            if let Some(codings) = leaf.get("coding").and_then(Value::as_array) {
                for coding in codings {
                    if let Some(code) = coding.get("code").and_then(Value::as_str) {
                        let system = coding
                            .get("system")
                            .and_then(Value::as_str)
                            .map(String::from);
                        codes.push((code.to_string(), system));
                    }
                }
            }
        }
    }
    codes
}

/// Validates a resource collection against a profile's binding tables.
pub struct BindingValidator<'a> {
    terminology: &'a dyn TerminologyService,
    absence: &'a dyn AbsenceChecker,
}

impl<'a> BindingValidator<'a> {
    pub fn new(terminology: &'a dyn TerminologyService, absence: &'a dyn AbsenceChecker) -> Self {
        Self {
            terminology,
            absence,
        }
    }

    /// Check every binding against the whole collection and fold the result
    /// into one outcome.
    ///
    /// Required bindings are checked first; any violation fails the check.
    /// Extensible bindings are re-checked against only the code system when
    /// valueset membership fails (the valueset constraint is deliberately
    /// dropped, not narrowed), and surviving violations become warnings.
    pub async fn check(
        &self,
        bindings: &[BindingDefinition],
        collection: &ResourceCollection,
    ) -> CheckOutcome {
        let mut failure_messages = Vec::new();
        let mut failing_resources = HashSet::new();
        let mut warnings = Vec::new();

        for binding in bindings
            .iter()
            .filter(|b| b.strength == BindingStrength::Required)
        {
            match self.invalid_codes(binding, collection, false).await {
                Ok(violations) => {
                    for violation in violations {
                        failing_resources.insert(format!(
                            "{}/{}",
                            violation.resource_type, violation.resource_id
                        ));
                        failure_messages
                            .push(violation.message(&format!("value set {}", binding.value_set)));
                    }
                }
                Err(e) => warnings.push(e.to_string()),
            }
        }

        for binding in bindings
            .iter()
            .filter(|b| b.strength == BindingStrength::Extensible)
        {
            match self.check_extensible(binding, collection).await {
                Ok(messages) => warnings.extend(messages),
                Err(e) => warnings.push(e.to_string()),
            }
        }

        if !failure_messages.is_empty() {
            return CheckOutcome::fail(format!(
                "{} invalid required binding(s) found in {} resource(s): {}",
                failure_messages.len(),
                failing_resources.len(),
                failure_messages.join(". ")
            ));
        }
        if !warnings.is_empty() {
            return CheckOutcome::warn(warnings.join(". "));
        }
        CheckOutcome::Pass
    }

    /// Extensible strength: valueset first, then code-system-only for the
    /// leftovers. Never produces failures.
    async fn check_extensible(
        &self,
        binding: &BindingDefinition,
        collection: &ResourceCollection,
    ) -> TerminologyResult<Vec<String>> {
        let valueset_misses = self.invalid_codes(binding, collection, false).await?;
        if valueset_misses.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            path = %binding.path,
            value_set = %binding.value_set,
            misses = valueset_misses.len(),
            "extensible binding missed value set, retrying against code system only"
        );
        let system_misses = self.invalid_codes(binding, collection, true).await?;
        Ok(system_misses
            .into_iter()
            .map(|v| {
                let scope = match &v.system {
                    Some(system) => format!("code system {system}"),
                    None => format!("value set {}", binding.value_set),
                };
                v.message(&scope)
            })
            .collect())
    }

    /// Walk the collection and return every code at the binding's path that
    /// the terminology service rejects. With `system_only` the valueset
    /// constraint is dropped and membership is tested against each code's
    /// own declared system; codes without a system stay invalid.
    async fn invalid_codes(
        &self,
        binding: &BindingDefinition,
        collection: &ResourceCollection,
        system_only: bool,
    ) -> TerminologyResult<Vec<BindingViolation>> {
        let mut violations = Vec::new();
        for resource in collection.resources() {
            let resource_id = resource
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            for leaf in collect_path(resource, &binding.path) {
                if self.absence.is_absent(leaf) {
                    continue;
                }
                for (code, system) in extract_codes(binding.element_type, leaf) {
                    let member = if system_only {
                        match &system {
                            Some(system_url) => {
                                self.terminology.code_in_system(system_url, &code).await?
                            }
                            None => false,
                        }
                    } else {
                        self.terminology
                            .code_in_value_set(&binding.value_set, &code, system.as_deref())
                            .await?
                    };
                    if !member {
                        violations.push(BindingViolation {
                            resource_type: collection.resource_type().to_string(),
                            resource_id: resource_id.clone(),
                            code,
                            system,
                        });
                    }
                }
            }
        }
        Ok(violations)
    }
}

/// In-memory terminology service backed by explicit valueset and code
/// system tables. Lookups against unregistered urls raise the unknown
/// conditions, matching a real service with partial content.
#[derive(Debug, Default)]
pub struct InMemoryTerminology {
    value_sets: HashMap<String, HashSet<String>>,
    code_systems: HashMap<String, HashSet<String>>,
}

impl InMemoryTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value_set_code(&mut self, value_set_url: &str, code: &str) {
        self.value_sets
            .entry(value_set_url.to_string())
            .or_default()
            .insert(code.to_string());
    }

    pub fn add_system_code(&mut self, system_url: &str, code: &str) {
        self.code_systems
            .entry(system_url.to_string())
            .or_default()
            .insert(code.to_string());
    }
}

#[async_trait]
impl TerminologyService for InMemoryTerminology {
    async fn code_in_value_set(
        &self,
        value_set_url: &str,
        code: &str,
        _system: Option<&str>,
    ) -> TerminologyResult<bool> {
        match self.value_sets.get(value_set_url) {
            Some(codes) => Ok(codes.contains(code)),
            None => Err(TerminologyError::UnknownValueSet {
                url: value_set_url.to_string(),
            }),
        }
    }

    async fn code_in_system(&self, system_url: &str, code: &str) -> TerminologyResult<bool> {
        match self.code_systems.get(system_url) {
            Some(codes) => Ok(codes.contains(code)),
            None => Err(TerminologyError::UnknownCodeSystem {
                url: system_url.to_string(),
            }),
        }
    }
}
