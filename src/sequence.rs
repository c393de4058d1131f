//! Check orchestration.
//!
//! A [`ConformanceSequence`] wires the collaborators and a profile rule-set
//! into the fixed set of conformance checks: read, search-parameter match,
//! terminology bindings, must-support coverage, and reference integrity.
//! Checks are independent - a failure in one never aborts another - but the
//! read/search phase gates the aggregate checks: with no resources in hand
//! they report an explicit skip. No state is mutated across checks; the
//! assembled collection is threaded through by value.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::absent::{AbsenceChecker, DataAbsentReasonChecker};
use crate::collection::ResourceCollection;
use crate::error::Result;
use crate::must_support::check_must_support;
use crate::outcome::{CheckOutcome, CheckReport, RunReport};
use crate::profile::ProfileRules;
use crate::reference::{DEFAULT_RESOLUTION_BUDGET, ReferenceIntegrityChecker};
use crate::search::match_resource;
use crate::sweep::search_with_status_sweep;
use crate::terminology::{BindingValidator, TerminologyService};
use crate::transport::{CapabilityView, ReadExecutor, SearchExecutor, SessionState};

pub const CHECK_READ: &str = "resource-read";
pub const CHECK_SEARCH: &str = "search-parameter-match";
pub const CHECK_BINDINGS: &str = "terminology-bindings";
pub const CHECK_MUST_SUPPORT: &str = "must-support";
pub const CHECK_REFERENCES: &str = "reference-integrity";

/// One profile's conformance checks against one server.
pub struct ConformanceSequence {
    rules: ProfileRules,
    search: Arc<dyn SearchExecutor>,
    read: Arc<dyn ReadExecutor>,
    terminology: Arc<dyn TerminologyService>,
    capability: Arc<dyn CapabilityView>,
    session: Arc<dyn SessionState>,
    absence: Arc<dyn AbsenceChecker>,
    resolution_budget: usize,
}

impl ConformanceSequence {
    /// Build a sequence. The rule tables are validated here so that a
    /// malformed configuration fails before any check runs.
    pub fn new(
        rules: ProfileRules,
        search: Arc<dyn SearchExecutor>,
        read: Arc<dyn ReadExecutor>,
        terminology: Arc<dyn TerminologyService>,
        capability: Arc<dyn CapabilityView>,
        session: Arc<dyn SessionState>,
    ) -> Result<Self> {
        rules.validate()?;
        Ok(Self {
            rules,
            search,
            read,
            terminology,
            capability,
            session,
            absence: Arc::new(DataAbsentReasonChecker::new()),
            resolution_budget: DEFAULT_RESOLUTION_BUDGET,
        })
    }

    pub fn with_absence_checker(mut self, absence: Arc<dyn AbsenceChecker>) -> Self {
        self.absence = absence;
        self
    }

    pub fn with_resolution_budget(mut self, budget: usize) -> Self {
        self.resolution_budget = budget;
        self
    }

    pub fn rules(&self) -> &ProfileRules {
        &self.rules
    }

    /// Read every session reference of the profile's type and assemble the
    /// fetched resources. Each read must return the resource it names.
    pub async fn read_check(&self) -> (CheckReport, ResourceCollection) {
        let resource_type = &self.rules.resource_type;
        let mut collection = ResourceCollection::new(resource_type.clone());

        if !self.capability.read_documented(resource_type) {
            let outcome = CheckOutcome::skip(format!(
                "The read interaction for {resource_type} is not documented by this server"
            ));
            return (CheckReport::new(CHECK_READ, outcome), collection);
        }

        let references: Vec<_> = self
            .session
            .resource_references()
            .into_iter()
            .filter(|r| r.resource_type == *resource_type)
            .collect();
        if references.is_empty() {
            let outcome = CheckOutcome::skip(format!(
                "No {resource_type} references found from the prior searches"
            ));
            return (CheckReport::new(CHECK_READ, outcome), collection);
        }

        let mut failures = Vec::new();
        for reference in &references {
            match self.read.read(resource_type, &reference.id).await {
                Ok(Some(resource)) => {
                    let type_ok = resource.get("resourceType").and_then(Value::as_str)
                        == Some(resource_type.as_str());
                    let id_ok = resource.get("id").and_then(Value::as_str)
                        == Some(reference.id.as_str());
                    if type_ok && id_ok {
                        collection.insert(resource);
                    } else {
                        failures.push(format!("Read of {reference} returned a different resource"));
                    }
                }
                Ok(None) => failures.push(format!("{reference} could not be read")),
                Err(e) => failures.push(format!("Read of {reference} failed: {e}")),
            }
        }
        debug!(
            resource_type = %resource_type,
            requested = references.len(),
            fetched = collection.len(),
            "read check complete"
        );

        let outcome = if failures.is_empty() {
            CheckOutcome::Pass
        } else {
            CheckOutcome::fail(failures.join(". "))
        };
        (CheckReport::new(CHECK_READ, outcome), collection)
    }

    /// Search per session patient (sweeping status where required) and
    /// assert every returned resource satisfies the filter that was
    /// claimed to produce it.
    pub async fn search_check(&self) -> (CheckReport, ResourceCollection) {
        let resource_type = &self.rules.resource_type;
        let mut collection = ResourceCollection::new(resource_type.clone());

        let patients = self.session.patient_ids();
        if patients.is_empty() {
            let outcome = CheckOutcome::skip("No patient ids available to search with");
            return (CheckReport::new(CHECK_SEARCH, outcome), collection);
        }

        let mut mismatches = Vec::new();
        let mut warnings = Vec::new();
        for patient_id in &patients {
            let base_params = vec![("patient".to_string(), patient_id.clone())];
            let sweep = match search_with_status_sweep(
                self.search.as_ref(),
                self.capability.as_ref(),
                resource_type,
                &base_params,
                &self.rules.status_values,
            )
            .await
            {
                Ok(sweep) => sweep,
                Err(e) => {
                    let report = CheckReport::new(CHECK_SEARCH, CheckOutcome::fail(e.to_string()));
                    return (report, collection);
                }
            };
            warnings.extend(sweep.warnings.iter().cloned());

            for resource in &sweep.resources {
                for (name, value) in &sweep.params {
                    let Some(spec) = self.rules.search_param(name) else {
                        continue;
                    };
                    if let CheckOutcome::Fail(reason) = match_resource(spec, resource, value) {
                        mismatches.push(reason);
                    }
                }
            }
            for resource in sweep.resources {
                collection.insert(resource);
            }
        }

        let outcome = if !mismatches.is_empty() {
            mismatches.sort();
            mismatches.dedup();
            CheckOutcome::fail(mismatches.join(". "))
        } else if collection.is_empty() {
            CheckOutcome::skip(format!(
                "No {resource_type} resources appear to be available"
            ))
        } else if !warnings.is_empty() {
            warnings.sort();
            warnings.dedup();
            CheckOutcome::warn(warnings.join(". "))
        } else {
            CheckOutcome::Pass
        };
        (CheckReport::new(CHECK_SEARCH, outcome), collection)
    }

    /// Terminology bindings over the assembled collection.
    pub async fn binding_check(&self, collection: &ResourceCollection) -> CheckReport {
        if collection.is_empty() {
            return CheckReport::new(CHECK_BINDINGS, self.no_resources_skip());
        }
        let validator = BindingValidator::new(self.terminology.as_ref(), self.absence.as_ref());
        let outcome = validator.check(&self.rules.bindings, collection).await;
        CheckReport::new(CHECK_BINDINGS, outcome)
    }

    /// Must-support coverage over the assembled collection.
    pub fn must_support_check(&self, collection: &ResourceCollection) -> CheckReport {
        if collection.is_empty() {
            return CheckReport::new(CHECK_MUST_SUPPORT, self.no_resources_skip());
        }
        let outcome = check_must_support(&self.rules.must_support, collection, self.absence.as_ref());
        CheckReport::new(CHECK_MUST_SUPPORT, outcome)
    }

    /// Reference integrity over the assembled collection.
    pub async fn reference_check(&self, collection: &ResourceCollection) -> CheckReport {
        let resource_type = &self.rules.resource_type;
        if !self.capability.search_documented(resource_type)
            || !self.capability.read_documented(resource_type)
        {
            let outcome = CheckOutcome::skip(format!(
                "Search and read interactions for {resource_type} are not both documented by \
                 this server"
            ));
            return CheckReport::new(CHECK_REFERENCES, outcome);
        }
        if collection.is_empty() {
            return CheckReport::new(CHECK_REFERENCES, self.no_resources_skip());
        }
        let outcome = ReferenceIntegrityChecker::new(self.read.as_ref())
            .with_budget(self.resolution_budget)
            .check(collection)
            .await;
        CheckReport::new(CHECK_REFERENCES, outcome)
    }

    /// Run every check in the fixed order and report each outcome plus the
    /// worst-of aggregate.
    pub async fn run_all(&self) -> RunReport {
        let (read_report, mut collection) = self.read_check().await;
        let (search_report, searched) = self.search_check().await;
        collection.merge(searched);

        let binding_report = self.binding_check(&collection).await;
        let must_support_report = self.must_support_check(&collection);
        let reference_report = self.reference_check(&collection).await;

        RunReport::new(vec![
            read_report,
            search_report,
            binding_report,
            must_support_report,
            reference_report,
        ])
    }

    fn no_resources_skip(&self) -> CheckOutcome {
        CheckOutcome::skip(format!(
            "No {} resources were found to check",
            self.rules.resource_type
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::us_core_encounter;
    use crate::terminology::InMemoryTerminology;
    use crate::transport::{
        InMemorySession, PermissiveCapabilityView, ResourceReference, SearchResponse,
        TransportResult,
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct EmptyServer;

    #[async_trait]
    impl SearchExecutor for EmptyServer {
        async fn search(
            &self,
            _resource_type: &str,
            _params: &[(String, String)],
        ) -> TransportResult<SearchResponse> {
            Ok(SearchResponse::Success {
                entries: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl ReadExecutor for EmptyServer {
        async fn read(&self, _resource_type: &str, _id: &str) -> TransportResult<Option<Value>> {
            Ok(None)
        }
    }

    fn empty_sequence(session: InMemorySession) -> ConformanceSequence {
        ConformanceSequence::new(
            us_core_encounter(),
            Arc::new(EmptyServer),
            Arc::new(EmptyServer),
            Arc::new(InMemoryTerminology::new()),
            Arc::new(PermissiveCapabilityView),
            Arc::new(session),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_check_skips_without_references() {
        let sequence = empty_sequence(InMemorySession::new());
        let (report, collection) = sequence.read_check().await;
        assert!(matches!(report.outcome, CheckOutcome::Skip(_)));
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn test_read_check_fails_on_missing_resource() {
        let session =
            InMemorySession::new().with_references(vec![ResourceReference::new("Encounter", "e1")]);
        let sequence = empty_sequence(session);
        let (report, _) = sequence.read_check().await;
        match report.outcome {
            CheckOutcome::Fail(reason) => assert!(reason.contains("Encounter/e1")),
            other => panic!("expected fail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_check_skips_without_patients() {
        let sequence = empty_sequence(InMemorySession::new());
        let (report, _) = sequence.search_check().await;
        assert!(matches!(report.outcome, CheckOutcome::Skip(_)));
    }

    #[tokio::test]
    async fn test_empty_collection_gates_aggregate_checks() {
        let sequence = empty_sequence(InMemorySession::new());
        let collection = ResourceCollection::new("Encounter");

        assert!(matches!(
            sequence.binding_check(&collection).await.outcome,
            CheckOutcome::Skip(_)
        ));
        assert!(matches!(
            sequence.must_support_check(&collection).outcome,
            CheckOutcome::Skip(_)
        ));
        assert!(matches!(
            sequence.reference_check(&collection).await.outcome,
            CheckOutcome::Skip(_)
        ));
    }

    #[tokio::test]
    async fn test_run_all_reports_every_check_once() {
        let sequence = empty_sequence(InMemorySession::new());
        let report = sequence.run_all().await;
        let names: Vec<_> = report.reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                CHECK_READ,
                CHECK_SEARCH,
                CHECK_BINDINGS,
                CHECK_MUST_SUPPORT,
                CHECK_REFERENCES
            ]
        );
        // Nothing to test against: every check skips, nothing fails.
        assert!(matches!(report.status(), CheckOutcome::Skip(_)));
    }

    #[tokio::test]
    async fn test_unmatched_search_param_is_hard_failure() {
        // Server honors nothing: returns a resource for a different patient.
        struct UnfilteredServer;

        #[async_trait]
        impl SearchExecutor for UnfilteredServer {
            async fn search(
                &self,
                _resource_type: &str,
                _params: &[(String, String)],
            ) -> TransportResult<SearchResponse> {
                Ok(SearchResponse::Success {
                    entries: vec![json!({
                        "resourceType": "Encounter", "id": "e9",
                        "status": "finished",
                        "subject": {"reference": "Patient/other"}
                    })],
                })
            }
        }

        let sequence = ConformanceSequence::new(
            us_core_encounter(),
            Arc::new(UnfilteredServer),
            Arc::new(EmptyServer),
            Arc::new(InMemoryTerminology::new()),
            Arc::new(PermissiveCapabilityView),
            Arc::new(InMemorySession::new().with_patient_ids(vec!["p1".into()])),
        )
        .unwrap();

        let (report, _) = sequence.search_check().await;
        match report.outcome {
            CheckOutcome::Fail(reason) => assert!(reason.contains("patient")),
            other => panic!("expected fail, got {other:?}"),
        }
    }
}
