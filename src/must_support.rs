//! Must-support coverage tracking.
//!
//! Must-support is an obligation on the server to be *capable* of producing
//! an element somewhere, not a per-instance requirement: an element counts
//! as covered if any resource in the collection populates it. Missing
//! coverage is insufficient evidence rather than a defect - the test data
//! may simply not exercise the element - so the aggregate result is a skip,
//! never a failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::absent::AbsenceChecker;
use crate::collection::ResourceCollection;
use crate::outcome::CheckOutcome;
use crate::path::resolve_path;

/// One element the profile obliges the server to support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MustSupportElement {
    pub path: String,
    /// When set, only leaves equal to this value count as coverage.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fixed_value: Option<String>,
}

impl MustSupportElement {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fixed_value: None,
        }
    }

    pub fn fixed(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fixed_value: Some(value.into()),
        }
    }

    fn label(&self) -> String {
        match &self.fixed_value {
            Some(value) => format!("{}: {}", self.path, value),
            None => self.path.clone(),
        }
    }

    fn satisfied_by(&self, resource: &Value, absence: &dyn AbsenceChecker) -> bool {
        resolve_path(resource, &self.path, |leaf| {
            if absence.is_absent(leaf) {
                return false;
            }
            match &self.fixed_value {
                None => true,
                Some(fixed) => leaf.as_str() == Some(fixed.as_str()),
            }
        })
    }
}

/// Sweep the element list across the whole collection and name every
/// element no resource populates.
pub fn missing_must_support(
    elements: &[MustSupportElement],
    collection: &ResourceCollection,
    absence: &dyn AbsenceChecker,
) -> Vec<String> {
    elements
        .iter()
        .filter(|element| {
            !collection
                .resources()
                .iter()
                .any(|resource| element.satisfied_by(resource, absence))
        })
        .map(MustSupportElement::label)
        .collect()
}

/// Aggregate must-support check: pass when every element is covered
/// somewhere, otherwise skip naming exactly the uncovered elements.
pub fn check_must_support(
    elements: &[MustSupportElement],
    collection: &ResourceCollection,
    absence: &dyn AbsenceChecker,
) -> CheckOutcome {
    let missing = missing_must_support(elements, collection, absence);
    debug!(
        resource_type = collection.resource_type(),
        checked = elements.len(),
        missing = missing.len(),
        "must-support sweep complete"
    );
    if missing.is_empty() {
        CheckOutcome::Pass
    } else {
        CheckOutcome::skip(format!(
            "Could not find {} in the {} provided {} resource(s)",
            missing.join(", "),
            collection.len(),
            collection.resource_type()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::absent::{DataAbsentReasonChecker, NoAbsenceChecker};
    use serde_json::json;

    fn collection(resources: Vec<Value>) -> ResourceCollection {
        let mut c = ResourceCollection::new("Encounter");
        for r in resources {
            c.insert(r);
        }
        c
    }

    #[test]
    fn test_any_resource_covers_element() {
        // Only resource #2 populates A; nothing populates B. Exactly B is
        // reported missing.
        let elements = vec![
            MustSupportElement::path("identifier"),
            MustSupportElement::path("period"),
        ];
        let resources = collection(vec![
            json!({"resourceType": "Encounter", "id": "1"}),
            json!({"resourceType": "Encounter", "id": "2",
                   "identifier": [{"value": "abc"}]}),
        ]);
        let missing = missing_must_support(&elements, &resources, &NoAbsenceChecker);
        assert_eq!(missing, vec!["period"]);
    }

    #[test]
    fn test_full_coverage_passes() {
        let elements = vec![
            MustSupportElement::path("status"),
            MustSupportElement::path("subject"),
        ];
        let resources = collection(vec![json!({
            "resourceType": "Encounter", "id": "1",
            "status": "finished",
            "subject": {"reference": "Patient/1"}
        })]);
        assert_eq!(
            check_must_support(&elements, &resources, &NoAbsenceChecker),
            CheckOutcome::Pass
        );
    }

    #[test]
    fn test_missing_coverage_is_skip_not_fail() {
        let elements = vec![MustSupportElement::path("hospitalization")];
        let resources = collection(vec![json!({"resourceType": "Encounter", "id": "1"})]);
        let outcome = check_must_support(&elements, &resources, &NoAbsenceChecker);
        match outcome {
            CheckOutcome::Skip(reason) => {
                assert!(reason.contains("hospitalization"));
                assert!(reason.contains("1 provided Encounter resource(s)"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_value_must_match() {
        let elements = vec![MustSupportElement::fixed("status", "finished")];
        let planned = collection(vec![json!({
            "resourceType": "Encounter", "id": "1", "status": "planned"
        })]);
        let missing = missing_must_support(&elements, &planned, &NoAbsenceChecker);
        assert_eq!(missing, vec!["status: finished"]);
    }

    #[test]
    fn test_absent_marker_does_not_count_as_coverage() {
        let elements = vec![MustSupportElement::path("type")];
        let resources = collection(vec![json!({
            "resourceType": "Encounter", "id": "1",
            "type": [{"coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/data-absent-reason",
                "code": "unknown"
            }]}]
        })]);
        let missing = missing_must_support(&elements, &resources, &DataAbsentReasonChecker);
        assert_eq!(missing, vec!["type"]);
    }
}
