//! Data-absent-reason detection.
//!
//! Servers may legitimately return an element whose value is replaced by an
//! explicit absence marker. Such leaves must not count as populated data for
//! must-support coverage, and must not be checked against terminology
//! bindings. The capability is a narrow trait so rule-sets with different
//! absence conventions can swap it without touching the engine.

use serde_json::Value;

/// Extension URL marking an absent value on a primitive or complex element.
pub const DATA_ABSENT_REASON_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/data-absent-reason";

/// Code system used when absence is expressed as a coding.
pub const DATA_ABSENT_REASON_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/data-absent-reason";

/// Does this leaf carry an explicit absence marker?
pub trait AbsenceChecker: Send + Sync {
    fn is_absent(&self, leaf: &Value) -> bool;
}

/// Default checker recognizing the FHIR data-absent-reason extension and
/// code system, on both Coding and CodeableConcept shapes.
#[derive(Debug, Default, Clone)]
pub struct DataAbsentReasonChecker;

impl DataAbsentReasonChecker {
    pub fn new() -> Self {
        Self
    }
}

impl AbsenceChecker for DataAbsentReasonChecker {
    fn is_absent(&self, leaf: &Value) -> bool {
        let Value::Object(obj) = leaf else {
            return false;
        };

        if let Some(extensions) = obj.get("extension").and_then(Value::as_array)
            && extensions.iter().any(|ext| {
                ext.get("url").and_then(Value::as_str) == Some(DATA_ABSENT_REASON_EXTENSION)
            })
        {
            return true;
        }

        if obj.get("system").and_then(Value::as_str) == Some(DATA_ABSENT_REASON_SYSTEM) {
            return true;
        }

        if let Some(codings) = obj.get("coding").and_then(Value::as_array) {
            return codings.iter().any(|coding| {
                coding.get("system").and_then(Value::as_str) == Some(DATA_ABSENT_REASON_SYSTEM)
            });
        }

        false
    }
}

/// Checker that treats nothing as absent. Useful when a rule-set has no
/// absence convention.
#[derive(Debug, Default, Clone)]
pub struct NoAbsenceChecker;

impl AbsenceChecker for NoAbsenceChecker {
    fn is_absent(&self, _leaf: &Value) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extension_form() {
        let checker = DataAbsentReasonChecker::new();
        let leaf = json!({
            "extension": [{
                "url": DATA_ABSENT_REASON_EXTENSION,
                "valueCode": "unknown"
            }]
        });
        assert!(checker.is_absent(&leaf));
    }

    #[test]
    fn test_coding_form() {
        let checker = DataAbsentReasonChecker::new();
        let coding = json!({"system": DATA_ABSENT_REASON_SYSTEM, "code": "unknown"});
        assert!(checker.is_absent(&coding));

        let concept = json!({"coding": [{"system": DATA_ABSENT_REASON_SYSTEM, "code": "masked"}]});
        assert!(checker.is_absent(&concept));
    }

    #[test]
    fn test_ordinary_values_are_present() {
        let checker = DataAbsentReasonChecker::new();
        assert!(!checker.is_absent(&json!("finished")));
        assert!(!checker.is_absent(&json!({"system": "http://loinc.org", "code": "1234-5"})));
        assert!(!checker.is_absent(&json!({
            "extension": [{"url": "http://example.org/other", "valueString": "x"}]
        })));
    }
}
