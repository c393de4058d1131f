//! Profile rule tables.
//!
//! A [`ProfileRules`] record carries everything resource-type-specific the
//! engine needs: search parameter specs, terminology bindings, must-support
//! elements, and the status value domain for the sweep. Tables are plain
//! data - the engine holds no per-resource-type logic - and are validated
//! at load time so a malformed table fails fast instead of surfacing as a
//! confusing path-resolution miss at check time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{EngineError, Result};
use crate::must_support::MustSupportElement;
use crate::search::SearchParamSpec;
use crate::terminology::{BindingDefinition, BindingStrength, CodedType};

/// The complete rule-set for one resource type under one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRules {
    pub resource_type: String,
    /// Canonical URL of the profile these rules implement.
    pub profile_url: String,
    pub search_params: Vec<SearchParamSpec>,
    pub bindings: Vec<BindingDefinition>,
    pub must_support: Vec<MustSupportElement>,
    /// Fixed, exhaustive, ordered domain for the status sweep.
    pub status_values: Vec<String>,
}

impl ProfileRules {
    /// Load-time validation: empty paths, duplicate parameter names, and an
    /// empty status domain are configuration mistakes, not runtime
    /// conditions.
    pub fn validate(&self) -> Result<()> {
        if self.resource_type.is_empty() {
            return Err(EngineError::InvalidRules("empty resource type".into()));
        }
        if self.status_values.is_empty() {
            return Err(EngineError::InvalidRules(format!(
                "{}: status value domain is empty",
                self.resource_type
            )));
        }

        let mut names = HashSet::new();
        for param in &self.search_params {
            if param.name.is_empty() || param.path.is_empty() {
                return Err(EngineError::InvalidRules(format!(
                    "{}: search parameter with empty name or path",
                    self.resource_type
                )));
            }
            if !names.insert(param.name.as_str()) {
                return Err(EngineError::InvalidRules(format!(
                    "{}: duplicate search parameter '{}'",
                    self.resource_type, param.name
                )));
            }
        }

        for binding in &self.bindings {
            if binding.path.is_empty() || binding.value_set.is_empty() {
                return Err(EngineError::InvalidRules(format!(
                    "{}: binding with empty path or value set",
                    self.resource_type
                )));
            }
        }

        for element in &self.must_support {
            if element.path.is_empty() {
                return Err(EngineError::InvalidRules(format!(
                    "{}: must-support element with empty path",
                    self.resource_type
                )));
            }
        }

        Ok(())
    }

    pub fn search_param(&self, name: &str) -> Option<&SearchParamSpec> {
        self.search_params.iter().find(|p| p.name == name)
    }
}

/// US Core 3.1.0 Encounter rule-set.
pub fn us_core_encounter() -> ProfileRules {
    let binding = |element_type, strength, value_set: &str, path: &str| BindingDefinition {
        element_type,
        strength,
        value_set: value_set.to_string(),
        path: path.to_string(),
    };

    ProfileRules {
        resource_type: "Encounter".to_string(),
        profile_url: "http://hl7.org/fhir/us/core/StructureDefinition/us-core-encounter"
            .to_string(),
        search_params: vec![
            SearchParamSpec::token("_id", "id"),
            SearchParamSpec::token("class", "class.code"),
            SearchParamSpec::date("date", "period"),
            SearchParamSpec::token("identifier", "identifier.value"),
            SearchParamSpec::reference("patient", "subject.reference", "Patient"),
            SearchParamSpec::token("status", "status"),
            SearchParamSpec::token("type", "type.coding.code"),
        ],
        bindings: vec![
            binding(
                CodedType::Code,
                BindingStrength::Required,
                "http://hl7.org/fhir/ValueSet/identifier-use",
                "identifier.use",
            ),
            binding(
                CodedType::CodeableConcept,
                BindingStrength::Extensible,
                "http://hl7.org/fhir/ValueSet/identifier-type",
                "identifier.type",
            ),
            binding(
                CodedType::Code,
                BindingStrength::Required,
                "http://hl7.org/fhir/ValueSet/encounter-status",
                "status",
            ),
            binding(
                CodedType::Code,
                BindingStrength::Required,
                "http://hl7.org/fhir/ValueSet/encounter-status",
                "statusHistory.status",
            ),
            binding(
                CodedType::Coding,
                BindingStrength::Extensible,
                "http://terminology.hl7.org/ValueSet/v3-ActEncounterCode",
                "class",
            ),
            binding(
                CodedType::Coding,
                BindingStrength::Extensible,
                "http://terminology.hl7.org/ValueSet/v3-ActEncounterCode",
                "classHistory.class",
            ),
            binding(
                CodedType::CodeableConcept,
                BindingStrength::Extensible,
                "http://hl7.org/fhir/us/core/ValueSet/us-core-encounter-type",
                "type",
            ),
            binding(
                CodedType::CodeableConcept,
                BindingStrength::Extensible,
                "http://hl7.org/fhir/ValueSet/encounter-participant-type",
                "participant.type",
            ),
            binding(
                CodedType::Code,
                BindingStrength::Required,
                "http://hl7.org/fhir/ValueSet/encounter-location-status",
                "location.status",
            ),
        ],
        must_support: [
            "identifier",
            "identifier.system",
            "identifier.value",
            "status",
            "class",
            "type",
            "subject",
            "participant",
            "participant.type",
            "participant.period",
            "participant.individual",
            "period",
            "reasonCode",
            "hospitalization",
            "hospitalization.dischargeDisposition",
            "location",
            "location.location",
        ]
        .iter()
        .map(|p| MustSupportElement::path(*p))
        .collect(),
        status_values: [
            "planned",
            "arrived",
            "triaged",
            "in-progress",
            "onleave",
            "finished",
            "cancelled",
            "entered-in-error",
            "unknown",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encounter_rules_validate() {
        let rules = us_core_encounter();
        rules.validate().unwrap();
        assert_eq!(rules.resource_type, "Encounter");
        assert_eq!(rules.search_params.len(), 7);
        assert_eq!(rules.bindings.len(), 9);
        assert_eq!(rules.must_support.len(), 17);
        assert_eq!(rules.status_values.len(), 9);
        assert!(rules.search_param("patient").is_some());
        assert!(rules.search_param("nope").is_none());
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let mut rules = us_core_encounter();
        rules
            .search_params
            .push(SearchParamSpec::token("status", "status"));
        let err = rules.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate search parameter"));
    }

    #[test]
    fn test_empty_status_domain_rejected() {
        let mut rules = us_core_encounter();
        rules.status_values.clear();
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut rules = us_core_encounter();
        rules.must_support.push(MustSupportElement::path(""));
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_rules_serde_round_trip() {
        let rules = us_core_encounter();
        let encoded = serde_json::to_string(&rules).unwrap();
        let decoded: ProfileRules = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, rules);
    }
}
