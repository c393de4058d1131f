//! Reference integrity checking.
//!
//! Walks every reference-typed element of a resource, fetches each
//! referenced resource through the read collaborator, and recurses into the
//! fetched resources. A global budget bounds the total number of
//! resolutions across the whole walk, and a visited set guarantees
//! termination on cyclic reference graphs. This is best-effort integrity
//! checking: once the budget is exhausted the walk stops silently rather
//! than failing.

use async_recursion::async_recursion;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::collection::ResourceCollection;
use crate::outcome::CheckOutcome;
use crate::transport::ReadExecutor;

/// Default cap on total reference resolutions per walk.
pub const DEFAULT_RESOLUTION_BUDGET: usize = 50;

/// Checks that references found in a resource collection can be resolved
/// and read back.
pub struct ReferenceIntegrityChecker<'a> {
    read: &'a dyn ReadExecutor,
    budget: usize,
}

struct WalkState {
    visited: HashSet<String>,
    resolutions: usize,
    violations: Vec<String>,
}

impl<'a> ReferenceIntegrityChecker<'a> {
    pub fn new(read: &'a dyn ReadExecutor) -> Self {
        Self {
            read,
            budget: DEFAULT_RESOLUTION_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Walk the whole collection. Violations (malformed relative
    /// references, unresolvable fetches) fail the check; an exhausted
    /// budget does not.
    pub async fn check(&self, collection: &ResourceCollection) -> CheckOutcome {
        let mut state = WalkState {
            visited: HashSet::new(),
            resolutions: 0,
            violations: Vec::new(),
        };

        // Resources already in hand never need a fetch.
        for resource in collection.resources() {
            if let Some(key) = resource_key(resource) {
                state.visited.insert(key);
            }
        }

        for resource in collection.resources() {
            if state.resolutions >= self.budget {
                break;
            }
            self.walk_resource(resource, &mut state).await;
        }

        debug!(
            resource_type = collection.resource_type(),
            resolutions = state.resolutions,
            violations = state.violations.len(),
            "reference walk complete"
        );

        if state.violations.is_empty() {
            CheckOutcome::Pass
        } else {
            CheckOutcome::fail(state.violations.join(". "))
        }
    }

    #[async_recursion]
    async fn walk_resource(&self, resource: &Value, state: &mut WalkState) {
        for reference in collect_reference_strings(resource) {
            if state.resolutions >= self.budget {
                return;
            }

            // Contained and absolute references are outside the read
            // collaborator's reach.
            if reference.starts_with('#') || reference.contains("://") {
                continue;
            }

            let Some((resource_type, id)) = parse_relative_reference(&reference) else {
                state
                    .violations
                    .push(format!("Invalid reference format: '{reference}'"));
                continue;
            };

            let key = format!("{resource_type}/{id}");
            if !state.visited.insert(key.clone()) {
                continue;
            }

            match self.read.read(&resource_type, &id).await {
                Ok(Some(fetched)) => {
                    state.resolutions += 1;
                    if resource_key(&fetched).as_deref() != Some(key.as_str()) {
                        state.violations.push(format!(
                            "Read of {key} returned a different resource"
                        ));
                        continue;
                    }
                    self.walk_resource(&fetched, state).await;
                }
                Ok(None) => {
                    state
                        .violations
                        .push(format!("Referenced resource {key} could not be read"));
                }
                Err(e) => {
                    state
                        .violations
                        .push(format!("Failed to resolve reference {key}: {e}"));
                }
            }
        }
    }
}

fn resource_key(resource: &Value) -> Option<String> {
    let resource_type = resource.get("resourceType")?.as_str()?;
    let id = resource.get("id")?.as_str()?;
    Some(format!("{resource_type}/{id}"))
}

/// A relative reference is exactly `Type/id`, with a non-empty
/// capitalized type and non-empty id.
fn parse_relative_reference(reference: &str) -> Option<(String, String)> {
    let (resource_type, id) = reference.split_once('/')?;
    if resource_type.is_empty() || id.is_empty() || id.contains('/') {
        return None;
    }
    if !resource_type.chars().next().is_some_and(char::is_uppercase) {
        return None;
    }
    Some((resource_type.to_string(), id.to_string()))
}

/// Recursively gather every `reference` string in the tree, in document
/// order.
fn collect_reference_strings(resource: &Value) -> Vec<String> {
    let mut references = Vec::new();
    gather(resource, &mut references);
    references
}

fn gather(node: &Value, references: &mut Vec<String>) {
    match node {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("reference").and_then(Value::as_str) {
                references.push(reference.to_string());
            }
            for (_, child) in obj {
                gather(child, references);
            }
        }
        Value::Array(items) => {
            for item in items {
                gather(item, references);
            }
        }
        _ => {}
    }
}
