//! Resource collections.

use serde_json::Value;

/// An ordered set of resources sharing one resource type, gathered by the
/// read/search phase. Read-only for every check that consumes it; the
/// aggregate checks (bindings, must-support) operate over the collection as
/// a whole.
#[derive(Debug, Clone)]
pub struct ResourceCollection {
    resource_type: String,
    resources: Vec<Value>,
}

impl ResourceCollection {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resources: Vec::new(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Add a resource. Resources whose `resourceType` does not match the
    /// collection's type are rejected.
    pub fn insert(&mut self, resource: Value) -> bool {
        let matches = resource.get("resourceType").and_then(Value::as_str)
            == Some(self.resource_type.as_str());
        if matches {
            self.resources.push(resource);
        }
        matches
    }

    /// Merge another collection, dropping duplicates by id. Incoming
    /// resources pass through the same type check as [`insert`].
    ///
    /// [`insert`]: ResourceCollection::insert
    pub fn merge(&mut self, other: ResourceCollection) {
        for resource in other.resources {
            let id = resource.get("id").and_then(Value::as_str);
            let duplicate = id.is_some()
                && self
                    .resources
                    .iter()
                    .any(|r| r.get("id").and_then(Value::as_str) == id);
            if !duplicate {
                self.insert(resource);
            }
        }
    }

    pub fn resources(&self) -> &[Value] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
