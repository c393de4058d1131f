//! Element path resolution over raw resource trees.
//!
//! Paths are dot-separated field names evaluated against a
//! `serde_json::Value` document. Intermediate array-valued fields broadcast:
//! the remainder of the path is applied to every element, and resolution
//! succeeds if *any* element satisfies it. Missing fields yield no leaves
//! rather than an error. Every other engine component is built on these
//! semantics.

use serde_json::Value;

/// Resolve `path` against `resource` and apply `predicate` to each reachable
/// leaf. Returns true as soon as any leaf satisfies the predicate.
///
/// Null leaves are never passed to the predicate. The resource is never
/// mutated.
pub fn resolve_path<F>(resource: &Value, path: &str, predicate: F) -> bool
where
    F: Fn(&Value) -> bool,
{
    let segments: Vec<&str> = path.split('.').collect();
    resolve_segments(resource, &segments, &predicate)
}

fn resolve_segments<F>(node: &Value, segments: &[&str], predicate: &F) -> bool
where
    F: Fn(&Value) -> bool,
{
    if let Value::Array(items) = node {
        return items
            .iter()
            .any(|item| resolve_segments(item, segments, predicate));
    }
    match segments.split_first() {
        None => !node.is_null() && predicate(node),
        Some((head, rest)) => match node.get(head) {
            Some(child) => resolve_segments(child, rest, predicate),
            None => false,
        },
    }
}

/// Eager companion to [`resolve_path`]: collect every non-null leaf reachable
/// at `path`, in document order. Used where each leaf must be reported
/// individually (binding violations).
pub fn collect_path<'a>(resource: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut leaves = Vec::new();
    collect_segments(resource, &segments, &mut leaves);
    leaves
}

fn collect_segments<'a>(node: &'a Value, segments: &[&str], leaves: &mut Vec<&'a Value>) {
    if let Value::Array(items) = node {
        for item in items {
            collect_segments(item, segments, leaves);
        }
        return;
    }
    match segments.split_first() {
        None => {
            if !node.is_null() {
                leaves.push(node);
            }
        }
        Some((head, rest)) => {
            if let Some(child) = node.get(head) {
                collect_segments(child, rest, leaves);
            }
        }
    }
}
