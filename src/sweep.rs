//! Status sweep search.
//!
//! Some servers refuse to honor any filter on a resource type unless the
//! `status` parameter is present. The sweep first attempts the search as
//! given; if that draws a client error it verifies the error body is a
//! machine-readable problem report, then retries across the full fixed
//! enumeration of status values, stopping at the first value that yields a
//! result. An exhausted sweep is not an error - the resource type is simply
//! absent for this search.

use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::transport::{CapabilityView, SearchExecutor, SearchResponse};

/// Result of one swept search.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Resources of the requested type from the winning search.
    pub resources: Vec<Value>,
    /// The status value that produced results, when the sweep was needed.
    /// Dependent checks reuse it.
    pub matched_status: Option<String>,
    /// The effective parameter set, including the merged status value.
    pub params: Vec<(String, String)>,
    /// Advisory findings gathered along the way (e.g. undocumented status
    /// requirement).
    pub warnings: Vec<String>,
}

/// Run `base_params` against the server, sweeping `status_values` in their
/// fixed order if the server rejects the unqualified search.
///
/// A client error whose body is not a problem report aborts with
/// [`EngineError::MalformedResponse`]. Every retry must succeed; a client
/// error on a status-qualified retry aborts with
/// [`EngineError::StatusSearchFailed`]. The first status yielding at least
/// one resource of the right type wins and no further values are tried.
pub async fn search_with_status_sweep(
    search: &dyn SearchExecutor,
    capability: &dyn CapabilityView,
    resource_type: &str,
    base_params: &[(String, String)],
    status_values: &[String],
) -> Result<SweepOutcome> {
    let reply = search.search(resource_type, base_params).await?;

    let (status, body) = match reply {
        SearchResponse::Success { entries } => {
            return Ok(SweepOutcome {
                resources: keep_resource_type(entries, resource_type),
                matched_status: None,
                params: base_params.to_vec(),
                warnings: Vec::new(),
            });
        }
        SearchResponse::ClientError { status, body } => (status, body),
    };

    require_problem_report(status, &body)?;
    debug!(resource_type, status, "unqualified search rejected, sweeping status values");

    let mut warnings = Vec::new();
    if !capability.search_documented(resource_type) {
        warnings.push(format!(
            "Server returned a status of {status} with an OperationOutcome, but the search \
             interaction for {resource_type} is not documented in the CapabilityStatement. \
             If this response was due to the server requiring a status parameter, the server \
             must document this requirement in its CapabilityStatement."
        ));
    } else if !capability.search_param_documented(resource_type, "status") {
        warnings.push(format!(
            "Server requires a status parameter on {resource_type} searches, but the status \
             search parameter is not documented in the CapabilityStatement."
        ));
    }

    for status_value in status_values {
        let mut params = base_params.to_vec();
        params.push(("status".to_string(), status_value.clone()));

        let reply = search.search(resource_type, &params).await?;
        let entries = match reply {
            SearchResponse::Success { entries } => entries,
            SearchResponse::ClientError { status, body } => {
                require_problem_report(status, &body)?;
                return Err(EngineError::StatusSearchFailed(format!(
                    "Server returned a status of {status} for a {resource_type} search with \
                     status={status_value}"
                )));
            }
        };

        let resources = keep_resource_type(entries, resource_type);
        debug!(
            resource_type,
            status_value = %status_value,
            found = resources.len(),
            "status sweep attempt"
        );
        if !resources.is_empty() {
            return Ok(SweepOutcome {
                resources,
                matched_status: Some(status_value.clone()),
                params,
                warnings,
            });
        }
    }

    Ok(SweepOutcome {
        resources: Vec::new(),
        matched_status: None,
        params: base_params.to_vec(),
        warnings,
    })
}

/// A client error must carry a machine-readable OperationOutcome body.
fn require_problem_report(status: u16, body: &str) -> Result<()> {
    let parsed: Value = serde_json::from_str(body).map_err(|_| {
        EngineError::MalformedResponse(format!(
            "Server returned a status of {status} without an OperationOutcome"
        ))
    })?;
    if parsed.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
        return Err(EngineError::MalformedResponse(format!(
            "Server returned a status of {status} without an OperationOutcome"
        )));
    }
    Ok(())
}

fn keep_resource_type(entries: Vec<Value>, resource_type: &str) -> Vec<Value> {
    entries
        .into_iter()
        .filter(|entry| entry.get("resourceType").and_then(Value::as_str) == Some(resource_type))
        .collect()
}
