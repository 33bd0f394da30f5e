//! Trace and metrics payload types.
//!
//! Pure functions only: lookback parsing, dependency-window arithmetic, and
//! decoding of the JSON bodies returned by the trace and metrics servers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::TelemetryError;

/// One service-to-service edge discovered from trace data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub parent: String,
    pub child: String,
    #[serde(rename = "callCount", default)]
    pub call_count: u64,
}

/// Query window in epoch milliseconds, shared by the dependencies API, range
/// queries and load-run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    /// Window ending at `end_ms` and reaching back `lookback`.
    #[must_use]
    pub fn ending_at(end_ms: i64, lookback: Duration) -> Self {
        let span = i64::try_from(lookback.as_millis()).unwrap_or(i64::MAX);
        Self {
            start_ms: end_ms.saturating_sub(span),
            end_ms,
        }
    }

    /// Lookback in milliseconds, as sent to the trace server.
    #[must_use]
    pub fn lookback_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// The same window widened by `margin` on both sides.
    #[must_use]
    pub fn padded(&self, margin: Duration) -> Self {
        let margin = i64::try_from(margin.as_millis()).unwrap_or(i64::MAX);
        Self {
            start_ms: self.start_ms.saturating_sub(margin),
            end_ms: self.end_ms.saturating_add(margin),
        }
    }

    /// Start as fractional Unix seconds, the form the metrics API expects.
    #[must_use]
    pub fn start_secs(&self) -> String {
        unix_secs(self.start_ms)
    }

    /// End as fractional Unix seconds.
    #[must_use]
    pub fn end_secs(&self) -> String {
        unix_secs(self.end_ms)
    }
}

fn unix_secs(ms: i64) -> String {
    format!("{}.{:03}", ms.div_euclid(1000), ms.rem_euclid(1000))
}

/// Parse a lookback such as `30s`, `15m` or `1h`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidLookback`] for any other shape, including
/// a missing number, an unknown unit, or overflow.
pub fn parse_lookback(input: &str) -> Result<Duration, TelemetryError> {
    parse_unit_duration(input).ok_or_else(|| TelemetryError::InvalidLookback(input.to_string()))
}

/// Parse a range-query resolution such as `15s` or `1m`. Zero is rejected.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidStep`] for a malformed or zero step.
pub fn parse_step(input: &str) -> Result<Duration, TelemetryError> {
    parse_unit_duration(input)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| TelemetryError::InvalidStep(input.to_string()))
}

fn parse_unit_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    let unit = trimmed.chars().last()?;
    let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
    let value: u64 = digits.parse().ok()?;
    let secs = match unit {
        's' => Some(value),
        'm' => value.checked_mul(60),
        'h' => value.checked_mul(3600),
        _ => None,
    }?;
    Some(Duration::from_secs(secs))
}

/// Decode a dependencies response body.
///
/// Edges are read from a top-level `data` array (query API) or a
/// `dependencies` array (older exports). A body with neither yields no edges.
///
/// # Errors
///
/// Returns [`TelemetryError::Payload`] when an edge is malformed.
pub fn parse_dependencies(body: &serde_json::Value) -> Result<Vec<DependencyEdge>, TelemetryError> {
    let Some(edges) = body.get("data").or_else(|| body.get("dependencies")) else {
        return Ok(Vec::new());
    };
    if edges.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(edges.clone()).map_err(|e| TelemetryError::Payload {
        service: "trace server",
        reason: e.to_string(),
    })
}

/// Dependency graph as rendered with `--json` and persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    pub start_ms: i64,
    pub end_ms: i64,
    pub services: Vec<String>,
    pub dependencies: Vec<DependencyEdge>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new(window: TimeWindow, dependencies: Vec<DependencyEdge>) -> Self {
        Self {
            start_ms: window.start_ms,
            end_ms: window.end_ms,
            services: services(&dependencies),
            dependencies,
        }
    }
}

/// Distinct service names appearing in `edges`, sorted.
#[must_use]
pub fn services(edges: &[DependencyEdge]) -> Vec<String> {
    let mut names: Vec<String> = edges
        .iter()
        .flat_map(|e| [e.parent.clone(), e.child.clone()])
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Count the series in an instant-query response.
///
/// A successful response with an empty result still proves connectivity.
///
/// # Errors
///
/// Returns [`TelemetryError::Payload`] when `status` is not `success` or the
/// result is not an array.
pub fn parse_query_result_count(body: &serde_json::Value) -> Result<usize, TelemetryError> {
    let payload_err = |reason: String| TelemetryError::Payload {
        service: "metrics server",
        reason,
    };
    let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if status != "success" {
        let detail = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("missing status");
        return Err(payload_err(format!("status '{status}': {detail}")));
    }
    body.get("data")
        .and_then(|d| d.get("result"))
        .and_then(|r| r.as_array())
        .map(Vec::len)
        .ok_or_else(|| payload_err("data.result is not an array".to_string()))
}

/// Result of probing one telemetry endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCheck {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub ok: bool,
    pub detail: String,
}

impl EndpointCheck {
    #[must_use]
    pub fn passed(service: &str, url: String, detail: String) -> Self {
        Self {
            service: service.to_string(),
            url: Some(url),
            ok: true,
            detail,
        }
    }

    #[must_use]
    pub fn failed(service: &str, url: Option<String>, err: &TelemetryError) -> Self {
        Self {
            service: service.to_string(),
            url,
            ok: false,
            detail: err.to_string(),
        }
    }
}
