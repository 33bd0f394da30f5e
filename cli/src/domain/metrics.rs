//! Range queries against the metrics server and their on-disk layout.
//!
//! Queries are fixed strings from the config file. Per-service results are
//! obtained by grouping the returned series on a label (by default `pod`),
//! never by rewriting the query text.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::TelemetryError;
use crate::domain::telemetry::TimeWindow;

/// Query names become file names.
static QUERY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").expect("valid regex")
});

/// One named range query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub name: String,
    pub query: String,
}

impl MetricQuery {
    fn new(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
        }
    }
}

/// `collect` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Resolution of every range query.
    pub step: String,
    /// Window used when no load record is given.
    pub lookback: String,
    /// Series label whose value names the pod a series belongs to.
    pub service_label: String,
    pub out_dir: PathBuf,
    pub queries: Vec<MetricQuery>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            step: "15s".to_string(),
            lookback: "15m".to_string(),
            service_label: "pod".to_string(),
            out_dir: PathBuf::from("data"),
            queries: default_queries(),
        }
    }
}

/// Per-pod resource and request-rate queries.
#[must_use]
pub fn default_queries() -> Vec<MetricQuery> {
    vec![
        MetricQuery::new(
            "http_request_success_rate",
            r#"sum(rate(http_requests_total{status=~"2.."}[5m])) by (pod) / sum(rate(http_requests_total[5m])) by (pod) * 100"#,
        ),
        MetricQuery::new(
            "cpu_usage_per_pod",
            "sum(rate(container_cpu_usage_seconds_total[5m])) by (pod)",
        ),
        MetricQuery::new(
            "memory_usage_per_pod",
            "sum(container_memory_usage_bytes) by (pod)",
        ),
        MetricQuery::new(
            "network_receive",
            "sum(rate(container_network_receive_bytes_total[5m])) by (pod)",
        ),
        MetricQuery::new(
            "network_transmit",
            "sum(rate(container_network_transmit_bytes_total[5m])) by (pod)",
        ),
    ]
}

/// Whether `name` can be used as a query name (and file stem).
#[must_use]
pub fn is_valid_query_name(name: &str) -> bool {
    QUERY_NAME.is_match(name)
}

/// Parameters of `GET /api/v1/query_range`.
#[must_use]
pub fn range_params(query: &str, window: TimeWindow, step: Duration) -> Vec<(&'static str, String)> {
    vec![
        ("query", query.to_string()),
        ("start", window.start_secs()),
        ("end", window.end_secs()),
        ("step", format!("{}s", step.as_secs().max(1))),
    ]
}

// ── Response decoding ────────────────────────────────────────────────────────

/// One time series: its labels and `[unix_seconds, "value"]` samples.
///
/// Sample values are kept as the strings the server sent (`NaN`, `+Inf`
/// included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// Decode a `query_range` response body.
///
/// # Errors
///
/// Returns [`TelemetryError::Payload`] when `status` is not `success`, the
/// result is not a matrix, or a series is malformed.
pub fn parse_range_result(body: &serde_json::Value) -> Result<Vec<Series>, TelemetryError> {
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
    let data = body
        .get("data")
        .ok_or_else(|| payload_err("missing data".to_string()))?;
    let kind = data.get("resultType").and_then(|t| t.as_str()).unwrap_or("");
    if kind != "matrix" {
        return Err(payload_err(format!("expected a matrix result, got '{kind}'")));
    }
    let result = data
        .get("result")
        .cloned()
        .ok_or_else(|| payload_err("data.result is missing".to_string()))?;
    serde_json::from_value(result).map_err(|e| payload_err(e.to_string()))
}

// ── Grouping ─────────────────────────────────────────────────────────────────

/// Service a series belongs to, judged by `label`.
///
/// A label value matches a service when it equals the service name or is the
/// name followed by `-` (pod names such as `text-service-7d9f8-x2x4k`). The
/// longest matching service wins, so `post-storage-...` is not attributed to
/// `post`.
#[must_use]
pub fn owning_service<'a>(
    series: &Series,
    label: &str,
    services: &'a [String],
) -> Option<&'a str> {
    let value = series.metric.get(label)?;
    services
        .iter()
        .filter(|s| {
            value == *s
                || value
                    .strip_prefix(s.as_str())
                    .is_some_and(|rest| rest.starts_with('-'))
        })
        .max_by_key(|s| s.len())
        .map(String::as_str)
}

/// Series grouped by owning service; series matching no service are kept
/// aside.
#[must_use]
pub fn group_by_service(
    series: &[Series],
    label: &str,
    services: &[String],
) -> (BTreeMap<String, Vec<Series>>, Vec<Series>) {
    let mut grouped: BTreeMap<String, Vec<Series>> = BTreeMap::new();
    let mut unmatched = Vec::new();
    for s in series {
        match owning_service(s, label, services) {
            Some(service) => grouped.entry(service.to_string()).or_default().push(s.clone()),
            None => unmatched.push(s.clone()),
        }
    }
    (grouped, unmatched)
}

/// Directory name for a service reported by the trace server.
///
/// Anything outside `[A-Za-z0-9_.-]` becomes `_`, and a leading dot is
/// escaped, so a service name can never leave the output directory.
#[must_use]
pub fn service_dir_name(service: &str) -> String {
    let mut name: String = service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.starts_with('.') {
        name.insert(0, '_');
    }
    name
}

// ── Collection ───────────────────────────────────────────────────────────────

/// Result of one configured query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub name: String,
    pub query: String,
    pub series: Vec<Series>,
}

/// A query that could not be collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFailure {
    pub name: String,
    pub detail: String,
}

/// Everything gathered by one collection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub window: TimeWindow,
    pub step_secs: u64,
    pub services: Vec<String>,
    pub results: Vec<MetricResult>,
    pub failures: Vec<QueryFailure>,
}

/// Contents of one persisted metric file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFile {
    pub metric: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub step_secs: u64,
    pub series: Vec<Series>,
}

/// A file to write, relative to the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub content: MetricFile,
}

impl Collection {
    /// Output layout: `<metric>.json` with every series, plus
    /// `<service>/<metric>.json` for each service that owns at least one
    /// series. Failed queries produce no files.
    #[must_use]
    pub fn files(&self, label: &str) -> Vec<PlannedFile> {
        let mut files = Vec::new();
        for result in &self.results {
            files.push(PlannedFile {
                path: PathBuf::from(format!("{}.json", result.name)),
                content: self.metric_file(result, None, result.series.clone()),
            });
            let (grouped, _) = group_by_service(&result.series, label, &self.services);
            for (service, series) in grouped {
                files.push(PlannedFile {
                    path: PathBuf::from(service_dir_name(&service))
                        .join(format!("{}.json", result.name)),
                    content: self.metric_file(result, Some(service), series),
                });
            }
        }
        files
    }

    fn metric_file(
        &self,
        result: &MetricResult,
        service: Option<String>,
        series: Vec<Series>,
    ) -> MetricFile {
        MetricFile {
            metric: result.name.clone(),
            query: result.query.clone(),
            service,
            start_ms: self.window.start_ms,
            end_ms: self.window.end_ms,
            step_secs: self.step_secs,
            series,
        }
    }
}
