//! HTTP infrastructure: implements `TelemetryClient` with `ureq` on
//! `spawn_blocking`.

use std::time::Duration;

use crate::application::ports::TelemetryClient;
use crate::domain::TelemetryError;

/// Default per-request timeout for the trace and metrics APIs.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Production implementation backed by a shared `ureq` agent.
pub struct UreqTelemetryClient {
    agent: ureq::Agent,
}

impl UreqTelemetryClient {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("meshbench/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for UreqTelemetryClient {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }
}

impl TelemetryClient for UreqTelemetryClient {
    async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, TelemetryError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        tracing::debug!(service, %url, ?query, "GET");

        tokio::task::spawn_blocking(move || {
            let mut req = agent.get(&url);
            for (k, v) in &query {
                req = req.query(k, v);
            }
            match req.call() {
                Ok(resp) => resp.into_json().map_err(|e| TelemetryError::Payload {
                    service,
                    reason: e.to_string(),
                }),
                Err(ureq::Error::Status(status, resp)) => Err(TelemetryError::HttpStatus {
                    service,
                    status,
                    body: resp.into_string().unwrap_or_default(),
                }),
                Err(ureq::Error::Transport(t)) => Err(TelemetryError::Unreachable {
                    service,
                    url,
                    reason: t.to_string(),
                }),
            }
        })
        .await
        .map_err(|e| TelemetryError::Unreachable {
            service,
            url: String::new(),
            reason: format!("request task panicked: {e}"),
        })?
    }
}
