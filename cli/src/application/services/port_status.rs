//! Port status use-case: a read-only view of every configured tunnel port.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use serde::Serialize;

use crate::application::ports::PortProbe;
use crate::domain::{PortState, TunnelError, TunnelSpec};

/// Probe result for one configured tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    pub local_port: u16,
    pub remote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_target: Option<String>,
    #[serde(flatten)]
    pub state: PortState,
}

/// Probe each tunnel's local port once, in configuration order.
///
/// # Errors
///
/// Returns [`TunnelError::ProbeUnavailable`] if the socket table cannot be read.
pub async fn probe_ports(
    probe: &impl PortProbe,
    specs: &[TunnelSpec],
) -> Result<Vec<PortStatus>, TunnelError> {
    let mut rows = Vec::with_capacity(specs.len());
    for spec in specs {
        rows.push(PortStatus {
            local_port: spec.local_port,
            remote: format!("{}:{}", spec.remote_host, spec.remote_port),
            cluster_target: spec.cluster_forward.as_ref().map(|f| {
                format!("{} -n {}", f.target(), f.namespace)
            }),
            state: probe.state(spec.local_port).await?,
        });
    }
    Ok(rows)
}
