//! `meshbench status`: show which configured ports are bound.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::app::AppContext;
use crate::application::services::port_status::{PortStatus, probe_ports};
use crate::output::Renderer;

#[derive(Serialize)]
struct StatusOutput<'a> {
    ports: &'a [PortStatus],
}

/// Probe every configured local port once.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the socket
/// table cannot be probed.
pub async fn run(app: &AppContext) -> Result<()> {
    let config = app.load_config()?;
    let rows = probe_ports(&app.probe(), &config.tunnels)
        .await
        .context("cannot read port status")?;

    match app.renderer() {
        Renderer::Human(r) => r.render_port_status(&rows),
        Renderer::Json(r) => r.render(&StatusOutput { ports: &rows })?,
    }
    Ok(())
}
