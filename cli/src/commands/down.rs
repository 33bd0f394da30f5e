//! `meshbench down`: free every configured local port.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::app::AppContext;
use crate::application::services::supervisor::{
    SupervisorConfig, TeardownEntry, TeardownResult, TunnelSupervisor,
};
use crate::output::Renderer;

#[derive(Serialize)]
struct TeardownOutput<'a> {
    ports: &'a [TeardownEntry],
}

/// Kill whatever holds each configured local port.
///
/// Returns 1 if any port is still occupied afterwards.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the socket
/// table cannot be probed.
pub async fn run(app: &AppContext) -> Result<i32> {
    let config = app.load_config()?;
    let probe = app.probe();
    let reporter = app.reporter();
    let supervisor = TunnelSupervisor::new(
        &app.runner,
        &probe,
        &app.signaller,
        &app.clock,
        &reporter,
        SupervisorConfig::from(&config),
    );

    let entries = supervisor
        .teardown(&config.tunnels)
        .await
        .context("teardown aborted")?;

    match app.renderer() {
        Renderer::Human(r) => r.render_teardown(&entries),
        Renderer::Json(r) => r.render(&TeardownOutput { ports: &entries })?,
    }
    let stuck = entries
        .iter()
        .any(|e| matches!(e.result, TeardownResult::StillOccupied { .. }));
    Ok(i32::from(stuck))
}
