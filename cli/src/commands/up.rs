//! `meshbench up`: establish every configured tunnel.

use anyhow::{Context, Result};

use crate::app::AppContext;
use crate::application::services::supervisor::{SupervisorConfig, TunnelSupervisor};
use crate::output::Renderer;

/// Run the two-phase establishment and render the report.
///
/// Returns the process exit code: 0 when every tunnel is established.
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

    let report = supervisor
        .establish(&config.tunnels)
        .await
        .context("tunnel setup aborted")?;

    match app.renderer() {
        Renderer::Human(r) => r.render_report(&report),
        Renderer::Json(r) => r.render(&report)?,
    }
    Ok(report.exit_code())
}
