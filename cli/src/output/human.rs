//! Human-readable terminal renderer.

use std::path::{Path, PathBuf};

use owo_colors::OwoColorize as _;

use crate::application::services::port_status::PortStatus;
use crate::application::services::supervisor::{TeardownEntry, TeardownResult};
use crate::domain::{
    Collection, DependencyEdge, EndpointCheck, LoadRecord, PortState, TunnelOutcome,
    TunnelReport,
};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the outcome of every tunnel followed by a one-line summary.
    pub fn render_report(&self, report: &TunnelReport) {
        if report.is_empty() {
            self.ctx.info("No tunnels configured.");
            return;
        }
        if !self.ctx.quiet {
            println!();
            self.ctx.header("Tunnels:");
        }
        for entry in &report.tunnels {
            let line = format!("{:<6} {}", entry.local_port, entry.outcome.label());
            match entry.outcome {
                TunnelOutcome::Established => self.ctx.success(&line),
                TunnelOutcome::Skipped { .. } => self.ctx.warn(&line),
                TunnelOutcome::Failed { .. } => self.ctx.error(&line),
            }
        }
        let up = report
            .tunnels
            .iter()
            .filter(|e| e.outcome.is_established())
            .count();
        if !self.ctx.quiet {
            println!();
        }
        self.ctx
            .kv("Established:", &format!("{up} of {}", report.len()));
    }

    /// Render one row per configured port.
    pub fn render_port_status(&self, rows: &[PortStatus]) {
        if rows.is_empty() {
            self.ctx.info("No tunnels configured.");
            return;
        }
        for row in rows {
            let target = row
                .cluster_target
                .as_deref()
                .map_or_else(|| row.remote.clone(), |t| format!("{} ({t})", row.remote));
            match &row.state {
                PortState::Free => {
                    println!(
                        "  {:<6} {:<40} {}",
                        row.local_port,
                        target,
                        "free".style(self.ctx.styles.dim)
                    );
                }
                PortState::Occupied { pids } => {
                    let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
                    println!(
                        "  {:<6} {:<40} {} (pid {})",
                        row.local_port,
                        target,
                        "occupied".style(self.ctx.styles.success),
                        pids.join(", ")
                    );
                }
            }
        }
    }

    /// Render the result of reaping every configured port.
    pub fn render_teardown(&self, entries: &[TeardownEntry]) {
        for entry in entries {
            let port = entry.local_port;
            match &entry.result {
                TeardownResult::NotInUse => self.ctx.info(&format!("{port:<6} not in use")),
                TeardownResult::Freed { pids } => {
                    let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
                    self.ctx
                        .success(&format!("{port:<6} freed (killed {})", pids.join(", ")));
                }
                TeardownResult::StillOccupied { message } => {
                    self.ctx.error(&format!("{port:<6} {message}"));
                }
            }
        }
    }

    /// Render dependency edges as `parent -> child` lines.
    pub fn render_dependencies(&self, edges: &[DependencyEdge], lookback: &str) {
        if edges.is_empty() {
            self.ctx
                .warn(&format!("No service dependencies found in the last {lookback}."));
            return;
        }
        if !self.ctx.quiet {
            println!();
            self.ctx
                .header(&format!("Service dependencies (last {lookback}):"));
        }
        let width = edges.iter().map(|e| e.parent.len()).max().unwrap_or(0);
        for edge in edges {
            let calls = if edge.call_count == 1 { "call" } else { "calls" };
            println!(
                "  {:<width$} {} {}  {}",
                edge.parent,
                "→".style(self.ctx.styles.dim),
                edge.child,
                format!("{} {calls}", edge.call_count).style(self.ctx.styles.dim),
            );
        }
    }

    /// Render telemetry endpoint checks.
    pub fn render_check(&self, checks: &[EndpointCheck]) {
        if !self.ctx.quiet {
            println!();
            self.ctx.header("Telemetry endpoints:");
        }
        for check in checks {
            let target = check.url.as_deref().unwrap_or("(not configured)");
            let line = format!("{}: {target}", check.service);
            if check.ok {
                self.ctx.success(&line);
            } else {
                self.ctx.error(&line);
            }
            self.ctx.kv("   ", &check.detail);
        }
    }

    /// Render a finished load run: its output, duration and where it was saved.
    pub fn render_load(&self, record: &LoadRecord, saved_to: &Path) {
        if !self.ctx.quiet {
            println!();
            self.ctx.header("Load generator output:");
            for line in record.output.lines() {
                println!("  {line}");
            }
            println!();
        }
        self.ctx.kv(
            "Duration:",
            &format!("{:.1}s", record.duration().as_secs_f64()),
        );
        self.ctx.kv("Saved to:", &saved_to.display().to_string());
    }

    /// Render the per-query outcome of a collection run.
    pub fn render_collection(&self, collection: &Collection, written: &[PathBuf]) {
        if !self.ctx.quiet {
            println!();
            self.ctx.header("Metrics:");
        }
        for result in &collection.results {
            let n = result.series.len();
            if n == 0 {
                self.ctx.warn(&format!("{}: no data", result.name));
            } else {
                self.ctx.success(&format!("{}: {n} series", result.name));
            }
        }
        for failure in &collection.failures {
            self.ctx.error(&format!("{}: {}", failure.name, failure.detail));
        }
        if !self.ctx.quiet {
            println!();
        }
        self.ctx
            .kv("Services:", &collection.services.len().to_string());
        self.ctx.kv("Files written:", &written.len().to_string());
    }
}
