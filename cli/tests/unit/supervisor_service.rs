//! Unit tests for the tunnel supervisor.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use meshbench_cli::application::services::supervisor::{
    TeardownEntry, TeardownResult, TunnelSupervisor,
};
use meshbench_cli::domain::{
    FailReason, ForwardFailure, SkipReason, TunnelError, TunnelOutcome, TunnelReport,
};

use crate::helpers::{cluster_spec, err_output, pids, relay_spec, supervisor_config};
use crate::mocks::{
    ChildScript, FakeClock, RecordingReporter, RecordingRunner, RecordingSignaller, ScriptedProbe,
};

struct Fakes {
    runner: RecordingRunner,
    probe: ScriptedProbe,
    signaller: RecordingSignaller,
    clock: FakeClock,
    reporter: RecordingReporter,
}

impl Fakes {
    fn new(runner: RecordingRunner, probe: ScriptedProbe) -> Self {
        Self {
            runner,
            probe,
            signaller: RecordingSignaller::new(),
            clock: FakeClock::new(),
            reporter: RecordingReporter::new(),
        }
    }

    fn supervisor(
        &self,
    ) -> TunnelSupervisor<
        '_,
        RecordingRunner,
        ScriptedProbe,
        RecordingSignaller,
        FakeClock,
        RecordingReporter,
    > {
        TunnelSupervisor::new(
            &self.runner,
            &self.probe,
            &self.signaller,
            &self.clock,
            &self.reporter,
            supervisor_config(),
        )
    }
}

fn outcomes(report: &TunnelReport) -> Vec<(u16, TunnelOutcome)> {
    report
        .tunnels
        .iter()
        .map(|e| (e.local_port, e.outcome.clone()))
        .collect()
}

// ── establish ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_establish_free_ports_in_order() {
    let fakes = Fakes::new(RecordingRunner::new(), ScriptedProbe::new());
    let specs = [relay_spec(8080), relay_spec(8081), relay_spec(8082)];

    let report = fakes.supervisor().establish(&specs).await.unwrap();

    assert_eq!(
        outcomes(&report),
        vec![
            (8080, TunnelOutcome::Established),
            (8081, TunnelOutcome::Established),
            (8082, TunnelOutcome::Established),
        ]
    );
    assert_eq!(report.exit_code(), 0);
    assert_eq!(fakes.runner.relay_ports(), vec![8080, 8081, 8082]);
    assert!(fakes.signaller.killed().is_empty());
    assert!(fakes.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_establish_reaps_every_port_before_binding_any() {
    let fakes = Fakes::new(RecordingRunner::new(), ScriptedProbe::new());
    let specs = [relay_spec(8080), relay_spec(8081), relay_spec(8082)];

    fakes.supervisor().establish(&specs).await.unwrap();

    assert_eq!(
        fakes.probe.calls(),
        vec![8080, 8081, 8082, 8080, 8081, 8082],
        "phase 1 probes all ports, then phase 2 re-probes each before launch"
    );
}

#[tokio::test]
async fn test_relay_command_shape() {
    let fakes = Fakes::new(RecordingRunner::new(), ScriptedProbe::new());

    fakes
        .supervisor()
        .establish(&[relay_spec(9090)])
        .await
        .unwrap();

    assert_eq!(
        fakes.runner.detached(),
        vec![vec![
            "ssh",
            "-p",
            "22",
            "-f",
            "-N",
            "-o",
            "ExitOnForwardFailure=yes",
            "-L",
            "9090:localhost:9090",
            "bench@relay.example.net"
        ]]
    );
}

#[tokio::test]
async fn test_unreclaimable_port_skips_only_that_tunnel() {
    let probe = ScriptedProbe::new().script(8081, vec![Ok(pids(&[999]))]);
    let fakes = Fakes::new(RecordingRunner::new(), probe);
    let specs = [relay_spec(8080), relay_spec(8081), relay_spec(8082)];

    let report = fakes.supervisor().establish(&specs).await.unwrap();

    assert_eq!(
        outcomes(&report),
        vec![
            (8080, TunnelOutcome::Established),
            (
                8081,
                TunnelOutcome::Skipped {
                    reason: SkipReason::PortBusy
                }
            ),
            (8082, TunnelOutcome::Established),
        ]
    );
    assert_eq!(fakes.runner.relay_ports(), vec![8080, 8082]);
    assert_eq!(report.exit_code(), 1);
    assert!(
        fakes
            .reporter
            .warnings()
            .iter()
            .any(|w| w.contains("port 8081 still occupied after 10s"))
    );
}

#[tokio::test]
async fn test_relay_failure_is_recorded_and_batch_continues() {
    let runner = RecordingRunner::new().relay_output(
        8081,
        err_output(
            255,
            b"bind [127.0.0.1]:8081: Address already in use\r\nError: Could not request local forwarding.\n",
        ),
    );
    let fakes = Fakes::new(runner, ScriptedProbe::new());
    let specs = [relay_spec(8080), relay_spec(8081), relay_spec(8082)];

    let report = fakes.supervisor().establish(&specs).await.unwrap();

    match report.get(8081) {
        Some(TunnelOutcome::Failed {
            reason: FailReason::RelayError { message },
        }) => assert!(message.contains("Address already in use"), "got: {message}"),
        other => panic!("expected relay error, got {other:?}"),
    }
    assert_eq!(report.get(8080), Some(&TunnelOutcome::Established));
    assert_eq!(report.get(8082), Some(&TunnelOutcome::Established));
}

#[tokio::test]
async fn test_relay_failure_without_stderr_names_the_exit_code() {
    let runner = RecordingRunner::new().relay_output(8080, err_output(255, b""));
    let fakes = Fakes::new(runner, ScriptedProbe::new());

    let report = fakes
        .supervisor()
        .establish(&[relay_spec(8080)])
        .await
        .unwrap();

    assert_eq!(
        report.get(8080),
        Some(&TunnelOutcome::Failed {
            reason: FailReason::RelayError {
                message: "ssh exited with code 255".to_string()
            }
        })
    );
}

#[tokio::test]
async fn test_relay_launch_timeout_is_a_relay_error() {
    let runner = RecordingRunner::new().relay_error(8080, "ssh timed out after 30s");
    let fakes = Fakes::new(runner, ScriptedProbe::new());

    let report = fakes
        .supervisor()
        .establish(&[relay_spec(8080)])
        .await
        .unwrap();

    assert!(matches!(
        report.get(8080),
        Some(TunnelOutcome::Failed {
            reason: FailReason::RelayError { message }
        }) if message.contains("timed out")
    ));
}

#[tokio::test]
async fn test_cluster_forward_is_established_after_relay() {
    let probe = ScriptedProbe::new().script(
        16686,
        vec![
            Ok(pids(&[])),
            Ok(pids(&[])),
            Ok(pids(&[])),
            Ok(pids(&[66686])),
        ],
    );
    let fakes = Fakes::new(RecordingRunner::new(), probe);

    let report = fakes
        .supervisor()
        .establish(&[cluster_spec(16686, "jaeger-query")])
        .await
        .unwrap();

    assert_eq!(report.get(16686), Some(&TunnelOutcome::Established));
    assert_eq!(fakes.runner.relay_ports(), vec![16686]);
    assert_eq!(fakes.runner.background().len(), 1);
    assert_eq!(fakes.clock.sleeps(), vec![Duration::from_secs(2)]);
    assert!(
        fakes
            .reporter
            .successes()
            .contains(&"cluster forward active on port 16686 (pid 66686)".to_string()),
        "got: {:?}",
        fakes.reporter.successes()
    );
}

#[tokio::test]
async fn test_port_taken_before_cluster_hop_is_skipped() {
    let probe = ScriptedProbe::new().script(
        16686,
        vec![Ok(pids(&[])), Ok(pids(&[])), Ok(pids(&[4321]))],
    );
    let fakes = Fakes::new(RecordingRunner::new(), probe);

    let report = fakes
        .supervisor()
        .establish(&[cluster_spec(16686, "jaeger-query")])
        .await
        .unwrap();

    assert_eq!(
        report.get(16686),
        Some(&TunnelOutcome::Skipped {
            reason: SkipReason::BusyForClusterForward
        })
    );
    assert!(fakes.runner.background().is_empty());
}

#[tokio::test]
async fn test_cluster_forward_exit_is_recorded_with_cause() {
    let runner = RecordingRunner::new().child(
        9091,
        ChildScript::Exits {
            after: 0,
            code: 1,
            stderr: "error: unable to forward port".to_string(),
        },
    );
    let fakes = Fakes::new(runner, ScriptedProbe::new());
    let specs = [cluster_spec(9091, "prometheus"), relay_spec(8080)];

    let report = fakes.supervisor().establish(&specs).await.unwrap();

    assert_eq!(
        report.get(9091),
        Some(&TunnelOutcome::Failed {
            reason: FailReason::ClusterForwardError {
                cause: ForwardFailure::ProcessExitedEarly {
                    code: Some(1),
                    stderr: "error: unable to forward port".to_string(),
                }
            }
        })
    );
    assert_eq!(report.get(8080), Some(&TunnelOutcome::Established));
}

#[tokio::test]
async fn test_unverified_cluster_forward_fails_without_kill() {
    let fakes = Fakes::new(RecordingRunner::new(), ScriptedProbe::new());

    let report = fakes
        .supervisor()
        .establish(&[cluster_spec(9091, "prometheus")])
        .await
        .unwrap();

    assert_eq!(
        report.get(9091),
        Some(&TunnelOutcome::Failed {
            reason: FailReason::ClusterForwardError {
                cause: ForwardFailure::ForwardNotVerified { timeout_secs: 10 }
            }
        })
    );
    assert!(fakes.signaller.killed().is_empty());
}

#[tokio::test]
async fn test_probe_unavailable_aborts_the_batch() {
    let fakes = Fakes::new(RecordingRunner::new(), ScriptedProbe::unavailable());

    let err = fakes
        .supervisor()
        .establish(&[relay_spec(8080), relay_spec(8081)])
        .await
        .unwrap_err();

    assert!(matches!(err, TunnelError::ProbeUnavailable { .. }));
    assert!(fakes.runner.detached().is_empty());
}

#[tokio::test]
async fn test_rerun_reaps_the_previous_session_and_reestablishes() {
    let specs = [relay_spec(8080), relay_spec(8081)];
    let first = Fakes::new(RecordingRunner::new(), ScriptedProbe::new());
    let first_report = first.supervisor().establish(&specs).await.unwrap();

    // The first run's ssh sessions now hold both ports.
    let probe = ScriptedProbe::new()
        .script(8080, vec![Ok(pids(&[4242])), Ok(pids(&[]))])
        .script(8081, vec![Ok(pids(&[4243])), Ok(pids(&[]))]);
    let second = Fakes::new(RecordingRunner::new(), probe);
    let second_report = second.supervisor().establish(&specs).await.unwrap();

    assert_eq!(first_report, second_report);
    assert_eq!(second.signaller.killed(), vec![4242, 4243]);
    assert_eq!(second.runner.relay_ports(), vec![8080, 8081]);
}

#[tokio::test]
async fn test_empty_batch_is_trivially_successful() {
    let fakes = Fakes::new(RecordingRunner::new(), ScriptedProbe::new());

    let report = fakes.supervisor().establish(&[]).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.exit_code(), 0);
}

// ── teardown ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_teardown_reports_each_port() {
    let probe = ScriptedProbe::new()
        .script(8080, vec![Ok(pids(&[11])), Ok(pids(&[]))])
        .script(8082, vec![Ok(pids(&[12]))]);
    let fakes = Fakes::new(RecordingRunner::new(), probe);
    let specs = [relay_spec(8080), relay_spec(8081), relay_spec(8082)];

    let entries = fakes.supervisor().teardown(&specs).await.unwrap();

    assert_eq!(
        entries[..2],
        [
            TeardownEntry {
                local_port: 8080,
                result: TeardownResult::Freed { pids: vec![11] },
            },
            TeardownEntry {
                local_port: 8081,
                result: TeardownResult::NotInUse,
            },
        ]
    );
    assert!(matches!(
        entries[2].result,
        TeardownResult::StillOccupied { .. }
    ));
    assert!(fakes.runner.detached().is_empty());
    assert!(fakes.runner.background().is_empty());
}
