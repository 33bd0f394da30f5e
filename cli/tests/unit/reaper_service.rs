//! Unit tests for the process reaper.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use meshbench_cli::application::services::reaper::{ReapOptions, ReapOutcome, free_port};
use meshbench_cli::domain::TunnelError;

use crate::helpers::pids;
use crate::mocks::{FakeClock, RecordingReporter, RecordingSignaller, ScriptedProbe};

const PORT: u16 = 9090;

fn opts() -> ReapOptions {
    ReapOptions::with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn test_free_port_on_unused_port_is_noop_without_waiting() {
    let probe = ScriptedProbe::new();
    let signaller = RecordingSignaller::new();
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let outcome = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap();

    assert_eq!(outcome, ReapOutcome::Noop);
    assert!(signaller.killed().is_empty());
    assert!(clock.sleeps().is_empty());
    assert_eq!(probe.calls(), vec![PORT]);
}

#[tokio::test]
async fn test_free_port_kills_every_owner_and_confirms_release() {
    let probe = ScriptedProbe::new().script(PORT, vec![Ok(pids(&[4242, 4243])), Ok(pids(&[]))]);
    let signaller = RecordingSignaller::new();
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let outcome = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReapOutcome::Freed {
            pids: vec![4242, 4243]
        }
    );
    assert_eq!(signaller.killed(), vec![4242, 4243]);
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_free_port_polls_until_the_kernel_releases_the_socket() {
    let probe = ScriptedProbe::new().script(
        PORT,
        vec![
            Ok(pids(&[7])),
            Ok(pids(&[7])),
            Ok(pids(&[7])),
            Ok(pids(&[7])),
            Ok(pids(&[])),
        ],
    );
    let signaller = RecordingSignaller::new();
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let outcome = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap();

    assert_eq!(outcome, ReapOutcome::Freed { pids: vec![7] });
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
    assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(1)));
    assert_eq!(signaller.killed(), vec![7], "owners are signalled once");
}

#[tokio::test]
async fn test_free_port_gives_up_only_after_the_timeout() {
    let probe = ScriptedProbe::new().script(PORT, vec![Ok(pids(&[31337]))]);
    let signaller = RecordingSignaller::new();
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let err = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TunnelError::PortStillOccupied {
            port: PORT,
            timeout: Duration::from_secs(10)
        }
    );
    assert!(clock.elapsed() >= Duration::from_secs(10));
}

#[tokio::test]
async fn test_free_port_never_signals_its_own_process() {
    let own = std::process::id();
    let probe = ScriptedProbe::new().script(PORT, vec![Ok(pids(&[own, 4242])), Ok(pids(&[]))]);
    let signaller = RecordingSignaller::new();
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let outcome = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap();

    assert_eq!(outcome, ReapOutcome::Freed { pids: vec![4242] });
    assert_eq!(signaller.killed(), vec![4242]);
}

#[tokio::test]
async fn test_free_port_warns_when_a_kill_is_refused() {
    let probe = ScriptedProbe::new().script(PORT, vec![Ok(pids(&[1])), Ok(pids(&[]))]);
    let signaller = RecordingSignaller::refusing(1);
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let outcome = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap();

    assert_eq!(outcome, ReapOutcome::Freed { pids: vec![1] });
    assert!(
        reporter
            .warnings()
            .iter()
            .any(|w| w.contains("could not kill process 1"))
    );
}

#[tokio::test]
async fn test_free_port_propagates_probe_unavailable() {
    let probe = ScriptedProbe::unavailable();
    let signaller = RecordingSignaller::new();
    let clock = FakeClock::new();
    let reporter = RecordingReporter::new();

    let err = free_port(&probe, &signaller, &clock, &reporter, PORT, opts())
        .await
        .unwrap_err();

    assert!(matches!(err, TunnelError::ProbeUnavailable { .. }));
    assert!(signaller.killed().is_empty());
}
