//! Fake capabilities for service-level tests.
//!
//! Every fake records what it was asked to do so tests can assert on the
//! exact sequence of probes, launches, kills and sleeps.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::process::{ExitStatus, Output};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use meshbench_cli::application::ports::{
    BackgroundChild, Clock, CommandRunner, PortProbe, ProgressReporter, Signaller,
    TelemetryClient,
};
use meshbench_cli::domain::{TelemetryError, TunnelError};

use crate::helpers::{exit_status, ok_output};

/// Local port named by a relay (`-L l:h:r`) or cluster (`l:r`) argv.
fn local_port_of(args: &[&str]) -> Option<u16> {
    args.iter().find_map(|a| {
        let (head, rest) = a.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        head.parse().ok()
    })
}

// ── Clock ────────────────────────────────────────────────────────────────────

/// Clock that only moves when something sleeps on it.
pub struct FakeClock {
    base: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Total simulated time elapsed.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

// ── Port probe ───────────────────────────────────────────────────────────────

type ProbeAnswer = Result<BTreeSet<u32>, TunnelError>;

/// Probe answering from a per-port script.
///
/// Each probe of a port consumes the next scripted answer; the last answer
/// repeats forever. Unscripted ports are free.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<u16, VecDeque<ProbeAnswer>>>,
    calls: Mutex<Vec<u16>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, port: u16, answers: Vec<ProbeAnswer>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(port, answers.into_iter().collect());
        self
    }

    /// Probe that fails for every port.
    pub fn unavailable() -> Self {
        let probe = Self::new();
        probe.scripts.lock().unwrap().insert(
            0,
            VecDeque::from([Err(TunnelError::ProbeUnavailable {
                reason: "failed to spawn lsof".to_string(),
            })]),
        );
        probe
    }

    pub fn calls(&self) -> Vec<u16> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, port: u16) -> usize {
        self.calls().iter().filter(|&&p| p == port).count()
    }
}

impl PortProbe for ScriptedProbe {
    async fn owning_pids(&self, port: u16) -> Result<BTreeSet<u32>, TunnelError> {
        self.calls.lock().unwrap().push(port);
        let mut scripts = self.scripts.lock().unwrap();
        let key = if scripts.contains_key(&port) { port } else { 0 };
        let Some(queue) = scripts.get_mut(&key) else {
            return Ok(BTreeSet::new());
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Ok(BTreeSet::new()))
        } else {
            queue.front().cloned().unwrap_or_else(|| Ok(BTreeSet::new()))
        }
    }
}

// ── Signaller ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSignaller {
    killed: Mutex<Vec<u32>>,
    refuse: BTreeSet<u32>,
}

impl RecordingSignaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail to signal `pid` (e.g. owned by another user).
    pub fn refusing(pid: u32) -> Self {
        Self {
            killed: Mutex::new(Vec::new()),
            refuse: BTreeSet::from([pid]),
        }
    }

    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().clone()
    }
}

impl Signaller for RecordingSignaller {
    fn kill(&self, pid: u32) -> Result<()> {
        if self.refuse.contains(&pid) {
            anyhow::bail!("EPERM: Operation not permitted");
        }
        self.killed.lock().unwrap().push(pid);
        Ok(())
    }
}

// ── Command runner ───────────────────────────────────────────────────────────

/// Scripted behaviour of a spawned background process.
#[derive(Debug, Clone)]
pub enum ChildScript {
    /// Keeps running for the whole test.
    Runs,
    /// Exits with `code` once it has been polled `after` times.
    Exits {
        after: usize,
        code: i32,
        stderr: String,
    },
    /// `spawn` itself fails.
    SpawnFails(String),
}

pub struct FakeChild {
    pid: u32,
    script: ChildScript,
    polls: usize,
}

impl BackgroundChild for FakeChild {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_exit(&mut self) -> Result<Option<ExitStatus>> {
        self.polls += 1;
        match &self.script {
            ChildScript::Exits { after, code, .. } if self.polls > *after => {
                Ok(Some(exit_status(*code)))
            }
            _ => Ok(None),
        }
    }

    async fn stderr_text(&mut self) -> String {
        match &self.script {
            ChildScript::Exits { stderr, .. } => stderr.clone(),
            _ => String::new(),
        }
    }
}

/// Records every launch; relay and cluster behaviour is scripted per port.
#[derive(Default)]
pub struct RecordingRunner {
    relay: HashMap<u16, Result<Output, String>>,
    children: HashMap<u16, ChildScript>,
    captured: HashMap<String, Result<Output, String>>,
    runs: Mutex<Vec<(Vec<String>, Duration)>>,
    detached: Mutex<Vec<Vec<String>>>,
    background: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the relay launch for `port` return `output`.
    pub fn relay_output(mut self, port: u16, output: Output) -> Self {
        self.relay.insert(port, Ok(output));
        self
    }

    /// Make the relay launch for `port` fail to spawn or time out.
    pub fn relay_error(mut self, port: u16, message: &str) -> Self {
        self.relay.insert(port, Err(message.to_string()));
        self
    }

    /// Make captured runs of `program` return `output`.
    pub fn on_run(mut self, program: &str, output: Output) -> Self {
        self.captured.insert(program.to_string(), Ok(output));
        self
    }

    /// Make captured runs of `program` fail to spawn or time out.
    pub fn on_run_error(mut self, program: &str, message: &str) -> Self {
        self.captured
            .insert(program.to_string(), Err(message.to_string()));
        self
    }

    /// Captured runs with their timeouts, in order.
    pub fn runs(&self) -> Vec<(Vec<String>, Duration)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn child(mut self, port: u16, script: ChildScript) -> Self {
        self.children.insert(port, script);
        self
    }

    pub fn detached(&self) -> Vec<Vec<String>> {
        self.detached.lock().unwrap().clone()
    }

    pub fn background(&self) -> Vec<Vec<String>> {
        self.background.lock().unwrap().clone()
    }

    /// Local ports of relay launches, in order.
    pub fn relay_ports(&self) -> Vec<u16> {
        self.detached()
            .iter()
            .filter_map(|argv| {
                let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
                local_port_of(&refs)
            })
            .collect()
    }
}

fn record(log: &Mutex<Vec<Vec<String>>>, program: &str, args: &[&str]) {
    let mut argv = vec![program.to_string()];
    argv.extend(args.iter().map(|a| (*a).to_string()));
    log.lock().unwrap().push(argv);
}

impl CommandRunner for RecordingRunner {
    type Child = FakeChild;

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().map(|a| (*a).to_string()));
        self.runs.lock().unwrap().push((argv, timeout));
        match self.captured.get(program) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => anyhow::bail!("{message}"),
            None => anyhow::bail!("{program} not expected in this test"),
        }
    }

    async fn run_detached(&self, program: &str, args: &[&str], _: Duration) -> Result<Output> {
        record(&self.detached, program, args);
        match local_port_of(args).and_then(|p| self.relay.get(&p)) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => anyhow::bail!("{message}"),
            None => Ok(ok_output()),
        }
    }

    fn spawn_background(&self, program: &str, args: &[&str]) -> Result<FakeChild> {
        record(&self.background, program, args);
        let port = local_port_of(args).unwrap_or_default();
        let script = self
            .children
            .get(&port)
            .cloned()
            .unwrap_or(ChildScript::Runs);
        if let ChildScript::SpawnFails(message) = &script {
            anyhow::bail!("{message}");
        }
        Ok(FakeChild {
            pid: 50_000 + u32::from(port),
            script,
            polls: 0,
        })
    }
}

// ── Reporter ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub steps: Mutex<Vec<String>>,
    pub successes: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.steps.lock().unwrap().push(message.to_string());
    }

    fn success(&self, message: &str) {
        self.successes.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

// ── Telemetry ────────────────────────────────────────────────────────────────

/// HTTP fake answering by URL.
#[derive(Default)]
pub struct FakeTelemetry {
    answers: HashMap<String, Result<serde_json::Value, TelemetryError>>,
    by_query: HashMap<(String, String), Result<serde_json::Value, TelemetryError>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, url: &str, body: Result<serde_json::Value, TelemetryError>) -> Self {
        self.answers.insert(url.to_string(), body);
        self
    }

    /// Answer requests to `url` whose `query` parameter is `query`.
    pub fn answer_query(
        mut self,
        url: &str,
        query: &str,
        body: Result<serde_json::Value, TelemetryError>,
    ) -> Self {
        self.by_query
            .insert((url.to_string(), query.to_string()), body);
        self
    }

    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }
}

impl TelemetryClient for FakeTelemetry {
    async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, TelemetryError> {
        self.requests.lock().unwrap().push((
            url.to_string(),
            query
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        ));
        let by_query = query
            .iter()
            .find(|(k, _)| *k == "query")
            .and_then(|(_, q)| self.by_query.get(&(url.to_string(), q.clone())));
        by_query
            .or_else(|| self.answers.get(url))
            .cloned()
            .unwrap_or_else(|| {
                Err(TelemetryError::Unreachable {
                    service,
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
            })
    }
}
