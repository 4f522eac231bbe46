//! Background verification jobs.
//!
//! A job is fire-and-forget: the verify route spawns it and never awaits
//! it, so every failure here degrades to published log lines on the
//! session's SSE channel instead of propagating. Closing the SSE connection
//! does not cancel a running prover; its later publishes become no-ops.

use std::{path::PathBuf, process::Stdio, time::Duration};

use blade_verifier_core::{
    classify, is_misrouted_stderr, ProgressEvent, Severity, VerificationRequest,
    DEFAULT_PROGRESS_FLOOR,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
    process::{Child, Command},
};

use crate::config::{AppState, Settings};

/// How a located prover will be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProverLaunch {
    /// A compiled binary found in a candidate directory or on PATH.
    Binary(PathBuf),
    /// Build-and-run from the prover crate directory.
    CargoRun(PathBuf),
}

/// Search the configured candidate directories, then every PATH entry, for
/// the prover binary; fall back to `cargo run` when a manifest directory is
/// configured. `None` means simulation.
pub(crate) fn locate_prover(settings: &Settings) -> Option<ProverLaunch> {
    for dir in &settings.prover_dirs {
        let candidate = dir.join(&settings.prover_bin);
        if candidate.is_file() {
            return Some(ProverLaunch::Binary(candidate));
        }
    }

    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join(&settings.prover_bin);
            if candidate.is_file() {
                return Some(ProverLaunch::Binary(candidate));
            }
        }
    }

    match &settings.prover_manifest_dir {
        Some(dir) if dir.is_dir() => Some(ProverLaunch::CargoRun(dir.clone())),
        _ => None,
    }
}

pub(crate) struct SimStep {
    pub(crate) log: &'static str,
    pub(crate) progress: u8,
    pub(crate) delay_ms: u64,
    pub(crate) completes: bool,
}

/// Canned progress sequence replayed when no prover is available. Each step
/// is published before its delay starts; `{player}` and `{score}` are
/// interpolated from the request.
pub(crate) const SIMULATION_STEPS: [SimStep; 11] = [
    SimStep { log: "Initializing SP1 ZK prover...", progress: 10, delay_ms: 800, completes: false },
    SimStep { log: "Preparing RISC-V program...", progress: 20, delay_ms: 1000, completes: false },
    SimStep { log: "Starting program execution in the ZK circuit...", progress: 30, delay_ms: 1200, completes: false },
    SimStep { log: "Checking game input data...", progress: 40, delay_ms: 800, completes: false },
    SimStep { log: "Processing score {score} for player {player}...", progress: 50, delay_ms: 1200, completes: false },
    SimStep { log: "Applying ZK circuit constraints...", progress: 60, delay_ms: 1500, completes: false },
    SimStep { log: "Generating proof witnesses...", progress: 70, delay_ms: 1500, completes: false },
    SimStep { log: "Constructing ZK proof...", progress: 80, delay_ms: 2000, completes: false },
    SimStep { log: "Verifying proof validity...", progress: 90, delay_ms: 1000, completes: false },
    SimStep { log: "Finalizing proof...", progress: 95, delay_ms: 800, completes: false },
    SimStep { log: "Proof generation completed successfully!", progress: 100, delay_ms: 500, completes: true },
];

/// Entry point for one verification job.
pub(crate) async fn run_verification(
    state: AppState,
    request: VerificationRequest,
    session: String,
    proof_file: String,
) {
    state
        .registry
        .publish(&session, ProgressEvent::log("Starting verification process...", 5));

    let launch = if state.settings.simulation_mode {
        None
    } else {
        locate_prover(&state.settings)
    };

    match launch {
        None => {
            tracing::info!(
                session = %session,
                forced = state.settings.simulation_mode,
                "no prover available; replaying simulated progress sequence"
            );
            run_simulation(&state, &request, &session).await;
        }
        Some(launch) => {
            state.registry.publish(
                &session,
                ProgressEvent::log(
                    "Starting SP1 zero-knowledge prover...",
                    DEFAULT_PROGRESS_FLOOR,
                ),
            );
            run_prover(&state, launch, &request, &session, &proof_file).await;
        }
    }
}

async fn run_simulation(state: &AppState, request: &VerificationRequest, session: &str) {
    for step in &SIMULATION_STEPS {
        let log = step
            .log
            .replace("{player}", &request.player_name)
            .replace("{score}", &request.score.to_string());
        let event = if step.completes {
            ProgressEvent::completed(log, true)
        } else {
            ProgressEvent::log(log, step.progress)
        };
        state.registry.publish(session, event);
        tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
    }
}

fn prover_command(launch: &ProverLaunch, request: &VerificationRequest) -> Command {
    let mut command = match launch {
        ProverLaunch::Binary(path) => {
            let mut command = Command::new(path);
            if let Some(dir) = path.parent() {
                command.current_dir(dir);
            }
            command
        }
        ProverLaunch::CargoRun(dir) => {
            let mut command = Command::new("cargo");
            command.args(["run", "--bin", "prove", "--"]).current_dir(dir);
            command
        }
    };
    command
        .arg("--prove")
        .args(["--timestamp", &request.timestamp.to_string()])
        .args(["--player", &request.player_name])
        .args(["--score", &request.score.to_string()])
        .args(["--game-hash", &request.game_hash])
        .env("RUST_BACKTRACE", "1")
        .env("RUST_LOG", "info")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

async fn run_prover(
    state: &AppState,
    launch: ProverLaunch,
    request: &VerificationRequest,
    session: &str,
    proof_file: &str,
) {
    let mut command = prover_command(&launch, request);
    tracing::info!(session = %session, "spawning prover: {launch:?}");

    let child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(session = %session, "failed to spawn prover: {err}");
            state.registry.publish(
                session,
                ProgressEvent::log(
                    format!("Error: failed to start prover: {err}"),
                    DEFAULT_PROGRESS_FLOOR,
                ),
            );
            state.registry.publish(
                session,
                ProgressEvent::completed("Verification aborted: prover could not be started", false),
            );
            return;
        }
    };

    stream_prover_output(state, child, session, proof_file).await;
}

async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>, session: &str) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            tracing::warn!(session = %session, "prover output read error: {err}");
            None
        }
    }
}

/// Pump the child's stdout and stderr through the classifier, publishing one
/// event per line plus milestone label events, then report the exit status.
pub(crate) async fn stream_prover_output(
    state: &AppState,
    mut child: Child,
    session: &str,
    proof_file: &str,
) {
    let mut floor = DEFAULT_PROGRESS_FLOOR;
    let mut sentinel_seen = false;

    if let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                line = next_line(&mut stdout_lines, session), if stdout_open => match line {
                    Some(raw) => publish_stdout_line(
                        state, session, proof_file, &raw, &mut floor, &mut sentinel_seen,
                    ),
                    None => stdout_open = false,
                },
                line = next_line(&mut stderr_lines, session), if stderr_open => match line {
                    Some(raw) => publish_stderr_line(state, session, &raw, floor),
                    None => stderr_open = false,
                },
            }
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(err) => {
            tracing::error!(session = %session, "failed to reap prover: {err}");
            state.registry.publish(
                session,
                ProgressEvent::completed(format!("Verification aborted: {err}"), false),
            );
            return;
        }
    };

    tracing::info!(session = %session, "prover exited with {status}");
    if !status.success() {
        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        state.registry.publish(
            session,
            ProgressEvent::completed(format!("Verification failed with exit code {code}"), false),
        );
    } else if !sentinel_seen {
        // Clean exit without the sentinel: reported as success with a
        // caveat rather than a failure, since the prover's output is noisy
        // enough that the sentinel can be missed.
        state.registry.publish(
            session,
            ProgressEvent::completed(
                "Verification finished without explicit success confirmation",
                true,
            ),
        );
    }
}

fn publish_stdout_line(
    state: &AppState,
    session: &str,
    proof_file: &str,
    raw: &str,
    floor: &mut u8,
    sentinel_seen: &mut bool,
) {
    let classified = classify(raw);
    if classified.line.is_empty() {
        return;
    }

    match classified.severity {
        Severity::Error => tracing::error!(session = %session, "prover: {}", classified.line),
        Severity::Info => tracing::info!(session = %session, "prover: {}", classified.line),
    }

    state
        .registry
        .publish(session, ProgressEvent::log(classified.line.clone(), *floor));

    if let Some(saved) = classified.saved_path {
        state.registry.publish(
            session,
            ProgressEvent::log(format!("Proof saved to: {saved}"), *floor),
        );
    }

    if let Some(milestone) = classified.milestone {
        *floor = (*floor).max(milestone.progress);
        if milestone.completes {
            *sentinel_seen = true;
            state.registry.publish(
                session,
                ProgressEvent::completed(milestone.label, true).with_proof_file(proof_file),
            );
        } else {
            state
                .registry
                .publish(session, ProgressEvent::log(milestone.label, *floor));
        }
    }
}

fn publish_stderr_line(state: &AppState, session: &str, raw: &str, floor: u8) {
    let classified = classify(raw);
    if classified.line.is_empty() {
        return;
    }

    if is_misrouted_stderr(&classified.line) {
        // Normal report output the prover's logger routed to stderr.
        tracing::info!(session = %session, "prover: {}", classified.line);
        state
            .registry
            .publish(session, ProgressEvent::log(classified.line, floor));
    } else {
        tracing::error!(session = %session, "prover: {}", classified.line);
        state.registry.publish(
            session,
            ProgressEvent::log(format!("Error: {}", classified.line), floor),
        );
    }
}
