use std::{env, path::PathBuf, sync::Arc};

use crate::registry::SessionRegistry;

pub(crate) const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub(crate) const DEFAULT_PROOFS_DIR: &str = "proofs";
pub(crate) const DEFAULT_PROVER_BIN: &str = "prove";
pub(crate) const DEFAULT_JSON_LIMIT_BYTES: usize = 1024 * 1024;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) bind_addr: String,
    /// Where placeholder and finished proof artifacts live.
    pub(crate) proofs_dir: PathBuf,
    /// Candidate directories searched for the prover binary, in order,
    /// before falling back to the system PATH.
    pub(crate) prover_dirs: Vec<PathBuf>,
    pub(crate) prover_bin: String,
    /// Crate directory for the `cargo run --bin prove --` fallback.
    pub(crate) prover_manifest_dir: Option<PathBuf>,
    /// Forces the canned progress sequence; also entered automatically
    /// when no prover can be located.
    pub(crate) simulation_mode: bool,
    pub(crate) json_limit_bytes: usize,
}

impl Settings {
    pub(crate) fn from_env() -> Self {
        let prover_dirs = match env::var_os("PROVER_DIRS") {
            Some(value) => env::split_paths(&value).collect(),
            None => default_prover_dirs(),
        };

        Self {
            bind_addr: env::var("API_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            proofs_dir: env::var("PROOFS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROOFS_DIR)),
            prover_dirs,
            prover_bin: env::var("PROVER_BIN").unwrap_or_else(|_| DEFAULT_PROVER_BIN.to_string()),
            prover_manifest_dir: env::var("PROVER_MANIFEST_DIR").ok().map(PathBuf::from),
            simulation_mode: read_env_bool("SIMULATION_MODE", false),
            json_limit_bytes: read_env_usize("JSON_LIMIT_BYTES", DEFAULT_JSON_LIMIT_BYTES),
        }
    }
}

fn default_prover_dirs() -> Vec<PathBuf> {
    ["target/release", "script/target/release", "script", "bin"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) settings: Arc<Settings>,
}

pub(crate) fn read_env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
