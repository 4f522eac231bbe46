use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use actix_web::{http::StatusCode, web::Data, web::Json, HttpResponse, Responder};
use blade_verifier_core::{proof_file_name, session_id, VerificationRequest};
use serde::{Deserialize, Serialize};

use crate::{config::AppState, response::json_error, runner};

pub(crate) fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// Verify request body with every field optional, so validation can answer
/// with a descriptive 400 instead of a deserialization error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyRequestBody {
    #[serde(default)]
    player_name: Option<String>,
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    timestamp: Option<u64>,
    #[serde(default)]
    game_hash: Option<String>,
}

impl VerifyRequestBody {
    /// All four fields are required; blank strings count as missing.
    fn into_request(self) -> Result<VerificationRequest, &'static str> {
        let player_name = self
            .player_name
            .filter(|name| !name.trim().is_empty())
            .ok_or("Missing required field: playerName")?;
        let score = self.score.ok_or("Missing required field: score")?;
        let timestamp = self.timestamp.ok_or("Missing required field: timestamp")?;
        let game_hash = self
            .game_hash
            .filter(|hash| !hash.trim().is_empty())
            .ok_or("Missing required field: gameHash")?;
        Ok(VerificationRequest {
            player_name,
            score,
            timestamp,
            game_hash,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyAccepted {
    success: bool,
    message: &'static str,
    verification_id: String,
    proof_file: String,
}

/// Accepts a score submission, answers immediately, and hands the actual
/// work to a background job. The response is sent before any proving
/// starts; everything after it can only report through the SSE channel.
pub(crate) async fn verify_score(
    state: Data<AppState>,
    body: Json<VerifyRequestBody>,
) -> impl Responder {
    let request = match body.into_inner().into_request() {
        Ok(request) => request,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, message),
    };

    tracing::info!(
        player = %request.player_name,
        score = request.score,
        "score verification requested"
    );

    let verification_id = session_id(&request.player_name, request.timestamp);
    let proof_file = proof_file_name(&request.player_name, request.score, now_unix_ms());

    let state_for_job = state.get_ref().clone();
    let job_session = verification_id.clone();
    let job_proof_file = proof_file.clone();
    tokio::spawn(async move {
        create_placeholder_proof(&state_for_job, &job_proof_file).await;
        runner::run_verification(state_for_job, request, job_session, job_proof_file).await;
    });

    HttpResponse::Ok().json(VerifyAccepted {
        success: true,
        message: "Verification process started",
        verification_id,
        proof_file,
    })
}

/// Best-effort: the placeholder marks the artifact's name on disk before the
/// prover runs; failing to create it only costs the marker.
async fn create_placeholder_proof(state: &AppState, proof_file: &str) {
    let path = state.settings.proofs_dir.join(proof_file);
    match tokio::fs::write(&path, Vec::new()).await {
        Ok(()) => tracing::info!("created placeholder proof file {}", path.display()),
        Err(err) => {
            tracing::warn!("failed to create placeholder proof {}: {err}", path.display())
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ProofFileEntry {
    pub(crate) name: String,
    pub(crate) created: u64,
    pub(crate) size: u64,
}

pub(crate) async fn list_proofs(state: Data<AppState>) -> impl Responder {
    match read_proofs_dir(&state.settings.proofs_dir) {
        Ok(proofs) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "proofs": proofs,
        })),
        Err(err) => {
            tracing::error!("failed to list proofs: {err}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error listing proofs: {err}"),
            )
        }
    }
}

/// `.bin` files in the proofs directory, newest first.
pub(crate) fn read_proofs_dir(dir: &Path) -> std::io::Result<Vec<ProofFileEntry>> {
    let mut proofs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".bin") {
            continue;
        }
        let metadata = entry.metadata()?;
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or(0);
        proofs.push(ProofFileEntry {
            name,
            created,
            size: metadata.len(),
        });
    }
    proofs.sort_by(|a, b| b.created.cmp(&a.created));
    Ok(proofs)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    simulation_mode: bool,
    active_sessions: usize,
    proofs_dir: String,
}

pub(crate) async fn health(state: Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: "blade-warrior-verification-api",
        simulation_mode: state.settings.simulation_mode,
        active_sessions: state.registry.active_sessions(),
        proofs_dir: state.settings.proofs_dir.display().to_string(),
    })
}
