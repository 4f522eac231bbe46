use serde::{Deserialize, Serialize};

/// One server-to-client frame on the verification log stream.
///
/// Plain log lines serialize as `{log, progress}`; `completed`, `success`
/// and `proofFile` only appear on the wire once a job finishes. `success`
/// is meaningful only when `completed` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub log: String,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "is_false")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_file: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ProgressEvent {
    /// A plain progress line.
    pub fn log(log: impl Into<String>, progress: u8) -> Self {
        Self {
            log: log.into(),
            progress,
            completed: false,
            success: None,
            proof_file: None,
        }
    }

    /// The terminal event for a session; pins progress at 100.
    pub fn completed(log: impl Into<String>, success: bool) -> Self {
        Self {
            log: log.into(),
            progress: 100,
            completed: true,
            success: Some(success),
            proof_file: None,
        }
    }

    pub fn with_proof_file(mut self, proof_file: impl Into<String>) -> Self {
        self.proof_file = Some(proof_file.into());
        self
    }
}
