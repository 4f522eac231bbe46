use serde::{Deserialize, Serialize};

/// Score submission posted by the game client at game-over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub player_name: String,
    pub score: u32,
    pub timestamp: u64,
    pub game_hash: String,
}

/// Join key correlating a verify request with its later SSE subscription.
///
/// Deliberately deterministic: the browser re-derives the same id from the
/// query parameters of the log-stream URL, so both routes must agree. Two
/// submissions sharing name and timestamp share a session; the registry
/// resolves that by letting the newest subscriber win.
pub fn session_id(player_name: &str, timestamp: u64) -> String {
    format!("{player_name}-{timestamp}")
}

/// Filename for the on-disk proof artifact. The player name is reduced to
/// `[A-Za-z0-9]` so it is safe as a path component.
pub fn proof_file_name(player_name: &str, score: u32, now_ms: u64) -> String {
    let sanitized: String = player_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{sanitized}_{score}_{now_ms}.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_deterministic() {
        assert_eq!(session_id("Ann", 1_700_000_000), "Ann-1700000000");
        assert_eq!(
            session_id("Ann", 1_700_000_000),
            session_id("Ann", 1_700_000_000)
        );
    }

    #[test]
    fn session_id_matches_across_body_and_query_derivation() {
        // The POST body and the SSE query string carry the same logical
        // fields; both routes go through this one function.
        let request = VerificationRequest {
            player_name: "Blade".to_string(),
            score: 999,
            timestamp: 1_700_000_123,
            game_hash: "ab".repeat(32),
        };
        assert_eq!(
            session_id(&request.player_name, request.timestamp),
            "Blade-1700000123"
        );
    }

    #[test]
    fn proof_file_name_sanitizes_player() {
        assert_eq!(
            proof_file_name("A nn/..x", 42, 1234),
            "A_nn___x_42_1234.bin"
        );
        assert_eq!(proof_file_name("Blade", 0, 7), "Blade_0_7.bin");
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let request: VerificationRequest = serde_json::from_str(
            r#"{"playerName":"Ann","score":42,"timestamp":1700000000,"gameHash":"abc"}"#,
        )
        .unwrap();
        assert_eq!(request.player_name, "Ann");
        assert_eq!(request.score, 42);
    }
}
