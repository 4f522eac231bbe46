//! Line classifier for prover output.
//!
//! The prover writes human-readable progress to stdout and stderr, with the
//! two streams sometimes merged by intermediate capture layers that tag
//! chunks with `stdout:` / `stderr:` markers. Classification is a pure
//! per-line function: strip the markers, decide whether the line is an
//! error, and match it against a fixed milestone table that maps known
//! phases to progress percentages.

/// Progress reported for lines that match no milestone. Callers keep the
/// published sequence monotonic by tracking `max(floor, milestone.progress)`.
pub const DEFAULT_PROGRESS_FLOOR: u8 = 10;

const STREAM_TAGS: [&str; 2] = ["stdout:", "stderr:"];

const ERROR_MARKERS: [&str; 3] = ["Error:", "Failed to", "exception"];

/// Lines the prover writes to stderr that are actually normal output
/// (its logger routes informational report lines there).
const STDERR_PROGRESS_MARKERS: [&str; 6] = [
    "Game Score Verification:",
    "Timestamp:",
    "Player:",
    "Score:",
    "Verification Result:",
    "Valid:",
];

const PROOF_SAVED_MARKER: &str = "Proof saved to:";

/// A known substring of prover output mapped to a progress percentage.
#[derive(Debug, PartialEq, Eq)]
pub struct Milestone {
    pub pattern: &'static str,
    pub progress: u8,
    pub label: &'static str,
    /// Set only on the authoritative success sentinel.
    pub completes: bool,
}

/// Milestone table, checked in priority order; the first match wins.
///
/// `VERIFICATION_SUCCESS=true` is the sole authoritative success signal:
/// a clean exit without it is reported as completed-with-caveat, never as
/// a failure.
pub const MILESTONES: [Milestone; 7] = [
    Milestone {
        pattern: "VERIFICATION_SUCCESS=true",
        progress: 100,
        label: "ZK score verification succeeded!",
        completes: true,
    },
    Milestone {
        pattern: "PROOF VERIFIED SUCCESSFULLY",
        progress: 95,
        label: "Proof verified successfully!",
        completes: false,
    },
    Milestone {
        pattern: "VERIFYING PROOF",
        progress: 85,
        label: "Verifying proof...",
        completes: false,
    },
    Milestone {
        pattern: "ZERO-KNOWLEDGE PROOF GENERATED",
        progress: 80,
        label: "Zero-knowledge proof generated!",
        completes: false,
    },
    Milestone {
        pattern: "GENERATING PROOF",
        progress: 50,
        label: "Building zero-knowledge proof...",
        completes: false,
    },
    Milestone {
        pattern: "PROVING AND VERIFICATION KEYS GENERATED",
        progress: 40,
        label: "Proving keys ready!",
        completes: false,
    },
    Milestone {
        pattern: "GENERATING KEYS",
        progress: 20,
        label: "Generating proving keys...",
        completes: false,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Result of classifying one raw output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    /// The line with stream markers stripped and whitespace normalized.
    pub line: String,
    pub severity: Severity,
    pub milestone: Option<&'static Milestone>,
    /// Path extracted from a `Proof saved to:` line, if present.
    pub saved_path: Option<String>,
}

/// Remove `stdout:` / `stderr:` capture tags, both leading and inline, and
/// collapse whitespace runs to single spaces.
pub fn strip_stream_markers(raw: &str) -> String {
    let tokens: Vec<&str> = raw
        .split_whitespace()
        .filter_map(|token| {
            for tag in STREAM_TAGS {
                if let Some(rest) = token.strip_prefix(tag) {
                    return if rest.is_empty() { None } else { Some(rest) };
                }
            }
            Some(token)
        })
        .collect();
    tokens.join(" ")
}

/// Classify one raw line of prover output. Pure and deterministic: no state
/// is carried between lines.
pub fn classify(raw: &str) -> Classified {
    let line = strip_stream_markers(raw);

    let severity = if ERROR_MARKERS.iter().any(|marker| line.contains(marker)) {
        Severity::Error
    } else {
        Severity::Info
    };

    let milestone = MILESTONES.iter().find(|m| line.contains(m.pattern));

    let saved_path = line
        .find(PROOF_SAVED_MARKER)
        .map(|idx| line[idx + PROOF_SAVED_MARKER.len()..].trim().to_string())
        .filter(|path| !path.is_empty());

    Classified {
        line,
        severity,
        milestone,
        saved_path,
    }
}

/// True when a line that arrived on the error stream is actually normal
/// prover output and should be relayed as progress, not as an error.
pub fn is_misrouted_stderr(line: &str) -> bool {
    STDERR_PROGRESS_MARKERS
        .iter()
        .any(|marker| line.contains(marker))
}
