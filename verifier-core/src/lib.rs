//! Pure building blocks for the Blade Warrior score-verification service.
//!
//! The external SP1 prover is an opaque subprocess; this crate holds the
//! pieces of the orchestrator that have no I/O: the line classifier that
//! turns free-text prover output into structured progress, the wire-level
//! progress event, and session-id / proof-filename derivation.

pub mod classify;
pub mod progress;
pub mod session;

pub use classify::{
    classify, is_misrouted_stderr, strip_stream_markers, Classified, Milestone, Severity,
    DEFAULT_PROGRESS_FLOOR, MILESTONES,
};
pub use progress::ProgressEvent;
pub use session::{proof_file_name, session_id, VerificationRequest};
