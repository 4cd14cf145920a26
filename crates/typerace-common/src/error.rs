use thiserror::Error;

/// Failures that can reach the user or gate an action.
///
/// Everything else (rejected keystrokes, unknown protocol messages, stale
/// progress updates) is absorbed silently so the race is never interrupted.
#[derive(Debug, Clone, Error)]
pub enum RaceError {
    /// The initial room load (or any request/response call) failed.
    /// Fatal when it happens at session start.
    #[error("failed to load room: {0}")]
    FetchFailed(String),

    /// The backend accepted the request but rejected it.
    #[error("{0}")]
    Backend(String),

    #[error("only the room owner may start or restart the race")]
    NotRoomOwner,

    #[error("the race has already started")]
    AlreadyStarted,

    #[error("the race is not finished")]
    NotFinished,
}
