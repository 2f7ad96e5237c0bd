use thiserror::Error;

/// Error kinds returned by [`crate::Engine`] and the broadcast layer beneath it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The engine has already been closed.
    #[error("subpub engine is closed")]
    Closed,
    /// The broadcaster for the subject has been closed (an engine close was
    /// attempted but interrupted before this broadcaster's turn completed).
    #[error("topic is closed")]
    TopicClosed,
    /// The caller-supplied deadline fired while closing.
    #[error("deadline exceeded while closing")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
