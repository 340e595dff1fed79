//! Error types for stream operations.

use crate::stream::client::ClientId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for stream operations.
///
/// Anything that damages stream invariants (double-configured storage, a
/// flavor refusing to initialize) is fatal and surfaces at spawn time.
/// Anything scoped to one client is isolated to that client's request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller is already registered on this stream.
    #[error("client {0} is already subscribed")]
    AlreadySubscribed(ClientId),

    /// The request referenced a client the stream does not know.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// A storage-backed operation was issued against a stream without storage.
    #[error("stream has no storage")]
    NoStorage,

    /// Seek could not find a usable keyframe for the requested position.
    #[error("no seekable position found")]
    SeekFailed,

    /// `info` was called with at least one unrecognized key.
    /// Carries the full requested key list.
    #[error("bad info keys: {0:?}")]
    BadInfoKeys(Vec<String>),

    /// Both a flavor-installed storage and the `timeshift` option were
    /// configured. Fatal at init.
    #[error("stream configured with both timeshift and storage")]
    TimeshiftAndStorage,

    /// The flavor adapter refused to initialize the stream. Fatal at init.
    #[error("flavor init failed: {0:?}")]
    FlavorInit(crate::flavor::StopReason),

    /// The stream actor is gone; the mailbox or reply channel closed.
    #[error("stream stopped")]
    Stopped,

    /// A synchronous request exceeded its deadline.
    #[error("request timed out")]
    Timeout,
}
