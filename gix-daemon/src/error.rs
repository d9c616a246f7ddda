//! Error taxonomy for the daemon crate, matching `spec.md` §7's `Operational`/`Policy`/`Concurrency`
//! categories for everything owned by the accept loop (the protocol-level categories live in
//! `gix-upload-pack`/`gix-receive-pack`, whose errors are wrapped here rather than re-derived).

use std::fmt;

/// Errors produced by the daemon's lifecycle and per-connection dispatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `start()` was called while the daemon was already [`Running`](crate::DaemonState::Running).
    #[error("daemon is already running")]
    AlreadyRunning,

    /// Binding or accepting on the listening socket failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The client's initial request line was not a well-formed pkt-line or service request.
    #[error("malformed service request: {0}")]
    MalformedRequest(String),

    /// The requested service name is not one this daemon understands.
    #[error("service '{0}' not recognized")]
    UnknownService(String),

    /// The resolved repository does not have the requested service enabled
    /// (e.g. `git-daemon-export-ok` missing, or receive-pack disabled by policy).
    #[error("service '{service}' not enabled for '{path}'")]
    NotEnabled {
        /// The service name as sent by the client.
        service: String,
        /// The repository path as sent by the client.
        path: String,
    },

    /// The requested repository path could not be resolved to an openable repository.
    #[error("repository '{0}' not found")]
    RepositoryNotFound(String),

    /// Opening the resolved repository with `gix` failed.
    #[error("failed to open repository: {0}")]
    Repository(#[from] gix::open::Error),

    /// The upload-pack service returned an error while serving a connection.
    #[error("upload-pack error: {0}")]
    UploadPack(String),

    /// The receive-pack service returned an error while serving a connection.
    #[error("receive-pack error: {0}")]
    ReceivePack(String),

    /// A connection exceeded its configured idle timeout.
    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for crate::ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            crate::ServiceKind::UploadPack => "git-upload-pack",
            crate::ServiceKind::ReceivePack => "git-receive-pack",
        })
    }
}
