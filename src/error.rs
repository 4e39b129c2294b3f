//! Error handling for warden.
use thiserror::Error;

/// Defines all possible errors that can occur in the service supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Error reading or accessing the setting file.
    #[error("Failed to read setting file: {0}")]
    Io(#[from] std::io::Error),

    /// The setting file is not well-formed XML.
    #[error("Malformed setting file: {0}")]
    MalformedSetting(String),

    /// A required setting node is missing or its value is out of range.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// No service record matches the given name.
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    /// Caller passed a value outside the accepted set.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Error spawning a service process.
    #[error("Failed to start service '{service}': {source}")]
    SpawnFailed {
        /// The service name that failed to start.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error terminating a service process.
    #[error("Failed to stop service '{service}': {source}")]
    StopFailed {
        /// The service name that failed to stop.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Writing the setting file back to disk failed; the in-memory change
    /// has been rolled back.
    #[error("Failed to persist setting file: {0}")]
    PersistFailed(#[source] std::io::Error),

    /// A management call arrived after the supervisor shut down.
    #[error("Supervisor has been shut down")]
    ShutDown,

    /// A system call outside the other categories failed.
    #[error("System call failed: {0}")]
    Errno(#[from] nix::errno::Errno),

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `SupervisorError`.
impl<T> From<std::sync::PoisonError<T>> for SupervisorError {
    /// Converts a `std::sync::PoisonError` into a `SupervisorError`.
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SupervisorError::MutexPoisonError(err.to_string())
    }
}
