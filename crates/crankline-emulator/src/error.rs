//! Emulator error types.

use thiserror::Error;

/// Errors that can stop the emulator itself.
///
/// Session-level problems never show up here: a misbehaving client ends
/// its own session and the acceptor resumes. Only listener/socket setup
/// failures and worker teardown are fatal.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Listener or socket setup failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A background worker panicked instead of returning.
    #[error("emulator worker panicked")]
    WorkerPanicked,
}
