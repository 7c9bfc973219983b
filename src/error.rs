//! Error taxonomy shared by the step engine and the timer scheduler.
//!
//! Every variant describes a programming error on the caller's side. Nothing
//! here is transient: retrying the same call will fail the same way.

use thiserror::Error;

/// Errors raised by workflows, steps and timer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The timer handle was already released.
    #[error("timer handle used after release")]
    Disposed,

    /// A workflow or step was used outside of its contract.
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// A typed step's value was read before its continuation fired.
    #[error("step value read before completion")]
    NotReady,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
