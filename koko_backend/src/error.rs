//! Fault taxonomy for the controller.
//!
//! Recoverable faults are absorbed where they occur and reported through
//! [`Fault::log`]; only [`Fault::Startup`] stops the controller, and only
//! before the first turn.

use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Classifier unavailable or failed; the turn continues with the default label.
    #[error("perception fault: {0}")]
    Perception(String),
    /// Profile store unreadable or unwritable; in-memory state is kept.
    #[error("persistence fault: {0}")]
    Persistence(String),
    /// Actuator send failed; the learning loop continues.
    #[error("actuation fault: {0}")]
    Actuation(String),
    /// A required collaborator could not be constructed.
    #[error("startup fault: {0}")]
    Startup(String),
}

impl Fault {
    pub fn perception(reason: impl Display) -> Self {
        Fault::Perception(reason.to_string())
    }

    pub fn persistence(reason: impl Display) -> Self {
        Fault::Persistence(reason.to_string())
    }

    pub fn actuation(reason: impl Display) -> Self {
        Fault::Actuation(reason.to_string())
    }

    pub fn startup(reason: impl Display) -> Self {
        Fault::Startup(reason.to_string())
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Fault::Startup(_))
    }

    pub fn log(&self) {
        if self.is_recoverable() {
            tracing::warn!("{}", self);
        } else {
            tracing::error!("{}", self);
        }
    }
}
