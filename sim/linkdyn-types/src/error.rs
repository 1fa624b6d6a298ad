//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while building or stepping a simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body index referenced.
    #[error("invalid body index: {0}")]
    InvalidBodyId(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A body description that cannot take part in a run.
    #[error("body '{body}' cannot be simulated: {reason}")]
    Unsimulatable {
        /// Name of the refused body.
        body: String,
        /// Why it was refused.
        reason: String,
    },

    /// A body description whose link tree is malformed.
    #[error("invalid body model: {reason}")]
    InvalidModel {
        /// Description of what's wrong.
        reason: String,
    },

    /// Operation called in the wrong lifecycle state.
    #[error("invalid simulator state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: String,
        /// State the simulator was in.
        actual: String,
    },

    /// A target of the wrong kind was written to a link.
    #[error("actuation mismatch on link '{link}': expected {expected}, got {actual}")]
    ActuationMismatch {
        /// Link the target was written to.
        link: String,
        /// Actuation kind fixed at registration.
        expected: String,
        /// Kind of the rejected target.
        actual: String,
    },

    /// Stepping was requested with no registered body.
    #[error("no simulatable body is registered")]
    NoBodies,

    /// Named link not found in a body.
    #[error("link '{link}' not found in body '{body}'")]
    LinkNotFound {
        /// Body searched.
        body: String,
        /// Missing link name.
        link: String,
    },

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an unsimulatable-body error.
    #[must_use]
    pub fn unsimulatable(body: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsimulatable {
            body: body.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid model error.
    #[must_use]
    pub fn invalid_model(reason: impl Into<String>) -> Self {
        Self::InvalidModel {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error.
    #[must_use]
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }

    /// Check if a body was refused at registration.
    #[must_use]
    pub fn is_unsimulatable(&self) -> bool {
        matches!(self, Self::Unsimulatable { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidBodyId(42);
        assert!(err.to_string().contains("42"));

        let err = SimError::unsimulatable("crawler", "mass is zero");
        assert!(err.to_string().contains("crawler"));
        assert!(err.to_string().contains("mass is zero"));

        let err = SimError::diverged("NaN in joint velocity");
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(SimError::diverged("x").is_diverged());
        assert!(SimError::invalid_config("x").is_config_error());
        assert!(SimError::InvalidTimestep(-1.0).is_config_error());
        assert!(SimError::unsimulatable("a", "b").is_unsimulatable());
        assert!(!SimError::NoBodies.is_unsimulatable());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SimError::invalid_state("Initialized", "Finalized");
        let msg = err.to_string();
        assert!(msg.contains("Initialized"));
        assert!(msg.contains("Finalized"));
    }
}
