//! Actuation modes.
//!
//! A body description declares, per link, a bitmask of the state quantities an
//! external controller writes ([`StateMode`]). At registration the bitmask is
//! classified once into a closed [`Actuation`] variant that carries the
//! target data for that mode. The integrator matches on the variant every
//! tick; the variant kind never changes while a run is active.

use std::fmt;

use bitflags::bitflags;
use nalgebra::Isometry3;

use crate::body::Twist;
use crate::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// Declared actuation bitmask of a link.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct StateMode: u16 {
        /// Joint torque or force.
        const JOINT_EFFORT = 1;
        /// Joint angle or displacement.
        const JOINT_DISPLACEMENT = 1 << 1;
        /// Joint rate.
        const JOINT_VELOCITY = 1 << 2;
        /// Joint acceleration.
        const JOINT_ACCELERATION = 1 << 3;
        /// Absolute link pose.
        const LINK_POSITION = 1 << 4;
        /// External wrench on the link. Input only, never a mode.
        const LINK_EXT_WRENCH = 1 << 5;
        /// Legacy belt surface velocity.
        const JOINT_SURFACE_VELOCITY = 1 << 6;
        /// Position, rate and acceleration all forced from outside.
        const ALL_STATE_HIGH_GAIN = Self::JOINT_DISPLACEMENT.bits()
            | Self::JOINT_VELOCITY.bits()
            | Self::JOINT_ACCELERATION.bits();
    }
}

impl StateMode {
    /// The declared mode with the external-wrench input bit masked out.
    #[must_use]
    pub fn actuation_bits(self) -> Self {
        self - Self::LINK_EXT_WRENCH
    }
}

impl fmt::Display for StateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        bitflags::parser::to_writer(self, f)
    }
}

/// Fieldless tag of an [`Actuation`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActuationKind {
    /// No actuation.
    Passive,
    /// Torque/force controlled.
    Effort,
    /// Displacement controlled.
    Displacement,
    /// Velocity controlled.
    Velocity,
    /// Absolute pose controlled.
    LinkPose,
    /// Continuous track surface speed.
    Track,
    /// Position and velocity forced every tick.
    HighGain,
}

impl fmt::Display for ActuationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Classified actuation of a link, with the targets an external source
/// writes every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Actuation {
    /// Not driven; the joint moves under dynamics alone.
    #[default]
    Passive,
    /// Joint torque (revolute) or force (prismatic) applied directly.
    Effort {
        /// Commanded effort.
        effort: f64,
    },
    /// Joint driven to a target displacement.
    Displacement {
        /// Target displacement.
        q: f64,
        /// Target rate, used by kinematic stepping.
        dq: f64,
    },
    /// Joint driven to a target rate.
    Velocity {
        /// Target rate.
        dq: f64,
    },
    /// Link driven to an absolute world pose.
    LinkPose {
        /// Target world pose.
        pose: Isometry3<f64>,
        /// Target world velocity.
        twist: Twist,
    },
    /// Belt surface speed of a continuous-track link.
    Track {
        /// Surface speed along the joint axis.
        speed: f64,
    },
    /// Position, rate and acceleration all forced from outside.
    HighGain {
        /// Target displacement.
        q: f64,
        /// Target rate.
        dq: f64,
        /// Target acceleration.
        ddq: f64,
    },
}

impl Actuation {
    /// Tag of this variant.
    #[must_use]
    pub const fn kind(&self) -> ActuationKind {
        match self {
            Self::Passive => ActuationKind::Passive,
            Self::Effort { .. } => ActuationKind::Effort,
            Self::Displacement { .. } => ActuationKind::Displacement,
            Self::Velocity { .. } => ActuationKind::Velocity,
            Self::LinkPose { .. } => ActuationKind::LinkPose,
            Self::Track { .. } => ActuationKind::Track,
            Self::HighGain { .. } => ActuationKind::HighGain,
        }
    }

    /// True when the driver prescribes the joint motion instead of
    /// integrating torque.
    #[must_use]
    pub const fn is_prescribed(&self) -> bool {
        matches!(
            self,
            Self::Displacement { .. }
                | Self::Velocity { .. }
                | Self::LinkPose { .. }
                | Self::HighGain { .. }
        )
    }

    /// Replace the targets, keeping the kind fixed.
    ///
    /// `link` only labels the error.
    pub fn update(&mut self, link: &str, target: Self) -> Result<()> {
        if self.kind() != target.kind() {
            return Err(SimError::ActuationMismatch {
                link: link.to_string(),
                expected: self.kind().to_string(),
                actual: target.kind().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_wrench_is_masked() {
        let declared = StateMode::JOINT_EFFORT | StateMode::LINK_EXT_WRENCH;
        assert_eq!(declared.actuation_bits(), StateMode::JOINT_EFFORT);
        assert!(StateMode::LINK_EXT_WRENCH.actuation_bits().is_empty());
    }

    #[test]
    fn test_high_gain_composition() {
        let mode = StateMode::JOINT_DISPLACEMENT
            | StateMode::JOINT_VELOCITY
            | StateMode::JOINT_ACCELERATION;
        assert_eq!(mode, StateMode::ALL_STATE_HIGH_GAIN);
    }

    #[test]
    fn test_update_keeps_kind() {
        let mut act = Actuation::Displacement { q: 0.0, dq: 0.0 };
        act.update("elbow", Actuation::Displacement { q: 0.5, dq: 0.1 })
            .expect("same kind should succeed");
        assert_eq!(act, Actuation::Displacement { q: 0.5, dq: 0.1 });

        let err = act
            .update("elbow", Actuation::Effort { effort: 1.0 })
            .unwrap_err();
        assert!(err.to_string().contains("elbow"));
        assert_eq!(act.kind(), ActuationKind::Displacement);
    }

    #[test]
    fn test_prescribed_kinds() {
        assert!(Actuation::Velocity { dq: 1.0 }.is_prescribed());
        assert!(!Actuation::Effort { effort: 1.0 }.is_prescribed());
        assert!(!Actuation::Track { speed: 1.0 }.is_prescribed());
    }
}
