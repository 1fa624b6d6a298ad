//! Joint types.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Joint connecting a link to its parent (or to the world, for the root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointType {
    /// Rigidly welded, no degree of freedom.
    #[default]
    Fixed,
    /// Rotation about a single axis.
    Revolute,
    /// Translation along a single axis.
    Prismatic,
    /// Unconstrained 6-DOF motion.
    Free,
    /// Rigid joint whose contact surface moves tangentially like a belt.
    ContinuousTrack,
}

impl JointType {
    /// Number of generalized velocity coordinates.
    #[must_use]
    pub const fn dof_count(self) -> usize {
        match self {
            Self::Fixed | Self::ContinuousTrack => 0,
            Self::Revolute | Self::Prismatic => 1,
            Self::Free => 6,
        }
    }

    /// True for revolute and prismatic joints, whose state is a single scalar.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Revolute | Self::Prismatic)
    }

    /// True for the unconstrained 6-DOF joint.
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fixed => "fixed",
            Self::Revolute => "revolute",
            Self::Prismatic => "prismatic",
            Self::Free => "free",
            Self::ContinuousTrack => "continuous track",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dof_counts() {
        assert_eq!(JointType::Fixed.dof_count(), 0);
        assert_eq!(JointType::ContinuousTrack.dof_count(), 0);
        assert_eq!(JointType::Revolute.dof_count(), 1);
        assert_eq!(JointType::Free.dof_count(), 6);
        assert!(JointType::Prismatic.is_scalar());
        assert!(!JointType::Free.is_scalar());
    }
}
