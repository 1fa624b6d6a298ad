//! Loop-closing joints between two links.

use nalgebra::Point3;

use crate::contact::LinkRef;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ball constraint pinning a point of one link to a point of another.
///
/// Enforced as three bilateral velocity rows with Baumgarte correction of
/// the positional error.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtraJointConstraint {
    /// First link.
    pub link_a: LinkRef,
    /// Anchor in `link_a` coordinates.
    pub point_a: Point3<f64>,
    /// Second link.
    pub link_b: LinkRef,
    /// Anchor in `link_b` coordinates.
    pub point_b: Point3<f64>,
}

impl ExtraJointConstraint {
    /// Create a ball constraint.
    #[must_use]
    pub const fn ball(
        link_a: LinkRef,
        point_a: Point3<f64>,
        link_b: LinkRef,
        point_b: Point3<f64>,
    ) -> Self {
        Self {
            link_a,
            point_a,
            link_b,
            point_b,
        }
    }
}
