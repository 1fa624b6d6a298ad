//! Contact candidates produced by the collision-detection collaborator.
//!
//! Candidates are transient: the driver asks the detector for a fresh list
//! once per elementary integration step and discards it after the solve.

use nalgebra::{Isometry3, Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Address of one link: body index in the world, link index in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkRef {
    /// World-assigned body index.
    pub body: usize,
    /// Link index within the body (root is 0).
    pub link: usize,
}

impl LinkRef {
    /// Create a link reference.
    #[must_use]
    pub const fn new(body: usize, link: usize) -> Self {
        Self { body, link }
    }
}

impl std::fmt::Display for LinkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.body, self.link)
    }
}

/// One contact point between two links.
///
/// `normal` points from link B toward link A: a positive normal impulse
/// pushes A along `normal` and B against it. `depth` is positive when the
/// links overlap and negative when they are separated by a gap.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// World-space contact position.
    pub position: Point3<f64>,
    /// Unit contact normal, B to A.
    pub normal: Vector3<f64>,
    /// Penetration depth (positive overlapping).
    pub depth: f64,
}

impl ContactPoint {
    /// Create a contact point, normalizing the normal.
    #[must_use]
    pub fn new(position: Point3<f64>, normal: Vector3<f64>, depth: f64) -> Self {
        let normal = normal.try_normalize(1e-12).unwrap_or_else(Vector3::z);
        Self {
            position,
            normal,
            depth,
        }
    }

    /// True when the point survives culling: separation no larger than
    /// `culling_distance` and penetration no deeper than `culling_depth`.
    #[must_use]
    pub fn within_culling(&self, culling_distance: f64, culling_depth: f64) -> bool {
        self.depth >= -culling_distance && self.depth <= culling_depth
    }
}

/// All contact points between one pair of links.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactCandidate {
    /// First link; the normal points toward it.
    pub link_a: LinkRef,
    /// Second link.
    pub link_b: LinkRef,
    /// Contact points.
    pub points: Vec<ContactPoint>,
}

impl ContactCandidate {
    /// Create a candidate.
    #[must_use]
    pub fn new(link_a: LinkRef, link_b: LinkRef, points: Vec<ContactPoint>) -> Self {
        Self {
            link_a,
            link_b,
            points,
        }
    }

    /// True when both links belong to the same body.
    #[must_use]
    pub fn is_self_contact(&self) -> bool {
        self.link_a.body == self.link_b.body
    }
}

/// World pose of one link, handed to the collision detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSnapshot {
    /// Link address.
    pub link: LinkRef,
    /// World pose of the link frame.
    pub pose: Isometry3<f64>,
}

/// Collision-detection collaborator.
///
/// Called once per elementary integration step with the current pose of
/// every link; returns the candidate contacts for that pose set.
pub trait CollisionDetector: Send {
    /// Produce contact candidates for the given link poses.
    fn detect(&mut self, links: &[LinkSnapshot]) -> Vec<ContactCandidate>;
}

impl<F> CollisionDetector for F
where
    F: FnMut(&[LinkSnapshot]) -> Vec<ContactCandidate> + Send,
{
    fn detect(&mut self, links: &[LinkSnapshot]) -> Vec<ContactCandidate> {
        self(links)
    }
}

/// Result of solving one contact point, kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolvedContact {
    /// First link.
    pub link_a: LinkRef,
    /// Second link.
    pub link_b: LinkRef,
    /// Contact point as solved (normal projected in planar mode).
    pub point: ContactPoint,
    /// Friction coefficient after clamping to the configured range.
    pub friction: f64,
    /// Normal impulse magnitude (N·s), never negative.
    pub normal_impulse: f64,
    /// Tangential impulse on link A (N·s).
    pub friction_impulse: Vector3<f64>,
}
