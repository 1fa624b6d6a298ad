//! Coulomb friction cone with radial projection.
//!
//! The friction impulse is constrained to lie within a cone:
//!
//! ```text
//! |λ_t| ≤ μ * λ_n
//! ```
//!
//! The cone is circular. Projection scales an outside impulse back onto the
//! boundary, keeping its direction.

use nalgebra::Vector2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction cone for one contact point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionCone {
    /// Coulomb friction coefficient.
    pub mu: f64,
}

impl FrictionCone {
    /// Create a new friction cone with the given coefficient.
    #[must_use]
    pub fn new(mu: f64) -> Self {
        Self { mu: mu.max(0.0) }
    }

    /// Create a cone whose coefficient is clamped to `[min, max]`.
    ///
    /// Values outside the range are clamped, never extrapolated. A NaN
    /// coefficient takes the lower bound.
    #[must_use]
    pub fn clamped(mu: f64, min: f64, max: f64) -> Self {
        let mu = if mu.is_nan() { min } else { mu.clamp(min, max) };
        Self::new(mu)
    }

    /// Create a frictionless cone (μ = 0).
    #[must_use]
    pub fn frictionless() -> Self {
        Self { mu: 0.0 }
    }

    /// Project a tangential impulse (in the two tangent directions) onto the
    /// cone for the given normal impulse.
    #[must_use]
    pub fn project(&self, tangent: Vector2<f64>, normal_magnitude: f64) -> Vector2<f64> {
        if normal_magnitude <= 0.0 || self.mu <= 0.0 {
            return Vector2::zeros();
        }

        let max_friction = self.mu * normal_magnitude;
        let magnitude = tangent.norm();

        if magnitude <= max_friction {
            tangent
        } else {
            tangent * (max_friction / magnitude)
        }
    }

    /// Project a single-direction tangential impulse (planar contacts).
    #[must_use]
    pub fn project_scalar(&self, tangent: f64, normal_magnitude: f64) -> f64 {
        let limit = self.max_friction(normal_magnitude);
        tangent.clamp(-limit, limit)
    }

    /// Check if a tangential impulse is within the cone.
    #[must_use]
    pub fn contains(&self, tangent_magnitude: f64, normal_magnitude: f64) -> bool {
        if normal_magnitude <= 0.0 {
            return tangent_magnitude < 1e-10;
        }
        tangent_magnitude <= self.mu * normal_magnitude + 1e-10
    }

    /// Maximum friction for the given normal impulse.
    #[must_use]
    pub fn max_friction(&self, normal_magnitude: f64) -> f64 {
        self.mu * normal_magnitude.max(0.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_friction_cone_inside() {
        let cone = FrictionCone::new(0.5);
        let t = Vector2::new(1.0, 0.0);
        assert_eq!(cone.project(t, 10.0), t);
    }

    #[test]
    fn test_friction_cone_outside() {
        let cone = FrictionCone::new(0.5);
        let projected = cone.project(Vector2::new(3.0, 4.0), 2.0);
        assert_relative_eq!(projected.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(projected.x / projected.y, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_clamped_range() {
        assert_eq!(FrictionCone::clamped(5.0, 0.1, 2.0).mu, 2.0);
        assert_eq!(FrictionCone::clamped(0.01, 0.1, 2.0).mu, 0.1);
        assert_eq!(FrictionCone::clamped(0.7, 0.1, 2.0).mu, 0.7);
        assert_eq!(FrictionCone::clamped(f64::NAN, 0.1, 2.0).mu, 0.1);
    }

    #[test]
    fn test_zero_normal() {
        let cone = FrictionCone::new(1.0);
        assert_eq!(cone.project(Vector2::new(1.0, 1.0), 0.0), Vector2::zeros());
        assert_eq!(cone.project_scalar(-3.0, 1.0), -1.0);
        assert!(cone.contains(0.0, 0.0));
        assert!(!cone.contains(0.1, 0.0));
    }
}
