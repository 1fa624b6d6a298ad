//! The solver's view of articulated dynamics.
//!
//! The solver never sees joints or mass matrices. It works on generalized
//! velocities through point Jacobians and the action of the inverse mass
//! matrix, supplied by whatever owns the multibody model.

use nalgebra::{DVector, Isometry3, Matrix3xX, Point3, Vector3};

use crate::contact::LinkRef;

/// Articulated-dynamics queries needed to build and solve constraint rows.
pub trait ConstraintSpace {
    /// Number of bodies addressable by [`LinkRef::body`].
    fn body_count(&self) -> usize;

    /// Generalized velocity dimension of a body. Zero for static or fully
    /// prescribed bodies, which then act as immovable.
    fn dof_count(&self, body: usize) -> usize;

    /// Unconstrained generalized velocity of a body at the end of the step.
    fn velocity(&self, body: usize) -> DVector<f64>;

    /// World pose of a link.
    fn link_pose(&self, link: LinkRef) -> Isometry3<f64>;

    /// 3 x n Jacobian mapping the body's generalized velocity to the world
    /// velocity of `point`, rigidly attached to `link`.
    ///
    /// With `planar`, columns for out-of-plane degrees of freedom are zero.
    fn point_jacobian(&self, link: LinkRef, point: &Point3<f64>, planar: bool) -> Matrix3xX<f64>;

    /// Apply the inverse mass matrix of a body to `rhs`.
    fn solve_mass(&self, body: usize, rhs: &DVector<f64>) -> DVector<f64>;

    /// Tangential velocity of a link's contact surface relative to the link
    /// (continuous tracks). Zero for ordinary links.
    fn surface_velocity(&self, link: LinkRef) -> Vector3<f64> {
        let _ = link;
        Vector3::zeros()
    }
}
