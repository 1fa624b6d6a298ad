//! Constraint force solver for articulated rigid bodies.
//!
//! Contacts are resolved as velocity-level constraints with an iterative
//! projected Gauss-Seidel kernel:
//!
//! - **Non-penetration**: normal impulses are never negative
//! - **Coulomb friction**: `|λ_t| ≤ μ λ_n` with μ clamped to a configured range
//! - **Restitution**: approaching contacts separate at `e` times their approach speed
//! - **Position correction**: excess depth is removed at a bounded velocity,
//!   never by an impulse proportional to depth
//!
//! ```text
//!   CollisionDetector ──► ContactCandidate ──► culling ──► MaterialTable
//!                                                            │
//!                                         HandlerRegistry ◄──┘ (veto / augment)
//!                                                │
//!   ConstraintSpace (J, M⁻¹, v*) ──► rows ──► PGS ──► SolveResult (Jᵀλ per body)
//! ```
//!
//! The solver knows nothing about joints. Articulated dynamics are reached
//! through the [`ConstraintSpace`] trait, so the same kernel serves fixed-base
//! arms, floating robots and static scenery.
//!
//! # Example
//!
//! ```
//! use linkdyn_contact::{ContactMaterial, ContactPoint, FrictionCone, UniformMaterial};
//! use nalgebra::{Point3, Vector3};
//!
//! let point = ContactPoint::new(Point3::origin(), Vector3::new(0.0, 0.0, 2.0), 0.001);
//! assert!(point.within_culling(0.005, 0.05));
//!
//! // Per-pair coefficients are clamped, never extrapolated.
//! let cone = FrictionCone::clamped(3.0, 0.0, 1.0);
//! assert_eq!(cone.mu, 1.0);
//!
//! let table = UniformMaterial(ContactMaterial::with_friction(0.7));
//! # let _ = table;
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

mod contact;
mod extra_joint;
mod friction;
mod handler;
mod material;
mod solver;
mod space;

pub use contact::{
    CollisionDetector, ContactCandidate, ContactPoint, LinkRef, LinkSnapshot, SolvedContact,
};
pub use extra_joint::ExtraJointConstraint;
pub use friction::FrictionCone;
pub use handler::{Callback, CollisionHandler, HandlerRegistry};
pub use material::{ContactMaterial, MaterialTable, PairMaterialTable, UniformMaterial};
pub use solver::{
    CollisionMode, ConstraintForceSolver, SolveResult, SolverParams, SolverStats,
};
pub use space::ConstraintSpace;
