//! Core types for articulated rigid-body simulation.
//!
//! This crate provides the data shared by the solver and the driver:
//!
//! - [`BodyId`], [`Twist`], [`MassProperties`] - identifiers and link state
//! - [`JointType`] - how a link is attached to its parent
//! - [`StateMode`] - the declared actuation bitmask of a link
//! - [`Actuation`] - the classified actuation, carrying per-tick targets
//! - [`SimulatorConfig`] - persisted simulator parameters
//! - [`SimError`] - errors for every fallible operation
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no physics, no integration.
//!
//! # Coordinate System
//!
//! - X: forward
//! - Y: left
//! - Z: up (gravity defaults to -Z)
//! - Right-handed
//!
//! Planar simulation keeps motion in the XZ plane.
//!
//! # Example
//!
//! ```
//! use linkdyn_types::{IntegrationMode, SimulatorConfig};
//!
//! let config = SimulatorConfig::with_timestep(0.002)
//!     .integration(IntegrationMode::SemiImplicitEuler)
//!     .friction_range(0.2, 1.5);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.integration_mode.symbol(), "semi-implicit_euler");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod actuation;
mod body;
mod config;
mod error;
mod joint;

pub use actuation::{Actuation, ActuationKind, StateMode};
pub use body::{BodyId, MassProperties, Twist};
pub use config::{
    check_non_negative, check_positive, DynamicsMode, IntegrationMode, SimulatorConfig,
    STANDARD_GRAVITY,
};
pub use error::SimError;
pub use joint::JointType;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
