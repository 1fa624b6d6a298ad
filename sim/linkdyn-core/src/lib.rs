//! Articulated rigid-multibody simulation.
//!
//! Bodies are trees of links joined by free, revolute, prismatic or fixed
//! joints. Each tick computes joint accelerations from the joint-space
//! equations of motion, resolves contacts with the constraint force solver
//! from [`linkdyn_contact`] and integrates the state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Simulator                             │
//! │  Lifecycle, configuration, hooks, forced pose, walking      │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          World                               │
//! │  Bodies, clock, collision detector, constraint solver       │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Integrators  ──►  BodyDynamics                   │
//! │  Semi-implicit Euler, RK4      CRBA mass matrix, RNE bias   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use linkdyn_core::{pose_at, BodyDescription, LinkDescription, Simulator};
//! use linkdyn_types::{JointType, MassProperties, SimulatorConfig, Vector3};
//!
//! let ball = BodyDescription::new("ball")
//!     .root_pose(pose_at(0.0, 0.0, 1.0))
//!     .link(
//!         LinkDescription::new("root")
//!             .joint(JointType::Free, Vector3::z())
//!             .mass(MassProperties::sphere(1.0, 0.1)),
//!     );
//!
//! let mut sim = Simulator::new(SimulatorConfig::default());
//! let report = sim.initialize(vec![ball]).unwrap();
//! for _ in 0..100 {
//!     sim.step().unwrap();
//! }
//!
//! let body = sim.body(report.registered[0]).unwrap();
//! assert!(body.root().position().z < 1.0);
//! ```
//!
//! # Actuation
//!
//! The state mode declared on each link picks how the driver treats it:
//!
//! | Declared mode | Treatment |
//! |---------------|-----------|
//! | none | Passive |
//! | effort | Torque input |
//! | displacement | Prescribed position (revolute, prismatic) |
//! | velocity | Prescribed rate (revolute, prismatic) |
//! | link pose | Prescribed root pose |
//! | displacement + velocity + acceleration | High gain (revolute, prismatic) |
//!
//! See [`classify`] for the full rule set.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::module_name_repetitions
)]

pub mod classify;
pub mod dynamics;
mod forced_pose;
mod hooks;
pub mod integrators;
pub mod kinematics;
mod model;
mod simulator;
pub mod spatial;
mod walking;
mod world;

pub use classify::{classify_link, ActuationIssue, ActuationWarning, LinkClass};
pub use dynamics::{bias_forces, mass_matrix, BodyDynamics};
pub use forced_pose::{ForcedPoseOverride, ForcedPoseRequest};
pub use hooks::{HookId, PostDynamicsHook, PostDynamicsHooks};
pub use integrators::{integrate_with_method, Integrator, RungeKutta4, SemiImplicitEuler};
pub use kinematics::{LinkTraverse, Subspace, PLANAR_LOCKED_DOFS};
pub use model::{pose_at, BodyDescription, JointPosition, Link, LinkDescription, SimBody};
pub use simulator::{
    ConfirmPolicy, ExtraJointSpec, InitReport, RefusedBody, Simulator, SimulatorState, StepResult,
};
pub use walking::KinematicWalker;
pub use world::World;

pub use linkdyn_contact::{
    CollisionDetector, CollisionHandler, ContactCandidate, ContactMaterial, ContactPoint, LinkRef,
    LinkSnapshot, MaterialTable, SolverStats, UniformMaterial,
};
pub use linkdyn_types::{
    Actuation, BodyId, DynamicsMode, IntegrationMode, JointType, MassProperties, Result, SimError,
    SimulatorConfig, StateMode, Twist,
};
