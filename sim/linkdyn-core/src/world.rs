//! The world: bodies, global parameters and the constraint solver.
//!
//! One acceleration evaluation per elementary integration step:
//!
//! ```text
//! link poses ──► CollisionDetector ──► candidates
//!      │                                   │
//!      ▼                                   ▼
//! BodyDynamics (M, b, drives) ──► ConstraintForceSolver on v + h·a
//!                                          │
//!            a = a_free + M⁻¹ Jᵀλ / h  ◄───┘
//! ```

use std::sync::Arc;

use nalgebra::{DVector, Isometry3, Matrix3xX, Point3, Vector3};
use tracing::debug;

use linkdyn_contact::{
    CollisionDetector, ConstraintForceSolver, ConstraintSpace, ContactMaterial, LinkRef,
    LinkSnapshot, MaterialTable, SolverParams, UniformMaterial,
};
use linkdyn_types::{BodyId, IntegrationMode, Result, SimError, SimulatorConfig};

use crate::dynamics::BodyDynamics;
use crate::model::SimBody;

/// Top-level aggregate owning every simulated body.
pub struct World {
    bodies: Vec<SimBody>,
    gravity: Vector3<f64>,
    time: f64,
    step_count: u64,
    timestep: f64,
    integration: IntegrationMode,
    planar: bool,
    solver: ConstraintForceSolver,
    detector: Option<Box<dyn CollisionDetector>>,
    materials: Arc<dyn MaterialTable>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("gravity", &self.gravity)
            .field("time", &self.time)
            .field("timestep", &self.timestep)
            .field("integration", &self.integration)
            .field("planar", &self.planar)
            .field("detector", &self.detector.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(&SimulatorConfig::default())
    }
}

impl World {
    /// Empty world with parameters from `config`.
    #[must_use]
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            bodies: Vec::new(),
            gravity: config.gravity,
            time: 0.0,
            step_count: 0,
            timestep: config.timestep,
            integration: config.integration_mode,
            planar: config.planar,
            solver: ConstraintForceSolver::new(SolverParams::from(config)),
            detector: None,
            materials: Arc::new(UniformMaterial(ContactMaterial::default())),
        }
    }

    /// Apply the global parameters of `config` and push solver parameters.
    pub fn configure(&mut self, config: &SimulatorConfig) -> Result<()> {
        self.solver.set_params(SolverParams::from(config))?;
        self.gravity = config.gravity;
        self.timestep = config.timestep;
        self.integration = config.integration_mode;
        self.planar = config.planar;
        Ok(())
    }

    /// Register a body. Its collision modes are handed to the solver.
    pub fn add_body(&mut self, mut body: SimBody) -> BodyId {
        let index = self.bodies.len();
        let id = BodyId::from(index);
        body.id = id;
        let (enabled, self_enabled) = body.collision_mode();
        self.solver
            .set_body_collision_detection_mode(index, enabled, self_enabled);
        self.bodies.push(body);
        id
    }

    /// Remove every body and reset the clock.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.solver.clear_bodies();
        self.time = 0.0;
        self.step_count = 0;
    }

    /// All bodies, in registration order.
    #[must_use]
    pub fn bodies(&self) -> &[SimBody] {
        &self.bodies
    }

    /// Mutable bodies.
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut SimBody> {
        self.bodies.iter_mut()
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Body by id.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&SimBody> {
        self.bodies.get(id.index())
    }

    /// Mutable body by id.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut SimBody> {
        self.bodies.get_mut(id.index())
    }

    /// Body by id, or an error.
    pub fn try_body_mut(&mut self, id: BodyId) -> Result<&mut SimBody> {
        self.bodies
            .get_mut(id.index())
            .ok_or(SimError::InvalidBodyId(id.raw()))
    }

    /// Body by name.
    #[must_use]
    pub fn find_body(&self, name: &str) -> Option<BodyId> {
        self.bodies
            .iter()
            .position(|b| b.name() == name)
            .map(BodyId::from)
    }

    /// Gravity vector.
    #[must_use]
    pub fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    /// Simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Completed ticks.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Tick length.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Integration method.
    #[must_use]
    pub fn integration(&self) -> IntegrationMode {
        self.integration
    }

    /// Planar mode.
    #[must_use]
    pub fn planar(&self) -> bool {
        self.planar
    }

    /// Constraint solver.
    #[must_use]
    pub fn solver(&self) -> &ConstraintForceSolver {
        &self.solver
    }

    /// Mutable constraint solver.
    pub fn solver_mut(&mut self) -> &mut ConstraintForceSolver {
        &mut self.solver
    }

    /// Install the collision-detection collaborator.
    pub fn set_collision_detector(&mut self, detector: Box<dyn CollisionDetector>) {
        self.detector = Some(detector);
    }

    /// Remove the collision-detection collaborator.
    pub fn clear_collision_detector(&mut self) {
        self.detector = None;
    }

    /// Install the material-table collaborator.
    pub fn set_material_table(&mut self, materials: Arc<dyn MaterialTable>) {
        self.materials = materials;
    }

    /// Recompute kinematics of every movable body.
    pub fn update_kinematics(&mut self) {
        for body in &mut self.bodies {
            body.forward_kinematics();
        }
    }

    /// Force high-gain links to their targets and refresh their kinematics.
    pub fn refresh_high_gain_states(&mut self) {
        for body in &mut self.bodies {
            if !body.high_gain_links().is_empty() {
                body.apply_high_gain_targets();
                body.forward_kinematics();
            }
        }
    }

    /// Clear per-tick external wrenches on every link.
    pub fn clear_external_forces(&mut self) {
        for body in &mut self.bodies {
            body.clear_external_forces();
        }
    }

    /// World poses of every link, for collision detection.
    #[must_use]
    pub fn link_snapshots(&self) -> Vec<LinkSnapshot> {
        self.bodies
            .iter()
            .enumerate()
            .flat_map(|(b, body)| {
                body.links().iter().enumerate().map(move |(l, link)| LinkSnapshot {
                    link: LinkRef::new(b, l),
                    pose: link.pose,
                })
            })
            .collect()
    }

    /// Generalized accelerations of every body at the current state,
    /// including constraint forces for a step of length `h`.
    pub fn compute_accelerations(&mut self, h: f64) -> Vec<DVector<f64>> {
        let dynamics: Vec<BodyDynamics> = self
            .bodies
            .iter()
            .map(|body| BodyDynamics::evaluate(body, &self.gravity, h, self.planar))
            .collect();
        let mut accels: Vec<DVector<f64>> = dynamics.iter().map(|d| d.accel.clone()).collect();

        let snapshots = if self.detector.is_some() {
            self.link_snapshots()
        } else {
            Vec::new()
        };
        let candidates = self
            .detector
            .as_mut()
            .map(|detector| detector.detect(&snapshots))
            .unwrap_or_default();
        if candidates.is_empty() && self.solver.extra_joints().is_empty() {
            return accels;
        }

        let space = WorldSpace {
            bodies: &self.bodies,
            dynamics: &dynamics,
            h,
        };
        let result = self
            .solver
            .solve(&space, candidates, self.materials.as_ref(), h);
        for (b, impulse) in result.impulses.iter().enumerate() {
            if impulse.is_empty() || impulse.len() != accels[b].len() {
                continue;
            }
            let dv = dynamics[b].solve_mass(impulse);
            accels[b].axpy(1.0 / h, &dv, 1.0);
        }
        if result.contact_count > 0 {
            debug!(
                contacts = result.contact_count,
                iterations = result.iterations,
                "constraint forces applied"
            );
        }
        accels
    }

    /// Advance the clock by one tick.
    pub fn advance_time(&mut self, dt: f64) {
        self.time += dt;
        self.step_count += 1;
    }

    /// Fail with [`SimError::Diverged`] when any body state is not finite.
    pub fn check_finite(&self) -> Result<()> {
        match self.bodies.iter().find(|b| !b.is_finite()) {
            Some(body) => Err(SimError::diverged(format!(
                "non-finite state in body {} at t = {}",
                body.name(),
                self.time
            ))),
            None => Ok(()),
        }
    }
}

/// Constraint-solver view of the world during one evaluation.
struct WorldSpace<'a> {
    bodies: &'a [SimBody],
    dynamics: &'a [BodyDynamics],
    h: f64,
}

impl ConstraintSpace for WorldSpace<'_> {
    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn dof_count(&self, body: usize) -> usize {
        self.bodies.get(body).map_or(0, SimBody::nv)
    }

    fn velocity(&self, body: usize) -> DVector<f64> {
        match (self.bodies.get(body), self.dynamics.get(body)) {
            (Some(b), Some(d)) => b.velocity() + &d.accel * self.h,
            _ => DVector::zeros(0),
        }
    }

    fn link_pose(&self, link: LinkRef) -> Isometry3<f64> {
        self.bodies
            .get(link.body)
            .and_then(|b| b.link(link.link))
            .map_or_else(Isometry3::identity, |l| l.pose)
    }

    fn point_jacobian(&self, link: LinkRef, point: &Point3<f64>, planar: bool) -> Matrix3xX<f64> {
        self.bodies
            .get(link.body)
            .map_or_else(|| Matrix3xX::zeros(0), |b| b.point_jacobian(link.link, point, planar))
    }

    fn solve_mass(&self, body: usize, rhs: &DVector<f64>) -> DVector<f64> {
        self.dynamics
            .get(body)
            .map_or_else(|| DVector::zeros(rhs.len()), |d| d.solve_mass(rhs))
    }

    fn surface_velocity(&self, link: LinkRef) -> Vector3<f64> {
        self.bodies
            .get(link.body)
            .map_or_else(Vector3::zeros, |b| b.surface_velocity(link.link))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, BodyDescription, LinkDescription};
    use approx::assert_relative_eq;
    use linkdyn_contact::{ContactCandidate, ContactPoint};
    use linkdyn_types::{JointType, MassProperties};

    fn ball_at(z: f64) -> SimBody {
        let desc = BodyDescription::new("ball")
            .root_pose(pose_at(0.0, 0.0, z))
            .link(
                LinkDescription::new("root")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::sphere(1.0, 0.1)),
            );
        SimBody::from_description(BodyId::new(0), &desc).unwrap().0
    }

    fn floor() -> SimBody {
        let desc = BodyDescription::static_body("floor").link(LinkDescription::new("ground"));
        SimBody::from_description(BodyId::new(0), &desc).unwrap().0
    }

    #[test]
    fn test_add_body_assigns_index_ids() {
        let mut world = World::default();
        assert_eq!(world.add_body(floor()), BodyId::new(0));
        assert_eq!(world.add_body(ball_at(1.0)), BodyId::new(1));
        assert_eq!(world.find_body("ball"), Some(BodyId::new(1)));
        assert_eq!(world.link_snapshots().len(), 2);
    }

    #[test]
    fn test_accelerations_without_contact() {
        let mut world = World::new(&SimulatorConfig::default().gravity(Vector3::new(0.0, 0.0, -10.0)));
        world.add_body(ball_at(1.0));
        let accels = world.compute_accelerations(0.001);
        assert_relative_eq!(accels[0][2], -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_resting_contact_cancels_gravity() {
        let mut world = World::new(&SimulatorConfig::default().gravity(Vector3::new(0.0, 0.0, -10.0)));
        world.add_body(floor());
        world.add_body(ball_at(0.1));
        world.set_collision_detector(Box::new(|links: &[LinkSnapshot]| {
            let ball = links.iter().find(|s| s.link.body == 1).unwrap();
            let bottom = ball.pose.translation.vector - Vector3::new(0.0, 0.0, 0.1);
            vec![ContactCandidate::new(
                LinkRef::new(1, 0),
                LinkRef::new(0, 0),
                vec![ContactPoint::new(Point3::from(bottom), Vector3::z(), 0.00025)],
            )]
        }));
        let accels = world.compute_accelerations(0.001);
        assert_relative_eq!(accels[1][2], 0.0, epsilon = 1e-6);
        assert_eq!(world.solver().last_contacts().len(), 1);
    }

    #[test]
    fn test_check_finite() {
        let mut world = World::default();
        world.add_body(ball_at(1.0));
        assert!(world.check_finite().is_ok());
        world.body_mut(BodyId::new(0)).unwrap().links[0].q = f64::NAN;
        assert!(world.check_finite().unwrap_err().is_diverged());
    }
}
