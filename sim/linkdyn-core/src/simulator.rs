//! Time integration driver.
//!
//! ```text
//! Uninitialized ──initialize──► Initialized ──step──► Stepping ──finalize──► Finalized
//!       ▲                                                                       │
//!       └──────────────────────────────── clear ◄───────────────────────────────┘
//! ```
//!
//! Each tick runs to completion:
//!
//! 1. reconcile the forced-pose hook with the override slot
//! 2. forward dynamics (high-gain refresh, then integrate) or kinematics
//!    (displacement targets, then walking or plain forward kinematics)
//! 3. advance the clock
//! 4. post-dynamics hooks (external-force clearing, forced pose, host hooks)
//! 5. divergence check

use std::fmt;
use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Vector3};
use tracing::{error, info, warn};

use linkdyn_contact::{
    CollisionDetector, CollisionHandler, ExtraJointConstraint, LinkRef, MaterialTable, SolverStats,
};
use linkdyn_types::{
    Actuation, BodyId, DynamicsMode, IntegrationMode, Result, SimError, SimulatorConfig,
};

use crate::classify::ActuationWarning;
use crate::forced_pose::ForcedPoseOverride;
use crate::hooks::{HookId, PostDynamicsHooks};
use crate::integrators::integrate_with_method;
use crate::model::{BodyDescription, SimBody};
use crate::walking::KinematicWalker;
use crate::world::World;

/// Lifecycle state of a [`Simulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulatorState {
    /// No bodies registered.
    #[default]
    Uninitialized,
    /// Bodies registered, not yet stepped.
    Initialized,
    /// At least one tick has run.
    Stepping,
    /// Run ended.
    Finalized,
}

impl fmt::Display for SimulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Stepping => "stepping",
            Self::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Answer to the all-link-position recording question asked at
/// initialization when a free joint sits below a root.
pub enum ConfirmPolicy {
    /// Always enable recording.
    AlwaysYes,
    /// Never enable recording.
    AlwaysNo,
    /// Ask a host callback with the question text.
    Ask(Box<dyn FnMut(&str) -> bool + Send>),
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self::AlwaysNo
    }
}

impl fmt::Debug for ConfirmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysYes => f.write_str("AlwaysYes"),
            Self::AlwaysNo => f.write_str("AlwaysNo"),
            Self::Ask(_) => f.write_str("Ask(<fn>)"),
        }
    }
}

impl ConfirmPolicy {
    fn confirm(&mut self, question: &str) -> bool {
        match self {
            Self::AlwaysYes => true,
            Self::AlwaysNo => false,
            Self::Ask(ask) => ask(question),
        }
    }
}

/// Loop-closing ball joint addressed by names, resolved at initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraJointSpec {
    /// First body.
    pub body_a: String,
    /// Link of the first body.
    pub link_a: String,
    /// Anchor in `link_a` coordinates.
    pub point_a: Point3<f64>,
    /// Second body.
    pub body_b: String,
    /// Link of the second body.
    pub link_b: String,
    /// Anchor in `link_b` coordinates.
    pub point_b: Point3<f64>,
}

impl ExtraJointSpec {
    /// Ball joint between two named links.
    #[must_use]
    pub fn ball(
        (body_a, link_a): (&str, &str),
        point_a: Point3<f64>,
        (body_b, link_b): (&str, &str),
        point_b: Point3<f64>,
    ) -> Self {
        Self {
            body_a: body_a.to_string(),
            link_a: link_a.to_string(),
            point_a,
            body_b: body_b.to_string(),
            link_b: link_b.to_string(),
            point_b,
        }
    }
}

/// A body refused at initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RefusedBody {
    /// Body name.
    pub name: String,
    /// Why it was refused.
    pub error: SimError,
}

/// What [`Simulator::initialize`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitReport {
    /// Registered bodies, in order.
    pub registered: Vec<BodyId>,
    /// Bodies left out of the run.
    pub refused: Vec<RefusedBody>,
    /// Ignored actuation requests.
    pub warnings: Vec<ActuationWarning>,
    /// Extra joints whose bodies or links were not found.
    pub unresolved_extra_joints: Vec<ExtraJointSpec>,
    /// A free joint below a root asked for all-link recording.
    pub confirmation_requested: bool,
    /// All-link recording is on after initialization.
    pub all_link_positions: bool,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    /// Simulation time after the tick.
    pub time: f64,
    /// Completed ticks.
    pub step: u64,
    /// Contacts resolved by the last solve of the tick.
    pub contact_count: usize,
    /// Support transfers made by kinematic walking.
    pub support_switches: usize,
}

/// Rigid-multibody simulator.
pub struct Simulator {
    config: SimulatorConfig,
    state: SimulatorState,
    world: World,
    hooks: PostDynamicsHooks,
    clear_forces_hook: Option<HookId>,
    forced_pose: ForcedPoseOverride,
    forced_pose_hook: Option<HookId>,
    walkers: Vec<Option<KinematicWalker>>,
    extra_joints: Vec<ExtraJointSpec>,
    confirm: ConfirmPolicy,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("world", &self.world)
            .field("hooks", &self.hooks)
            .field("confirm", &self.confirm)
            .finish_non_exhaustive()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    /// Simulator with the given configuration. An invalid configuration is
    /// reported by [`Self::initialize`].
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            world: World::new(&config),
            config,
            state: SimulatorState::Uninitialized,
            hooks: PostDynamicsHooks::new(),
            clear_forces_hook: None,
            forced_pose: ForcedPoseOverride::new(),
            forced_pose_hook: None,
            walkers: Vec::new(),
            extra_joints: Vec::new(),
            confirm: ConfirmPolicy::default(),
        }
    }

    // ==================== configuration ====================

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SimulatorState {
        self.state
    }

    /// Replace the whole configuration. Refused, keeping the old one, when
    /// invalid.
    pub fn set_config(&mut self, config: SimulatorConfig) -> Result<()> {
        self.update_config(|c| *c = config)
    }

    fn update_config(&mut self, change: impl FnOnce(&mut SimulatorConfig)) -> Result<()> {
        let mut candidate = self.config.clone();
        change(&mut candidate);
        candidate.validate()?;
        self.world.configure(&candidate)?;
        self.config = candidate;
        Ok(())
    }

    /// Set the gravity vector.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) -> Result<()> {
        self.update_config(|c| c.gravity = gravity)
    }

    /// Set the tick length.
    pub fn set_timestep(&mut self, timestep: f64) -> Result<()> {
        self.update_config(|c| c.timestep = timestep)
    }

    /// Set the friction coefficient clamp range.
    pub fn set_friction_range(&mut self, min: f64, max: f64) -> Result<()> {
        self.update_config(|c| {
            c.min_friction_coefficient = min;
            c.max_friction_coefficient = max;
        })
    }

    /// Set the contact culling distance and depth.
    pub fn set_contact_culling(&mut self, distance: f64, depth: f64) -> Result<()> {
        self.update_config(|c| {
            c.contact_culling_distance = distance;
            c.contact_culling_depth = depth;
        })
    }

    /// Set the solver error criterion.
    pub fn set_error_criterion(&mut self, criterion: f64) -> Result<()> {
        self.update_config(|c| c.error_criterion = criterion)
    }

    /// Set the solver iteration cap.
    pub fn set_max_iterations(&mut self, iterations: usize) -> Result<()> {
        self.update_config(|c| c.max_iterations = iterations)
    }

    /// Set the penetration left uncorrected and the correction velocity
    /// ratio.
    pub fn set_contact_correction(&mut self, depth: f64, velocity_ratio: f64) -> Result<()> {
        self.update_config(|c| {
            c.contact_correction_depth = depth;
            c.contact_correction_velocity_ratio = velocity_ratio;
        })
    }

    /// Set the default restitution coefficient.
    pub fn set_restitution(&mut self, epsilon: f64) -> Result<()> {
        self.update_config(|c| c.restitution = epsilon)
    }

    /// Enable planar (XZ) simulation.
    pub fn set_planar(&mut self, planar: bool) -> Result<()> {
        self.update_config(|c| c.planar = planar)
    }

    /// Enable kinematic walking.
    pub fn set_kinematic_walking(&mut self, enabled: bool) -> Result<()> {
        self.update_config(|c| c.kinematic_walking = enabled)
    }

    /// Choose forward dynamics or kinematics.
    pub fn set_dynamics_mode(&mut self, mode: DynamicsMode) -> Result<()> {
        self.update_config(|c| c.dynamics_mode = mode)
    }

    /// Choose the integration method.
    pub fn set_integration_mode(&mut self, mode: IntegrationMode) -> Result<()> {
        self.update_config(|c| c.integration_mode = mode)
    }

    /// Enable recording of every link pose.
    pub fn set_all_link_position_output(&mut self, enabled: bool) -> Result<()> {
        self.update_config(|c| c.record_all_link_positions = enabled)
    }

    /// Set the answer policy for the all-link recording question.
    pub fn set_confirm_policy(&mut self, policy: ConfirmPolicy) {
        self.confirm = policy;
    }

    // ==================== collaborators ====================

    /// Install the collision-detection collaborator.
    pub fn set_collision_detector(&mut self, detector: Box<dyn CollisionDetector>) {
        self.world.set_collision_detector(detector);
    }

    /// Install the material-table collaborator.
    pub fn set_material_table(&mut self, materials: Arc<dyn MaterialTable>) {
        self.world.set_material_table(materials);
    }

    /// Register a named collision handler, replacing one of the same name.
    pub fn register_collision_handler(&mut self, name: impl Into<String>, handler: CollisionHandler) {
        self.world
            .solver_mut()
            .register_collision_handler(name, handler);
    }

    /// Unregister a collision handler. Returns false for an unknown name.
    pub fn unregister_collision_handler(&mut self, name: &str) -> bool {
        self.world.solver_mut().unregister_collision_handler(name)
    }

    /// Override collision detection enablement of a registered body.
    pub fn set_body_collision_detection_mode(
        &mut self,
        body: BodyId,
        enabled: bool,
        self_enabled: bool,
    ) -> Result<()> {
        if self.world.body(body).is_none() {
            return Err(SimError::InvalidBodyId(body.raw()));
        }
        self.world
            .solver_mut()
            .set_body_collision_detection_mode(body.index(), enabled, self_enabled);
        Ok(())
    }

    /// Add a loop-closing joint. Resolved now when bodies are registered,
    /// otherwise at initialization.
    pub fn add_extra_joint(&mut self, joint: ExtraJointSpec) -> Result<()> {
        if matches!(
            self.state,
            SimulatorState::Initialized | SimulatorState::Stepping
        ) {
            let resolved = self.resolve_extra_joint(&joint).ok_or_else(|| {
                SimError::LinkNotFound {
                    body: format!("{} / {}", joint.body_a, joint.body_b),
                    link: format!("{} / {}", joint.link_a, joint.link_b),
                }
            })?;
            self.world.solver_mut().add_extra_joint(resolved);
        }
        self.extra_joints.push(joint);
        Ok(())
    }

    /// Remove every loop-closing joint.
    pub fn clear_extra_joints(&mut self) {
        self.extra_joints.clear();
        self.world.solver_mut().clear_extra_joints();
    }

    fn resolve_extra_joint(&self, joint: &ExtraJointSpec) -> Option<ExtraJointConstraint> {
        let link_ref = |body: &str, link: &str| -> Option<LinkRef> {
            let id = self.world.find_body(body)?;
            let index = self.world.body(id)?.find_link(link)?;
            Some(LinkRef::new(id.index(), index))
        };
        Some(ExtraJointConstraint::ball(
            link_ref(&joint.body_a, &joint.link_a)?,
            joint.point_a,
            link_ref(&joint.body_b, &joint.link_b)?,
            joint.point_b,
        ))
    }

    // ==================== hooks ====================

    /// Add a hook run after every tick.
    pub fn add_post_dynamics_hook<F>(&mut self, hook: F) -> HookId
    where
        F: FnMut(&mut World) + Send + 'static,
    {
        self.hooks.add(hook)
    }

    /// Remove a hook. Returns false for an unknown id.
    pub fn remove_post_dynamics_hook(&mut self, id: HookId) -> bool {
        self.hooks.remove(id)
    }

    // ==================== forced pose ====================

    /// Pin a body's root at `pose` until cleared. Repeated calls overwrite
    /// the pose.
    pub fn set_forced_pose(&mut self, body: BodyId, pose: Isometry3<f64>) {
        self.forced_pose.request(body, pose);
        self.sync_forced_pose_hook();
    }

    /// Release the override of `body`. Returns false when it had none.
    pub fn clear_forced_pose(&mut self, body: BodyId) -> bool {
        let cleared = self.forced_pose.clear(body);
        self.sync_forced_pose_hook();
        cleared
    }

    /// Release every override.
    pub fn clear_forced_poses(&mut self) {
        self.forced_pose.clear_all();
        self.sync_forced_pose_hook();
    }

    /// Whether `body` is pinned by the latest request.
    #[must_use]
    pub fn is_forced_pose_active_for(&self, body: BodyId) -> bool {
        self.forced_pose.is_active_for(body)
    }

    /// Handle for requesting overrides from another thread.
    #[must_use]
    pub fn forced_pose_handle(&self) -> ForcedPoseOverride {
        self.forced_pose.clone()
    }

    /// Whether the forced-pose hook is installed.
    #[must_use]
    pub fn has_forced_pose_hook(&self) -> bool {
        self.forced_pose_hook.is_some()
    }

    fn sync_forced_pose_hook(&mut self) {
        match (self.forced_pose.is_active(), self.forced_pose_hook) {
            (true, None) => {
                let handle = self.forced_pose.clone();
                let id = self.hooks.add(move |world| {
                    handle.apply(world);
                });
                self.forced_pose_hook = Some(id);
                info!("forced pose hook installed");
            }
            (false, Some(id)) => {
                self.hooks.remove(id);
                self.forced_pose_hook = None;
                info!("forced pose hook removed");
            }
            _ => {}
        }
    }

    // ==================== lifecycle ====================

    /// Register bodies and prepare the run.
    ///
    /// Unsimulatable bodies are logged, reported and left out. The run goes
    /// on with the rest.
    pub fn initialize(&mut self, bodies: Vec<BodyDescription>) -> Result<InitReport> {
        if self.state != SimulatorState::Uninitialized {
            return Err(SimError::invalid_state(
                SimulatorState::Uninitialized.to_string(),
                self.state.to_string(),
            ));
        }
        self.config.validate()?;
        self.world.clear();
        self.world.configure(&self.config)?;
        self.walkers.clear();

        let mut report = InitReport::default();
        let mut floating_chain = None;
        for desc in &bodies {
            let id = BodyId::from(self.world.body_count());
            match SimBody::from_description(id, desc) {
                Ok((body, warnings)) => {
                    if body.has_non_root_free_joint() && floating_chain.is_none() {
                        floating_chain = Some(desc.name.clone());
                    }
                    self.walkers.push(KinematicWalker::new(&body));
                    report.registered.push(self.world.add_body(body));
                    report.warnings.extend(warnings);
                }
                Err(e) => {
                    error!(body = %desc.name, "{e}");
                    report.refused.push(RefusedBody {
                        name: desc.name.clone(),
                        error: e,
                    });
                }
            }
        }

        if let Some(name) = floating_chain {
            if !self.config.record_all_link_positions {
                report.confirmation_requested = true;
                let question = format!(
                    "{name} has a free joint below its root. Record the position of every link?"
                );
                if self.confirm.confirm(&question) {
                    self.config.record_all_link_positions = true;
                }
            }
        }
        report.all_link_positions = self.config.record_all_link_positions;

        for joint in &self.extra_joints {
            match self.resolve_extra_joint(joint) {
                Some(resolved) => self.world.solver_mut().add_extra_joint(resolved),
                None => {
                    warn!(
                        body_a = %joint.body_a,
                        link_a = %joint.link_a,
                        body_b = %joint.body_b,
                        link_b = %joint.link_b,
                        "extra joint skipped: link not found"
                    );
                    report.unresolved_extra_joints.push(joint.clone());
                }
            }
        }

        if self.clear_forces_hook.is_none() {
            self.clear_forces_hook = Some(self.hooks.add(World::clear_external_forces));
        }
        self.sync_forced_pose_hook();

        self.state = SimulatorState::Initialized;
        info!(
            bodies = report.registered.len(),
            refused = report.refused.len(),
            integration = %self.config.integration_mode,
            dynamics = %self.config.dynamics_mode,
            "simulation initialized"
        );
        Ok(report)
    }

    /// Advance one tick.
    pub fn step(&mut self) -> Result<StepResult> {
        match self.state {
            SimulatorState::Initialized | SimulatorState::Stepping => {}
            state => {
                return Err(SimError::invalid_state(
                    SimulatorState::Initialized.to_string(),
                    state.to_string(),
                ));
            }
        }
        if self.world.body_count() == 0 {
            return Err(SimError::NoBodies);
        }
        self.state = SimulatorState::Stepping;
        let dt = self.config.timestep;

        // 1. Forced pose requests may come from another thread.
        self.sync_forced_pose_hook();

        // 2. Dynamics or kinematics
        let mut support_switches = 0;
        match self.config.dynamics_mode {
            DynamicsMode::ForwardDynamics => {
                self.world.refresh_high_gain_states();
                integrate_with_method(self.config.integration_mode, &mut self.world, dt)?;
            }
            DynamicsMode::Kinematics => {
                let walking = self.config.kinematic_walking;
                for (body, walker) in self.world.bodies_mut().zip(self.walkers.iter_mut()) {
                    let driven = body.apply_displacement_targets();
                    match walker {
                        Some(walker) if walking => {
                            if walker.step(body) {
                                support_switches += 1;
                            }
                        }
                        _ if driven => body.forward_kinematics(),
                        _ => {}
                    }
                }
            }
        }

        // 3. Advance time
        self.world.advance_time(dt);

        // 4. Post-dynamics hooks
        self.hooks.run(&mut self.world);

        // 5. Divergence
        self.world.check_finite()?;

        Ok(StepResult {
            time: self.world.time(),
            step: self.world.step_count(),
            contact_count: self.world.solver().last_contacts().len(),
            support_switches,
        })
    }

    /// End the run. Calling it again does nothing.
    pub fn finalize(&mut self) {
        if self.state == SimulatorState::Finalized {
            return;
        }
        if let Some(id) = self.forced_pose_hook.take() {
            self.hooks.remove(id);
        }
        self.state = SimulatorState::Finalized;
        info!(time = self.world.time(), steps = self.world.step_count(), "simulation finalized");
    }

    /// Drop every body and return to [`SimulatorState::Uninitialized`].
    /// Host hooks, handlers and extra joint specs are kept.
    pub fn clear(&mut self) {
        if let Some(id) = self.forced_pose_hook.take() {
            self.hooks.remove(id);
        }
        if let Some(id) = self.clear_forces_hook.take() {
            self.hooks.remove(id);
        }
        self.forced_pose.clear_all();
        self.world.clear();
        self.walkers.clear();
        self.state = SimulatorState::Uninitialized;
    }

    // ==================== state access ====================

    /// The world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world, for reading and writing link state between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Body by id.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&SimBody> {
        self.world.body(id)
    }

    /// Body id by name.
    #[must_use]
    pub fn find_body(&self, name: &str) -> Option<BodyId> {
        self.world.find_body(name)
    }

    /// Write the targets of a link's actuation.
    pub fn set_actuation_target(&mut self, body: BodyId, link: &str, target: Actuation) -> Result<()> {
        let body = self.world.try_body_mut(body)?;
        let index = body.link_index(link)?;
        body.set_actuation_target(index, target)
    }

    /// Add an external wrench at a link's center of mass for the next tick.
    pub fn apply_external_wrench(
        &mut self,
        body: BodyId,
        link: &str,
        force: Vector3<f64>,
        torque: Vector3<f64>,
    ) -> Result<()> {
        let body = self.world.try_body_mut(body)?;
        let index = body.link_index(link)?;
        if let Some(link) = body.link_mut(index) {
            link.add_external_wrench(&force, &torque);
        }
        Ok(())
    }

    /// Link index of the current support foot of a walking body.
    #[must_use]
    pub fn support_foot(&self, body: BodyId) -> Option<usize> {
        self.walkers
            .get(body.index())?
            .as_ref()
            .map(KinematicWalker::support_foot)
    }

    /// Constraint solver counters.
    #[must_use]
    pub fn solver_stats(&self) -> &SolverStats {
        self.world.solver().stats()
    }

    /// Simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.world.time()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, LinkDescription};
    use approx::assert_relative_eq;
    use linkdyn_types::{JointType, MassProperties, StateMode};
    use std::f64::consts::FRAC_PI_2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ball(name: &str, z: f64) -> BodyDescription {
        BodyDescription::new(name).root_pose(pose_at(0.0, 0.0, z)).link(
            LinkDescription::new("root")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::sphere(1.0, 0.1)),
        )
    }

    fn floating_chain() -> BodyDescription {
        ball("chain", 1.0).link(
            LinkDescription::new("float")
                .parent(0)
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::point_mass(0.5)),
        )
    }

    #[test]
    fn test_step_before_initialize_fails() {
        let mut sim = Simulator::default();
        let err = sim.step().unwrap_err();
        assert!(matches!(err, SimError::InvalidState { .. }));
    }

    #[test]
    fn test_step_without_bodies_fails() {
        let mut sim = Simulator::default();
        sim.initialize(vec![]).unwrap();
        assert_eq!(sim.state(), SimulatorState::Initialized);
        assert_eq!(sim.step().unwrap_err(), SimError::NoBodies);
    }

    #[test]
    fn test_lifecycle() {
        let mut sim = Simulator::default();
        sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        assert!(sim.initialize(vec![]).is_err());
        let result = sim.step().unwrap();
        assert_eq!(result.step, 1);
        assert_eq!(sim.state(), SimulatorState::Stepping);

        sim.finalize();
        sim.finalize();
        assert_eq!(sim.state(), SimulatorState::Finalized);
        assert!(sim.step().is_err());

        sim.clear();
        assert_eq!(sim.state(), SimulatorState::Uninitialized);
        assert_eq!(sim.world().body_count(), 0);
        sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        assert_relative_eq!(sim.time(), 0.0);
    }

    #[test]
    fn test_invalid_setter_keeps_old_value() {
        let mut sim = Simulator::default();
        let err = sim.set_timestep(-1.0).unwrap_err();
        assert!(err.is_config_error());
        assert_relative_eq!(sim.config().timestep, 0.001);
        assert!(sim.set_friction_range(2.0, 1.0).is_err());
        assert!(sim.set_max_iterations(0).is_err());
        sim.set_max_iterations(20).unwrap();
        assert_eq!(sim.world().solver().params().max_iterations, 20);
    }

    #[test]
    fn test_floating_chain_asks_for_confirmation() {
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&asked);
        let mut sim = Simulator::default();
        sim.set_confirm_policy(ConfirmPolicy::Ask(Box::new(move |question| {
            counter.fetch_add(1, Ordering::SeqCst);
            question.contains("chain")
        })));
        let report = sim.initialize(vec![floating_chain()]).unwrap();
        assert!(report.confirmation_requested);
        assert!(report.all_link_positions);
        assert_eq!(asked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_declined_confirmation_is_not_an_error() {
        let mut sim = Simulator::default();
        sim.set_confirm_policy(ConfirmPolicy::AlwaysNo);
        let report = sim.initialize(vec![floating_chain()]).unwrap();
        assert!(report.confirmation_requested);
        assert!(!report.all_link_positions);
        sim.step().unwrap();
    }

    #[test]
    fn test_no_question_when_recording_already_on() {
        let mut config = SimulatorConfig::default();
        config.record_all_link_positions = true;
        let mut sim = Simulator::new(config);
        let report = sim.initialize(vec![floating_chain()]).unwrap();
        assert!(!report.confirmation_requested);
    }

    #[test]
    fn test_external_force_cleared_after_tick() {
        let mut sim = Simulator::new(SimulatorConfig::default().zero_gravity());
        let report = sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        let id = report.registered[0];
        sim.apply_external_wrench(id, "root", Vector3::new(0.0, 0.0, 10.0), Vector3::zeros())
            .unwrap();
        sim.step().unwrap();
        let v1 = sim.body(id).unwrap().root().linear_velocity().z;
        assert_relative_eq!(v1, 10.0 * 0.001, epsilon = 1e-12);
        assert_relative_eq!(sim.body(id).unwrap().root().f_ext.norm(), 0.0);
        sim.step().unwrap();
        let v2 = sim.body(id).unwrap().root().linear_velocity().z;
        assert_relative_eq!(v2, v1, epsilon = 1e-12);
    }

    #[test]
    fn test_forced_pose_hook_lifecycle() {
        let mut sim = Simulator::default();
        let report = sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        let id = report.registered[0];
        assert!(!sim.has_forced_pose_hook());

        sim.set_forced_pose(id, pose_at(0.0, 0.0, 3.0));
        assert!(sim.has_forced_pose_hook());
        assert!(sim.is_forced_pose_active_for(id));
        sim.step().unwrap();
        assert_relative_eq!(sim.body(id).unwrap().root().position().z, 3.0);

        assert!(sim.clear_forced_pose(id));
        assert!(!sim.has_forced_pose_hook());
        assert!(!sim.clear_forced_pose(id));
    }

    #[test]
    fn test_remote_request_installs_hook_next_tick() {
        let mut sim = Simulator::default();
        let report = sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        let id = report.registered[0];
        let handle = sim.forced_pose_handle();
        handle.request(id, pose_at(1.0, 0.0, 2.0));
        assert!(!sim.has_forced_pose_hook());
        sim.step().unwrap();
        assert!(sim.has_forced_pose_hook());
        assert_relative_eq!(sim.body(id).unwrap().root().position().x, 1.0);
    }

    #[test]
    fn test_host_hook_runs_each_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut sim = Simulator::default();
        let hook = sim.add_post_dynamics_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        sim.step().unwrap();
        sim.step().unwrap();
        assert!(sim.remove_post_dynamics_hook(hook));
        sim.step().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_kinematics_mode_follows_displacement_targets() {
        let arm = BodyDescription::new("arm")
            .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
            .link(
                LinkDescription::new("joint")
                    .parent(0)
                    .joint(JointType::Revolute, Vector3::z())
                    .mass(MassProperties::point_mass(1.0))
                    .mode(StateMode::JOINT_DISPLACEMENT),
            );
        let mut sim = Simulator::new(SimulatorConfig::default().kinematics());
        let id = sim.initialize(vec![arm]).unwrap().registered[0];
        sim.set_actuation_target(id, "joint", Actuation::Displacement { q: 0.4, dq: 0.0 })
            .unwrap();
        sim.step().unwrap();
        assert_relative_eq!(sim.body(id).unwrap().links()[1].q, 0.4);
        assert!(sim
            .set_actuation_target(id, "joint", Actuation::Effort { effort: 1.0 })
            .is_err());
    }

    /// Kinematics mode only re-solves link poses of bodies with driven joints.
    #[test]
    fn test_kinematics_mode_skips_undriven_bodies() {
        let arm = |mode| {
            BodyDescription::new("arm")
                .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
                .link(
                    LinkDescription::new("joint")
                        .parent(0)
                        .joint(JointType::Revolute, Vector3::z())
                        .mass(MassProperties::point_mass(1.0).with_center_of_mass(Vector3::x()))
                        .mode(mode),
                )
        };
        let mut sim = Simulator::new(SimulatorConfig::default().kinematics());
        let report = sim
            .initialize(vec![arm(StateMode::empty()), arm(StateMode::JOINT_DISPLACEMENT)])
            .unwrap();
        let (passive, driven) = (report.registered[0], report.registered[1]);

        for id in [passive, driven] {
            sim.world_mut().body_mut(id).unwrap().link_mut(1).unwrap().q = FRAC_PI_2;
        }
        sim.set_actuation_target(driven, "joint", Actuation::Displacement { q: FRAC_PI_2, dq: 0.0 })
            .unwrap();
        sim.step().unwrap();

        let com = |id| sim.body(id).unwrap().links()[1].center_of_mass();
        assert_relative_eq!(com(passive).coords, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(com(driven).coords, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_unresolved_extra_joint_is_reported() {
        let mut sim = Simulator::default();
        sim.add_extra_joint(ExtraJointSpec::ball(
            ("ball", "root"),
            Point3::origin(),
            ("missing", "root"),
            Point3::origin(),
        ))
        .unwrap();
        let report = sim.initialize(vec![ball("ball", 1.0)]).unwrap();
        assert_eq!(report.unresolved_extra_joints.len(), 1);
        assert!(sim.world().solver().extra_joints().is_empty());
    }

    #[test]
    fn test_refused_body_does_not_stop_the_run() {
        let ghost = BodyDescription::new("ghost").link(LinkDescription::new("root"));
        let mut sim = Simulator::default();
        let report = sim.initialize(vec![ghost, ball("ball", 1.0)]).unwrap();
        assert_eq!(report.refused.len(), 1);
        assert!(report.refused[0].error.is_unsimulatable());
        assert_eq!(report.registered, vec![BodyId::new(0)]);
        assert_eq!(sim.find_body("ball"), Some(BodyId::new(0)));
        sim.step().unwrap();
    }
}
