//! Projected Gauss-Seidel constraint force solver.
//!
//! Each tick the driver hands the solver the contact candidates for the
//! current pose set and a [`ConstraintSpace`] describing the articulated
//! dynamics. The solver:
//!
//! 1. drops candidates whose bodies have collision detection disabled,
//! 2. culls points outside `[-culling_distance, culling_depth]`,
//! 3. resolves the pair material and runs any named collision handler,
//! 4. builds one normal row and one or two friction rows per point, plus
//!    three bilateral rows per extra joint,
//! 5. relaxes all rows with projected Gauss-Seidel until the relative
//!    impulse change drops below the error criterion or the iteration cap
//!    is reached.
//!
//! # Row targets
//!
//! ```text
//! normal:    v_n ≥ max(-e·v_n⁻, ratio·(depth - correction_depth))   (depth ≥ 0)
//!            v_n ≥ depth / h                                         (depth < 0)
//! friction:  v_t = -t·(s_a - s_b),  |λ_t| ≤ μ·λ_n,  μ ∈ [min, max]
//! extra:     v_k = -ratio·(p_a - p_b)_k
//! ```
//!
//! Reaching the iteration cap is not an error. The approximate impulses are
//! returned and the hit is counted in [`SolverStats`].

use nalgebra::{DVector, Point3, Vector2, Vector3};
use tracing::debug;

use linkdyn_types::{check_non_negative, check_positive, Result, SimError, SimulatorConfig};

use crate::contact::{ContactCandidate, ContactPoint, LinkRef, SolvedContact};
use crate::extra_joint::ExtraJointConstraint;
use crate::friction::FrictionCone;
use crate::handler::{CollisionHandler, HandlerRegistry};
use crate::material::MaterialTable;
use crate::space::ConstraintSpace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Numerical parameters of the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverParams {
    /// Lower clamp for per-pair friction coefficients.
    pub min_friction: f64,
    /// Upper clamp for per-pair friction coefficients.
    pub max_friction: f64,
    /// Maximum separation of a kept contact point.
    pub culling_distance: f64,
    /// Maximum penetration of a kept contact point.
    pub culling_depth: f64,
    /// Relative impulse change at which iteration stops.
    pub error_criterion: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Penetration left uncorrected.
    pub correction_depth: f64,
    /// Fraction of excess penetration removed per second.
    pub correction_velocity_ratio: f64,
    /// Default restitution coefficient.
    pub restitution: f64,
    /// Project constraints into the XZ plane.
    pub planar: bool,
    /// Added to every row's effective mass denominator.
    pub regularization: f64,
    /// Record the residual of every iteration.
    pub track_convergence: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self::from(&SimulatorConfig::default())
    }
}

impl From<&SimulatorConfig> for SolverParams {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            min_friction: config.min_friction_coefficient,
            max_friction: config.max_friction_coefficient,
            culling_distance: config.contact_culling_distance,
            culling_depth: config.contact_culling_depth,
            error_criterion: config.error_criterion,
            max_iterations: config.max_iterations,
            correction_depth: config.contact_correction_depth,
            correction_velocity_ratio: config.contact_correction_velocity_ratio,
            restitution: config.restitution,
            planar: config.planar,
            regularization: 1e-12,
            track_convergence: false,
        }
    }
}

impl SolverParams {
    /// Record per-iteration residuals.
    #[must_use]
    pub fn with_convergence_tracking(mut self) -> Self {
        self.track_convergence = true;
        self
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("min_friction", self.min_friction)?;
        check_non_negative("max_friction", self.max_friction)?;
        if self.min_friction > self.max_friction {
            return Err(SimError::invalid_config(
                "min_friction exceeds max_friction",
            ));
        }
        check_non_negative("culling_distance", self.culling_distance)?;
        check_non_negative("culling_depth", self.culling_depth)?;
        check_positive("error_criterion", self.error_criterion)?;
        if self.max_iterations == 0 {
            return Err(SimError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }
        check_non_negative("correction_depth", self.correction_depth)?;
        check_non_negative("correction_velocity_ratio", self.correction_velocity_ratio)?;
        check_non_negative("restitution", self.restitution)?;
        check_non_negative("regularization", self.regularization)?;
        Ok(())
    }
}

/// Collision detection enablement of one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionMode {
    /// Collide with other bodies.
    pub enabled: bool,
    /// Collide links of this body with each other.
    pub self_enabled: bool,
}

impl Default for CollisionMode {
    fn default() -> Self {
        Self {
            enabled: true,
            self_enabled: false,
        }
    }
}

/// Running counters across solves.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverStats {
    /// Number of calls to [`ConstraintForceSolver::solve`].
    pub solves: u64,
    /// Solves that stopped at the iteration cap without converging.
    pub iteration_cap_hits: u64,
    /// Iterations used by the last solve.
    pub last_iterations: usize,
    /// Final residual of the last solve.
    pub last_residual: f64,
}

/// Output of one solve.
#[derive(Debug, Clone, Default)]
pub struct SolveResult {
    /// Generalized constraint impulse per body (`Jᵀλ`, N·s).
    pub impulses: Vec<DVector<f64>>,
    /// Iterations performed.
    pub iterations: usize,
    /// Largest impulse change in the final iteration.
    pub residual: f64,
    /// Whether the error criterion was met.
    pub converged: bool,
    /// Residual per iteration, when tracking is enabled.
    pub residual_history: Vec<f64>,
    /// Number of contact points that entered the solve.
    pub contact_count: usize,
}

impl SolveResult {
    /// Generalized impulse of a body, if it has one.
    #[must_use]
    pub fn impulse(&self, body: usize) -> Option<&DVector<f64>> {
        self.impulses.get(body)
    }
}

struct Side {
    body: usize,
    jac: DVector<f64>,
    minv_jt: DVector<f64>,
}

struct Row {
    sides: Vec<Side>,
    inv_a: f64,
    target: f64,
    lambda: f64,
}

impl Row {
    fn velocity(&self, vel: &[DVector<f64>]) -> f64 {
        self.sides.iter().map(|s| s.jac.dot(&vel[s.body])).sum()
    }

    fn unclamped(&self, vel: &[DVector<f64>]) -> f64 {
        self.lambda + (self.target - self.velocity(vel)) * self.inv_a
    }

    /// Move to `lambda`, updating velocities. Returns the change.
    fn set_lambda(&mut self, vel: &mut [DVector<f64>], lambda: f64) -> f64 {
        let delta = lambda - self.lambda;
        for side in &self.sides {
            vel[side.body].axpy(delta, &side.minv_jt, 1.0);
        }
        self.lambda = lambda;
        delta
    }

    fn accumulate(&self, impulses: &mut [DVector<f64>]) {
        for side in &self.sides {
            impulses[side.body].axpy(self.lambda, &side.jac, 1.0);
        }
    }
}

struct ContactBlock {
    normal: Row,
    tangents: Vec<Row>,
    tangent_dirs: Vec<Vector3<f64>>,
    cone: FrictionCone,
    contact: usize,
}

/// Iterative contact and friction solver.
#[derive(Debug, Clone, Default)]
pub struct ConstraintForceSolver {
    params: SolverParams,
    handlers: HandlerRegistry,
    collision_modes: Vec<CollisionMode>,
    extra_joints: Vec<ExtraJointConstraint>,
    last_contacts: Vec<SolvedContact>,
    stats: SolverStats,
}

impl ConstraintForceSolver {
    /// Create a solver with the given parameters.
    #[must_use]
    pub fn new(params: SolverParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Current parameters.
    #[must_use]
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Replace all parameters after validation.
    pub fn set_params(&mut self, params: SolverParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Register a named collision handler, replacing any with that name.
    pub fn register_collision_handler(&mut self, name: impl Into<String>, handler: CollisionHandler) {
        self.handlers.register(name, handler);
    }

    /// Remove a named handler. Returns `false` if the name is unknown.
    pub fn unregister_collision_handler(&mut self, name: &str) -> bool {
        self.handlers.unregister(name)
    }

    /// Registered handlers.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Set collision detection enablement for a body index.
    pub fn set_body_collision_detection_mode(
        &mut self,
        body: usize,
        enabled: bool,
        self_enabled: bool,
    ) {
        if self.collision_modes.len() <= body {
            self.collision_modes
                .resize(body + 1, CollisionMode::default());
        }
        self.collision_modes[body] = CollisionMode {
            enabled,
            self_enabled,
        };
    }

    /// Collision detection enablement of a body index.
    #[must_use]
    pub fn collision_mode(&self, body: usize) -> CollisionMode {
        self.collision_modes.get(body).copied().unwrap_or_default()
    }

    /// Forget per-body collision modes and extra joints before a new run.
    pub fn clear_bodies(&mut self) {
        self.collision_modes.clear();
        self.extra_joints.clear();
        self.last_contacts.clear();
    }

    /// Add a loop-closing joint.
    pub fn add_extra_joint(&mut self, joint: ExtraJointConstraint) {
        self.extra_joints.push(joint);
    }

    /// Remove all loop-closing joints.
    pub fn clear_extra_joints(&mut self) {
        self.extra_joints.clear();
    }

    /// Registered loop-closing joints.
    #[must_use]
    pub fn extra_joints(&self) -> &[ExtraJointConstraint] {
        &self.extra_joints
    }

    /// Contacts resolved by the last solve.
    #[must_use]
    pub fn last_contacts(&self) -> &[SolvedContact] {
        &self.last_contacts
    }

    /// Counters across solves.
    #[must_use]
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Reset the counters.
    pub fn reset_stats(&mut self) {
        self.stats = SolverStats::default();
    }

    fn pair_enabled(&self, a: LinkRef, b: LinkRef) -> bool {
        let mode_a = self.collision_mode(a.body);
        if a.body == b.body {
            return mode_a.enabled && mode_a.self_enabled;
        }
        mode_a.enabled && self.collision_mode(b.body).enabled
    }

    /// Compute constraint impulses for one elementary step of length `dt`.
    pub fn solve(
        &mut self,
        space: &dyn ConstraintSpace,
        candidates: Vec<ContactCandidate>,
        materials: &dyn MaterialTable,
        dt: f64,
    ) -> SolveResult {
        let params = self.params;
        let body_count = space.body_count();
        let mut vel: Vec<DVector<f64>> = (0..body_count).map(|b| space.velocity(b)).collect();

        self.last_contacts.clear();
        let mut blocks = Vec::new();

        for candidate in candidates {
            let ContactCandidate {
                link_a,
                link_b,
                mut points,
            } = candidate;
            if link_a.body >= body_count || link_b.body >= body_count {
                continue;
            }
            if !self.pair_enabled(link_a, link_b) {
                continue;
            }
            points.retain(|p| p.within_culling(params.culling_distance, params.culling_depth));
            if points.is_empty() {
                continue;
            }

            let mut material = materials.material(link_a, link_b);
            if !self
                .handlers
                .dispatch(link_a, link_b, &mut points, &mut material)
            {
                continue;
            }

            let cone = FrictionCone::clamped(material.friction, params.min_friction, params.max_friction);
            let restitution = material.restitution.unwrap_or(params.restitution);
            let surface = space.surface_velocity(link_a) - space.surface_velocity(link_b);

            for point in points {
                let Some(block) = self.build_contact(
                    space,
                    &vel,
                    (link_a, link_b),
                    point,
                    cone,
                    restitution,
                    &surface,
                    dt,
                ) else {
                    continue;
                };
                blocks.push(block);
            }
        }

        let mut bilateral = self.build_extra_joint_rows(space, body_count);

        let mut history = Vec::new();
        let mut iterations = 0;
        let mut residual = 0.0;
        let mut converged = blocks.is_empty() && bilateral.is_empty();

        if !converged {
            for iteration in 1..=params.max_iterations {
                iterations = iteration;
                let mut max_delta = 0.0_f64;
                let mut max_lambda = 0.0_f64;

                for block in &mut blocks {
                    let normal = block.normal.unclamped(&vel).max(0.0);
                    let delta = block.normal.set_lambda(&mut vel, normal);
                    max_delta = max_delta.max(delta.abs());
                    max_lambda = max_lambda.max(normal);

                    match block.tangents.as_mut_slice() {
                        [t] => {
                            let friction = block.cone.project_scalar(t.unclamped(&vel), normal);
                            let delta = t.set_lambda(&mut vel, friction);
                            max_delta = max_delta.max(delta.abs());
                        }
                        [t1, t2] => {
                            let wanted = Vector2::new(t1.unclamped(&vel), t2.unclamped(&vel));
                            let friction = block.cone.project(wanted, normal);
                            let d1 = t1.set_lambda(&mut vel, friction.x);
                            let d2 = t2.set_lambda(&mut vel, friction.y);
                            max_delta = max_delta.max(d1.abs()).max(d2.abs());
                        }
                        _ => {}
                    }
                }

                for row in &mut bilateral {
                    let lambda = row.unclamped(&vel);
                    let delta = row.set_lambda(&mut vel, lambda);
                    max_delta = max_delta.max(delta.abs());
                    max_lambda = max_lambda.max(lambda.abs());
                }

                residual = max_delta;
                if params.track_convergence {
                    history.push(residual);
                }
                if max_delta <= params.error_criterion * max_lambda.max(f64::MIN_POSITIVE) {
                    converged = true;
                    break;
                }
            }
        }

        let mut impulses: Vec<DVector<f64>> = (0..body_count)
            .map(|b| DVector::zeros(space.dof_count(b)))
            .collect();
        for block in &blocks {
            block.normal.accumulate(&mut impulses);
            let mut friction = Vector3::zeros();
            for (row, dir) in block.tangents.iter().zip(&block.tangent_dirs) {
                row.accumulate(&mut impulses);
                friction += dir * row.lambda;
            }
            if let Some(contact) = self.last_contacts.get_mut(block.contact) {
                contact.normal_impulse = block.normal.lambda;
                contact.friction_impulse = friction;
            }
        }
        for row in &bilateral {
            row.accumulate(&mut impulses);
        }

        self.stats.solves += 1;
        self.stats.last_iterations = iterations;
        self.stats.last_residual = residual;
        if !converged {
            self.stats.iteration_cap_hits += 1;
            debug!(
                iterations,
                residual,
                contacts = blocks.len(),
                "constraint solver reached iteration cap"
            );
        }

        SolveResult {
            impulses,
            iterations,
            residual,
            converged,
            residual_history: history,
            contact_count: blocks.len(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_contact(
        &mut self,
        space: &dyn ConstraintSpace,
        vel: &[DVector<f64>],
        (link_a, link_b): (LinkRef, LinkRef),
        point: ContactPoint,
        cone: FrictionCone,
        restitution: f64,
        surface: &Vector3<f64>,
        dt: f64,
    ) -> Option<ContactBlock> {
        let params = self.params;
        let normal = if params.planar {
            Vector3::new(point.normal.x, 0.0, point.normal.z).try_normalize(1e-9)?
        } else {
            point.normal
        };
        let point = ContactPoint { normal, ..point };
        let at = point.position;

        let mut normal_row = build_row(space, (link_a, &at), (link_b, &at), &normal, params)?;
        normal_row.target = if point.depth < 0.0 {
            point.depth / dt
        } else {
            let approach = normal_row.velocity(vel);
            let bounce = if approach < 0.0 {
                -restitution * approach
            } else {
                0.0
            };
            let correction = if point.depth > params.correction_depth {
                params.correction_velocity_ratio * (point.depth - params.correction_depth)
            } else {
                0.0
            };
            bounce.max(correction)
        };

        let dirs = if params.planar {
            vec![Vector3::new(normal.z, 0.0, -normal.x)]
        } else {
            let (t1, t2) = tangent_basis(&normal);
            vec![t1, t2]
        };
        let mut tangents = Vec::with_capacity(dirs.len());
        let mut tangent_dirs = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if let Some(mut row) = build_row(space, (link_a, &at), (link_b, &at), &dir, params) {
                row.target = -dir.dot(surface);
                tangents.push(row);
                tangent_dirs.push(dir);
            }
        }

        self.last_contacts.push(SolvedContact {
            link_a,
            link_b,
            point,
            friction: cone.mu,
            normal_impulse: 0.0,
            friction_impulse: Vector3::zeros(),
        });

        Some(ContactBlock {
            normal: normal_row,
            tangents,
            tangent_dirs,
            cone,
            contact: self.last_contacts.len() - 1,
        })
    }

    fn build_extra_joint_rows(&self, space: &dyn ConstraintSpace, body_count: usize) -> Vec<Row> {
        let params = self.params;
        let mut rows = Vec::new();
        for joint in &self.extra_joints {
            if joint.link_a.body >= body_count || joint.link_b.body >= body_count {
                continue;
            }
            let pa = space.link_pose(joint.link_a) * joint.point_a;
            let pb = space.link_pose(joint.link_b) * joint.point_b;
            let error = pa - pb;
            for axis in 0..3 {
                if params.planar && axis == 1 {
                    continue;
                }
                let dir = Vector3::ith(axis, 1.0);
                if let Some(mut row) =
                    build_row(space, (joint.link_a, &pa), (joint.link_b, &pb), &dir, params)
                {
                    row.target = -params.correction_velocity_ratio * error[axis];
                    rows.push(row);
                }
            }
        }
        rows
    }
}

/// Build a row acting along `dir` on A and against it on B.
fn build_row(
    space: &dyn ConstraintSpace,
    (link_a, point_a): (LinkRef, &Point3<f64>),
    (link_b, point_b): (LinkRef, &Point3<f64>),
    dir: &Vector3<f64>,
    params: SolverParams,
) -> Option<Row> {
    let mut sides: Vec<Side> = Vec::with_capacity(2);
    for (link, point, sign) in [(link_a, point_a, 1.0), (link_b, point_b, -1.0)] {
        if space.dof_count(link.body) == 0 {
            continue;
        }
        let jac: DVector<f64> =
            space.point_jacobian(link, point, params.planar).transpose() * dir * sign;
        match sides.iter_mut().find(|s| s.body == link.body) {
            Some(side) => side.jac += jac,
            None => sides.push(Side {
                body: link.body,
                jac,
                minv_jt: DVector::zeros(0),
            }),
        }
    }

    let mut diagonal = 0.0;
    for side in &mut sides {
        side.minv_jt = space.solve_mass(side.body, &side.jac);
        diagonal += side.jac.dot(&side.minv_jt);
    }
    if sides.is_empty() || diagonal <= f64::EPSILON {
        return None;
    }

    Some(Row {
        sides,
        inv_a: 1.0 / (diagonal + params.regularization),
        target: 0.0,
        lambda: 0.0,
    })
}

fn tangent_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let seed = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = (seed - normal * normal.dot(&seed)).normalize();
    (t1, normal.cross(&t1))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::many_single_char_names
)]
mod tests {
    use super::*;
    use crate::material::{ContactMaterial, UniformMaterial};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Matrix3, Matrix3xX};

    /// Body 0: free rigid body (linear velocity, angular velocity about
    /// the COM). Body 1: static ground.
    struct RigidSpace {
        mass: f64,
        inertia: Matrix3<f64>,
        com: Point3<f64>,
        velocity: DVector<f64>,
    }

    impl RigidSpace {
        fn point_mass(mass: f64, velocity: Vector3<f64>) -> Self {
            Self {
                mass,
                inertia: Matrix3::identity() * 0.1,
                com: Point3::origin(),
                velocity: DVector::from_iterator(
                    6,
                    velocity.iter().copied().chain([0.0, 0.0, 0.0]),
                ),
            }
        }

        fn after(&self, result: &SolveResult) -> DVector<f64> {
            &self.velocity + self.solve_mass(0, &result.impulses[0])
        }
    }

    impl ConstraintSpace for RigidSpace {
        fn body_count(&self) -> usize {
            2
        }

        fn dof_count(&self, body: usize) -> usize {
            if body == 0 {
                6
            } else {
                0
            }
        }

        fn velocity(&self, body: usize) -> DVector<f64> {
            if body == 0 {
                self.velocity.clone()
            } else {
                DVector::zeros(0)
            }
        }

        fn link_pose(&self, _link: LinkRef) -> Isometry3<f64> {
            Isometry3::translation(self.com.x, self.com.y, self.com.z)
        }

        fn point_jacobian(&self, _link: LinkRef, point: &Point3<f64>, planar: bool) -> Matrix3xX<f64> {
            let r = point - self.com;
            let mut jac = Matrix3xX::zeros(6);
            jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
            jac.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-r.cross_matrix()));
            if planar {
                for col in [1, 3, 5] {
                    jac.column_mut(col).fill(0.0);
                }
            }
            jac
        }

        fn solve_mass(&self, _body: usize, rhs: &DVector<f64>) -> DVector<f64> {
            let lin = rhs.fixed_rows::<3>(0) / self.mass;
            let inv_i = self.inertia.try_inverse().unwrap();
            let ang = inv_i * rhs.fixed_rows::<3>(3);
            DVector::from_iterator(6, lin.iter().chain(ang.iter()).copied())
        }
    }

    fn ground_contact(at: Point3<f64>, depth: f64) -> ContactCandidate {
        ContactCandidate::new(
            LinkRef::new(0, 0),
            LinkRef::new(1, 0),
            vec![ContactPoint::new(at, Vector3::z(), depth)],
        )
    }

    fn materials(mu: f64) -> UniformMaterial {
        UniformMaterial(ContactMaterial::with_friction(mu))
    }

    #[test]
    fn test_resting_contact_cancels_approach() {
        let dt = 0.001;
        let space = RigidSpace::point_mass(2.0, Vector3::new(0.0, 0.0, -9.8 * dt));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());

        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(0.5), dt);

        assert!(result.converged);
        assert_eq!(result.contact_count, 1);
        let v = space.after(&result);
        assert_relative_eq!(v[2], 0.0, epsilon = 1e-9);
        assert_relative_eq!(solver.last_contacts()[0].normal_impulse, 2.0 * 9.8 * dt, epsilon = 1e-9);
    }

    #[test]
    fn test_separating_contact_has_no_impulse() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, 1.0));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());
        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(0.5), 0.001);
        assert!(result.converged);
        assert_relative_eq!(result.impulses[0].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_friction_clamped_to_max() {
        let dt = 0.001;
        let space = RigidSpace::point_mass(1.0, Vector3::new(1.0, 0.0, -1.0));
        let params = SolverParams {
            min_friction: 0.1,
            max_friction: 0.5,
            ..SolverParams::default()
        };
        let mut solver = ConstraintForceSolver::new(params);
        solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(5.0), dt);

        let contact = solver.last_contacts()[0];
        assert_eq!(contact.friction, 0.5);
        assert_relative_eq!(contact.normal_impulse, 1.0, epsilon = 1e-6);
        // Sliding hard: friction saturates at the clamped bound.
        assert_relative_eq!(contact.friction_impulse.norm(), 0.5, epsilon = 1e-6);
        assert!(contact.friction_impulse.x < 0.0);
    }

    #[test]
    fn test_friction_clamped_to_min() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(1.0, 0.0, -1.0));
        let params = SolverParams {
            min_friction: 0.2,
            max_friction: 1.0,
            ..SolverParams::default()
        };
        let mut solver = ConstraintForceSolver::new(params);
        solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(0.0), 0.001);
        let contact = solver.last_contacts()[0];
        assert_relative_eq!(contact.friction_impulse.norm(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_static_friction_stays_inside_cone() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -0.5));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());
        solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(0.8), 0.001);
        let contact = solver.last_contacts()[0];
        assert!(FrictionCone::new(0.8).contains(contact.friction_impulse.norm(), contact.normal_impulse));
        assert_relative_eq!(contact.friction_impulse.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_culling_drops_deep_and_distant_points() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());
        let result = solver.solve(
            &space,
            vec![
                ground_contact(Point3::origin(), 0.2),
                ground_contact(Point3::origin(), -0.1),
            ],
            &materials(0.5),
            0.001,
        );
        assert_eq!(result.contact_count, 0);
        assert!(solver.last_contacts().is_empty());
    }

    #[test]
    fn test_speculative_contact_allows_closing_the_gap() {
        let dt = 0.01;
        // 2 mm gap, approaching at 0.1 m/s: 1 mm per step, no impulse.
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -0.1));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());
        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), -0.002)], &materials(0.5), dt);
        assert_relative_eq!(result.impulses[0].norm(), 0.0, epsilon = 1e-12);

        // Approaching at 1 m/s would overshoot: limited to the gap.
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0));
        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), -0.002)], &materials(0.5), dt);
        assert_relative_eq!(space.after(&result)[2], -0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_restitution_reverses_approach() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -2.0));
        let params = SolverParams {
            restitution: 0.5,
            ..SolverParams::default()
        };
        let mut solver = ConstraintForceSolver::new(params);
        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(0.0), 0.001);
        assert_relative_eq!(space.after(&result)[2], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_position_bias_pushes_out_excess_depth() {
        let space = RigidSpace::point_mass(1.0, Vector3::zeros());
        let params = SolverParams::default();
        let mut solver = ConstraintForceSolver::new(params);
        let depth = 0.01;
        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), depth)], &materials(0.5), 0.001);
        let expected = params.correction_velocity_ratio * (depth - params.correction_depth);
        assert_relative_eq!(space.after(&result)[2], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_handler_veto_and_unregister() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());
        solver.register_collision_handler("ghost", CollisionHandler::new(|_, _, _, _| false));
        let table = UniformMaterial(ContactMaterial::default().handler("ghost"));

        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &table, 0.001);
        assert_eq!(result.contact_count, 0);

        assert!(solver.unregister_collision_handler("ghost"));
        assert!(!solver.unregister_collision_handler("ghost"));

        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &table, 0.001);
        assert_eq!(result.contact_count, 1);
    }

    #[test]
    fn test_collision_modes_filter_pairs() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.0, 0.0, -1.0));
        let mut solver = ConstraintForceSolver::new(SolverParams::default());
        solver.set_body_collision_detection_mode(1, false, false);
        let result = solver.solve(&space, vec![ground_contact(Point3::origin(), 0.0)], &materials(0.5), 0.001);
        assert_eq!(result.contact_count, 0);

        solver.set_body_collision_detection_mode(1, true, false);
        let self_contact = ContactCandidate::new(
            LinkRef::new(0, 0),
            LinkRef::new(0, 1),
            vec![ContactPoint::new(Point3::origin(), Vector3::z(), 0.0)],
        );
        let result = solver.solve(&space, vec![self_contact], &materials(0.5), 0.001);
        assert_eq!(result.contact_count, 0);
        assert!(!solver.collision_mode(0).self_enabled);
    }

    #[test]
    fn test_planar_mode_removes_out_of_plane_impulse() {
        let space = RigidSpace::point_mass(1.0, Vector3::new(0.3, 0.4, -1.0));
        let params = SolverParams {
            planar: true,
            ..SolverParams::default()
        };
        let mut solver = ConstraintForceSolver::new(params);
        let tilted = ContactCandidate::new(
            LinkRef::new(0, 0),
            LinkRef::new(1, 0),
            vec![ContactPoint::new(Point3::new(0.1, 0.2, 0.0), Vector3::new(0.0, 0.3, 1.0), 0.0)],
        );
        let result = solver.solve(&space, vec![tilted], &materials(1.0), 0.001);
        let impulse = &result.impulses[0];
        assert_relative_eq!(impulse[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(impulse[3], 0.0, epsilon = 1e-12);
        assert_relative_eq!(impulse[5], 0.0, epsilon = 1e-12);
        assert_relative_eq!(solver.last_contacts()[0].point.normal.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_three_point_support_converges() {
        let dt = 0.001;
        let mut space = RigidSpace::point_mass(4.0, Vector3::new(0.0, 0.0, -0.02));
        space.inertia = Matrix3::from_diagonal(&Vector3::new(0.03, 0.05, 0.06));
        let candidates = [(-0.2, -0.1), (0.2, -0.1), (0.0, 0.1)]
            .iter()
            .map(|&(x, y)| ground_contact(Point3::new(x, y, 0.0), 0.0))
            .collect();

        let params = SolverParams {
            error_criterion: 1e-6,
            ..SolverParams::default()
        }
        .with_convergence_tracking();
        let mut solver = ConstraintForceSolver::new(params);
        let result = solver.solve(&space, candidates, &materials(0.6), dt);

        assert!(result.converged);
        assert_eq!(result.residual_history.len(), result.iterations);
        let history = &result.residual_history;
        assert!(history.last().unwrap() < &history[0]);
        // Sweeps may wobble, but never climb over a few iterations.
        for window in history.windows(4) {
            assert!(
                window[3] <= window[0] * (1.0 + 1e-9),
                "residual rose from {} to {}",
                window[0],
                window[3]
            );
        }
        let v = space.after(&result);
        assert!(v[2] > -1e-4);
        let total: f64 = solver.last_contacts().iter().map(|c| c.normal_impulse).sum();
        assert_relative_eq!(total, 4.0 * 0.02, epsilon = 1e-4);
        for contact in solver.last_contacts() {
            assert!(contact.normal_impulse >= 0.0);
            assert!(FrictionCone::new(0.6).contains(contact.friction_impulse.norm(), contact.normal_impulse));
        }
    }

    #[test]
    fn test_iteration_cap_is_counted_not_reported() {
        let mut space = RigidSpace::point_mass(4.0, Vector3::new(0.0, 0.0, -0.5));
        space.com = Point3::new(0.0, 0.0, 0.1);
        let candidates = [(-0.2, -0.1), (0.2, -0.1), (0.0, 0.1)]
            .iter()
            .map(|&(x, y)| ground_contact(Point3::new(x, y, 0.0), 0.0))
            .collect();
        let params = SolverParams {
            max_iterations: 1,
            error_criterion: 1e-12,
            ..SolverParams::default()
        };
        let mut solver = ConstraintForceSolver::new(params);
        let result = solver.solve(&space, candidates, &materials(0.5), 0.001);

        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(solver.stats().iteration_cap_hits, 1);
        assert_eq!(solver.stats().solves, 1);
        assert!(result.impulses[0][2] > 0.0);
    }

    #[test]
    fn test_extra_joint_pulls_anchor_back() {
        let space = RigidSpace::point_mass(1.0, Vector3::zeros());
        let params = SolverParams {
            correction_velocity_ratio: 10.0,
            ..SolverParams::default()
        };
        let mut solver = ConstraintForceSolver::new(params);
        // Anchor on the body sits 0.1 above its ground anchor.
        solver.add_extra_joint(ExtraJointConstraint::ball(
            LinkRef::new(0, 0),
            Point3::new(0.0, 0.0, 0.1),
            LinkRef::new(1, 0),
            Point3::origin(),
        ));
        let result = solver.solve(&space, Vec::new(), &materials(0.5), 0.001);
        assert!(result.converged);
        let v = space.after(&result);
        assert_relative_eq!(v[2], -1.0, epsilon = 1e-6);
        assert_eq!(solver.extra_joints().len(), 1);
        solver.clear_extra_joints();
        assert!(solver.extra_joints().is_empty());
    }

    #[test]
    fn test_params_validation() {
        let mut solver = ConstraintForceSolver::default();
        let bad = SolverParams {
            max_iterations: 0,
            ..SolverParams::default()
        };
        assert!(solver.set_params(bad).is_err());
        assert_eq!(solver.params().max_iterations, 1000);
        let bad = SolverParams {
            culling_depth: -1.0,
            ..SolverParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
