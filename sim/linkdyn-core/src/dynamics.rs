//! Articulated-body dynamics of one body.
//!
//! Evaluated once per elementary integration step from the current joint
//! state (kinematics must be up to date):
//!
//! ```text
//! M(q) a = τ - b(q, v)            CRBA for M, Newton-Euler for b
//!
//! dofs split by actuation:  p = prescribed, f = free
//!   a_p  from the drive target
//!   M_ff a_f = (τ - b)_f - M_fp a_p
//! ```
//!
//! Gravity enters the Newton-Euler pass as an upward base acceleration.
//! External wrenches are subtracted from the link forces before the
//! backward pass. Constraint impulses only move free dofs; prescribed dofs
//! behave as infinitely heavy.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn, Isometry3, Matrix3, Matrix6, Vector3, Vector6, LU};
use tracing::debug;

use linkdyn_types::{Actuation, JointType};

use crate::kinematics::{dof_rate, PLANAR_LOCKED_DOFS};
use crate::model::SimBody;
use crate::spatial::{cross_force, cross_motion, spatial, spatial_inertia, wrench_at};

#[derive(Debug, Clone)]
enum Factor {
    Cholesky(Cholesky<f64, Dyn>),
    Lu(LU<f64, Dyn, Dyn>),
}

impl Factor {
    fn new(matrix: DMatrix<f64>) -> Self {
        match Cholesky::new(matrix.clone()) {
            Some(chol) => Self::Cholesky(chol),
            None => {
                debug!(size = matrix.nrows(), "mass matrix not positive definite, using LU");
                Self::Lu(matrix.lu())
            }
        }
    }

    fn solve(&self, rhs: &DVector<f64>) -> Option<DVector<f64>> {
        match self {
            Self::Cholesky(chol) => Some(chol.solve(rhs)),
            Self::Lu(lu) => lu.solve(rhs),
        }
    }
}

/// Dynamics of one body at one state.
#[derive(Debug, Clone)]
pub struct BodyDynamics {
    /// Joint-space mass matrix.
    pub mass_matrix: DMatrix<f64>,
    /// Coriolis, centrifugal, gravity and external-wrench terms.
    pub bias: DVector<f64>,
    /// Applied joint efforts.
    pub tau: DVector<f64>,
    /// Acceleration ignoring constraints.
    pub accel: DVector<f64>,
    prescribed: Vec<bool>,
    free: Vec<usize>,
    factor: Option<Factor>,
}

impl BodyDynamics {
    /// Evaluate the body at its current state.
    ///
    /// `dt` converts drive targets into accelerations that reach them in one
    /// step. `planar` locks the out-of-plane dofs of free joints.
    #[must_use]
    pub fn evaluate(body: &SimBody, gravity: &Vector3<f64>, dt: f64, planar: bool) -> Self {
        let nv = body.nv();
        let mass_matrix = mass_matrix(body);
        let bias = bias_forces(body, gravity);

        let mut tau = DVector::zeros(nv);
        let mut prescribed = vec![false; nv];
        let mut accel = DVector::zeros(nv);

        for link in body.links() {
            let dofs = link.dofs();
            if dofs.is_empty() {
                continue;
            }
            let s = dofs.start;
            match link.actuation {
                Actuation::Effort { effort } => tau[s] = effort,
                Actuation::Displacement { q, .. } => {
                    prescribed[s] = true;
                    accel[s] = ((q - link.q) / dt - link.dq) / dt;
                }
                Actuation::Velocity { dq } => {
                    prescribed[s] = true;
                    accel[s] = (dq - link.dq) / dt;
                }
                Actuation::HighGain { ddq, .. } => {
                    prescribed[s] = true;
                    accel[s] = ddq;
                }
                Actuation::LinkPose { pose, .. } if link.joint_type == JointType::Free => {
                    let parent = link
                        .parent
                        .map_or_else(Isometry3::identity, |p| body.links()[p].pose);
                    let target = (parent * link.offset).inverse() * pose;
                    let lin = (target.translation.vector - link.free_pose.translation.vector) / dt;
                    let ang = (target.rotation * link.free_pose.rotation.inverse()).scaled_axis() / dt;
                    let desired = Vector6::new(lin.x, lin.y, lin.z, ang.x, ang.y, ang.z);
                    for k in 0..6 {
                        prescribed[s + k] = true;
                        accel[s + k] = (desired[k] - link.free_velocity[k]) / dt;
                    }
                }
                Actuation::LinkPose { .. } => {
                    for k in dofs {
                        prescribed[k] = true;
                        accel[k] = -dof_rate(link, k - s) / dt;
                    }
                }
                Actuation::Passive | Actuation::Track { .. } => {}
            }
            if planar && link.joint_type == JointType::Free {
                for k in PLANAR_LOCKED_DOFS {
                    if !prescribed[s + k] {
                        prescribed[s + k] = true;
                        accel[s + k] = -link.free_velocity[k] / dt;
                    }
                }
            }
        }

        let free: Vec<usize> = (0..nv).filter(|&i| !prescribed[i]).collect();
        let mut factor = None;
        if !free.is_empty() {
            let mff = mass_matrix.select_rows(&free).select_columns(&free);
            let mut rhs = DVector::from_iterator(free.len(), free.iter().map(|&i| tau[i] - bias[i]));
            for (row, &i) in free.iter().enumerate() {
                for j in (0..nv).filter(|&j| prescribed[j]) {
                    rhs[row] -= mass_matrix[(i, j)] * accel[j];
                }
            }
            let f = Factor::new(mff);
            if let Some(af) = f.solve(&rhs) {
                for (row, &i) in free.iter().enumerate() {
                    accel[i] = af[row];
                }
            } else {
                debug!(body = body.name(), "singular mass matrix, free dofs left unaccelerated");
            }
            factor = Some(f);
        }

        Self {
            mass_matrix,
            bias,
            tau,
            accel,
            prescribed,
            free,
            factor,
        }
    }

    /// Apply the inverse mass matrix of the free dofs to `rhs`. Prescribed
    /// dofs get zero.
    #[must_use]
    pub fn solve_mass(&self, rhs: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(rhs.len());
        let Some(factor) = &self.factor else {
            return out;
        };
        let reduced = DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| rhs[i]));
        if let Some(x) = factor.solve(&reduced) {
            for (row, &i) in self.free.iter().enumerate() {
                out[i] = x[row];
            }
        }
        out
    }

    /// Whether a dof is driven by its actuation.
    #[must_use]
    pub fn is_prescribed(&self, dof: usize) -> bool {
        self.prescribed.get(dof).copied().unwrap_or(false)
    }

    /// Number of dofs left to dynamics.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

/// World-frame spatial inertia of every link.
fn link_inertias(body: &SimBody) -> Vec<Matrix6<f64>> {
    body.links()
        .iter()
        .map(|link| {
            let r = link.pose.rotation.to_rotation_matrix();
            let ic: Matrix3<f64> = r.matrix() * link.mass.inertia * r.matrix().transpose();
            spatial_inertia(link.mass.mass, &link.center_of_mass().coords, &ic)
        })
        .collect()
}

/// Joint-space mass matrix by the composite-rigid-body algorithm.
#[must_use]
pub fn mass_matrix(body: &SimBody) -> DMatrix<f64> {
    let nv = body.nv();
    let mut m = DMatrix::zeros(nv, nv);
    if nv == 0 {
        return m;
    }
    let links = body.links();
    let mut composite = link_inertias(body);
    for i in (1..links.len()).rev() {
        if let Some(p) = links[i].parent {
            let child = composite[i];
            composite[p] += child;
        }
    }

    for (k, link) in links.iter().enumerate() {
        for i in link.dofs() {
            let force = composite[k] * body.cdof[i];
            let mut ancestor = Some(k);
            while let Some(j) = ancestor {
                for d in links[j].dofs() {
                    let value = body.cdof[d].dot(&force);
                    m[(i, d)] = value;
                    m[(d, i)] = value;
                }
                ancestor = links[j].parent;
            }
        }
    }
    m
}

/// Bias forces `b(q, v)` by recursive Newton-Euler with zero joint
/// acceleration.
#[must_use]
pub fn bias_forces(body: &SimBody, gravity: &Vector3<f64>) -> DVector<f64> {
    let nv = body.nv();
    let mut bias = DVector::zeros(nv);
    if nv == 0 {
        return bias;
    }
    let links = body.links();
    let inertias = link_inertias(body);
    let base = spatial(&Vector3::zeros(), &(-gravity));

    let mut accel: Vec<Vector6<f64>> = Vec::with_capacity(links.len());
    let mut force: Vec<Vector6<f64>> = Vec::with_capacity(links.len());
    for (k, link) in links.iter().enumerate() {
        let (parent_accel, parent_velocity) = match link.parent {
            Some(p) => (accel[p], links[p].velocity),
            None => (base, Vector6::zeros()),
        };
        // Free joint axes turn with the joint frame but not with the
        // joint's own rotation.
        let mut carrier = parent_velocity;
        if link.joint_type.is_free() {
            for (t, d) in link.dofs().take(3).enumerate() {
                carrier += body.cdof[d] * link.free_velocity[t];
            }
        }
        let mut a = parent_accel;
        for (n, d) in link.dofs().enumerate() {
            a += cross_motion(&carrier, &body.cdof[d]) * dof_rate(link, n);
        }
        let inertia = inertias[k];
        let v = link.velocity;
        let external = wrench_at(&link.center_of_mass().coords, &link.f_ext, &link.tau_ext);
        force.push(inertia * a + cross_force(&v, &(inertia * v)) - external);
        accel.push(a);
    }

    for k in (0..links.len()).rev() {
        for d in links[k].dofs() {
            bias[d] = body.cdof[d].dot(&force[k]);
        }
        if let Some(p) = links[k].parent {
            let child = force[k];
            force[p] += child;
        }
    }
    bias
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, BodyDescription, LinkDescription};
    use approx::assert_relative_eq;
    use linkdyn_types::{BodyId, MassProperties, StateMode};

    fn gravity() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -9.8)
    }

    fn ball(mass: f64) -> SimBody {
        let desc = BodyDescription::new("ball")
            .root_pose(pose_at(0.0, 0.0, 1.0))
            .link(
                LinkDescription::new("root")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::sphere(mass, 0.1)),
            );
        SimBody::from_description(BodyId::new(0), &desc).unwrap().0
    }

    fn pendulum(mode: StateMode) -> SimBody {
        let desc = BodyDescription::new("pendulum")
            .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
            .link(
                LinkDescription::new("arm")
                    .parent(0)
                    .joint(JointType::Revolute, Vector3::y())
                    .mass(MassProperties::point_mass(2.0).with_center_of_mass(Vector3::new(0.5, 0.0, 0.0)))
                    .mode(mode),
            );
        SimBody::from_description(BodyId::new(0), &desc).unwrap().0
    }

    #[test]
    fn test_free_body_mass_matrix() {
        let body = ball(2.0);
        let m = mass_matrix(&body);
        let i = 0.4 * 2.0 * 0.01;
        for k in 0..3 {
            assert_relative_eq!(m[(k, k)], 2.0, epsilon = 1e-12);
            assert_relative_eq!(m[(k + 3, k + 3)], i, epsilon = 1e-12);
        }
        // Rotation about the origin of a centered body does not couple.
        assert_relative_eq!(m[(0, 4)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall_acceleration() {
        let body = ball(3.0);
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.001, false);
        assert_relative_eq!(dynamics.accel[2], -9.8, epsilon = 1e-12);
        assert_relative_eq!(dynamics.accel[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(dynamics.accel[5], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_external_force_cancels_gravity() {
        let mut body = ball(3.0);
        body.links[0].add_external_wrench(&Vector3::new(0.0, 0.0, 3.0 * 9.8), &Vector3::zeros());
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.001, false);
        assert_relative_eq!(dynamics.accel.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_horizontal_pendulum_gravity_torque() {
        let body = pendulum(StateMode::empty());
        let m = mass_matrix(&body);
        assert_relative_eq!(m[(0, 0)], 2.0 * 0.25, epsilon = 1e-12);
        // Arm along +x, axis +y: gravity torque m g l about y is +9.8.
        let b = bias_forces(&body, &gravity());
        assert_relative_eq!(b[0], -2.0 * 9.8 * 0.5, epsilon = 1e-12);
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.001, false);
        assert_relative_eq!(dynamics.accel[0], 9.8 / 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_centripetal_bias_of_spinning_arm() {
        let mut body = pendulum(StateMode::empty());
        body.links[1].dq = 3.0;
        body.forward_kinematics();
        // Spinning about its own axis at constant rate needs no torque.
        let b = bias_forces(&body, &Vector3::zeros());
        assert_relative_eq!(b[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_drive_reaches_target_in_one_step() {
        let mut body = pendulum(StateMode::JOINT_VELOCITY);
        body.set_actuation_target(1, Actuation::Velocity { dq: 2.0 }).unwrap();
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.01, false);
        assert_relative_eq!(dynamics.accel[0], 200.0, epsilon = 1e-9);
        assert!(dynamics.is_prescribed(0));
        assert_eq!(dynamics.free_count(), 0);
        assert_relative_eq!(dynamics.solve_mass(&DVector::from_element(1, 1.0))[0], 0.0);
    }

    #[test]
    fn test_displacement_drive() {
        let mut body = pendulum(StateMode::JOINT_DISPLACEMENT);
        body.set_actuation_target(1, Actuation::Displacement { q: 0.01, dq: 0.0 })
            .unwrap();
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.1, false);
        assert_relative_eq!(dynamics.accel[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_planar_mode_locks_out_of_plane_dofs() {
        let mut body = ball(1.0);
        body.links[0].free_velocity = Vector6::new(0.0, 0.5, 0.0, 0.2, 0.0, 0.0);
        body.forward_kinematics();
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.01, true);
        assert!(dynamics.is_prescribed(1));
        assert!(dynamics.is_prescribed(3));
        assert!(!dynamics.is_prescribed(2));
        assert_relative_eq!(dynamics.accel[1], -50.0, epsilon = 1e-12);
        assert_relative_eq!(dynamics.accel[3], -20.0, epsilon = 1e-12);
        assert_relative_eq!(dynamics.accel[2], -9.8, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_mass_inverts_free_block() {
        let body = ball(2.0);
        let dynamics = BodyDynamics::evaluate(&body, &gravity(), 0.001, false);
        let rhs = DVector::from_vec(vec![2.0, 0.0, 4.0, 0.0, 0.0, 0.0]);
        let x = dynamics.solve_mass(&rhs);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 2.0, epsilon = 1e-12);
    }
}
