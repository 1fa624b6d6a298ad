//! Forward kinematics, motion subspaces and point Jacobians.
//!
//! Link poses are composed root to tip:
//!
//! ```text
//! pose(child) = pose(parent) · offset · joint(q)
//! ```
//!
//! Each pass also refreshes the motion subspace columns (`cdof`) of every
//! degree of freedom. They are the link's spatial velocity per unit joint
//! rate, referenced to the world origin, and feed both the velocity
//! recursion and the dynamics.

use nalgebra::{Isometry3, Matrix3xX, Point3, Translation3, Unit, UnitQuaternion, Vector3, Vector6};
use smallvec::SmallVec;

use linkdyn_types::{JointType, Twist};

use crate::model::{Link, SimBody};
use crate::spatial::{angular, point_velocity, spatial};

/// Up to six motion subspace columns of one joint.
pub type Subspace = SmallVec<[Vector6<f64>; 6]>;

/// Free joint dofs removed by planar mode: Y translation, X and Z rotation.
pub const PLANAR_LOCKED_DOFS: [usize; 3] = [1, 3, 5];

/// Transform across a joint at its current position.
#[must_use]
pub fn joint_local(link: &Link) -> Isometry3<f64> {
    match link.joint_type {
        JointType::Revolute => Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(&Unit::new_unchecked(link.joint_axis), link.q),
        ),
        JointType::Prismatic => Isometry3::from_parts(
            Translation3::from(link.joint_axis * link.q),
            UnitQuaternion::identity(),
        ),
        JointType::Free => link.free_pose,
        JointType::Fixed | JointType::ContinuousTrack => Isometry3::identity(),
    }
}

/// Motion subspace of a joint whose frame is at `frame` in the world and
/// whose child origin is at `origin`.
///
/// Free joints list translation dofs first, then rotation dofs about the
/// child origin, all along the joint frame axes.
#[must_use]
pub fn motion_subspace(link: &Link, frame: &Isometry3<f64>, origin: &Vector3<f64>) -> Subspace {
    let mut columns = Subspace::new();
    match link.joint_type {
        JointType::Revolute => {
            let a = frame.rotation * link.joint_axis;
            columns.push(spatial(&a, &origin.cross(&a)));
        }
        JointType::Prismatic => {
            let a = frame.rotation * link.joint_axis;
            columns.push(spatial(&Vector3::zeros(), &a));
        }
        JointType::Free => {
            let r = frame.rotation.to_rotation_matrix();
            for i in 0..3 {
                columns.push(spatial(&Vector3::zeros(), &r.matrix().column(i).into_owned()));
            }
            for i in 0..3 {
                let a = r.matrix().column(i).into_owned();
                columns.push(spatial(&a, &origin.cross(&a)));
            }
        }
        JointType::Fixed | JointType::ContinuousTrack => {}
    }
    columns
}

/// Rate of the `k`th dof of a link.
#[inline]
pub(crate) fn dof_rate(link: &Link, k: usize) -> f64 {
    if link.joint_type.is_free() {
        link.free_velocity[k]
    } else {
        link.dq
    }
}

impl SimBody {
    /// Recompute link poses, spatial velocities and motion subspaces from
    /// the joint state, starting at the root.
    pub fn forward_kinematics(&mut self) {
        self.cdof.resize(self.nv, Vector6::zeros());
        for i in 0..self.links.len() {
            let (parent_pose, parent_velocity) = match self.links[i].parent {
                Some(p) => (self.links[p].pose, self.links[p].velocity),
                None => (Isometry3::identity(), Vector6::zeros()),
            };
            let link = &mut self.links[i];
            let frame = parent_pose * link.offset;
            link.pose = frame * joint_local(link);

            let origin = link.pose.translation.vector;
            let mut velocity = parent_velocity;
            for (k, column) in motion_subspace(link, &frame, &origin)
                .iter()
                .take(link.dof_count)
                .enumerate()
            {
                velocity += column * dof_rate(link, k);
                self.cdof[link.dof_start + k] = *column;
            }
            link.velocity = velocity;
        }
    }

    /// Motion subspace column of a generalized velocity index, as of the last
    /// kinematics pass.
    #[must_use]
    pub fn motion_column(&self, dof: usize) -> Option<&Vector6<f64>> {
        self.cdof.get(dof)
    }

    /// Indices of a link and all its ancestors, tip first.
    #[must_use]
    pub fn chain_to_root(&self, link: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = Some(link);
        while let Some(index) = current {
            chain.push(index);
            current = self.links[index].parent;
        }
        chain
    }

    /// 3 x nv Jacobian of the world velocity of `point`, rigidly attached to
    /// `link`. With `planar`, the out-of-plane columns of free joints are
    /// zero.
    #[must_use]
    pub fn point_jacobian(&self, link: usize, point: &Point3<f64>, planar: bool) -> Matrix3xX<f64> {
        let mut jac = Matrix3xX::zeros(self.nv);
        if link >= self.links.len() {
            return jac;
        }
        for index in self.chain_to_root(link) {
            let l = &self.links[index];
            for k in 0..l.dof_count {
                if planar && l.joint_type.is_free() && PLANAR_LOCKED_DOFS.contains(&k) {
                    continue;
                }
                let column = &self.cdof[l.dof_start + k];
                jac.set_column(l.dof_start + k, &point_velocity(column, &point.coords));
            }
        }
        jac
    }

    /// World velocity of a point rigidly attached to a link.
    #[must_use]
    pub fn point_velocity(&self, link: usize, point: &Point3<f64>) -> Vector3<f64> {
        self.links
            .get(link)
            .map_or_else(Vector3::zeros, |l| point_velocity(&l.velocity, &point.coords))
    }
}

/// Kinematic chain rooted at an arbitrary link.
///
/// Poses are solved holding the base link fixed in the world: the chain
/// from the base up to the body root is walked in reverse to place the
/// root, then ordinary forward kinematics fills in every other link. A
/// free root joint is given the velocity that keeps the base link still.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTraverse {
    base: usize,
    path: Vec<usize>,
}

impl LinkTraverse {
    /// Chain rooted at `base`.
    #[must_use]
    pub fn new(body: &SimBody, base: usize) -> Self {
        Self {
            base,
            path: body.chain_to_root(base),
        }
    }

    /// Base link index.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Links from the base up to the body root.
    #[must_use]
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Solve poses keeping the base link at `base_pose`.
    pub fn calc_forward_kinematics(&self, body: &mut SimBody, base_pose: &Isometry3<f64>) {
        let mut pose = *base_pose;
        for &index in &self.path {
            let link = &body.links[index];
            if link.parent.is_none() {
                break;
            }
            pose = pose * (link.offset * joint_local(link)).inverse();
        }
        body.place_root(&pose);
        body.forward_kinematics();

        if body.links[0].joint_type.is_free() && !body.is_static {
            // Cancel the base velocity produced by the joint rates.
            let v = body.links[0].velocity - body.links[self.base].velocity;
            let root_pose = body.root_world_pose();
            let twist = Twist::new(
                point_velocity(&v, &root_pose.translation.vector),
                angular(&v),
            );
            body.set_root_state(&root_pose, &twist);
            body.forward_kinematics();
        }
    }
}

impl SimBody {
    /// Place the root link at a world pose, keeping its joint velocity.
    pub(crate) fn place_root(&mut self, pose: &Isometry3<f64>) {
        let root = &mut self.links[0];
        if root.joint_type.is_free() {
            root.free_pose = root.offset.inverse() * pose;
        } else {
            root.offset = *pose;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, BodyDescription, LinkDescription};
    use approx::assert_relative_eq;
    use linkdyn_types::{BodyId, MassProperties};
    use nalgebra::DVector;
    use std::f64::consts::FRAC_PI_2;

    fn arm() -> SimBody {
        let desc = BodyDescription::new("arm")
            .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
            .link(
                LinkDescription::new("upper")
                    .parent(0)
                    .joint(JointType::Revolute, Vector3::z())
                    .mass(MassProperties::point_mass(1.0)),
            )
            .link(
                LinkDescription::new("lower")
                    .parent(1)
                    .joint(JointType::Revolute, Vector3::z())
                    .offset_translation(1.0, 0.0, 0.0)
                    .mass(MassProperties::point_mass(1.0)),
            );
        SimBody::from_description(BodyId::new(0), &desc).unwrap().0
    }

    #[test]
    fn test_planar_arm_pose() {
        let mut body = arm();
        body.links[1].q = FRAC_PI_2;
        body.forward_kinematics();
        let tip = body.links[2].position();
        assert_relative_eq!(tip, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_matches_jacobian() {
        let mut body = arm();
        body.links[1].q = 0.3;
        body.links[2].q = -0.7;
        body.set_velocity(&DVector::from_vec(vec![0.5, 1.5])).unwrap();
        body.forward_kinematics();

        let tip = Point3::new(0.2, 0.1, 0.0) + body.links[2].pose.translation.vector;
        let from_links = body.point_velocity(2, &tip);
        let from_jacobian = body.point_jacobian(2, &tip, false) * body.velocity();
        assert_relative_eq!(from_links, from_jacobian, epsilon = 1e-12);
    }

    #[test]
    fn test_free_joint_velocity_is_world_twist() {
        let desc = BodyDescription::new("ball")
            .root_pose(pose_at(1.0, 2.0, 3.0))
            .root_twist(Twist::new(Vector3::new(0.0, 0.0, -1.0), Vector3::new(0.0, 0.0, 2.0)))
            .link(
                LinkDescription::new("root")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::sphere(1.0, 0.1)),
            );
        let (body, _) = SimBody::from_description(BodyId::new(0), &desc).unwrap();
        let root = body.root();
        assert_relative_eq!(root.linear_velocity(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
        assert_relative_eq!(root.angular_velocity(), Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_planar_jacobian_drops_out_of_plane_columns() {
        let desc = BodyDescription::new("ball").link(
            LinkDescription::new("root")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::sphere(1.0, 0.1)),
        );
        let (body, _) = SimBody::from_description(BodyId::new(0), &desc).unwrap();
        let jac = body.point_jacobian(0, &Point3::new(0.0, 0.0, -0.1), true);
        for k in PLANAR_LOCKED_DOFS {
            assert_eq!(jac.column(k).norm(), 0.0);
        }
        assert!(jac.column(0).norm() > 0.0);
    }

    #[test]
    fn test_traverse_holds_base_link() {
        let desc = BodyDescription::new("walker")
            .root_pose(pose_at(0.0, 0.0, 1.0))
            .link(
                LinkDescription::new("waist")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::point_mass(1.0)),
            )
            .link(
                LinkDescription::new("leg")
                    .parent(0)
                    .joint(JointType::Prismatic, Vector3::z())
                    .offset_translation(0.0, 0.0, -0.9)
                    .mass(MassProperties::point_mass(0.1)),
            );
        let (mut body, _) = SimBody::from_description(BodyId::new(0), &desc).unwrap();
        let traverse = LinkTraverse::new(&body, 1);
        assert_eq!(traverse.path(), &[1, 0]);

        let foot = body.links[1].pose;
        body.links[1].q = -0.2;
        body.links[1].dq = -1.0;
        traverse.calc_forward_kinematics(&mut body, &foot);

        assert_relative_eq!(body.links[1].position(), Point3::new(0.0, 0.0, 0.1), epsilon = 1e-12);
        assert_relative_eq!(body.root().position().z, 1.2, epsilon = 1e-12);
        assert_relative_eq!(body.links[1].linear_velocity(), Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(body.root().linear_velocity().z, 1.0, epsilon = 1e-12);
    }
}
