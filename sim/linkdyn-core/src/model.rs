//! Articulated body model.
//!
//! A [`BodyDescription`] is the plain data a caller hands in: a tree of
//! links ordered parent before child, each attached by one joint.
//! [`SimBody::from_description`] validates it, classifies the actuation of
//! every link and lays out the generalized coordinates:
//!
//! ```text
//! joint         dofs   generalized velocity
//! Fixed         0      -
//! Revolute      1      dq (rad/s)
//! Prismatic     1      dq (m/s)
//! Free          6      [v; ω] in the joint frame axes
//! ContinuousTrack 0    -
//! ```
//!
//! Static bodies carry no dofs at all. They are positioned once and act as
//! immovable scenery for the constraint solver.

use std::ops::Range;

use nalgebra::{DVector, Isometry3, Point3, Translation3, UnitQuaternion, Vector3, Vector6};
use tracing::warn;

use linkdyn_types::{
    Actuation, BodyId, JointType, MassProperties, Result, SimError, StateMode, Twist,
};

use crate::classify::{classify_link, ActuationWarning};
use crate::spatial::{angular, point_velocity};

/// Plain description of one link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDescription {
    /// Unique name within the body.
    pub name: String,
    /// Index of the parent link; `None` for the root.
    pub parent: Option<usize>,
    /// Joint connecting the link to its parent.
    pub joint_type: JointType,
    /// Joint axis in the joint frame.
    pub joint_axis: Vector3<f64>,
    /// Joint frame relative to the parent link frame.
    pub offset: Isometry3<f64>,
    /// Mass properties.
    pub mass: MassProperties,
    /// Declared actuation mode.
    pub state_mode: StateMode,
    /// Initial joint displacement.
    pub q: f64,
    /// Initial joint rate.
    pub dq: f64,
}

impl LinkDescription {
    /// A massless fixed link with no parent.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            joint_type: JointType::Fixed,
            joint_axis: Vector3::z(),
            offset: Isometry3::identity(),
            mass: MassProperties::default(),
            state_mode: StateMode::empty(),
            q: 0.0,
            dq: 0.0,
        }
    }

    /// Attach to a parent link.
    #[must_use]
    pub fn parent(mut self, index: usize) -> Self {
        self.parent = Some(index);
        self
    }

    /// Set the joint type and axis.
    #[must_use]
    pub fn joint(mut self, joint_type: JointType, axis: Vector3<f64>) -> Self {
        self.joint_type = joint_type;
        self.joint_axis = axis;
        self
    }

    /// Set the joint frame relative to the parent.
    #[must_use]
    pub fn offset(mut self, offset: Isometry3<f64>) -> Self {
        self.offset = offset;
        self
    }

    /// Set the joint frame to a pure translation from the parent.
    #[must_use]
    pub fn offset_translation(mut self, x: f64, y: f64, z: f64) -> Self {
        self.offset = Isometry3::translation(x, y, z);
        self
    }

    /// Set the mass properties.
    #[must_use]
    pub fn mass(mut self, mass: MassProperties) -> Self {
        self.mass = mass;
        self
    }

    /// Set the declared actuation mode.
    #[must_use]
    pub fn mode(mut self, mode: StateMode) -> Self {
        self.state_mode = mode;
        self
    }

    /// Set the initial joint state.
    #[must_use]
    pub fn initial(mut self, q: f64, dq: f64) -> Self {
        self.q = q;
        self.dq = dq;
        self
    }
}

/// Plain description of one body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDescription {
    /// Body name, used for lookups and log messages.
    pub name: String,
    /// Immovable scenery.
    pub is_static: bool,
    /// Name of a body this one is attached to. Attached bodies cannot be
    /// simulated and are refused.
    pub parent_body: Option<String>,
    /// Initial root link pose.
    pub root_pose: Isometry3<f64>,
    /// Initial root link velocity, world frame.
    pub root_twist: Twist,
    /// Links, parent before child.
    pub links: Vec<LinkDescription>,
    /// Names of the links that may serve as support feet.
    pub feet: Vec<String>,
    /// Collide with other bodies.
    pub collision_enabled: bool,
    /// Collide links of this body with each other.
    pub self_collision_enabled: bool,
}

impl BodyDescription {
    /// A dynamic body with no links.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            parent_body: None,
            root_pose: Isometry3::identity(),
            root_twist: Twist::zero(),
            links: Vec::new(),
            feet: Vec::new(),
            collision_enabled: true,
            self_collision_enabled: false,
        }
    }

    /// A static body with no links.
    #[must_use]
    pub fn static_body(name: impl Into<String>) -> Self {
        Self {
            is_static: true,
            ..Self::new(name)
        }
    }

    /// Append a link.
    #[must_use]
    pub fn link(mut self, link: LinkDescription) -> Self {
        self.links.push(link);
        self
    }

    /// Set the initial root pose.
    #[must_use]
    pub fn root_pose(mut self, pose: Isometry3<f64>) -> Self {
        self.root_pose = pose;
        self
    }

    /// Set the initial root velocity.
    #[must_use]
    pub fn root_twist(mut self, twist: Twist) -> Self {
        self.root_twist = twist;
        self
    }

    /// Attach to another body.
    #[must_use]
    pub fn attached_to(mut self, parent: impl Into<String>) -> Self {
        self.parent_body = Some(parent.into());
        self
    }

    /// Declare the support feet for kinematic walking.
    #[must_use]
    pub fn feet<I, S>(mut self, feet: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feet = feet.into_iter().map(Into::into).collect();
        self
    }

    /// Set collision enablement.
    #[must_use]
    pub fn collision(mut self, enabled: bool, self_enabled: bool) -> Self {
        self.collision_enabled = enabled;
        self.self_collision_enabled = self_enabled;
        self
    }

    /// Sum of link masses.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.links.iter().map(|l| l.mass.mass).sum()
    }
}

/// Runtime state of one link.
#[derive(Debug, Clone)]
pub struct Link {
    /// Link name.
    pub name: String,
    /// Parent link index.
    pub parent: Option<usize>,
    /// Joint type, after any legacy track upgrade.
    pub joint_type: JointType,
    /// Unit joint axis in the joint frame.
    pub joint_axis: Vector3<f64>,
    /// Joint frame relative to the parent link frame.
    pub offset: Isometry3<f64>,
    /// Mass properties.
    pub mass: MassProperties,
    /// Declared actuation mode.
    pub state_mode: StateMode,
    /// Joint displacement.
    pub q: f64,
    /// Joint rate.
    pub dq: f64,
    /// Joint acceleration of the last evaluation.
    pub ddq: f64,
    /// Free joint pose relative to the joint frame.
    pub free_pose: Isometry3<f64>,
    /// Free joint velocity `[v; ω]` in the joint frame axes.
    pub free_velocity: Vector6<f64>,
    /// Free joint acceleration of the last evaluation.
    pub free_acceleration: Vector6<f64>,
    /// World pose.
    pub pose: Isometry3<f64>,
    /// Spatial velocity `[ω; vo]` referenced to the world origin.
    pub velocity: Vector6<f64>,
    /// External force at the center of mass, world frame.
    pub f_ext: Vector3<f64>,
    /// External torque, world frame.
    pub tau_ext: Vector3<f64>,
    pub(crate) actuation: Actuation,
    pub(crate) dof_start: usize,
    pub(crate) dof_count: usize,
}

impl Link {
    /// Classified actuation with its current targets.
    #[must_use]
    pub fn actuation(&self) -> &Actuation {
        &self.actuation
    }

    /// Generalized velocity indices owned by this link's joint.
    #[must_use]
    pub fn dofs(&self) -> Range<usize> {
        self.dof_start..self.dof_start + self.dof_count
    }

    /// World position of the link origin.
    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    /// World angular velocity.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        angular(&self.velocity)
    }

    /// World linear velocity of the link origin.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        point_velocity(&self.velocity, &self.pose.translation.vector)
    }

    /// World center of mass.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3<f64> {
        self.pose * Point3::from(self.mass.center_of_mass)
    }

    /// Accumulate an external wrench acting at the center of mass.
    pub fn add_external_wrench(&mut self, force: &Vector3<f64>, torque: &Vector3<f64>) {
        self.f_ext += force;
        self.tau_ext += torque;
    }

    fn is_finite(&self) -> bool {
        let pose_ok = self.pose.translation.vector.iter().all(|x| x.is_finite())
            && self.pose.rotation.coords.iter().all(|x| x.is_finite());
        pose_ok
            && self.q.is_finite()
            && self.dq.is_finite()
            && self.velocity.iter().all(|x| x.is_finite())
    }
}

/// Position of one joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointPosition {
    /// Joint without position state.
    None,
    /// Scalar displacement.
    Scalar(f64),
    /// Relative pose of a free joint.
    Pose(Isometry3<f64>),
}

/// Simulation-ready articulated body.
#[derive(Debug, Clone)]
pub struct SimBody {
    pub(crate) id: BodyId,
    pub(crate) name: String,
    pub(crate) is_static: bool,
    pub(crate) links: Vec<Link>,
    pub(crate) nv: usize,
    pub(crate) cdof: Vec<Vector6<f64>>,
    pub(crate) high_gain_links: Vec<usize>,
    pub(crate) feet: Vec<usize>,
    pub(crate) has_non_root_free_joint: bool,
    pub(crate) collision_enabled: bool,
    pub(crate) self_collision_enabled: bool,
}

impl SimBody {
    /// Validate a description and build the runtime body.
    ///
    /// Classification warnings are logged and returned; the offending links
    /// run passive.
    pub fn from_description(
        id: BodyId,
        desc: &BodyDescription,
    ) -> Result<(Self, Vec<ActuationWarning>)> {
        if desc.links.is_empty() {
            return Err(SimError::invalid_model(format!(
                "body {} has no links",
                desc.name
            )));
        }
        if desc.parent_body.is_some() {
            return Err(SimError::unsimulatable(
                &desc.name,
                "attached to a parent body",
            ));
        }
        if !desc.is_static && desc.total_mass() <= 0.0 {
            return Err(SimError::unsimulatable(&desc.name, "total mass is zero"));
        }

        let mut links = Vec::with_capacity(desc.links.len());
        let mut warnings = Vec::new();
        let mut high_gain_links = Vec::new();
        let mut has_non_root_free_joint = false;
        let mut nv = 0;

        for (index, ld) in desc.links.iter().enumerate() {
            match (index, ld.parent) {
                (0, None) => {}
                (0, Some(_)) => {
                    return Err(SimError::invalid_model(format!(
                        "root link {} of {} has a parent",
                        ld.name, desc.name
                    )));
                }
                (_, Some(p)) if p < index => {}
                _ => {
                    return Err(SimError::invalid_model(format!(
                        "link {} of {} must follow its parent",
                        ld.name, desc.name
                    )));
                }
            }
            if !ld.mass.is_valid() {
                return Err(SimError::invalid_model(format!(
                    "link {} of {} has invalid mass properties",
                    ld.name, desc.name
                )));
            }
            let axis = ld.joint_axis.try_normalize(f64::EPSILON);
            if ld.joint_type.is_scalar() && axis.is_none() {
                return Err(SimError::invalid_model(format!(
                    "joint of link {} of {} has a zero axis",
                    ld.name, desc.name
                )));
            }

            let class = classify_link(ld.joint_type, ld.state_mode, ld.q, ld.dq);
            if let Some(issue) = class.issue {
                let warning = ActuationWarning {
                    body: desc.name.clone(),
                    link: ld.name.clone(),
                    mode: ld.state_mode.actuation_bits(),
                    issue,
                };
                warn!(body = %desc.name, link = %ld.name, "{warning}");
                warnings.push(warning);
            }
            if class.high_gain {
                high_gain_links.push(index);
            }
            if index > 0 && class.joint_type.is_free() {
                has_non_root_free_joint = true;
            }

            let dof_count = if desc.is_static {
                0
            } else {
                class.joint_type.dof_count()
            };
            links.push(Link {
                name: ld.name.clone(),
                parent: ld.parent,
                joint_type: class.joint_type,
                joint_axis: axis.unwrap_or_else(Vector3::z),
                offset: ld.offset,
                mass: ld.mass,
                state_mode: ld.state_mode,
                q: ld.q,
                dq: ld.dq,
                ddq: 0.0,
                free_pose: Isometry3::identity(),
                free_velocity: Vector6::zeros(),
                free_acceleration: Vector6::zeros(),
                pose: Isometry3::identity(),
                velocity: Vector6::zeros(),
                f_ext: Vector3::zeros(),
                tau_ext: Vector3::zeros(),
                actuation: class.actuation,
                dof_start: nv,
                dof_count,
            });
            nv += dof_count;
        }

        let mut feet = Vec::with_capacity(desc.feet.len());
        for foot in &desc.feet {
            let index = links
                .iter()
                .position(|l| &l.name == foot)
                .ok_or_else(|| SimError::LinkNotFound {
                    body: desc.name.clone(),
                    link: foot.clone(),
                })?;
            feet.push(index);
        }

        let mut body = Self {
            id,
            name: desc.name.clone(),
            is_static: desc.is_static,
            links,
            nv,
            cdof: vec![Vector6::zeros(); nv],
            high_gain_links,
            feet,
            has_non_root_free_joint,
            collision_enabled: desc.collision_enabled,
            self_collision_enabled: desc.self_collision_enabled,
        };
        body.set_root_state(&desc.root_pose, &desc.root_twist);
        body.forward_kinematics();
        body.seed_link_pose_targets();
        Ok((body, warnings))
    }

    /// Body id.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Body name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immovable scenery.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Generalized velocity dimension.
    #[must_use]
    pub fn nv(&self) -> usize {
        self.nv
    }

    /// All links.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Link by index.
    #[must_use]
    pub fn link(&self, index: usize) -> Option<&Link> {
        self.links.get(index)
    }

    /// Mutable link by index.
    pub fn link_mut(&mut self, index: usize) -> Option<&mut Link> {
        self.links.get_mut(index)
    }

    /// Root link.
    #[must_use]
    pub fn root(&self) -> &Link {
        &self.links[0]
    }

    /// Index of a link by name.
    #[must_use]
    pub fn find_link(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l.name == name)
    }

    /// Index of a link by name, or a lookup error.
    pub fn link_index(&self, name: &str) -> Result<usize> {
        self.find_link(name).ok_or_else(|| SimError::LinkNotFound {
            body: self.name.clone(),
            link: name.to_string(),
        })
    }

    /// Links refreshed from their high-gain targets every tick.
    #[must_use]
    pub fn high_gain_links(&self) -> &[usize] {
        &self.high_gain_links
    }

    /// Support foot candidates.
    #[must_use]
    pub fn feet(&self) -> &[usize] {
        &self.feet
    }

    /// A free joint below the root makes a floating sub-chain.
    #[must_use]
    pub fn has_non_root_free_joint(&self) -> bool {
        self.has_non_root_free_joint
    }

    /// Collision enablement `(enabled, self_enabled)`.
    #[must_use]
    pub fn collision_mode(&self) -> (bool, bool) {
        (self.collision_enabled, self.self_collision_enabled)
    }

    /// Sum of link masses.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.links.iter().map(|l| l.mass.mass).sum()
    }

    /// Replace the targets of a link's actuation. The kind is fixed at
    /// registration.
    pub fn set_actuation_target(&mut self, link: usize, target: Actuation) -> Result<()> {
        let body = self.name.clone();
        let link = self
            .links
            .get_mut(link)
            .ok_or_else(|| SimError::LinkNotFound {
                body,
                link: link.to_string(),
            })?;
        link.actuation.update(&link.name, target)
    }

    /// Generalized velocity vector.
    #[must_use]
    pub fn velocity(&self) -> DVector<f64> {
        let mut v = DVector::zeros(self.nv);
        for link in &self.links {
            match link.dof_count {
                1 => v[link.dof_start] = link.dq,
                6 => v
                    .fixed_rows_mut::<6>(link.dof_start)
                    .copy_from(&link.free_velocity),
                _ => {}
            }
        }
        v
    }

    /// Write a generalized velocity vector. Link spatial velocities are not
    /// updated until the next kinematics pass.
    pub fn set_velocity(&mut self, v: &DVector<f64>) -> Result<()> {
        if v.len() != self.nv {
            return Err(SimError::invalid_state(
                format!("{} velocities", self.nv),
                format!("{} velocities", v.len()),
            ));
        }
        for link in &mut self.links {
            match link.dof_count {
                1 => link.dq = v[link.dof_start],
                6 => link
                    .free_velocity
                    .copy_from(&v.fixed_rows::<6>(link.dof_start)),
                _ => {}
            }
        }
        Ok(())
    }

    /// Record the accelerations of the last evaluation.
    pub(crate) fn set_accelerations(&mut self, a: &DVector<f64>) {
        for link in &mut self.links {
            match link.dof_count {
                1 => link.ddq = a[link.dof_start],
                6 => link
                    .free_acceleration
                    .copy_from(&a.fixed_rows::<6>(link.dof_start)),
                _ => {}
            }
        }
    }

    /// Joint positions of all links.
    #[must_use]
    pub fn positions(&self) -> Vec<JointPosition> {
        self.links
            .iter()
            .map(|link| match link.joint_type {
                JointType::Revolute | JointType::Prismatic => JointPosition::Scalar(link.q),
                JointType::Free => JointPosition::Pose(link.free_pose),
                JointType::Fixed | JointType::ContinuousTrack => JointPosition::None,
            })
            .collect()
    }

    /// Restore joint positions saved with [`Self::positions`].
    pub fn set_positions(&mut self, positions: &[JointPosition]) -> Result<()> {
        if positions.len() != self.links.len() {
            return Err(SimError::invalid_state(
                format!("{} joint positions", self.links.len()),
                format!("{} joint positions", positions.len()),
            ));
        }
        for (link, position) in self.links.iter_mut().zip(positions) {
            match *position {
                JointPosition::Scalar(q) => link.q = q,
                JointPosition::Pose(pose) => link.free_pose = pose,
                JointPosition::None => {}
            }
        }
        Ok(())
    }

    /// Advance joint positions by `v` over `dt`.
    ///
    /// Free joint rotations are advanced on the unit quaternion manifold by
    /// left-multiplying the incremental rotation `exp(ω dt)`.
    pub fn integrate_positions(&mut self, v: &DVector<f64>, dt: f64) {
        for link in &mut self.links {
            match link.dof_count {
                1 => link.q += v[link.dof_start] * dt,
                6 => {
                    let s = link.dof_start;
                    let lin = Vector3::new(v[s], v[s + 1], v[s + 2]);
                    let ang = Vector3::new(v[s + 3], v[s + 4], v[s + 5]);
                    link.free_pose.translation.vector += lin * dt;
                    let rotation = UnitQuaternion::from_scaled_axis(ang * dt)
                        * link.free_pose.rotation;
                    link.free_pose.rotation = UnitQuaternion::new_normalize(rotation.into_inner());
                }
                _ => {}
            }
        }
    }

    /// Place the root link at a world pose with a world velocity.
    ///
    /// Only meaningful when the root joint is free; a fixed root is welded
    /// at the given pose. Run kinematics afterwards.
    pub fn set_root_state(&mut self, pose: &Isometry3<f64>, twist: &Twist) {
        let root = &mut self.links[0];
        if root.joint_type.is_free() {
            let frame = root.offset;
            root.free_pose = frame.inverse() * pose;
            let r = frame.rotation.inverse();
            let lin = r * twist.linear;
            let ang = r * twist.angular;
            root.free_velocity = Vector6::new(lin.x, lin.y, lin.z, ang.x, ang.y, ang.z);
        } else {
            root.offset = *pose;
        }
    }

    /// Place the root link at a world pose, zeroing its velocity.
    pub fn set_root_pose(&mut self, pose: &Isometry3<f64>) {
        self.set_root_state(pose, &Twist::zero());
    }

    /// Point every link-pose target at the current pose so that an untouched
    /// drive holds position.
    fn seed_link_pose_targets(&mut self) {
        for link in &mut self.links {
            if matches!(link.actuation, Actuation::LinkPose { .. }) {
                link.actuation = Actuation::LinkPose {
                    pose: link.pose,
                    twist: Twist::new(link.linear_velocity(), link.angular_velocity()),
                };
            }
        }
    }

    /// Copy high-gain targets into the joint state.
    pub fn apply_high_gain_targets(&mut self) {
        for &index in &self.high_gain_links {
            let link = &mut self.links[index];
            if let Actuation::HighGain { q, dq, ddq } = link.actuation {
                link.q = q;
                link.dq = dq;
                link.ddq = ddq;
            }
        }
    }

    /// Copy displacement targets into the joint state for kinematic stepping.
    /// Returns whether any joint was driven.
    pub fn apply_displacement_targets(&mut self) -> bool {
        let mut driven = false;
        for link in &mut self.links {
            match link.actuation {
                Actuation::Displacement { q, dq } => {
                    link.q = q;
                    link.dq = dq;
                    driven = true;
                }
                Actuation::HighGain { q, dq, .. } => {
                    link.q = q;
                    link.dq = dq;
                    driven = true;
                }
                _ => {}
            }
        }
        driven
    }

    /// Surface speed of a continuous-track link along its joint axis, world
    /// frame. Zero for other links.
    #[must_use]
    pub fn surface_velocity(&self, index: usize) -> Vector3<f64> {
        let Some(link) = self.links.get(index) else {
            return Vector3::zeros();
        };
        match (link.joint_type, link.actuation) {
            (JointType::ContinuousTrack, Actuation::Track { speed }) => {
                link.pose.rotation * link.joint_axis * speed
            }
            _ => Vector3::zeros(),
        }
    }

    /// Clear accumulated external wrenches.
    pub fn clear_external_forces(&mut self) {
        for link in &mut self.links {
            link.f_ext = Vector3::zeros();
            link.tau_ext = Vector3::zeros();
        }
    }

    /// True when every pose and velocity is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.links.iter().all(Link::is_finite)
    }

    pub(crate) fn root_world_pose(&self) -> Isometry3<f64> {
        self.links[0].pose
    }
}

/// Identity pose at a world position.
#[must_use]
pub fn pose_at(x: f64, y: f64, z: f64) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use linkdyn_types::ActuationKind;

    fn pendulum() -> BodyDescription {
        BodyDescription::new("pendulum")
            .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
            .link(
                LinkDescription::new("arm")
                    .parent(0)
                    .joint(JointType::Revolute, Vector3::y())
                    .offset_translation(0.0, 0.0, 1.0)
                    .mass(MassProperties::sphere(1.0, 0.1).with_center_of_mass(Vector3::new(0.0, 0.0, -0.5)))
                    .mode(StateMode::JOINT_EFFORT),
            )
    }

    fn ball() -> BodyDescription {
        BodyDescription::new("ball")
            .root_pose(pose_at(0.0, 0.0, 2.0))
            .link(
                LinkDescription::new("root")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::sphere(1.0, 0.1)),
            )
    }

    #[test]
    fn test_dof_layout() {
        let (body, warnings) = SimBody::from_description(BodyId::new(0), &pendulum()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(body.nv(), 1);
        assert_eq!(body.links()[1].dofs(), 0..1);
        assert_eq!(body.links()[1].actuation().kind(), ActuationKind::Effort);

        let (body, _) = SimBody::from_description(BodyId::new(1), &ball()).unwrap();
        assert_eq!(body.nv(), 6);
        assert_relative_eq!(body.root().position().z, 2.0);
    }

    #[test]
    fn test_zero_mass_dynamic_body_refused() {
        let desc = BodyDescription::new("ghost").link(LinkDescription::new("root"));
        let err = SimBody::from_description(BodyId::new(0), &desc).unwrap_err();
        assert!(err.is_unsimulatable());
    }

    #[test]
    fn test_static_body_has_no_dofs() {
        let desc = BodyDescription::static_body("floor").link(
            LinkDescription::new("root").joint(JointType::Free, Vector3::z()),
        );
        let (body, _) = SimBody::from_description(BodyId::new(0), &desc).unwrap();
        assert_eq!(body.nv(), 0);
        assert!(body.velocity().is_empty());
    }

    #[test]
    fn test_attached_body_refused() {
        let desc = pendulum().attached_to("carrier");
        let err = SimBody::from_description(BodyId::new(0), &desc).unwrap_err();
        assert!(err.is_unsimulatable());
    }

    #[test]
    fn test_parent_must_precede_child() {
        let desc = BodyDescription::new("bad")
            .link(LinkDescription::new("a").mass(MassProperties::point_mass(1.0)))
            .link(LinkDescription::new("b").parent(2))
            .link(LinkDescription::new("c").parent(0));
        assert!(SimBody::from_description(BodyId::new(0), &desc).is_err());
    }

    #[test]
    fn test_unknown_foot_is_an_error() {
        let desc = pendulum().feet(["toe"]);
        let err = SimBody::from_description(BodyId::new(0), &desc).unwrap_err();
        assert!(matches!(err, SimError::LinkNotFound { .. }));
    }

    #[test]
    fn test_velocity_roundtrip_and_length_check() {
        let (mut body, _) = SimBody::from_description(BodyId::new(0), &ball()).unwrap();
        let v = DVector::from_vec(vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);
        body.set_velocity(&v).unwrap();
        assert_eq!(body.velocity(), v);
        assert!(body.set_velocity(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn test_integrate_free_rotation() {
        let (mut body, _) = SimBody::from_description(BodyId::new(0), &ball()).unwrap();
        let v = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::PI]);
        body.integrate_positions(&v, 0.5);
        let angle = body.root().free_pose.rotation.angle();
        assert_relative_eq!(angle, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_actuation_kind_is_fixed() {
        let (mut body, _) = SimBody::from_description(BodyId::new(0), &pendulum()).unwrap();
        body.set_actuation_target(1, Actuation::Effort { effort: 2.0 })
            .unwrap();
        assert!(body
            .set_actuation_target(1, Actuation::Velocity { dq: 1.0 })
            .is_err());
    }

    #[test]
    fn test_track_surface_velocity() {
        let desc = BodyDescription::new("crawler")
            .link(LinkDescription::new("chassis").joint(JointType::Free, Vector3::z()).mass(MassProperties::point_mass(5.0)))
            .link(
                LinkDescription::new("track")
                    .parent(0)
                    .joint(JointType::Fixed, Vector3::x())
                    .mode(StateMode::JOINT_SURFACE_VELOCITY),
            );
        let (mut body, warnings) = SimBody::from_description(BodyId::new(0), &desc).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(body.links()[1].joint_type, JointType::ContinuousTrack);
        body.set_actuation_target(1, Actuation::Track { speed: 0.4 })
            .unwrap();
        assert_relative_eq!(body.surface_velocity(1), Vector3::new(0.4, 0.0, 0.0));
        assert_eq!(body.surface_velocity(0), Vector3::zeros());
    }
}
