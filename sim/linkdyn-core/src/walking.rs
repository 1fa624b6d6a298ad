//! Kinematic walking.
//!
//! Dynamics-free stepping for legged bodies. One foot is the support: its
//! world pose is held while the joint targets move every other link. When
//! another foot drops strictly below the support foot, support transfers:
//!
//! ```text
//!   before           after
//!   ┌──┐             ┌──┐
//!   │  │             │  │
//!   ┘  └─ support    ┘  └─ new support snapped to the old support height
//! ```
//!
//! The snap keeps the body from jumping by the height difference at the
//! moment of transfer.

use nalgebra::Isometry3;
use tracing::debug;

use crate::kinematics::LinkTraverse;
use crate::model::SimBody;

/// Support-foot bookkeeping of one legged body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KinematicWalker {
    feet: Vec<usize>,
    support: usize,
    traverse: LinkTraverse,
}

impl KinematicWalker {
    /// Walker for a body with declared feet, supporting on the lowest foot.
    /// Ties go to the first foot. `None` for a body without feet.
    #[must_use]
    pub fn new(body: &SimBody) -> Option<Self> {
        let feet = body.feet().to_vec();
        let first = *feet.first()?;
        let mut support = 0;
        let mut lowest = height(body, first);
        for (i, &foot) in feet.iter().enumerate().skip(1) {
            let z = height(body, foot);
            if z < lowest {
                lowest = z;
                support = i;
            }
        }
        let traverse = LinkTraverse::new(body, feet[support]);
        Some(Self {
            feet,
            support,
            traverse,
        })
    }

    /// Position of the support foot in the foot list.
    #[must_use]
    pub fn support_index(&self) -> usize {
        self.support
    }

    /// Link index of the support foot.
    #[must_use]
    pub fn support_foot(&self) -> usize {
        self.feet[self.support]
    }

    /// Foot link indices.
    #[must_use]
    pub fn feet(&self) -> &[usize] {
        &self.feet
    }

    /// Solve kinematics from the support foot and transfer support if
    /// another foot dropped below it. Returns whether support moved.
    pub fn step(&mut self, body: &mut SimBody) -> bool {
        let support_link = self.support_foot();
        let support_pose = body.links[support_link].pose;
        self.traverse.calc_forward_kinematics(body, &support_pose);

        let support_z = height(body, support_link);
        let Some(next) = self
            .feet
            .iter()
            .position(|&foot| foot != support_link && height(body, foot) < support_z)
        else {
            return false;
        };

        let foot = self.feet[next];
        let mut snapped: Isometry3<f64> = body.links[foot].pose;
        snapped.translation.vector.z = support_z;

        self.support = next;
        self.traverse = LinkTraverse::new(body, foot);
        self.traverse.calc_forward_kinematics(body, &snapped);
        debug!(
            body = body.name(),
            from = %body.links[support_link].name,
            to = %body.links[foot].name,
            "support foot switched"
        );
        true
    }
}

fn height(body: &SimBody, link: usize) -> f64 {
    body.links[link].pose.translation.vector.z
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, BodyDescription, LinkDescription};
    use approx::assert_relative_eq;
    use linkdyn_types::{Actuation, BodyId, JointType, MassProperties, StateMode};
    use nalgebra::Vector3;

    fn tripod() -> SimBody {
        let mut desc = BodyDescription::new("tripod")
            .root_pose(pose_at(0.0, 0.0, 1.0))
            .link(
                LinkDescription::new("waist")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::point_mass(1.0)),
            );
        for (i, q) in [0.0, -0.05, -0.02].into_iter().enumerate() {
            desc = desc.link(
                LinkDescription::new(format!("foot{i}"))
                    .parent(0)
                    .joint(JointType::Prismatic, Vector3::z())
                    .offset_translation(0.3 * i as f64, 0.0, -0.9)
                    .mass(MassProperties::point_mass(0.1))
                    .mode(StateMode::JOINT_DISPLACEMENT)
                    .initial(q, 0.0),
            );
        }
        let desc = desc.feet(["foot0", "foot1", "foot2"]);
        SimBody::from_description(BodyId::new(0), &desc).unwrap().0
    }

    fn foot_heights(body: &SimBody) -> Vec<f64> {
        body.feet().iter().map(|&f| height(body, f)).collect()
    }

    #[test]
    fn test_initial_support_is_lowest_foot() {
        let body = tripod();
        let heights = foot_heights(&body);
        assert_relative_eq!(heights[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(heights[1], 0.05, epsilon = 1e-12);
        assert_relative_eq!(heights[2], 0.08, epsilon = 1e-12);

        let walker = KinematicWalker::new(&body).unwrap();
        assert_eq!(walker.support_index(), 1);
    }

    #[test]
    fn test_no_switch_without_lower_foot() {
        let mut body = tripod();
        let mut walker = KinematicWalker::new(&body).unwrap();
        body.apply_displacement_targets();
        assert!(!walker.step(&mut body));
        assert_eq!(walker.support_index(), 1);
        assert_relative_eq!(foot_heights(&body)[1], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_switch_snaps_new_support() {
        let mut body = tripod();
        let mut walker = KinematicWalker::new(&body).unwrap();
        body.set_actuation_target(1, Actuation::Displacement { q: -0.06, dq: 0.0 })
            .unwrap();
        body.apply_displacement_targets();

        assert!(walker.step(&mut body));
        assert_eq!(walker.support_index(), 0);
        let heights = foot_heights(&body);
        assert_relative_eq!(heights[0], 0.05, epsilon = 1e-12);
        assert_relative_eq!(heights[1], 0.06, epsilon = 1e-12);
        assert_relative_eq!(heights[2], 0.09, epsilon = 1e-12);

        // Holding targets keeps the new support.
        assert!(!walker.step(&mut body));
        assert_eq!(walker.support_index(), 0);
    }

    #[test]
    fn test_equal_height_never_switches() {
        let mut body = tripod();
        let mut walker = KinematicWalker::new(&body).unwrap();
        body.set_actuation_target(1, Actuation::Displacement { q: -0.05, dq: 0.0 })
            .unwrap();
        body.apply_displacement_targets();
        assert!(!walker.step(&mut body));
        assert_eq!(walker.support_index(), 1);
    }

    #[test]
    fn test_body_without_feet_has_no_walker() {
        let desc = BodyDescription::new("box").link(
            LinkDescription::new("root")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::point_mass(1.0)),
        );
        let (body, _) = SimBody::from_description(BodyId::new(0), &desc).unwrap();
        assert!(KinematicWalker::new(&body).is_none());
    }
}
