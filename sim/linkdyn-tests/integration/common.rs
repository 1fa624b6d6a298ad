//! Shared fixtures: a ground plane at z = 0 and simple body builders.
//!
//! The detectors here stand in for a real collision backend. They only know
//! two shapes, which is enough to exercise the solver end to end:
//!
//! ```text
//!   sphere: one point under the center, depth = r - z
//!   box:    the four bottom corners, depth = -z of each corner
//! ```

use linkdyn_core::{
    pose_at, BodyDescription, CollisionDetector, ContactCandidate, ContactPoint, LinkDescription,
    LinkRef, LinkSnapshot,
};
use linkdyn_types::{JointType, MassProperties, StateMode};
use nalgebra::{Point3, Vector3};

/// Ground link address when the ground is registered second.
pub const GROUND: LinkRef = LinkRef::new(1, 0);

/// Contact shape attached to one link.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Sphere centered on the link origin.
    Sphere(f64),
    /// Box centered on the link origin.
    Box(Vector3<f64>),
}

/// Plane detector for a fixed list of shaped links.
#[derive(Debug, Clone)]
pub struct PlaneDetector {
    ground: LinkRef,
    shapes: Vec<(LinkRef, Shape)>,
}

impl PlaneDetector {
    pub fn new(ground: LinkRef) -> Self {
        Self {
            ground,
            shapes: Vec::new(),
        }
    }

    pub fn with(mut self, link: LinkRef, shape: Shape) -> Self {
        self.shapes.push((link, shape));
        self
    }

    fn points(snapshot: &LinkSnapshot, shape: Shape) -> Vec<ContactPoint> {
        match shape {
            Shape::Sphere(radius) => {
                let c = snapshot.pose.translation.vector;
                vec![ContactPoint::new(
                    Point3::new(c.x, c.y, 0.0),
                    Vector3::z(),
                    radius - c.z,
                )]
            }
            Shape::Box(half) => {
                let mut corners = Vec::with_capacity(4);
                for sx in [-1.0, 1.0] {
                    for sy in [-1.0, 1.0] {
                        let local = Point3::new(sx * half.x, sy * half.y, -half.z);
                        let p = snapshot.pose * local;
                        corners.push(ContactPoint::new(
                            Point3::new(p.x, p.y, 0.0),
                            Vector3::z(),
                            -p.z,
                        ));
                    }
                }
                corners
            }
        }
    }
}

impl CollisionDetector for PlaneDetector {
    fn detect(&mut self, links: &[LinkSnapshot]) -> Vec<ContactCandidate> {
        let mut found = Vec::new();
        for (link, shape) in &self.shapes {
            let Some(snapshot) = links.iter().find(|s| s.link == *link) else {
                continue;
            };
            let points = Self::points(snapshot, *shape);
            found.push(ContactCandidate::new(*link, self.ground, points));
        }
        found
    }
}

/// Static ground body with one massless link.
pub fn ground() -> BodyDescription {
    BodyDescription::static_body("ground").link(LinkDescription::new("plane"))
}

/// Free sphere of mass 1 and the given radius, centered at height `z`.
pub fn ball(name: &str, radius: f64, z: f64) -> BodyDescription {
    BodyDescription::new(name).root_pose(pose_at(0.0, 0.0, z)).link(
        LinkDescription::new("root")
            .joint(JointType::Free, Vector3::z())
            .mass(MassProperties::sphere(1.0, radius)),
    )
}

/// Free flat box of mass 1 resting on its bottom face.
pub fn crate_box(half: Vector3<f64>) -> BodyDescription {
    BodyDescription::new("box").root_pose(pose_at(0.0, 0.0, half.z)).link(
        LinkDescription::new("root")
            .joint(JointType::Free, Vector3::z())
            .mass(MassProperties::box_shape(1.0, half)),
    )
}

/// Fixed-base arm with one revolute joint about `axis` and a point mass one
/// meter out along x.
pub fn arm(axis: Vector3<f64>, mode: StateMode) -> BodyDescription {
    BodyDescription::new("arm")
        .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
        .link(
            LinkDescription::new("elbow")
                .parent(0)
                .joint(JointType::Revolute, axis)
                .mass(
                    MassProperties::point_mass(1.0)
                        .with_center_of_mass(Vector3::new(1.0, 0.0, 0.0)),
                )
                .mode(mode),
        )
}

/// Waist at z = 1 with three prismatic legs 0.9 m long, 0.3 m apart.
/// Initial foot heights are 0.10, 0.05 and 0.08.
pub fn tripod() -> BodyDescription {
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
    desc.feet(["foot0", "foot1", "foot2"])
}
