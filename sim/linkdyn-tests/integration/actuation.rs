//! Actuation modes under forward dynamics.
//!
//! The arm fixture has a unit point mass one meter from a revolute joint,
//! so its joint inertia is 1 and torques read directly as accelerations.
//! Tests that need exact values integrate with semi-implicit Euler, where a
//! prescribed acceleration of `(target - current) / dt` lands on the target
//! in one step.

use std::sync::Arc;

use approx::assert_relative_eq;
use linkdyn_contact::{ContactMaterial, LinkRef, UniformMaterial};
use linkdyn_core::{pose_at, ActuationIssue, BodyDescription, LinkDescription, Simulator};
use linkdyn_types::{
    Actuation, BodyId, IntegrationMode, JointType, MassProperties, SimulatorConfig, StateMode,
    Twist,
};
use nalgebra::Vector3;

use crate::common::{arm, ground, PlaneDetector, Shape, GROUND};

fn euler() -> SimulatorConfig {
    SimulatorConfig::default().integration(IntegrationMode::SemiImplicitEuler)
}

fn elbow(sim: &Simulator) -> (f64, f64) {
    let link = &sim.body(BodyId::new(0)).unwrap().links()[1];
    (link.q, link.dq)
}

// ============================================================================
// Torque
// ============================================================================

/// Horizontal arm: gravity along the joint axis exerts no torque.
#[test]
fn effort_accelerates_joint() {
    let mut sim = Simulator::new(euler());
    let id = sim
        .initialize(vec![arm(Vector3::z(), StateMode::JOINT_EFFORT)])
        .unwrap()
        .registered[0];
    sim.set_actuation_target(id, "elbow", Actuation::Effort { effort: 1.0 })
        .unwrap();
    for _ in 0..1000 {
        sim.step().unwrap();
    }
    let (_, dq) = elbow(&sim);
    assert_relative_eq!(dq, 1.0, epsilon = 1e-9);
}

#[test]
fn external_wrench_lasts_one_tick() {
    let mut sim = Simulator::new(euler());
    let id = sim
        .initialize(vec![arm(Vector3::z(), StateMode::empty())])
        .unwrap()
        .registered[0];
    sim.apply_external_wrench(id, "elbow", Vector3::new(0.0, 1.0, 0.0), Vector3::zeros())
        .unwrap();
    sim.step().unwrap();
    let (_, after_push) = elbow(&sim);
    assert_relative_eq!(after_push, 0.001, epsilon = 1e-9);

    sim.step().unwrap();
    let (_, later) = elbow(&sim);
    assert_relative_eq!(later, after_push, epsilon = 1e-9);

    assert!(sim
        .apply_external_wrench(id, "missing", Vector3::zeros(), Vector3::zeros())
        .is_err());
}

// ============================================================================
// Prescribed motion
// ============================================================================

#[test]
fn velocity_drive_holds_rate() {
    let mut sim = Simulator::new(euler());
    let id = sim
        .initialize(vec![arm(Vector3::z(), StateMode::JOINT_VELOCITY)])
        .unwrap()
        .registered[0];
    sim.set_actuation_target(id, "elbow", Actuation::Velocity { dq: 2.0 })
        .unwrap();
    for _ in 0..500 {
        sim.step().unwrap();
    }
    let (q, dq) = elbow(&sim);
    assert_relative_eq!(dq, 2.0, epsilon = 1e-9);
    assert_relative_eq!(q, 1.0, epsilon = 1e-9);
}

/// Gravity pulls on the arm, but a displacement drive is prescribed motion
/// and ignores it.
#[test]
fn displacement_drive_reaches_target_under_gravity() {
    let mut sim = Simulator::new(euler());
    let id = sim
        .initialize(vec![arm(Vector3::y(), StateMode::JOINT_DISPLACEMENT)])
        .unwrap()
        .registered[0];
    sim.set_actuation_target(id, "elbow", Actuation::Displacement { q: 0.3, dq: 0.0 })
        .unwrap();
    for _ in 0..10 {
        sim.step().unwrap();
        let (q, _) = elbow(&sim);
        assert_relative_eq!(q, 0.3, epsilon = 1e-9);
    }
}

#[test]
fn displacement_drive_holds_initial_angle() {
    let desc = BodyDescription::new("arm")
        .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
        .link(
            LinkDescription::new("elbow")
                .parent(0)
                .joint(JointType::Revolute, Vector3::y())
                .mass(MassProperties::point_mass(1.0).with_center_of_mass(Vector3::x()))
                .mode(StateMode::JOINT_DISPLACEMENT)
                .initial(0.7, 0.0),
        );
    let mut sim = Simulator::default();
    sim.initialize(vec![desc]).unwrap();
    for _ in 0..100 {
        sim.step().unwrap();
    }
    let (q, _) = elbow(&sim);
    assert_relative_eq!(q, 0.7, epsilon = 1e-9);
}

#[test]
fn high_gain_forces_state_every_tick() {
    let mut sim = Simulator::default();
    let id = sim
        .initialize(vec![arm(Vector3::y(), StateMode::ALL_STATE_HIGH_GAIN)])
        .unwrap()
        .registered[0];
    assert_eq!(sim.body(id).unwrap().high_gain_links(), &[1]);

    sim.set_actuation_target(
        id,
        "elbow",
        Actuation::HighGain {
            q: 0.5,
            dq: 0.0,
            ddq: 0.0,
        },
    )
    .unwrap();
    for _ in 0..20 {
        sim.step().unwrap();
    }
    let (q, dq) = elbow(&sim);
    assert_relative_eq!(q, 0.5, epsilon = 1e-9);
    assert_relative_eq!(dq, 0.0, epsilon = 1e-9);
}

#[test]
fn link_pose_drive_moves_root_to_target() {
    let desc = BodyDescription::new("ball").root_pose(pose_at(0.0, 0.0, 1.0)).link(
        LinkDescription::new("root")
            .joint(JointType::Free, Vector3::z())
            .mass(MassProperties::sphere(1.0, 0.1))
            .mode(StateMode::LINK_POSITION),
    );
    let mut sim = Simulator::new(euler());
    let id = sim.initialize(vec![desc]).unwrap().registered[0];

    // Registration seeds the target with the current pose.
    sim.step().unwrap();
    assert_relative_eq!(
        sim.body(id).unwrap().root().position().z,
        1.0,
        epsilon = 1e-9
    );

    sim.set_actuation_target(
        id,
        "root",
        Actuation::LinkPose {
            pose: pose_at(1.0, 0.0, 2.0),
            twist: Twist::zero(),
        },
    )
    .unwrap();
    sim.step().unwrap();
    let p = sim.body(id).unwrap().root().position();
    assert_relative_eq!(p.coords, Vector3::new(1.0, 0.0, 2.0), epsilon = 1e-9);
}

#[test]
fn target_kind_is_fixed_for_the_run() {
    let mut sim = Simulator::default();
    let id = sim
        .initialize(vec![arm(Vector3::z(), StateMode::JOINT_VELOCITY)])
        .unwrap()
        .registered[0];
    let err = sim
        .set_actuation_target(id, "elbow", Actuation::Effort { effort: 1.0 })
        .unwrap_err();
    assert!(matches!(err, linkdyn_types::SimError::ActuationMismatch { .. }));
    assert!(sim
        .set_actuation_target(BodyId::new(3), "elbow", Actuation::Velocity { dq: 1.0 })
        .is_err());
}

// ============================================================================
// Classification
// ============================================================================

fn with_link(joint: JointType, mode: StateMode) -> BodyDescription {
    BodyDescription::new("rover")
        .link(
            LinkDescription::new("chassis")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::box_shape(1.0, Vector3::new(0.2, 0.2, 0.05))),
        )
        .link(
            LinkDescription::new("belt")
                .parent(0)
                .joint(joint, Vector3::x())
                .mass(MassProperties::point_mass(0.1))
                .mode(mode),
        )
}

#[test]
fn surface_velocity_on_fixed_joint_becomes_track() {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![with_link(
            JointType::Fixed,
            StateMode::JOINT_SURFACE_VELOCITY,
        )])
        .unwrap();
    assert!(report.warnings.is_empty());
    let belt = &sim.body(report.registered[0]).unwrap().links()[1];
    assert_eq!(belt.joint_type, JointType::ContinuousTrack);
    assert_eq!(*belt.actuation(), Actuation::Track { speed: 0.0 });
}

#[test]
fn displacement_on_track_is_a_warning() {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![with_link(
            JointType::ContinuousTrack,
            StateMode::JOINT_DISPLACEMENT | StateMode::LINK_EXT_WRENCH,
        )])
        .unwrap();
    assert_eq!(report.registered.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    let warning = &report.warnings[0];
    assert_eq!(warning.issue, ActuationIssue::TrackMode);
    assert_eq!(warning.link, "belt");
    assert_eq!(warning.mode, StateMode::JOINT_DISPLACEMENT);
    assert!(warning.to_string().contains("continuous track"));

    let belt = &sim.body(report.registered[0]).unwrap().links()[1];
    assert_eq!(*belt.actuation(), Actuation::Passive);
    sim.step().unwrap();
}

#[test]
fn unsupported_combination_is_a_warning() {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![arm(
            Vector3::z(),
            StateMode::JOINT_DISPLACEMENT | StateMode::JOINT_EFFORT,
        )])
        .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].issue, ActuationIssue::Unsupported);
    sim.step().unwrap();
}

/// Joint drives need a revolute or prismatic joint. On a free root they are
/// reported and the body keeps its own motion.
#[test]
fn velocity_drive_on_free_joint_is_a_warning() {
    let drifting = Twist::new(Vector3::new(0.5, 0.0, 0.0), Vector3::zeros());
    let desc = BodyDescription::new("ball")
        .root_pose(pose_at(0.0, 0.0, 1.0))
        .root_twist(drifting)
        .link(
            LinkDescription::new("root")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::sphere(1.0, 0.1))
                .mode(StateMode::JOINT_VELOCITY),
        );
    let mut sim = Simulator::new(euler().zero_gravity());
    let report = sim.initialize(vec![desc]).unwrap();
    let id = report.registered[0];

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].issue, ActuationIssue::Unsupported);
    assert_eq!(report.warnings[0].link, "root");
    assert!(matches!(
        sim.set_actuation_target(id, "root", Actuation::Velocity { dq: 1.0 }),
        Err(linkdyn_types::SimError::ActuationMismatch { .. })
    ));

    for _ in 0..5 {
        sim.step().unwrap();
        let v = sim.body(id).unwrap().root().linear_velocity();
        assert_relative_eq!(v, Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
    }
}

#[test]
fn high_gain_on_free_joint_is_a_warning() {
    let desc = BodyDescription::new("ball")
        .root_pose(pose_at(0.0, 0.0, 1.0))
        .link(
            LinkDescription::new("root")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::sphere(1.0, 0.1))
                .mode(StateMode::ALL_STATE_HIGH_GAIN),
        );
    let mut sim = Simulator::new(euler());
    let report = sim.initialize(vec![desc]).unwrap();
    let id = report.registered[0];
    assert_eq!(report.warnings[0].issue, ActuationIssue::Unsupported);
    assert!(sim.body(id).unwrap().high_gain_links().is_empty());

    // Runs passive: it falls.
    for _ in 0..10 {
        sim.step().unwrap();
    }
    assert!(sim.body(id).unwrap().root().position().z < 1.0);
}

// ============================================================================
// Continuous track
// ============================================================================

/// The belt runs at +0.2 m/s along the chassis x axis. Friction holds the
/// belt surface still against the ground, so the chassis drives the other
/// way at the belt speed.
#[test]
fn track_drives_chassis_through_friction() {
    let half = Vector3::new(0.2, 0.2, 0.05);
    let rover = with_link(JointType::ContinuousTrack, StateMode::JOINT_VELOCITY)
        .root_pose(pose_at(0.0, 0.0, half.z));

    let mut sim = Simulator::new(euler());
    sim.set_collision_detector(Box::new(
        PlaneDetector::new(GROUND).with(LinkRef::new(0, 1), Shape::Box(half)),
    ));
    sim.set_material_table(Arc::new(UniformMaterial(ContactMaterial::with_friction(1.0))));
    let id = sim.initialize(vec![rover, ground()]).unwrap().registered[0];
    sim.set_actuation_target(id, "belt", Actuation::Track { speed: 0.2 })
        .unwrap();

    for _ in 0..500 {
        sim.step().unwrap();
    }
    let v = sim.body(id).unwrap().root().linear_velocity();
    assert_relative_eq!(v.x, -0.2, epsilon = 1e-2);
    assert_relative_eq!(v.y, 0.0, epsilon = 1e-3);
}
