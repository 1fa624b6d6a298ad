//! Contacts through the full step pipeline.
//!
//! # Coverage
//!
//! - Resting contact carries exactly the weight
//! - Friction coefficients are clamped to the configured range, both ends
//! - Friction impulses stay inside the cone
//! - Collision handlers veto pairs; unknown names fail to unregister
//! - Per-body collision modes
//! - Loop-closing extra joints
//! - Restitution, global and per material
//! - The iteration cap

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use linkdyn_contact::{CollisionHandler, ContactMaterial, LinkRef, SolvedContact, UniformMaterial};
use linkdyn_core::{BodyDescription, ExtraJointSpec, Simulator};
use linkdyn_types::{BodyId, IntegrationMode, SimulatorConfig, Twist, STANDARD_GRAVITY};
use nalgebra::{Point3, Vector3};

use crate::common::{ball, crate_box, ground, PlaneDetector, Shape, GROUND};

const DT: f64 = 0.001;
fn box_half() -> Vector3<f64> {
    Vector3::new(0.2, 0.2, 0.05)
}

fn euler() -> SimulatorConfig {
    SimulatorConfig::default().integration(IntegrationMode::SemiImplicitEuler)
}

/// A ball or box as body 0 and the ground as body 1.
fn on_ground(config: SimulatorConfig, body: BodyDescription, shape: Shape) -> Simulator {
    let mut sim = Simulator::new(config);
    sim.set_collision_detector(Box::new(
        PlaneDetector::new(GROUND).with(LinkRef::new(0, 0), shape),
    ));
    let report = sim.initialize(vec![body, ground()]).unwrap();
    assert_eq!(report.registered.len(), 2);
    sim
}

fn assert_inside_cone(contacts: &[SolvedContact]) {
    assert!(!contacts.is_empty());
    for c in contacts {
        assert!(c.normal_impulse >= 0.0);
        let bound = c.friction * c.normal_impulse;
        assert!(
            c.friction_impulse.norm() <= bound * (1.0 + 1e-9) + 1e-12,
            "friction {} outside cone {}",
            c.friction_impulse.norm(),
            bound
        );
    }
}

// ============================================================================
// Normal direction
// ============================================================================

/// Sphere touching the plane at depth zero. Restitution is zero and the depth
/// is inside the correction allowance, so the normal impulse cancels exactly
/// one step of gravity.
#[test]
fn resting_ball_carries_its_weight() {
    let mut sim = on_ground(euler(), ball("ball", 0.1, 0.1), Shape::Sphere(0.1));
    for _ in 0..1000 {
        sim.step().unwrap();
    }

    let root = sim.body(BodyId::new(0)).unwrap().root();
    assert_relative_eq!(root.position().z, 0.1, epsilon = 1e-6);
    assert_relative_eq!(root.linear_velocity().z, 0.0, epsilon = 1e-6);

    let contacts = sim.world().solver().last_contacts();
    assert_eq!(contacts.len(), 1);
    assert_relative_eq!(
        contacts[0].normal_impulse,
        STANDARD_GRAVITY * DT,
        max_relative = 1e-3
    );
    assert!(sim.solver_stats().solves >= 1000);
}

/// Ball touching the plane while moving down at 2 m/s, no gravity. The
/// rebound speed is the approach speed times the restitution coefficient.
fn rebound_speed(config: SimulatorConfig, material: Option<ContactMaterial>) -> f64 {
    let down = Twist::new(Vector3::new(0.0, 0.0, -2.0), Vector3::zeros());
    let mut sim = on_ground(
        config.zero_gravity(),
        ball("ball", 0.1, 0.1).root_twist(down),
        Shape::Sphere(0.1),
    );
    if let Some(material) = material {
        sim.set_material_table(Arc::new(UniformMaterial(material)));
    }
    sim.step().unwrap();
    sim.body(BodyId::new(0)).unwrap().root().linear_velocity().z
}

#[test]
fn restitution_uses_global_coefficient() {
    assert_relative_eq!(rebound_speed(euler(), None), 0.0, epsilon = 1e-9);
    assert_relative_eq!(
        rebound_speed(euler().restitution(0.5), None),
        1.0,
        epsilon = 1e-6
    );
}

#[test]
fn material_restitution_overrides_global() {
    let speed = rebound_speed(
        euler().restitution(0.5),
        Some(ContactMaterial::default().restitution(1.0)),
    );
    assert_relative_eq!(speed, 2.0, epsilon = 1e-6);
}

// ============================================================================
// Friction
// ============================================================================

/// Tilted gravity pulls the box sideways with 3 m/s². The pair material asks
/// for 0.5 but the range caps it at 0.2, so the box slides.
#[test]
fn friction_clamped_to_max_lets_box_slide() {
    let config = euler()
        .gravity(Vector3::new(3.0, 0.0, -9.8))
        .friction_range(0.0, 0.2);
    let mut sim = on_ground(config, crate_box(box_half()), Shape::Box(box_half()));
    sim.set_material_table(Arc::new(UniformMaterial(ContactMaterial::with_friction(0.5))));

    for _ in 0..500 {
        sim.step().unwrap();
    }

    let contacts = sim.world().solver().last_contacts();
    assert_eq!(contacts.len(), 4);
    for c in contacts {
        assert_relative_eq!(c.friction, 0.2);
    }
    assert_inside_cone(contacts);

    // (3.0 - 0.2 * 9.8) * 0.5 s
    let vx = sim.body(BodyId::new(0)).unwrap().root().linear_velocity().x;
    assert!(vx > 0.3, "box slid at {vx}");
}

/// Frictionless material raised to 0.5 by the range: the required ratio is
/// 3 / 9.8, inside the cone, so the box sticks.
#[test]
fn friction_clamped_to_min_holds_box() {
    let config = euler()
        .gravity(Vector3::new(3.0, 0.0, -9.8))
        .friction_range(0.5, 1.0)
        .solver_iterations(1000, 1e-6);
    let mut sim = on_ground(config, crate_box(box_half()), Shape::Box(box_half()));
    sim.set_material_table(Arc::new(UniformMaterial(ContactMaterial::with_friction(0.0))));

    for _ in 0..500 {
        sim.step().unwrap();
        assert_inside_cone(sim.world().solver().last_contacts());
    }

    for c in sim.world().solver().last_contacts() {
        assert_relative_eq!(c.friction, 0.5);
    }
    let vx = sim.body(BodyId::new(0)).unwrap().root().linear_velocity().x;
    assert!(vx.abs() < 1e-2, "box crept at {vx}");
}

// ============================================================================
// Handlers and collision modes
// ============================================================================

#[test]
fn handler_veto_lets_ball_fall_through() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut sim = on_ground(euler(), ball("ball", 0.1, 0.1), Shape::Sphere(0.1));
    sim.set_material_table(Arc::new(UniformMaterial(
        ContactMaterial::default().handler("ghost"),
    )));
    sim.register_collision_handler(
        "ghost",
        CollisionHandler::new(move |_, _, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }),
    );

    for _ in 0..300 {
        sim.step().unwrap();
    }
    assert!(calls.load(Ordering::SeqCst) > 0);
    assert!(sim.body(BodyId::new(0)).unwrap().root().position().z < 0.0);
    assert!(sim.world().solver().last_contacts().is_empty());
}

#[test]
fn unregistered_handler_name_falls_back_to_default() {
    let mut sim = on_ground(euler(), ball("ball", 0.1, 0.1), Shape::Sphere(0.1));
    sim.set_material_table(Arc::new(UniformMaterial(
        ContactMaterial::default().handler("ghost"),
    )));
    sim.register_collision_handler("ghost", CollisionHandler::new(|_, _, _, _| false));

    assert!(sim.unregister_collision_handler("ghost"));
    assert!(!sim.unregister_collision_handler("ghost"));
    assert!(!sim.unregister_collision_handler("never registered"));

    for _ in 0..300 {
        sim.step().unwrap();
    }
    assert_relative_eq!(
        sim.body(BodyId::new(0)).unwrap().root().position().z,
        0.1,
        epsilon = 1e-6
    );
}

#[test]
fn disabled_collision_mode_skips_body() {
    let mut sim = on_ground(euler(), ball("ball", 0.1, 0.1), Shape::Sphere(0.1));
    sim.set_body_collision_detection_mode(BodyId::new(0), false, false)
        .unwrap();
    assert!(sim
        .set_body_collision_detection_mode(BodyId::new(7), false, false)
        .is_err());

    for _ in 0..300 {
        sim.step().unwrap();
    }
    assert!(sim.body(BodyId::new(0)).unwrap().root().position().z < 0.0);
}

#[test]
fn description_collision_flag_reaches_solver() {
    let mut sim = on_ground(
        euler(),
        ball("ball", 0.1, 0.1).collision(false, false),
        Shape::Sphere(0.1),
    );
    for _ in 0..300 {
        sim.step().unwrap();
    }
    assert!(sim.body(BodyId::new(0)).unwrap().root().position().z < 0.0);
}

// ============================================================================
// Extra joints
// ============================================================================

/// Ball center pinned to a world point through a static anchor. Gravity
/// cannot pull it away.
#[test]
fn extra_joint_pins_ball_to_anchor() {
    let mut sim = Simulator::new(euler());
    sim.add_extra_joint(ExtraJointSpec::ball(
        ("ball", "root"),
        Point3::origin(),
        ("ground", "plane"),
        Point3::new(0.0, 0.0, 1.0),
    ))
    .unwrap();
    let report = sim.initialize(vec![ball("ball", 0.1, 1.0), ground()]).unwrap();
    assert!(report.unresolved_extra_joints.is_empty());
    assert_eq!(sim.world().solver().extra_joints().len(), 1);

    for _ in 0..500 {
        sim.step().unwrap();
    }
    let z = sim.body(BodyId::new(0)).unwrap().root().position().z;
    assert_relative_eq!(z, 1.0, epsilon = 1e-3);

    sim.clear_extra_joints();
    for _ in 0..100 {
        sim.step().unwrap();
    }
    let dropped = sim.body(BodyId::new(0)).unwrap().root().position().z;
    assert!(dropped < z - 0.01);
}

// ============================================================================
// Iteration cap
// ============================================================================

/// Four coupled corner contacts cannot converge in one sweep. The cap is
/// counted, never raised.
#[test]
fn iteration_cap_is_counted_not_raised() {
    let config = euler().solver_iterations(1, 1e-9);
    let mut sim = on_ground(config, crate_box(box_half()), Shape::Box(box_half()));
    for _ in 0..50 {
        sim.step().unwrap();
    }
    let stats = sim.solver_stats();
    assert_eq!(stats.solves, 50);
    assert!(stats.iteration_cap_hits > 0);
    assert_eq!(stats.last_iterations, 1);
}
