//! Kinematic walking through the simulator.
//!
//! The tripod fixture starts with foot heights `[0.10, 0.05, 0.08]`, so the
//! second foot (link 2) supports the body.

use approx::assert_relative_eq;
use linkdyn_core::Simulator;
use linkdyn_types::{Actuation, BodyId, SimulatorConfig};

use crate::common::{ball, tripod};

fn walking_sim(walking: bool) -> (Simulator, BodyId) {
    let config = SimulatorConfig::default()
        .kinematics()
        .kinematic_walking(walking);
    let mut sim = Simulator::new(config);
    let id = sim.initialize(vec![tripod()]).unwrap().registered[0];
    (sim, id)
}

fn foot_heights(sim: &Simulator, id: BodyId) -> Vec<f64> {
    let body = sim.body(id).unwrap();
    body.feet()
        .iter()
        .map(|&f| body.links()[f].position().z)
        .collect()
}

#[test]
fn lowest_foot_supports_initially() {
    let (sim, id) = walking_sim(true);
    assert_eq!(sim.support_foot(id), Some(2));
}

#[test]
fn support_stays_without_target_change() {
    let (mut sim, id) = walking_sim(true);
    let result = sim.step().unwrap();
    assert_eq!(result.support_switches, 0);
    assert_eq!(sim.support_foot(id), Some(2));

    let heights = foot_heights(&sim, id);
    assert_relative_eq!(heights[0], 0.10, epsilon = 1e-12);
    assert_relative_eq!(heights[1], 0.05, epsilon = 1e-12);
    assert_relative_eq!(heights[2], 0.08, epsilon = 1e-12);
}

/// Extending the first leg drops it 1 cm below the support. Support moves
/// once, and the new support foot is snapped to the old support height.
#[test]
fn lower_foot_takes_support_with_snap() {
    let (mut sim, id) = walking_sim(true);
    sim.set_actuation_target(id, "foot0", Actuation::Displacement { q: -0.06, dq: 0.0 })
        .unwrap();

    let result = sim.step().unwrap();
    assert_eq!(result.support_switches, 1);
    assert_eq!(sim.support_foot(id), Some(1));

    let heights = foot_heights(&sim, id);
    assert_relative_eq!(heights[0], 0.05, epsilon = 1e-12);
    assert_relative_eq!(heights[1], 0.06, epsilon = 1e-12);
    assert_relative_eq!(heights[2], 0.09, epsilon = 1e-12);

    let again = sim.step().unwrap();
    assert_eq!(again.support_switches, 0);
    assert_eq!(sim.support_foot(id), Some(1));
}

#[test]
fn equal_height_keeps_support() {
    let (mut sim, id) = walking_sim(true);
    sim.set_actuation_target(id, "foot0", Actuation::Displacement { q: -0.05, dq: 0.0 })
        .unwrap();
    let result = sim.step().unwrap();
    assert_eq!(result.support_switches, 0);
    assert_eq!(sim.support_foot(id), Some(2));
}

/// With walking off the root stays put and the leg moves under it.
#[test]
fn walking_disabled_solves_from_root() {
    let (mut sim, id) = walking_sim(false);
    sim.set_actuation_target(id, "foot0", Actuation::Displacement { q: -0.06, dq: 0.0 })
        .unwrap();
    let result = sim.step().unwrap();
    assert_eq!(result.support_switches, 0);

    let body = sim.body(id).unwrap();
    assert_relative_eq!(body.root().position().z, 1.0, epsilon = 1e-12);
    let heights = foot_heights(&sim, id);
    assert_relative_eq!(heights[0], 0.04, epsilon = 1e-12);
}

#[test]
fn body_without_feet_is_not_walked() {
    let config = SimulatorConfig::default()
        .kinematics()
        .kinematic_walking(true);
    let mut sim = Simulator::new(config);
    let id = sim.initialize(vec![ball("ball", 0.1, 1.0)]).unwrap().registered[0];
    assert_eq!(sim.support_foot(id), None);

    for _ in 0..10 {
        sim.step().unwrap();
    }
    // Kinematics mode ignores gravity.
    assert_relative_eq!(
        sim.body(id).unwrap().root().position().z,
        1.0,
        epsilon = 1e-12
    );
}
