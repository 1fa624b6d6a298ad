//! Free fall without contacts.
//!
//! With constant gravity both integrators reproduce the velocity exactly.
//! Positions differ: semi-implicit Euler overshoots the drop by `g·T·dt/2`,
//! RK4 is exact for a quadratic trajectory.

use approx::assert_relative_eq;
use linkdyn_core::{Simulator, StateMode, Twist};
use linkdyn_types::{IntegrationMode, SimulatorConfig, STANDARD_GRAVITY};
use nalgebra::Vector3;

use crate::common::{arm, ball};

fn drop_ball(mode: IntegrationMode, steps: usize) -> (f64, f64) {
    let mut sim = Simulator::new(SimulatorConfig::default().integration(mode));
    let id = sim.initialize(vec![ball("ball", 0.1, 10.0)]).unwrap().registered[0];
    for _ in 0..steps {
        sim.step().unwrap();
    }
    let root = sim.body(id).unwrap().root();
    (root.position().z, root.linear_velocity().z)
}

// ============================================================================
// Velocity
// ============================================================================

#[test]
fn euler_velocity_matches_gravity() {
    let (_, vz) = drop_ball(IntegrationMode::SemiImplicitEuler, 500);
    assert_relative_eq!(vz, -STANDARD_GRAVITY * 0.5, epsilon = 1e-9);
}

#[test]
fn rk4_velocity_matches_gravity() {
    let (_, vz) = drop_ball(IntegrationMode::RungeKutta, 500);
    assert_relative_eq!(vz, -STANDARD_GRAVITY * 0.5, epsilon = 1e-9);
}

// ============================================================================
// Position
// ============================================================================

#[test]
fn euler_position_has_first_order_error() {
    let (z, _) = drop_ball(IntegrationMode::SemiImplicitEuler, 500);
    let (t, dt) = (0.5, 0.001);
    let exact = 10.0 - 0.5 * STANDARD_GRAVITY * t * t;
    assert_relative_eq!(z, exact - 0.5 * STANDARD_GRAVITY * t * dt, epsilon = 1e-9);
}

#[test]
fn rk4_position_is_exact() {
    let (z, _) = drop_ball(IntegrationMode::RungeKutta, 500);
    assert_relative_eq!(z, 10.0 - 0.5 * STANDARD_GRAVITY * 0.25, epsilon = 1e-9);
}

#[test]
fn custom_gravity_direction() {
    let config = SimulatorConfig::default()
        .gravity(Vector3::new(2.0, 0.0, 0.0))
        .integration(IntegrationMode::SemiImplicitEuler);
    let mut sim = Simulator::new(config);
    let id = sim.initialize(vec![ball("ball", 0.1, 0.0)]).unwrap().registered[0];
    for _ in 0..1000 {
        sim.step().unwrap();
    }
    let v = sim.body(id).unwrap().root().linear_velocity();
    assert_relative_eq!(v, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-9);
}

#[test]
fn initial_twist_carries_over() {
    let twist = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
    let mut sim = Simulator::new(SimulatorConfig::default().zero_gravity());
    let id = sim
        .initialize(vec![ball("ball", 0.1, 1.0).root_twist(twist)])
        .unwrap()
        .registered[0];
    for _ in 0..1000 {
        sim.step().unwrap();
    }
    let root = sim.body(id).unwrap().root();
    assert_relative_eq!(root.position().x, 1.0, epsilon = 1e-9);
    assert_relative_eq!(root.position().z, 1.0, epsilon = 1e-9);
}

// ============================================================================
// Articulated
// ============================================================================

/// Passive pendulum released horizontally. The arm accelerates at `g / l`
/// at the start and passes through the bottom at `sqrt(2 g l)`.
#[test]
fn pendulum_reaches_bottom_speed() {
    let mut sim = Simulator::new(SimulatorConfig::default().integration(IntegrationMode::RungeKutta));
    let id = sim
        .initialize(vec![arm(Vector3::y(), StateMode::empty())])
        .unwrap()
        .registered[0];

    let mut max_rate = 0.0_f64;
    for _ in 0..1000 {
        sim.step().unwrap();
        let dq = sim.body(id).unwrap().links()[1].dq;
        max_rate = max_rate.max(dq.abs());
    }
    assert_relative_eq!(max_rate, (2.0 * STANDARD_GRAVITY).sqrt(), epsilon = 1e-3);
}

#[test]
fn planar_mode_removes_out_of_plane_motion() {
    let twist = Twist::new(Vector3::new(1.0, 1.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
    let config = SimulatorConfig::default()
        .zero_gravity()
        .planar(true)
        .integration(IntegrationMode::SemiImplicitEuler);
    let mut sim = Simulator::new(config);
    let id = sim
        .initialize(vec![ball("ball", 0.1, 1.0).root_twist(twist)])
        .unwrap()
        .registered[0];
    sim.step().unwrap();

    let root = sim.body(id).unwrap().root();
    let v = root.linear_velocity();
    let w = root.angular_velocity();
    assert_relative_eq!(v.y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(w.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(w.z, 0.0, epsilon = 1e-9);
    assert_relative_eq!(v.x, 1.0, epsilon = 1e-6);
    assert_relative_eq!(w.y, 1.0, epsilon = 1e-6);
}
