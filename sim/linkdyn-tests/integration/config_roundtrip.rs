//! Configuration archives.
//!
//! Archived settings reload into the same configuration, and a reloaded
//! configuration reproduces the same run bit for bit.

use std::sync::Arc;

use linkdyn_contact::{ContactMaterial, LinkRef, UniformMaterial};
use linkdyn_core::Simulator;
use linkdyn_types::{BodyId, DynamicsMode, IntegrationMode, SimulatorConfig};
use nalgebra::Vector3;

use crate::common::{crate_box, ground, PlaneDetector, Shape, GROUND};

fn tuned() -> SimulatorConfig {
    SimulatorConfig::default()
        .integration(IntegrationMode::SemiImplicitEuler)
        .gravity(Vector3::new(1.5, 0.0, -9.8))
        .friction_range(0.1, 0.8)
        .solver_iterations(200, 1e-5)
        .contact_correction(0.0005, 2.0)
        .restitution(0.25)
}

// ============================================================================
// Archive format
// ============================================================================

#[test]
fn archive_uses_stable_names() {
    let json = serde_json::to_value(tuned()).unwrap();
    assert_eq!(json["dynamicsMode"], "Forward dynamics");
    assert_eq!(json["integrationMode"], "semi-implicit_euler");
    assert_eq!(json["timeStep"], 0.001);
    assert_eq!(json["maxNumIterations"], 200);
    assert_eq!(json["epsilon"], 0.25);
    assert_eq!(json["2Dmode"], false);
    assert_eq!(json["allLinkPositionOutputMode"], false);
    assert_eq!(json["min_friction_coefficient"], 0.1);
}

#[test]
fn archive_round_trips() {
    let config = tuned().kinematics().planar(true);
    let text = serde_json::to_string_pretty(&config).unwrap();
    let back: SimulatorConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn empty_archive_is_default() {
    let config: SimulatorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, SimulatorConfig::default());
}

/// An archive without an integration key runs semi-implicit Euler.
#[test]
fn missing_integration_mode_selects_euler() {
    let config: SimulatorConfig = serde_json::from_str(r#"{"timeStep": 0.002}"#).unwrap();
    assert_eq!(config.integration_mode, IntegrationMode::SemiImplicitEuler);
    assert_eq!(
        serde_json::to_value(SimulatorConfig::default()).unwrap()["integrationMode"],
        "semi-implicit_euler"
    );
}

#[test]
fn mode_symbols_parse() {
    let config: SimulatorConfig = serde_json::from_str(
        r#"{"dynamicsMode": "Kinematics", "integrationMode": "Runge Kutta", "kinematicWalking": true}"#,
    )
    .unwrap();
    assert_eq!(config.dynamics_mode, DynamicsMode::Kinematics);
    assert_eq!(config.integration_mode, IntegrationMode::RungeKutta);
    assert!(config.kinematic_walking);

    let euler: SimulatorConfig =
        serde_json::from_str(r#"{"integrationMode": "semi-implicit_euler"}"#).unwrap();
    assert_eq!(euler.integration_mode, IntegrationMode::SemiImplicitEuler);
}

/// Archived values are not trusted: a bad timestep is caught when the
/// simulator starts.
#[test]
fn invalid_archive_is_rejected_at_initialize() {
    let config: SimulatorConfig = serde_json::from_str(r#"{"timeStep": -0.01}"#).unwrap();
    let mut sim = Simulator::new(config);
    let err = sim.initialize(vec![ground()]).unwrap_err();
    assert!(err.is_config_error());
}

// ============================================================================
// Reproducibility
// ============================================================================

fn sliding_box(config: SimulatorConfig) -> Simulator {
    let half = Vector3::new(0.2, 0.2, 0.05);
    let mut sim = Simulator::new(config);
    sim.set_collision_detector(Box::new(
        PlaneDetector::new(GROUND).with(LinkRef::new(0, 0), Shape::Box(half)),
    ));
    sim.set_material_table(Arc::new(UniformMaterial(ContactMaterial::with_friction(0.15))));
    sim.initialize(vec![crate_box(half), ground()]).unwrap();
    sim
}

#[test]
fn reloaded_config_reproduces_run() {
    let original = tuned();
    let reloaded: SimulatorConfig =
        serde_json::from_str(&serde_json::to_string(&original).unwrap()).unwrap();

    let mut a = sliding_box(original);
    let mut b = sliding_box(reloaded);
    for _ in 0..200 {
        let ra = a.step().unwrap();
        let rb = b.step().unwrap();
        assert_eq!(ra, rb);
        assert_eq!(
            a.world().solver().last_contacts(),
            b.world().solver().last_contacts()
        );
    }
    let (ba, bb) = (a.body(BodyId::new(0)).unwrap(), b.body(BodyId::new(0)).unwrap());
    assert_eq!(ba.positions(), bb.positions());
    assert_eq!(ba.velocity(), bb.velocity());
    assert_eq!(a.solver_stats(), b.solver_stats());
}
