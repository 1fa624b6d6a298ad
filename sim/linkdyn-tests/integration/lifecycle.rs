//! Driver lifecycle and body registration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use linkdyn_core::{
    BodyDescription, ConfirmPolicy, LinkDescription, Simulator, SimulatorState,
};
use linkdyn_types::{
    BodyId, IntegrationMode, JointType, MassProperties, SimError, SimulatorConfig,
};
use nalgebra::Vector3;

use crate::common::ball;

// ============================================================================
// Registration
// ============================================================================

#[test]
fn massless_static_body_is_accepted() {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![BodyDescription::static_body("wall")
            .link(LinkDescription::new("panel").mass(MassProperties::point_mass(0.0)))])
        .unwrap();
    assert_eq!(report.registered.len(), 1);
    assert!(report.refused.is_empty());
    assert_eq!(sim.body(report.registered[0]).unwrap().nv(), 0);
    sim.step().unwrap();
}

#[test]
fn massless_moving_body_is_refused() {
    let mut sim = Simulator::default();
    let ghost = BodyDescription::new("ghost").link(
        LinkDescription::new("root")
            .joint(JointType::Free, Vector3::z())
            .mass(MassProperties::point_mass(0.0)),
    );
    let report = sim.initialize(vec![ghost, ball("ball", 0.1, 1.0)]).unwrap();

    assert_eq!(report.registered, vec![BodyId::new(0)]);
    assert_eq!(report.refused.len(), 1);
    assert_eq!(report.refused[0].name, "ghost");
    assert!(report.refused[0].error.is_unsimulatable());

    // The accepted body takes the first id and the run goes on.
    assert_eq!(sim.find_body("ball"), Some(BodyId::new(0)));
    assert_eq!(sim.find_body("ghost"), None);
    sim.step().unwrap();
}

#[test]
fn attached_body_is_refused() {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![
            ball("carrier", 0.1, 1.0),
            ball("passenger", 0.05, 1.2).attached_to("carrier"),
        ])
        .unwrap();
    assert_eq!(report.registered.len(), 1);
    assert_eq!(report.refused[0].name, "passenger");
    assert!(matches!(
        report.refused[0].error,
        SimError::Unsimulatable { .. }
    ));
}

#[test]
fn malformed_link_tree_is_refused() {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![BodyDescription::new("loose")
            .link(LinkDescription::new("a").mass(MassProperties::point_mass(1.0)))
            .link(LinkDescription::new("b").mass(MassProperties::point_mass(1.0)))])
        .unwrap();
    assert!(report.registered.is_empty());
    assert!(matches!(report.refused[0].error, SimError::InvalidModel { .. }));

    // Nothing left to step.
    assert_eq!(sim.step().unwrap_err(), SimError::NoBodies);
}

/// A chain with a free joint below the root asks whether every link pose
/// should be recorded.
#[test]
fn floating_chain_asks_host() {
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&asked);

    let mut sim = Simulator::default();
    sim.set_confirm_policy(ConfirmPolicy::Ask(Box::new(move |question| {
        counter.fetch_add(1, Ordering::SeqCst);
        question.contains("chain")
    })));
    let chain = BodyDescription::new("chain")
        .link(LinkDescription::new("anchor").mass(MassProperties::point_mass(1.0)))
        .link(
            LinkDescription::new("float")
                .parent(0)
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::sphere(1.0, 0.1)),
        );
    let report = sim.initialize(vec![chain]).unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert!(report.confirmation_requested);
    assert!(report.all_link_positions);
    assert!(sim.config().record_all_link_positions);
}

// ============================================================================
// State machine
// ============================================================================

#[test]
fn full_lifecycle() {
    let mut sim = Simulator::default();
    assert_eq!(sim.state(), SimulatorState::Uninitialized);
    assert!(matches!(
        sim.step().unwrap_err(),
        SimError::InvalidState { .. }
    ));

    sim.initialize(vec![ball("ball", 0.1, 1.0)]).unwrap();
    assert_eq!(sim.state(), SimulatorState::Initialized);
    assert!(sim.initialize(vec![ball("again", 0.1, 1.0)]).is_err());

    let result = sim.step().unwrap();
    assert_eq!(sim.state(), SimulatorState::Stepping);
    assert_eq!(result.step, 1);
    assert_relative_eq!(result.time, 0.001, epsilon = 1e-15);

    sim.finalize();
    sim.finalize();
    assert_eq!(sim.state(), SimulatorState::Finalized);
    assert!(sim.step().is_err());

    sim.clear();
    assert_eq!(sim.state(), SimulatorState::Uninitialized);
    assert!(sim.world().bodies().is_empty());

    let report = sim.initialize(vec![ball("fresh", 0.1, 2.0)]).unwrap();
    assert_eq!(report.registered, vec![BodyId::new(0)]);
    assert_relative_eq!(sim.time(), 0.0);
    sim.step().unwrap();
}

#[test]
fn host_hook_sees_every_tick() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);

    let mut sim = Simulator::default();
    let id = sim.add_post_dynamics_hook(move |world| {
        assert!(world.time() > 0.0);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    sim.initialize(vec![ball("ball", 0.1, 1.0)]).unwrap();
    for _ in 0..5 {
        sim.step().unwrap();
    }
    assert_eq!(ticks.load(Ordering::SeqCst), 5);

    assert!(sim.remove_post_dynamics_hook(id));
    assert!(!sim.remove_post_dynamics_hook(id));
    sim.step().unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 5);
}

// ============================================================================
// Divergence
// ============================================================================

#[test]
fn nan_wrench_is_reported_as_divergence() {
    for mode in [IntegrationMode::SemiImplicitEuler, IntegrationMode::RungeKutta] {
        let mut sim = Simulator::new(SimulatorConfig::default().integration(mode));
        let id = sim
            .initialize(vec![ball("ball", 0.1, 1.0)])
            .unwrap()
            .registered[0];
        sim.apply_external_wrench(id, "root", Vector3::new(f64::NAN, 0.0, 0.0), Vector3::zeros())
            .unwrap();
        let err = sim.step().unwrap_err();
        assert!(err.is_diverged(), "{mode}: {err}");
    }
}

// ============================================================================
// Configuration setters
// ============================================================================

#[test]
fn invalid_settings_keep_previous_values() {
    let mut sim = Simulator::default();
    sim.initialize(vec![ball("ball", 0.1, 1.0)]).unwrap();

    assert!(sim.set_timestep(0.0).is_err());
    assert!(sim.set_timestep(f64::NAN).is_err());
    assert_relative_eq!(sim.config().timestep, 0.001);

    assert!(sim.set_friction_range(0.8, 0.2).is_err());
    assert_relative_eq!(sim.config().max_friction_coefficient, 100.0);

    assert!(sim.set_max_iterations(0).is_err());
    assert_eq!(sim.config().max_iterations, 1000);

    assert!(sim.set_restitution(-0.5).is_err());
    assert_relative_eq!(sim.config().restitution, 0.0);

    // Valid changes take effect between ticks.
    sim.set_timestep(0.002).unwrap();
    let result = sim.step().unwrap();
    assert_relative_eq!(result.time, 0.002, epsilon = 1e-15);
    assert_relative_eq!(sim.world().timestep(), 0.002);
}
