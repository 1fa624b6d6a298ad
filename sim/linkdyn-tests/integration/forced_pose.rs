//! Forced pose override.
//!
//! A pinned body ignores gravity: the override runs after dynamics and
//! rewrites the root pose with zero velocity.

use std::thread;

use approx::assert_relative_eq;
use linkdyn_core::{pose_at, Simulator};
use linkdyn_types::BodyId;
use nalgebra::Vector3;

use crate::common::ball;

fn two_balls() -> (Simulator, BodyId, BodyId) {
    let mut sim = Simulator::default();
    let report = sim
        .initialize(vec![ball("a", 0.1, 1.0), ball("b", 0.1, 1.0)])
        .unwrap();
    (sim, report.registered[0], report.registered[1])
}

fn height(sim: &Simulator, id: BodyId) -> f64 {
    sim.body(id).unwrap().root().position().z
}

#[test]
fn pinned_body_holds_pose() {
    let (mut sim, a, b) = two_balls();
    sim.set_forced_pose(a, pose_at(0.5, 0.0, 2.0));
    assert!(sim.has_forced_pose_hook());
    assert!(sim.is_forced_pose_active_for(a));
    assert!(!sim.is_forced_pose_active_for(b));

    for _ in 0..100 {
        sim.step().unwrap();
    }
    let root = sim.body(a).unwrap().root();
    assert_relative_eq!(root.position().coords, Vector3::new(0.5, 0.0, 2.0), epsilon = 1e-12);
    assert_relative_eq!(root.linear_velocity().norm(), 0.0, epsilon = 1e-12);

    // The other body falls as usual.
    assert!(height(&sim, b) < 1.0);
}

/// Requesting the same pose twice leaves the same state as requesting it
/// once.
#[test]
fn repeated_request_is_idempotent() {
    let (mut once, a, _) = two_balls();
    once.set_forced_pose(a, pose_at(0.0, 0.0, 3.0));

    let (mut twice, a2, _) = two_balls();
    twice.set_forced_pose(a2, pose_at(0.0, 0.0, 3.0));
    twice.set_forced_pose(a2, pose_at(0.0, 0.0, 3.0));

    for _ in 0..10 {
        once.step().unwrap();
        twice.step().unwrap();
    }
    assert_eq!(once.body(a).unwrap().positions(), twice.body(a2).unwrap().positions());
    assert_eq!(once.body(a).unwrap().velocity(), twice.body(a2).unwrap().velocity());
}

#[test]
fn latest_request_replaces_earlier_target() {
    let (mut sim, a, b) = two_balls();
    sim.set_forced_pose(a, pose_at(0.0, 0.0, 3.0));
    sim.set_forced_pose(b, pose_at(0.0, 0.0, 4.0));
    assert!(!sim.is_forced_pose_active_for(a));
    assert!(sim.is_forced_pose_active_for(b));

    sim.step().unwrap();
    assert_relative_eq!(height(&sim, b), 4.0, epsilon = 1e-12);
    assert!(height(&sim, a) < 1.0);
}

/// Another thread requests through a cloned handle. The stepping thread
/// picks the request up on its next tick.
#[test]
fn request_from_another_thread() {
    let (mut sim, a, _) = two_balls();
    let handle = sim.forced_pose_handle();
    assert!(!sim.has_forced_pose_hook());

    thread::spawn(move || handle.request(a, pose_at(0.0, 1.0, 5.0)))
        .join()
        .unwrap();

    sim.step().unwrap();
    assert!(sim.has_forced_pose_hook());
    let p = sim.body(a).unwrap().root().position();
    assert_relative_eq!(p.coords, Vector3::new(0.0, 1.0, 5.0), epsilon = 1e-12);
}

#[test]
fn cleared_body_falls_again() {
    let (mut sim, a, b) = two_balls();
    sim.set_forced_pose(a, pose_at(0.0, 0.0, 2.0));
    for _ in 0..10 {
        sim.step().unwrap();
    }

    assert!(!sim.clear_forced_pose(b));
    assert!(sim.has_forced_pose_hook());
    assert!(sim.clear_forced_pose(a));
    assert!(!sim.has_forced_pose_hook());
    assert!(!sim.is_forced_pose_active_for(a));

    for _ in 0..100 {
        sim.step().unwrap();
    }
    assert!(height(&sim, a) < 2.0);
}

#[test]
fn clear_from_handle_removes_hook_next_tick() {
    let (mut sim, a, _) = two_balls();
    sim.set_forced_pose(a, pose_at(0.0, 0.0, 2.0));
    sim.forced_pose_handle().clear_all();
    assert!(sim.has_forced_pose_hook());

    sim.step().unwrap();
    assert!(!sim.has_forced_pose_hook());
    assert!(height(&sim, a) < 1.0);
}

#[test]
fn unknown_body_request_is_ignored() {
    let (mut sim, a, _) = two_balls();
    sim.set_forced_pose(BodyId::new(9), pose_at(0.0, 0.0, 2.0));
    sim.step().unwrap();
    assert!(height(&sim, a) < 1.0);
    sim.clear_forced_poses();
    assert!(!sim.has_forced_pose_hook());
}
