//! Benchmarks for the simulation step.
//!
//! Run with: cargo bench -p linkdyn-core

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Vector3;

use linkdyn_core::{
    mass_matrix, pose_at, BodyDescription, ContactCandidate, ContactPoint, LinkDescription,
    LinkRef, LinkSnapshot, Simulator,
};
use linkdyn_types::{IntegrationMode, JointType, MassProperties, SimulatorConfig};

/// Floating base with a serial chain of `n` revolute links.
fn chain(n: usize) -> BodyDescription {
    let mut desc = BodyDescription::new("chain")
        .root_pose(pose_at(0.0, 0.0, 2.0))
        .link(
            LinkDescription::new("base")
                .joint(JointType::Free, Vector3::z())
                .mass(MassProperties::box_shape(2.0, Vector3::new(0.1, 0.1, 0.1))),
        );
    for i in 0..n {
        let axis = if i % 2 == 0 { Vector3::y() } else { Vector3::x() };
        desc = desc.link(
            LinkDescription::new(format!("link{i}"))
                .parent(i)
                .joint(JointType::Revolute, axis)
                .offset_translation(0.0, 0.0, -0.2)
                .mass(
                    MassProperties::sphere(0.5, 0.05)
                        .with_center_of_mass(Vector3::new(0.0, 0.0, -0.1)),
                ),
        );
    }
    desc
}

fn ground_contacts(links: &[LinkSnapshot]) -> Vec<ContactCandidate> {
    links
        .iter()
        .filter(|s| s.link.body == 0 && s.pose.translation.vector.z < 0.05)
        .map(|s| {
            let p = s.pose.translation.vector;
            let point = ContactPoint::new(
                nalgebra::Point3::new(p.x, p.y, 0.0),
                Vector3::z(),
                0.05 - p.z,
            );
            ContactCandidate::new(s.link, LinkRef::new(1, 0), vec![point])
        })
        .collect()
}

fn bench_free_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_chain_step");
    for n in [2, 8, 16] {
        for (label, mode) in [
            ("euler", IntegrationMode::SemiImplicitEuler),
            ("rk4", IntegrationMode::RungeKutta),
        ] {
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, &n| {
                let mut sim = Simulator::new(SimulatorConfig::default().integration(mode));
                sim.initialize(vec![chain(n)]).unwrap();
                b.iter(|| black_box(sim.step().unwrap()));
            });
        }
    }
    group.finish();
}

fn bench_mass_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("mass_matrix");
    for n in [2, 8, 16, 32] {
        let mut sim = Simulator::default();
        sim.initialize(vec![chain(n)]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let body = &sim.world().bodies()[0];
            b.iter(|| black_box(mass_matrix(body)));
        });
    }
    group.finish();
}

fn bench_resting_contact(c: &mut Criterion) {
    c.bench_function("chain_on_ground", |b| {
        let mut sim = Simulator::new(
            SimulatorConfig::default().integration(IntegrationMode::SemiImplicitEuler),
        );
        sim.set_collision_detector(Box::new(ground_contacts));
        let mut body = chain(4);
        body.root_pose = pose_at(0.0, 0.0, 0.9);
        let ground = BodyDescription::static_body("ground").link(LinkDescription::new("plane"));
        sim.initialize(vec![body, ground]).unwrap();
        for _ in 0..500 {
            sim.step().unwrap();
        }
        b.iter(|| black_box(sim.step().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_free_chain,
    bench_mass_matrix,
    bench_resting_contact
);
criterion_main!(benches);
