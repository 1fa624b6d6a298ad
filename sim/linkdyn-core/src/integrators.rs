//! Time integration of the whole world.
//!
//! Both methods call [`World::compute_accelerations`] once per elementary
//! step, so the constraint solver always sees the state at the start of
//! that step.
//!
//! - **Semi-Implicit Euler**: velocity first, then position from the new
//!   velocity. One evaluation per tick.
//! - **RK4**: classic four-stage scheme on `(q, v)`. Four evaluations per
//!   tick.
//!
//! Free-joint orientations are advanced through the exponential map in
//! [`SimBody::integrate_positions`](crate::SimBody::integrate_positions).

use nalgebra::DVector;

use linkdyn_types::{IntegrationMode, Result};

use crate::model::JointPosition;
use crate::world::World;

/// Advance every body of a world by one tick.
pub trait Integrator {
    /// Integrate the world forward by `dt`.
    fn integrate(world: &mut World, dt: f64) -> Result<()>;
}

/// Dispatch to the integrator selected by `mode`.
pub fn integrate_with_method(mode: IntegrationMode, world: &mut World, dt: f64) -> Result<()> {
    match mode {
        IntegrationMode::SemiImplicitEuler => SemiImplicitEuler::integrate(world, dt),
        IntegrationMode::RungeKutta => RungeKutta4::integrate(world, dt),
    }
}

/// Semi-implicit Euler integration (symplectic Euler).
///
/// ```text
/// v(t+dt) = v(t) + a(t) * dt
/// q(t+dt) = q(t) ⊕ v(t+dt) * dt
/// ```
pub struct SemiImplicitEuler;

impl Integrator for SemiImplicitEuler {
    fn integrate(world: &mut World, dt: f64) -> Result<()> {
        let accels = world.compute_accelerations(dt);
        for (body, a) in world.bodies_mut().zip(&accels) {
            if body.is_static() {
                continue;
            }
            let mut v = body.velocity();
            v.axpy(dt, a, 1.0);
            body.set_velocity(&v)?;
            body.set_accelerations(a);
            body.integrate_positions(&v, dt);
            body.forward_kinematics();
        }
        Ok(())
    }
}

/// Classic fourth-order Runge-Kutta.
///
/// ```text
/// k1 = a(q0, v0)
/// k2 = a(q0 ⊕ v0·dt/2, v0 + k1·dt/2)
/// k3 = a(q0 ⊕ v2·dt/2, v0 + k2·dt/2)
/// k4 = a(q0 ⊕ v3·dt,   v0 + k3·dt)
/// v  = v0 + dt/6 (k1 + 2k2 + 2k3 + k4)
/// q  = q0 ⊕ dt/6 (v0 + 2v2 + 2v3 + v4)
/// ```
pub struct RungeKutta4;

struct Stage {
    q0: Vec<JointPosition>,
    v0: DVector<f64>,
    v: Vec<DVector<f64>>,
    k: Vec<DVector<f64>>,
}

impl RungeKutta4 {
    /// Place every body at `q0 ⊕ v_q·h` with velocity `v0 + k·h` and refresh
    /// kinematics.
    fn set_stage(world: &mut World, stages: &mut [Stage], h: f64, q_rate: usize) -> Result<()> {
        for (body, stage) in world.bodies_mut().zip(stages.iter_mut()) {
            if body.is_static() {
                continue;
            }
            let Some(k) = stage.k.last() else {
                continue;
            };
            let mut v = stage.v0.clone();
            v.axpy(h, k, 1.0);
            body.set_positions(&stage.q0)?;
            body.integrate_positions(&stage.v[q_rate], h);
            body.set_velocity(&v)?;
            body.forward_kinematics();
            stage.v.push(v);
        }
        Ok(())
    }

    fn record(world: &mut World, stages: &mut [Stage], dt: f64) {
        let accels = world.compute_accelerations(dt);
        for (stage, a) in stages.iter_mut().zip(accels) {
            stage.k.push(a);
        }
    }
}

impl Integrator for RungeKutta4 {
    fn integrate(world: &mut World, dt: f64) -> Result<()> {
        let mut stages: Vec<Stage> = world
            .bodies()
            .iter()
            .map(|body| Stage {
                q0: body.positions(),
                v0: body.velocity(),
                v: vec![body.velocity()],
                k: Vec::with_capacity(4),
            })
            .collect();

        // k1 at the initial state.
        Self::record(world, &mut stages, dt);
        // k2 at the midpoint along v0.
        Self::set_stage(world, &mut stages, dt / 2.0, 0)?;
        Self::record(world, &mut stages, dt);
        // k3 at the midpoint along v2.
        Self::set_stage(world, &mut stages, dt / 2.0, 1)?;
        Self::record(world, &mut stages, dt);
        // k4 at the end along v3.
        Self::set_stage(world, &mut stages, dt, 2)?;
        Self::record(world, &mut stages, dt);

        for (body, stage) in world.bodies_mut().zip(&stages) {
            if body.is_static() || stage.k.len() < 4 || stage.v.len() < 4 {
                continue;
            }
            let accel = (&stage.k[0] + &stage.k[1] * 2.0 + &stage.k[2] * 2.0 + &stage.k[3]) / 6.0;
            let rate = (&stage.v[0] + &stage.v[1] * 2.0 + &stage.v[2] * 2.0 + &stage.v[3]) / 6.0;
            let mut v = stage.v0.clone();
            v.axpy(dt, &accel, 1.0);

            body.set_positions(&stage.q0)?;
            body.integrate_positions(&rate, dt);
            body.set_velocity(&v)?;
            body.set_accelerations(&accel);
            body.forward_kinematics();
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, BodyDescription, LinkDescription, SimBody};
    use approx::assert_relative_eq;
    use linkdyn_types::{BodyId, JointType, MassProperties, SimulatorConfig, StateMode};
    use nalgebra::Vector3;

    fn world_with(body: BodyDescription) -> World {
        let config = SimulatorConfig::default().gravity(Vector3::new(0.0, 0.0, -10.0));
        let mut world = World::new(&config);
        world.add_body(SimBody::from_description(BodyId::new(0), &body).unwrap().0);
        world
    }

    fn ball() -> BodyDescription {
        BodyDescription::new("ball")
            .root_pose(pose_at(0.0, 0.0, 10.0))
            .link(
                LinkDescription::new("root")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::sphere(1.0, 0.1)),
            )
    }

    fn pendulum() -> BodyDescription {
        BodyDescription::new("pendulum")
            .link(LinkDescription::new("base").mass(MassProperties::point_mass(1.0)))
            .link(
                LinkDescription::new("arm")
                    .parent(0)
                    .joint(JointType::Revolute, Vector3::y())
                    .mass(MassProperties::point_mass(1.0).with_center_of_mass(Vector3::new(1.0, 0.0, 0.0)))
                    .mode(StateMode::empty()),
            )
    }

    #[test]
    fn test_euler_free_fall() {
        let mut world = world_with(ball());
        for _ in 0..100 {
            SemiImplicitEuler::integrate(&mut world, 0.01).unwrap();
        }
        let root = world.bodies()[0].root();
        assert_relative_eq!(root.linear_velocity().z, -10.0, epsilon = 1e-9);
        // Symplectic Euler overshoots the drop by g·T·dt/2.
        assert_relative_eq!(root.position().z, 10.0 - 5.0 - 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_rk4_free_fall_is_exact() {
        let mut world = world_with(ball());
        for _ in 0..100 {
            RungeKutta4::integrate(&mut world, 0.01).unwrap();
        }
        let root = world.bodies()[0].root();
        assert_relative_eq!(root.linear_velocity().z, -10.0, epsilon = 1e-9);
        assert_relative_eq!(root.position().z, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rk4_tracks_pendulum_energy_better_than_euler() {
        let energy = |world: &World| {
            let body = &world.bodies()[0];
            let com = body.links()[1].center_of_mass();
            let speed = body.point_velocity(1, &com).norm();
            0.5 * speed * speed + 10.0 * com.z
        };

        let mut euler = world_with(pendulum());
        let mut rk4 = world_with(pendulum());
        let e0 = energy(&rk4);
        let mut drift_euler = 0.0_f64;
        let mut drift_rk4 = 0.0_f64;
        for _ in 0..200 {
            SemiImplicitEuler::integrate(&mut euler, 0.005).unwrap();
            RungeKutta4::integrate(&mut rk4, 0.005).unwrap();
            drift_euler = drift_euler.max((energy(&euler) - e0).abs());
            drift_rk4 = drift_rk4.max((energy(&rk4) - e0).abs());
        }
        assert!(drift_rk4 < 1e-4, "rk4 drift {drift_rk4}");
        assert!(drift_rk4 < drift_euler);
    }

    #[test]
    fn test_dispatch_matches_mode() {
        let mut a = world_with(ball());
        let mut b = world_with(ball());
        integrate_with_method(IntegrationMode::SemiImplicitEuler, &mut a, 0.01).unwrap();
        SemiImplicitEuler::integrate(&mut b, 0.01).unwrap();
        assert_eq!(a.bodies()[0].velocity(), b.bodies()[0].velocity());
    }
}
