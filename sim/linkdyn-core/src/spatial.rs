//! 6D spatial algebra in `[angular; linear]` order.
//!
//! All spatial quantities are referenced to the world origin:
//!
//! - motion `[ω; vo]` where `vo = v - ω × p` for a link origin at `p`
//! - force `[n; f]` where `n` is the moment about the world origin

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

/// Build a spatial vector from angular and linear parts.
#[inline]
pub fn spatial(angular: &Vector3<f64>, linear: &Vector3<f64>) -> Vector6<f64> {
    Vector6::new(
        angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
    )
}

/// Angular (top 3) component.
#[inline]
pub fn angular(v: &Vector6<f64>) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

/// Linear (bottom 3) component.
#[inline]
pub fn linear(v: &Vector6<f64>) -> Vector3<f64> {
    Vector3::new(v[3], v[4], v[5])
}

/// Motion cross product `v ×ₘ m`.
pub fn cross_motion(v: &Vector6<f64>, m: &Vector6<f64>) -> Vector6<f64> {
    let w = angular(v);
    let vo = linear(v);
    let a = angular(m);
    let b = linear(m);
    spatial(&w.cross(&a), &(w.cross(&b) + vo.cross(&a)))
}

/// Force cross product `v ×f f`.
pub fn cross_force(v: &Vector6<f64>, f: &Vector6<f64>) -> Vector6<f64> {
    let w = angular(v);
    let vo = linear(v);
    let n = angular(f);
    let force = linear(f);
    spatial(&(w.cross(&n) + vo.cross(&force)), &w.cross(&force))
}

/// Velocity of the world point `x` moving with spatial velocity `v`.
#[inline]
pub fn point_velocity(v: &Vector6<f64>, x: &Vector3<f64>) -> Vector3<f64> {
    linear(v) + angular(v).cross(x)
}

/// Spatial inertia about the world origin of a body with mass `m`, world
/// center of mass `c` and world rotational inertia `ic` about `c`.
///
/// ```text
/// ┌ Ic - m[c]×[c]×   m[c]× ┐
/// └ -m[c]×           m·1   ┘
/// ```
pub fn spatial_inertia(m: f64, c: &Vector3<f64>, ic: &Matrix3<f64>) -> Matrix6<f64> {
    let cx = c.cross_matrix();
    let mut out = Matrix6::zeros();
    out.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(ic - m * cx * cx));
    out.fixed_view_mut::<3, 3>(0, 3).copy_from(&(m * cx));
    out.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-m * cx));
    out.fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(Matrix3::identity() * m));
    out
}

/// Wrench `(f, τ)` applied at world point `c`, as a spatial force.
#[inline]
pub fn wrench_at(c: &Vector3<f64>, force: &Vector3<f64>, torque: &Vector3<f64>) -> Vector6<f64> {
    spatial(&(torque + c.cross(force)), force)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_velocity_of_origin_referenced_twist() {
        // Spinning about z through p = (1, 0, 0): the point p itself is still.
        let p = Vector3::new(1.0, 0.0, 0.0);
        let w = Vector3::new(0.0, 0.0, 2.0);
        let v = spatial(&w, &(-w.cross(&p)));
        assert_relative_eq!(point_velocity(&v, &p), Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(
            point_velocity(&v, &Vector3::zeros()),
            Vector3::new(0.0, -2.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_spatial_inertia_momentum() {
        // Translating point mass: momentum m v, moment c × m v.
        let m = 2.0;
        let c = Vector3::new(0.0, 1.0, 0.0);
        let inertia = spatial_inertia(m, &c, &Matrix3::zeros());
        let v = spatial(&Vector3::zeros(), &Vector3::new(3.0, 0.0, 0.0));
        let h = inertia * v;
        assert_relative_eq!(linear(&h), Vector3::new(6.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(angular(&h), c.cross(&Vector3::new(6.0, 0.0, 0.0)), epsilon = 1e-12);
    }

    #[test]
    fn test_spatial_inertia_is_symmetric() {
        let inertia = spatial_inertia(
            1.5,
            &Vector3::new(0.3, -0.2, 0.7),
            &Matrix3::from_diagonal(&Vector3::new(0.1, 0.2, 0.3)),
        );
        assert_relative_eq!(inertia, inertia.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_cross_products_are_dual() {
        let v = Vector6::new(0.1, 0.2, 0.3, 0.4, 0.5, 0.6);
        let m = Vector6::new(-0.3, 0.1, 0.7, 0.2, -0.5, 0.4);
        let f = Vector6::new(1.0, -2.0, 0.5, 0.3, 0.8, -0.1);
        // (v ×ₘ m) · f = -m · (v ×f f)
        assert_relative_eq!(
            cross_motion(&v, &m).dot(&f),
            -m.dot(&cross_force(&v, &f)),
            epsilon = 1e-12
        );
    }
}
