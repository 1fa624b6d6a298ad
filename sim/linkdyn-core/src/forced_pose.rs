//! Forced pose override.
//!
//! A single-slot handoff between any thread that wants to pin a body and
//! the stepping thread. Only the latest request matters; there is no queue.
//! The lock is held for the read or write alone, never across a step.
//!
//! ```text
//! controller thread ──request──► [ Mutex<Option<request>> ] ──apply──► stepping thread
//! ```
//!
//! The stepping thread installs a post-dynamics hook while a request is
//! active and removes it once every request is cleared.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nalgebra::Isometry3;

use linkdyn_types::BodyId;

use crate::world::World;

/// Requested absolute root pose of one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedPoseRequest {
    /// Target body.
    pub body: BodyId,
    /// Root link world pose.
    pub pose: Isometry3<f64>,
}

/// Cloneable handle to the override slot.
#[derive(Debug, Clone, Default)]
pub struct ForcedPoseOverride {
    slot: Arc<Mutex<Option<ForcedPoseRequest>>>,
}

impl ForcedPoseOverride {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ForcedPoseRequest>> {
        // The slot holds plain data, so a poisoned lock is still usable.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pin `body` at `pose`, replacing any earlier request.
    pub fn request(&self, body: BodyId, pose: Isometry3<f64>) {
        *self.lock() = Some(ForcedPoseRequest { body, pose });
    }

    /// The active request, if any.
    #[must_use]
    pub fn current(&self) -> Option<ForcedPoseRequest> {
        *self.lock()
    }

    /// Whether any request is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether the active request targets `body`.
    #[must_use]
    pub fn is_active_for(&self, body: BodyId) -> bool {
        self.lock().is_some_and(|r| r.body == body)
    }

    /// Clear the request for `body`. Returns false when `body` is not the
    /// current target.
    pub fn clear(&self, body: BodyId) -> bool {
        let mut slot = self.lock();
        if slot.is_some_and(|r| r.body == body) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Clear any request.
    pub fn clear_all(&self) {
        *self.lock() = None;
    }

    /// Write the requested pose to the target body's root, zero its root
    /// velocity and propagate through the chain. Returns whether a body was
    /// moved.
    pub fn apply(&self, world: &mut World) -> bool {
        let Some(request) = self.current() else {
            return false;
        };
        let Some(body) = world.body_mut(request.body) else {
            return false;
        };
        body.set_root_pose(&request.pose);
        body.forward_kinematics();
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{pose_at, BodyDescription, LinkDescription, SimBody};
    use approx::assert_relative_eq;
    use linkdyn_types::{JointType, MassProperties, Twist};
    use nalgebra::Vector3;
    use std::thread;

    fn world_with_ball() -> World {
        let desc = BodyDescription::new("ball")
            .root_pose(pose_at(0.0, 0.0, 1.0))
            .root_twist(Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 3.0)))
            .link(
                LinkDescription::new("root")
                    .joint(JointType::Free, Vector3::z())
                    .mass(MassProperties::sphere(1.0, 0.1)),
            );
        let mut world = World::default();
        world.add_body(SimBody::from_description(BodyId::new(0), &desc).unwrap().0);
        world
    }

    #[test]
    fn test_latest_request_wins() {
        let handle = ForcedPoseOverride::new();
        handle.request(BodyId::new(0), pose_at(0.0, 0.0, 1.0));
        handle.request(BodyId::new(1), pose_at(0.0, 0.0, 2.0));
        assert!(!handle.is_active_for(BodyId::new(0)));
        assert!(handle.is_active_for(BodyId::new(1)));
        assert!(!handle.clear(BodyId::new(0)));
        assert!(handle.clear(BodyId::new(1)));
        assert!(!handle.is_active());
    }

    #[test]
    fn test_apply_pins_root_and_zeroes_velocity() {
        let mut world = world_with_ball();
        let handle = ForcedPoseOverride::new();
        handle.request(BodyId::new(0), pose_at(2.0, 0.0, 0.5));
        assert!(handle.apply(&mut world));

        let root = world.bodies()[0].root();
        assert_relative_eq!(root.position().x, 2.0);
        assert_relative_eq!(root.position().z, 0.5);
        assert_relative_eq!(root.velocity.norm(), 0.0);
    }

    #[test]
    fn test_request_from_another_thread_is_visible() {
        let handle = ForcedPoseOverride::new();
        let remote = handle.clone();
        thread::spawn(move || remote.request(BodyId::new(3), Isometry3::identity()))
            .join()
            .unwrap();
        assert!(handle.is_active_for(BodyId::new(3)));
    }

    #[test]
    fn test_unknown_body_is_ignored() {
        let mut world = world_with_ball();
        let handle = ForcedPoseOverride::new();
        handle.request(BodyId::new(7), Isometry3::identity());
        assert!(!handle.apply(&mut world));
    }
}
