//! Actuation classification.
//!
//! Runs once per link at registration. The declared [`StateMode`] bitmask,
//! with the external-wrench input bit masked out, maps to exactly one
//! [`Actuation`] variant. Rules, first match wins:
//!
//! 1. no bits: passive
//! 2. effort only: torque integrated directly
//! 3. continuous-track joint: velocity or legacy surface velocity drive the
//!    belt, anything else is unsupported
//! 4. displacement, velocity or link position alone: kinematic drive;
//!    displacement and velocity need a revolute or prismatic joint
//! 5. all-state high gain on a revolute or prismatic joint: forced state,
//!    refreshed before every tick
//! 6. legacy surface velocity on a fixed joint: joint becomes a track
//! 7. anything else: unsupported
//!
//! Unsupported combinations are warnings; the link runs passive.

use std::fmt;

use linkdyn_types::{Actuation, JointType, StateMode, Twist};
use nalgebra::Isometry3;

/// Why an actuation request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationIssue {
    /// The mode cannot drive a continuous-track link.
    TrackMode,
    /// The mode combination is not supported.
    Unsupported,
}

/// Non-fatal registration warning for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationWarning {
    /// Body name.
    pub body: String,
    /// Link name.
    pub link: String,
    /// Declared mode, wrench bit masked.
    pub mode: StateMode,
    /// What was wrong.
    pub issue: ActuationIssue,
}

impl fmt::Display for ActuationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issue {
            ActuationIssue::TrackMode => write!(
                f,
                "actuation mode {} cannot be used for the continuous track link {} of {}",
                self.mode, self.link, self.body
            ),
            ActuationIssue::Unsupported => write!(
                f,
                "actuation mode {} specified for the {} link of {} is not supported",
                self.mode, self.link, self.body
            ),
        }
    }
}

/// Outcome of classifying one link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkClass {
    /// Actuation with initial targets.
    pub actuation: Actuation,
    /// Joint type after any legacy upgrade.
    pub joint_type: JointType,
    /// Whether the link joins the high-gain refresh list.
    pub high_gain: bool,
    /// Problem to report, if the request was ignored.
    pub issue: Option<ActuationIssue>,
}

impl LinkClass {
    fn accepted(actuation: Actuation, joint_type: JointType) -> Self {
        Self {
            actuation,
            joint_type,
            high_gain: false,
            issue: None,
        }
    }

    fn ignored(joint_type: JointType, issue: ActuationIssue) -> Self {
        Self {
            actuation: Actuation::Passive,
            joint_type,
            high_gain: false,
            issue: Some(issue),
        }
    }
}

/// Classify a link's declared mode. `q` and `dq` seed the initial targets so
/// that a freshly registered drive holds its current state.
#[must_use]
pub fn classify_link(joint_type: JointType, declared: StateMode, q: f64, dq: f64) -> LinkClass {
    let mode = declared.actuation_bits();

    if mode.is_empty() {
        return LinkClass::accepted(Actuation::Passive, joint_type);
    }
    if mode == StateMode::JOINT_EFFORT {
        return LinkClass::accepted(Actuation::Effort { effort: 0.0 }, joint_type);
    }
    if joint_type == JointType::ContinuousTrack {
        return if mode == StateMode::JOINT_VELOCITY || mode == StateMode::JOINT_SURFACE_VELOCITY {
            LinkClass::accepted(Actuation::Track { speed: dq }, joint_type)
        } else {
            LinkClass::ignored(joint_type, ActuationIssue::TrackMode)
        };
    }
    let scalar = joint_type.is_scalar();
    if mode == StateMode::JOINT_DISPLACEMENT && scalar {
        return LinkClass::accepted(Actuation::Displacement { q, dq: 0.0 }, joint_type);
    }
    if mode == StateMode::JOINT_VELOCITY && scalar {
        return LinkClass::accepted(Actuation::Velocity { dq }, joint_type);
    }
    if mode == StateMode::LINK_POSITION {
        // Pose target is filled in once forward kinematics has run.
        return LinkClass::accepted(
            Actuation::LinkPose {
                pose: Isometry3::identity(),
                twist: Twist::zero(),
            },
            joint_type,
        );
    }
    if mode == StateMode::ALL_STATE_HIGH_GAIN && scalar {
        return LinkClass {
            high_gain: true,
            ..LinkClass::accepted(Actuation::HighGain { q, dq, ddq: 0.0 }, joint_type)
        };
    }
    if mode == StateMode::JOINT_SURFACE_VELOCITY && joint_type == JointType::Fixed {
        return LinkClass::accepted(Actuation::Track { speed: 0.0 }, JointType::ContinuousTrack);
    }
    LinkClass::ignored(joint_type, ActuationIssue::Unsupported)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use linkdyn_types::ActuationKind;

    fn kind(joint: JointType, mode: StateMode) -> (ActuationKind, JointType, Option<ActuationIssue>) {
        let class = classify_link(joint, mode, 0.3, 0.1);
        (class.actuation.kind(), class.joint_type, class.issue)
    }

    #[test]
    fn test_no_mode_is_passive() {
        assert_eq!(
            kind(JointType::Revolute, StateMode::empty()),
            (ActuationKind::Passive, JointType::Revolute, None)
        );
        // The wrench bit alone is input, not a mode.
        assert_eq!(
            kind(JointType::Revolute, StateMode::LINK_EXT_WRENCH),
            (ActuationKind::Passive, JointType::Revolute, None)
        );
    }

    #[test]
    fn test_effort_and_direct_drives() {
        let wrench = StateMode::LINK_EXT_WRENCH;
        assert_eq!(
            kind(JointType::Revolute, StateMode::JOINT_EFFORT | wrench).0,
            ActuationKind::Effort
        );
        assert_eq!(
            kind(JointType::Prismatic, StateMode::JOINT_DISPLACEMENT).0,
            ActuationKind::Displacement
        );
        assert_eq!(
            kind(JointType::Revolute, StateMode::JOINT_VELOCITY).0,
            ActuationKind::Velocity
        );
        assert_eq!(
            kind(JointType::Free, StateMode::LINK_POSITION).0,
            ActuationKind::LinkPose
        );
    }

    #[test]
    fn test_displacement_seeds_current_angle() {
        let class = classify_link(JointType::Revolute, StateMode::JOINT_DISPLACEMENT, 0.3, 0.1);
        assert_eq!(class.actuation, Actuation::Displacement { q: 0.3, dq: 0.0 });
    }

    #[test]
    fn test_high_gain_joins_refresh_list() {
        let class = classify_link(JointType::Revolute, StateMode::ALL_STATE_HIGH_GAIN, 0.3, 0.1);
        assert!(class.high_gain);
        assert_eq!(class.actuation, Actuation::HighGain { q: 0.3, dq: 0.1, ddq: 0.0 });

        let partial = StateMode::JOINT_DISPLACEMENT | StateMode::JOINT_VELOCITY;
        let class = classify_link(JointType::Revolute, partial, 0.0, 0.0);
        assert!(!class.high_gain);
        assert_eq!(class.issue, Some(ActuationIssue::Unsupported));
    }

    #[test]
    fn test_joint_drives_need_a_scalar_joint() {
        for joint in [JointType::Free, JointType::Fixed] {
            for mode in [
                StateMode::JOINT_DISPLACEMENT,
                StateMode::JOINT_VELOCITY,
                StateMode::ALL_STATE_HIGH_GAIN,
            ] {
                let class = classify_link(joint, mode, 0.0, 0.0);
                assert_eq!(class.actuation, Actuation::Passive, "{joint:?} {mode}");
                assert_eq!(class.issue, Some(ActuationIssue::Unsupported));
                assert!(!class.high_gain);
            }
        }
    }

    #[test]
    fn test_legacy_surface_velocity_upgrades_fixed_joint() {
        assert_eq!(
            kind(JointType::Fixed, StateMode::JOINT_SURFACE_VELOCITY),
            (ActuationKind::Track, JointType::ContinuousTrack, None)
        );
        assert_eq!(
            kind(JointType::Revolute, StateMode::JOINT_SURFACE_VELOCITY),
            (ActuationKind::Passive, JointType::Revolute, Some(ActuationIssue::Unsupported))
        );
    }

    #[test]
    fn test_track_joint_modes() {
        let track = JointType::ContinuousTrack;
        assert_eq!(kind(track, StateMode::JOINT_VELOCITY).0, ActuationKind::Track);
        assert_eq!(kind(track, StateMode::JOINT_SURFACE_VELOCITY).0, ActuationKind::Track);
        assert_eq!(
            kind(track, StateMode::JOINT_DISPLACEMENT),
            (ActuationKind::Passive, track, Some(ActuationIssue::TrackMode))
        );
        // Effort is matched before the track rules.
        assert_eq!(kind(track, StateMode::JOINT_EFFORT).0, ActuationKind::Effort);
    }

    #[test]
    fn test_warning_message() {
        let warning = ActuationWarning {
            body: "crawler".into(),
            link: "left_track".into(),
            mode: StateMode::JOINT_DISPLACEMENT,
            issue: ActuationIssue::TrackMode,
        };
        let msg = warning.to_string();
        assert!(msg.contains("left_track"));
        assert!(msg.contains("continuous track"));
    }
}
