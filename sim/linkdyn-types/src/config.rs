//! Persisted simulator configuration.
//!
//! Every field is long-lived, changed only through explicit setters and read
//! every tick. With the `serde` feature each field is stored under a stable
//! archive name and may be absent independently; missing fields take their
//! default value.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²).
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Main configuration record for a simulator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SimulatorConfig {
    /// Forward dynamics or pure kinematics.
    #[cfg_attr(feature = "serde", serde(rename = "dynamicsMode"))]
    pub dynamics_mode: DynamicsMode,
    /// Time integration scheme for forward dynamics.
    #[cfg_attr(feature = "serde", serde(rename = "integrationMode"))]
    pub integration_mode: IntegrationMode,
    /// Gravity acceleration vector (m/s²).
    pub gravity: Vector3<f64>,
    /// Fixed timestep (seconds).
    #[cfg_attr(feature = "serde", serde(rename = "timeStep"))]
    pub timestep: f64,
    /// Lower bound applied to every per-pair friction coefficient.
    pub min_friction_coefficient: f64,
    /// Upper bound applied to every per-pair friction coefficient.
    pub max_friction_coefficient: f64,
    /// Contacts separated by more than this distance are dropped.
    #[cfg_attr(feature = "serde", serde(rename = "cullingThresh"))]
    pub contact_culling_distance: f64,
    /// Contacts penetrating deeper than this are dropped.
    #[cfg_attr(feature = "serde", serde(rename = "contactCullingDepth"))]
    pub contact_culling_depth: f64,
    /// Relative impulse change at which the solver stops iterating.
    #[cfg_attr(feature = "serde", serde(rename = "errorCriterion"))]
    pub error_criterion: f64,
    /// Iteration cap of the solver.
    #[cfg_attr(feature = "serde", serde(rename = "maxNumIterations"))]
    pub max_iterations: usize,
    /// Penetration left uncorrected by the position bias.
    #[cfg_attr(feature = "serde", serde(rename = "contactCorrectionDepth"))]
    pub contact_correction_depth: f64,
    /// Fraction of excess penetration removed per second.
    #[cfg_attr(feature = "serde", serde(rename = "contactCorrectionVelocityRatio"))]
    pub contact_correction_velocity_ratio: f64,
    /// Coefficient of restitution.
    #[cfg_attr(feature = "serde", serde(rename = "epsilon"))]
    pub restitution: f64,
    /// Step legged bodies by kinematic walking in kinematics mode.
    #[cfg_attr(feature = "serde", serde(rename = "kinematicWalking"))]
    pub kinematic_walking: bool,
    /// Restrict all motion to the XZ plane.
    #[cfg_attr(feature = "serde", serde(rename = "2Dmode"))]
    pub planar: bool,
    /// Record every link pose during playback, not only root poses.
    #[cfg_attr(feature = "serde", serde(rename = "allLinkPositionOutputMode"))]
    pub record_all_link_positions: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            dynamics_mode: DynamicsMode::ForwardDynamics,
            integration_mode: IntegrationMode::SemiImplicitEuler,
            gravity: Vector3::new(0.0, 0.0, -STANDARD_GRAVITY),
            timestep: 0.001,
            min_friction_coefficient: 0.0,
            max_friction_coefficient: 100.0,
            contact_culling_distance: 0.005,
            contact_culling_depth: 0.05,
            error_criterion: 1.0e-3,
            max_iterations: 1000,
            contact_correction_depth: 0.00025,
            contact_correction_velocity_ratio: 5.0,
            restitution: 0.0,
            kinematic_walking: false,
            planar: false,
            record_all_link_positions: false,
        }
    }
}

impl SimulatorConfig {
    /// Default configuration with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Interactive preset: coarser step, Euler, fewer solver iterations.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            timestep: 1.0 / 200.0,
            integration_mode: IntegrationMode::SemiImplicitEuler,
            max_iterations: 50,
            error_criterion: 1.0e-2,
            ..Default::default()
        }
    }

    /// Accuracy preset: RK4, tight error criterion, more iterations.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            timestep: 0.0005,
            integration_mode: IntegrationMode::RungeKutta,
            max_iterations: 5000,
            error_criterion: 1.0e-6,
            ..Default::default()
        }
    }

    /// Set gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the integration scheme.
    #[must_use]
    pub fn integration(mut self, mode: IntegrationMode) -> Self {
        self.integration_mode = mode;
        self
    }

    /// Switch to kinematics mode.
    #[must_use]
    pub fn kinematics(mut self) -> Self {
        self.dynamics_mode = DynamicsMode::Kinematics;
        self
    }

    /// Set the friction coefficient clamp range.
    #[must_use]
    pub fn friction_range(mut self, min: f64, max: f64) -> Self {
        self.min_friction_coefficient = min;
        self.max_friction_coefficient = max;
        self
    }

    /// Set the culling distance and depth.
    #[must_use]
    pub fn culling(mut self, distance: f64, depth: f64) -> Self {
        self.contact_culling_distance = distance;
        self.contact_culling_depth = depth;
        self
    }

    /// Set the solver stopping rule.
    #[must_use]
    pub fn solver_iterations(mut self, max_iterations: usize, error_criterion: f64) -> Self {
        self.max_iterations = max_iterations;
        self.error_criterion = error_criterion;
        self
    }

    /// Set the penetration correction parameters.
    #[must_use]
    pub fn contact_correction(mut self, depth: f64, velocity_ratio: f64) -> Self {
        self.contact_correction_depth = depth;
        self.contact_correction_velocity_ratio = velocity_ratio;
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn restitution(mut self, epsilon: f64) -> Self {
        self.restitution = epsilon;
        self
    }

    /// Enable or disable planar (XZ) simulation.
    #[must_use]
    pub fn planar(mut self, enabled: bool) -> Self {
        self.planar = enabled;
        self
    }

    /// Enable or disable kinematic walking.
    #[must_use]
    pub fn kinematic_walking(mut self, enabled: bool) -> Self {
        self.kinematic_walking = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }
        check_non_negative("min_friction_coefficient", self.min_friction_coefficient)?;
        check_non_negative("max_friction_coefficient", self.max_friction_coefficient)?;
        if self.min_friction_coefficient > self.max_friction_coefficient {
            return Err(crate::SimError::invalid_config(
                "min_friction_coefficient exceeds max_friction_coefficient",
            ));
        }
        check_non_negative("contact_culling_distance", self.contact_culling_distance)?;
        check_non_negative("contact_culling_depth", self.contact_culling_depth)?;
        check_positive("error_criterion", self.error_criterion)?;
        if self.max_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }
        check_non_negative("contact_correction_depth", self.contact_correction_depth)?;
        check_non_negative(
            "contact_correction_velocity_ratio",
            self.contact_correction_velocity_ratio,
        )?;
        check_non_negative("restitution", self.restitution)?;
        Ok(())
    }
}

/// Refuse negative or non-finite values.
pub fn check_non_negative(name: &str, value: f64) -> crate::Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(crate::SimError::invalid_config(format!(
            "{name} must be non-negative, got {value}"
        )))
    }
}

/// Refuse zero, negative or non-finite values.
pub fn check_positive(name: &str, value: f64) -> crate::Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(crate::SimError::invalid_config(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

/// How bodies are advanced each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "String", into = "String")
)]
pub enum DynamicsMode {
    /// Integrate the equations of motion with contact constraints.
    #[default]
    ForwardDynamics,
    /// Copy joint targets and solve forward kinematics only.
    Kinematics,
}

impl DynamicsMode {
    /// Archive symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::ForwardDynamics => "Forward dynamics",
            Self::Kinematics => "Kinematics",
        }
    }
}

impl From<&str> for DynamicsMode {
    fn from(symbol: &str) -> Self {
        if symbol == Self::Kinematics.symbol() {
            Self::Kinematics
        } else {
            Self::ForwardDynamics
        }
    }
}

impl From<String> for DynamicsMode {
    fn from(symbol: String) -> Self {
        Self::from(symbol.as_str())
    }
}

impl From<DynamicsMode> for String {
    fn from(mode: DynamicsMode) -> Self {
        mode.symbol().to_string()
    }
}

impl std::fmt::Display for DynamicsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Integration scheme for forward dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "String", into = "String")
)]
pub enum IntegrationMode {
    /// Velocities first, then positions with the new velocities.
    #[default]
    SemiImplicitEuler,
    /// Classic four-stage Runge-Kutta.
    RungeKutta,
}

impl IntegrationMode {
    /// Archive symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::SemiImplicitEuler => "semi-implicit_euler",
            Self::RungeKutta => "runge-kutta",
        }
    }

    /// Order of accuracy.
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::SemiImplicitEuler => 1,
            Self::RungeKutta => 4,
        }
    }

    /// Solver calls per tick.
    #[must_use]
    pub const fn stages(self) -> usize {
        match self {
            Self::SemiImplicitEuler => 1,
            Self::RungeKutta => 4,
        }
    }
}

impl From<&str> for IntegrationMode {
    /// Lenient parse: both spellings of Runge-Kutta are accepted, anything
    /// else falls back to semi-implicit Euler.
    fn from(symbol: &str) -> Self {
        match symbol {
            "runge-kutta" | "Runge Kutta" => Self::RungeKutta,
            _ => Self::SemiImplicitEuler,
        }
    }
}

impl From<String> for IntegrationMode {
    fn from(symbol: String) -> Self {
        Self::from(symbol.as_str())
    }
}

impl From<IntegrationMode> for String {
    fn from(mode: IntegrationMode) -> Self {
        mode.symbol().to_string()
    }
}

impl std::fmt::Display for IntegrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SemiImplicitEuler => write!(f, "Semi-Implicit Euler"),
            Self::RungeKutta => write!(f, "RK4"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = SimulatorConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.gravity.z, -9.80665, epsilon = 1e-12);
        assert_eq!(config.dynamics_mode, DynamicsMode::ForwardDynamics);
        assert_eq!(config.integration_mode, IntegrationMode::SemiImplicitEuler);
        assert_eq!(config.max_iterations, 1000);
        assert!(!config.planar);
    }

    #[test]
    fn test_presets_validate() {
        assert!(SimulatorConfig::realtime().validate().is_ok());
        assert!(SimulatorConfig::high_accuracy().validate().is_ok());
        assert_eq!(
            SimulatorConfig::realtime().integration_mode,
            IntegrationMode::SemiImplicitEuler
        );
    }

    #[test]
    fn test_builder() {
        let config = SimulatorConfig::with_timestep(0.002)
            .friction_range(0.1, 2.0)
            .culling(0.01, 0.1)
            .restitution(0.3)
            .planar(true)
            .kinematics();
        assert_eq!(config.timestep, 0.002);
        assert_eq!(config.min_friction_coefficient, 0.1);
        assert_eq!(config.contact_culling_depth, 0.1);
        assert!(config.planar);
        assert_eq!(config.dynamics_mode, DynamicsMode::Kinematics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(SimulatorConfig::with_timestep(0.0).validate().is_err());
        assert!(SimulatorConfig::default()
            .culling(-0.1, 0.05)
            .validate()
            .is_err());
        assert!(SimulatorConfig::default()
            .solver_iterations(0, 1e-3)
            .validate()
            .is_err());
        assert!(SimulatorConfig::default()
            .solver_iterations(10, 0.0)
            .validate()
            .is_err());
        assert!(SimulatorConfig::default()
            .friction_range(2.0, 1.0)
            .validate()
            .is_err());
        assert!(SimulatorConfig::default()
            .contact_correction(0.001, -1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_integration_mode_parsing() {
        assert_eq!(IntegrationMode::from("runge-kutta"), IntegrationMode::RungeKutta);
        assert_eq!(IntegrationMode::from("Runge Kutta"), IntegrationMode::RungeKutta);
        assert_eq!(
            IntegrationMode::from("semi-implicit_euler"),
            IntegrationMode::SemiImplicitEuler
        );
        assert_eq!(IntegrationMode::from("verlet"), IntegrationMode::SemiImplicitEuler);
        assert_eq!(String::from(IntegrationMode::RungeKutta), "runge-kutta");
    }

    #[test]
    fn test_dynamics_mode_parsing() {
        assert_eq!(DynamicsMode::from("Kinematics"), DynamicsMode::Kinematics);
        assert_eq!(DynamicsMode::from("Forward dynamics"), DynamicsMode::ForwardDynamics);
        assert_eq!(DynamicsMode::from("unknown"), DynamicsMode::ForwardDynamics);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_archive_names() {
        let json = serde_json::to_value(SimulatorConfig::default()).expect("serialize");
        for key in [
            "dynamicsMode",
            "integrationMode",
            "gravity",
            "min_friction_coefficient",
            "max_friction_coefficient",
            "cullingThresh",
            "contactCullingDepth",
            "errorCriterion",
            "maxNumIterations",
            "contactCorrectionDepth",
            "contactCorrectionVelocityRatio",
            "epsilon",
            "kinematicWalking",
            "2Dmode",
        ] {
            assert!(json.get(key).is_some(), "missing archive key {key}");
        }
        assert_eq!(json["integrationMode"], "semi-implicit_euler");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_missing_fields_take_defaults() {
        let config: SimulatorConfig =
            serde_json::from_str(r#"{"2Dmode": true}"#).expect("partial record should parse");
        assert_eq!(config.integration_mode, IntegrationMode::SemiImplicitEuler);
        assert!(config.planar);
        assert_eq!(config.max_iterations, 1000);
        assert_relative_eq!(config.gravity.z, -9.80665, epsilon = 1e-12);
    }
}
