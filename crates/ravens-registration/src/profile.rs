//! Named registration profiles.
//!
//! A [`Profile`] selects an immutable [`ProfileConfig`]: the pyramid
//! schedule, per-level iteration budgets and the stage parameters shared by a
//! whole run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::validation::{validate_learning_rate, validate_sigma};

/// Built-in parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Default,
    Quick,
    Balanced,
    Test,
}

impl Profile {
    pub const ALL: [Profile; 4] = [Profile::Default, Profile::Quick, Profile::Balanced, Profile::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Quick => "quick",
            Profile::Balanced => "balanced",
            Profile::Test => "test",
        }
    }

    pub fn config(&self) -> ProfileConfig {
        let (iterations, affine_learning_rate) = match self {
            Profile::Default => (vec![200, 100, 50], 3e-3),
            Profile::Quick => (vec![100, 50, 0], 3e-3),
            Profile::Balanced => (vec![50, 50, 25], 3e-3),
            Profile::Test => (vec![40, 10, 0], 1e-2),
        };
        ProfileConfig {
            name: self.name().to_string(),
            scales: vec![4, 2, 1],
            iterations,
            affine_learning_rate,
            lncc_window: 5,
            deformable: DeformableConfig::default(),
            moments: MomentsConfig::default(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Profile::ALL
            .into_iter()
            .find(|profile| profile.name() == wanted)
            .ok_or_else(|| {
                RegistrationError::invalid_configuration(format!(
                    "unknown profile '{}' (expected one of: default, quick, balanced, test)",
                    s
                ))
            })
    }
}

/// How the moments stage may flip principal axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationMode {
    /// Proper rotations only (det = +1), 4 axis sign candidates.
    Rotation,
    /// Rotations and reflections, all 8 axis sign candidates.
    RotationAndReflection,
}

/// Moments initializer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentsConfig {
    /// 1 matches centroids only, 2 also matches principal axes.
    pub order: u8,
    pub orientation: OrientationMode,
}

impl Default for MomentsConfig {
    fn default() -> Self {
        Self {
            order: 2,
            orientation: OrientationMode::Rotation,
        }
    }
}

impl MomentsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: u8) -> Self {
        self.order = order;
        self
    }

    pub fn with_orientation(mut self, orientation: OrientationMode) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.order) {
            return Err(RegistrationError::invalid_configuration(format!(
                "moment order must be 1 or 2, got {}",
                self.order
            )));
        }
        Ok(())
    }
}

/// Deformable stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeformableConfig {
    /// Largest per-iteration displacement update, in voxels of the level.
    pub learning_rate: f64,
    /// Gaussian width (voxels) applied to the similarity gradient.
    pub gradient_sigma: f64,
    /// Gaussian width (voxels) applied to the field after every update.
    pub warp_sigma: f64,
    /// Iteration cap of the finest level when the schedule has 3+ levels.
    pub final_level_cap: usize,
    /// Per-level budgets replacing the profile's shared iteration counts.
    #[serde(default)]
    pub iterations: Option<Vec<usize>>,
}

impl Default for DeformableConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            gradient_sigma: 0.5,
            warp_sigma: 0.25,
            final_level_cap: 25,
            iterations: None,
        }
    }
}

impl DeformableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_gradient_sigma(mut self, sigma: f64) -> Self {
        self.gradient_sigma = sigma;
        self
    }

    pub fn with_warp_sigma(mut self, sigma: f64) -> Self {
        self.warp_sigma = sigma;
        self
    }

    pub fn with_final_level_cap(mut self, cap: usize) -> Self {
        self.final_level_cap = cap;
        self
    }

    pub fn with_iterations(mut self, iterations: Vec<usize>) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_learning_rate(self.learning_rate)?;
        validate_sigma("gradient sigma", self.gradient_sigma)?;
        validate_sigma("warp sigma", self.warp_sigma)
    }
}

/// Complete parameter set of one registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    /// Shrink factors, coarsest first.
    pub scales: Vec<usize>,
    /// Iteration budget per level, shared by the affine and deformable stages.
    pub iterations: Vec<usize>,
    pub affine_learning_rate: f64,
    /// LNCC window edge length in voxels.
    pub lncc_window: usize,
    pub deformable: DeformableConfig,
    pub moments: MomentsConfig,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Profile::Default.config()
    }
}

impl ProfileConfig {
    /// Look up a built-in profile by name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(name.parse::<Profile>()?.config())
    }

    pub fn with_scales(mut self, scales: Vec<usize>, iterations: Vec<usize>) -> Self {
        self.scales = scales;
        self.iterations = iterations;
        self
    }

    pub fn with_affine_learning_rate(mut self, learning_rate: f64) -> Self {
        self.affine_learning_rate = learning_rate;
        self
    }

    pub fn with_deformable(mut self, deformable: DeformableConfig) -> Self {
        self.deformable = deformable;
        self
    }

    pub fn with_moments(mut self, moments: MomentsConfig) -> Self {
        self.moments = moments;
        self
    }

    /// Affine iteration budget per level.
    pub fn affine_budgets(&self) -> Vec<usize> {
        self.iterations.clone()
    }

    /// Deformable iteration budget per level: the shared (or overridden)
    /// budgets with the finest level capped at `final_level_cap` once there
    /// are 3+ levels.
    pub fn deformable_budgets(&self) -> Vec<usize> {
        let mut budgets = self.deformable.iterations.clone().unwrap_or_else(|| self.iterations.clone());
        if budgets.len() >= 3 {
            if let Some(last) = budgets.last_mut() {
                *last = (*last).min(self.deformable.final_level_cap);
            }
        }
        budgets
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations.len() != self.scales.len() {
            return Err(RegistrationError::invalid_configuration(format!(
                "{} iteration budgets for {} pyramid levels",
                self.iterations.len(),
                self.scales.len()
            )));
        }
        if let Some(budgets) = &self.deformable.iterations {
            if budgets.len() != self.scales.len() {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{} deformable budgets for {} pyramid levels",
                    budgets.len(),
                    self.scales.len()
                )));
            }
        }
        if self.lncc_window == 0 {
            return Err(RegistrationError::invalid_configuration("LNCC window must be at least 1 voxel"));
        }
        validate_learning_rate(self.affine_learning_rate)?;
        self.deformable.validate()?;
        self.moments.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Quick".parse::<Profile>().unwrap(), Profile::Quick);
        assert_eq!(" TEST ".parse::<Profile>().unwrap(), Profile::Test);
        assert_eq!(Profile::Balanced.to_string(), "balanced");
    }

    #[test]
    fn test_unknown_profile_is_error() {
        let err = "fast".parse::<Profile>().unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_builtin_tables() {
        let default = Profile::Default.config();
        assert_eq!(default.scales, vec![4, 2, 1]);
        assert_eq!(default.iterations, vec![200, 100, 50]);
        assert_eq!(default.affine_learning_rate, 3e-3);
        assert_eq!(Profile::Quick.config().iterations, vec![100, 50, 0]);
        assert_eq!(Profile::Balanced.config().iterations, vec![50, 50, 25]);
        assert_eq!(Profile::Test.config().affine_learning_rate, 1e-2);
        for profile in Profile::ALL {
            assert!(profile.config().validate().is_ok());
        }
    }

    #[test]
    fn test_final_level_cap() {
        assert_eq!(Profile::Default.config().deformable_budgets(), vec![200, 100, 25]);
        assert_eq!(Profile::Quick.config().deformable_budgets(), vec![100, 50, 0]);

        let two_levels = Profile::Default.config().with_scales(vec![2, 1], vec![80, 60]);
        assert_eq!(two_levels.deformable_budgets(), vec![80, 60]);

        let overridden = Profile::Default
            .config()
            .with_deformable(DeformableConfig::new().with_iterations(vec![0, 0, 0]));
        assert_eq!(overridden.deformable_budgets(), vec![0, 0, 0]);
        assert_eq!(overridden.affine_budgets(), vec![200, 100, 50]);
    }

    #[test]
    fn test_mismatched_budgets_rejected() {
        let config = Profile::Test.config().with_scales(vec![2, 1], vec![10]);
        assert!(config.validate().is_err());
    }
}
