//! Tolerance configuration shared by both comparison variants.

use crate::enums::Interpolation;
use crate::error::{GammaError, Result};

/// Validated gamma tolerance settings.
///
/// Built through [`ToleranceConfig::builder`]; every instance that exists
/// has passed validation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct ToleranceConfig {
    spatial_tolerance_mm: f64,
    dose_difference_tolerance_percent: f64,
    reference_dose_gy: f64,
    use_maximum_dose: bool,
    analysis_threshold_percent: f64,
    maximum_gamma: f64,
    dose_threshold_on_reference_only: bool,
    use_linear_interpolation: bool,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            spatial_tolerance_mm: 3.0,
            dose_difference_tolerance_percent: 3.0,
            reference_dose_gy: 0.0,
            use_maximum_dose: true,
            analysis_threshold_percent: 0.0,
            maximum_gamma: 2.0,
            dose_threshold_on_reference_only: true,
            use_linear_interpolation: true,
        }
    }
}

impl ToleranceConfig {
    pub fn builder() -> ToleranceConfigBuilder {
        ToleranceConfigBuilder::default()
    }

    /// Distance to agreement (mm).
    pub fn spatial_tolerance_mm(&self) -> f64 {
        self.spatial_tolerance_mm
    }

    /// The DTA slot, read as a volume tolerance (%) by the curve variant.
    pub fn volume_difference_tolerance_percent(&self) -> f64 {
        self.spatial_tolerance_mm
    }

    pub fn dose_difference_tolerance_percent(&self) -> f64 {
        self.dose_difference_tolerance_percent
    }

    pub fn reference_dose_gy(&self) -> f64 {
        self.reference_dose_gy
    }

    pub fn use_maximum_dose(&self) -> bool {
        self.use_maximum_dose
    }

    pub fn analysis_threshold_percent(&self) -> f64 {
        self.analysis_threshold_percent
    }

    pub fn maximum_gamma(&self) -> f64 {
        self.maximum_gamma
    }

    pub fn dose_threshold_on_reference_only(&self) -> bool {
        self.dose_threshold_on_reference_only
    }

    pub fn use_linear_interpolation(&self) -> bool {
        self.use_linear_interpolation
    }

    pub fn interpolation(&self) -> Interpolation {
        Interpolation::from_linear_flag(self.use_linear_interpolation)
    }

    /// Resolve the dose the percentages are taken of. `maximum_reference_dose`
    /// is only consulted when `use_maximum_dose` is set.
    pub fn normalization_dose(&self, maximum_reference_dose: impl FnOnce() -> f64) -> f64 {
        if self.use_maximum_dose {
            maximum_reference_dose()
        } else {
            self.reference_dose_gy
        }
    }

    fn validate(&self) -> Result<()> {
        positive("spatial_tolerance_mm", self.spatial_tolerance_mm)?;
        positive(
            "dose_difference_tolerance_percent",
            self.dose_difference_tolerance_percent,
        )?;
        positive("maximum_gamma", self.maximum_gamma)?;
        if !self.reference_dose_gy.is_finite() || self.reference_dose_gy < 0.0 {
            return Err(GammaError::InvalidTolerance {
                name: "reference_dose_gy",
                value: self.reference_dose_gy,
            });
        }
        if !(0.0..100.0).contains(&self.analysis_threshold_percent) {
            return Err(GammaError::InvalidTolerance {
                name: "analysis_threshold_percent",
                value: self.analysis_threshold_percent,
            });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GammaError::InvalidTolerance { name, value })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ToleranceConfigBuilder {
    config: ToleranceConfig,
}

impl ToleranceConfigBuilder {
    pub fn spatial_tolerance_mm(mut self, value: f64) -> Self {
        self.config.spatial_tolerance_mm = value;
        self
    }

    /// Curve-variant spelling of [`Self::spatial_tolerance_mm`].
    pub fn volume_difference_tolerance_percent(self, value: f64) -> Self {
        self.spatial_tolerance_mm(value)
    }

    pub fn dose_difference_tolerance_percent(mut self, value: f64) -> Self {
        self.config.dose_difference_tolerance_percent = value;
        self
    }

    /// Normalize dose differences against a fixed dose. Clears
    /// `use_maximum_dose`.
    pub fn reference_dose_gy(mut self, value: f64) -> Self {
        self.config.reference_dose_gy = value;
        self.config.use_maximum_dose = false;
        self
    }

    pub fn use_maximum_dose(mut self, value: bool) -> Self {
        self.config.use_maximum_dose = value;
        self
    }

    pub fn analysis_threshold_percent(mut self, value: f64) -> Self {
        self.config.analysis_threshold_percent = value;
        self
    }

    pub fn maximum_gamma(mut self, value: f64) -> Self {
        self.config.maximum_gamma = value;
        self
    }

    pub fn dose_threshold_on_reference_only(mut self, value: bool) -> Self {
        self.config.dose_threshold_on_reference_only = value;
        self
    }

    pub fn use_linear_interpolation(mut self, value: bool) -> Self {
        self.config.use_linear_interpolation = value;
        self
    }

    /// # Errors
    ///
    /// Returns [`GammaError::InvalidTolerance`] naming the first field that
    /// is out of range.
    pub fn build(self) -> Result<ToleranceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
