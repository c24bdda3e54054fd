use crate::config::ToleranceConfig;
use crate::dose_field::DoseField;
use crate::dvh::DvhCurve;
use crate::enums::GeometryKind;
use crate::error::Result;
use crate::gamma::{curve, volumetric};
use crate::report::GammaResult;

use log::{debug, info};

/// The two distributions to compare, tagged by geometry.
#[derive(Clone, Copy, Debug)]
pub enum ComparisonInput<'a> {
    /// `compare` is resampled onto `reference`'s grid when they differ
    Volumetric {
        reference: &'a DoseField,
        compare: &'a DoseField,
    },
    /// `dose_max` is the maximum of the dose image behind the curves
    Curve {
        first: &'a DvhCurve,
        second: &'a DvhCurve,
        dose_max: f64,
    },
}

impl ComparisonInput<'_> {
    pub fn kind(&self) -> GeometryKind {
        match self {
            ComparisonInput::Volumetric { .. } => GeometryKind::Volumetric,
            ComparisonInput::Curve { .. } => GeometryKind::Curve,
        }
    }
}

/// Gamma comparison with a fixed tolerance configuration.
///
/// The engine holds no state besides its configuration; every call returns
/// a fresh [`GammaResult`] and leaves its inputs untouched.
///
/// ```
/// # use dose_gamma::{DoseField, GammaEngine, ToleranceConfig};
/// let reference = DoseField::new([2, 2, 1], [1.0; 3], vec![50.0; 4]).unwrap();
/// let compare = reference.clone();
/// let config = ToleranceConfig::builder()
///     .spatial_tolerance_mm(1.0)
///     .reference_dose_gy(50.0)
///     .build()
///     .unwrap();
/// let result = GammaEngine::new(config)
///     .compare_dose_fields(&reference, &compare)
///     .unwrap();
/// assert_eq!(result.pass_fraction_percent(), Some(100.0));
/// ```
#[derive(Clone, Debug, Default)]
pub struct GammaEngine {
    config: ToleranceConfig,
}

impl GammaEngine {
    pub fn new(config: ToleranceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToleranceConfig {
        &self.config
    }

    /// Run the comparison selected by `input`.
    ///
    /// # Errors
    ///
    /// Returns a [`GammaError`](crate::GammaError) when the inputs cannot be
    /// compared at all. Recoverable per-point problems are reported inside
    /// the result.
    pub fn evaluate(&self, input: ComparisonInput<'_>) -> Result<GammaResult> {
        debug!("Running {} gamma with {:?}", input.kind(), self.config);
        let result = match input {
            ComparisonInput::Volumetric { reference, compare } => {
                let evaluation = volumetric::evaluate(reference, compare, &self.config)?;
                GammaResult::from_volumetric(evaluation, &self.config)
            }
            ComparisonInput::Curve {
                first,
                second,
                dose_max,
            } => {
                let evaluation = curve::evaluate(first, second, dose_max, &self.config)?;
                GammaResult::from_curve(evaluation, &self.config)
            }
        };
        info!(
            "Gamma {}: {} of {} points evaluated, pass fraction {}",
            result.kind(),
            result.evaluated_count(),
            result.total_count(),
            result
                .pass_fraction_percent()
                .map_or_else(|| "n/a".to_string(), |p| format!("{p:.2} %"))
        );
        Ok(result)
    }

    pub fn compare_dose_fields(
        &self,
        reference: &DoseField,
        compare: &DoseField,
    ) -> Result<GammaResult> {
        self.evaluate(ComparisonInput::Volumetric { reference, compare })
    }

    pub fn compare_dvh_curves(
        &self,
        first: &DvhCurve,
        second: &DvhCurve,
        dose_max: f64,
    ) -> Result<GammaResult> {
        self.evaluate(ComparisonInput::Curve {
            first,
            second,
            dose_max,
        })
    }
}
