use crate::config::ToleranceConfig;
use crate::dose_field::DoseField;
use crate::enums::GeometryKind;
use crate::error::{GammaError, Result};
use crate::gamma::{CurveEvaluation, CurveRoles, Exclusion, PointGamma, VolumetricEvaluation};

use std::fmt;

/// Upper bounds of the histogram buckets; the last bucket is open.
pub const HISTOGRAM_BOUNDS: [f64; 3] = [0.5, 1.0, 1.5];

/// Counts of evaluated gammas in `[0, 0.5)`, `[0.5, 1]`, `(1, 1.5]`, `(1.5, ∞)`.
///
/// The second bucket is closed on the right so that the first two buckets
/// hold exactly the passing points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct GammaHistogram {
    pub counts: [usize; 4],
}

impl GammaHistogram {
    fn bucket(gamma: f64) -> usize {
        if gamma < HISTOGRAM_BOUNDS[0] {
            0
        } else if gamma <= HISTOGRAM_BOUNDS[1] {
            1
        } else if gamma <= HISTOGRAM_BOUNDS[2] {
            2
        } else {
            3
        }
    }

    fn add(&mut self, gamma: f64) {
        self.counts[Self::bucket(gamma)] += 1;
    }

    fn labels() -> [&'static str; 4] {
        ["[0.0, 0.5)", "[0.5, 1.0]", "(1.0, 1.5]", "(1.5, inf)"]
    }
}

/// Summary of the evaluated gamma values.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct GammaStatistics {
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
}

/// Number of points excluded for each reason.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct ExclusionCounts {
    pub below_threshold: usize,
    pub masked: usize,
    pub no_data: usize,
    pub no_candidates: usize,
    pub zero_normalization: usize,
}

impl ExclusionCounts {
    fn add(&mut self, reason: Exclusion) {
        match reason {
            Exclusion::BelowThreshold => self.below_threshold += 1,
            Exclusion::Masked => self.masked += 1,
            Exclusion::NoData => self.no_data += 1,
            Exclusion::NoCandidates => self.no_candidates += 1,
            Exclusion::ZeroNormalization => self.zero_normalization += 1,
        }
    }

    pub fn get(&self, reason: Exclusion) -> usize {
        match reason {
            Exclusion::BelowThreshold => self.below_threshold,
            Exclusion::Masked => self.masked,
            Exclusion::NoData => self.no_data,
            Exclusion::NoCandidates => self.no_candidates,
            Exclusion::ZeroNormalization => self.zero_normalization,
        }
    }
}

/// Variant-specific context reported next to the statistics.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum ComparisonDetails {
    Volumetric {
        normalization_dose_gy: f64,
        resampled: bool,
        neighborhood_size: usize,
    },
    Curve {
        roles: CurveRoles,
        total_volume_cc: f64,
        dose_max_gy: f64,
    },
}

/// Outcome of one comparison. Owned by the caller, never updated in place.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct GammaResult {
    kind: GeometryKind,
    config: ToleranceConfig,
    details: ComparisonDetails,
    #[cfg_attr(feature = "json", serde(skip))]
    gamma_values: Vec<f64>,
    evaluated_count: usize,
    total_count: usize,
    passed_count: usize,
    pass_fraction_percent: Option<f64>,
    statistics: Option<GammaStatistics>,
    histogram: GammaHistogram,
    exclusions: ExclusionCounts,
    normalization_note: Option<String>,
    report_text: String,
}

impl GammaResult {
    pub(crate) fn from_volumetric(
        evaluation: VolumetricEvaluation,
        config: &ToleranceConfig,
    ) -> Self {
        let note = evaluation
            .points
            .iter()
            .any(|p| *p == PointGamma::Excluded(Exclusion::ZeroNormalization))
            .then(|| {
                format!(
                    "Normalization dose resolved to {} Gy; no point was evaluated",
                    evaluation.normalization_dose
                )
            });
        let details = ComparisonDetails::Volumetric {
            normalization_dose_gy: evaluation.normalization_dose,
            resampled: evaluation.resampled,
            neighborhood_size: evaluation.neighborhood_size,
        };
        Self::aggregate(GeometryKind::Volumetric, &evaluation.points, config, details, note)
    }

    pub(crate) fn from_curve(evaluation: CurveEvaluation, config: &ToleranceConfig) -> Self {
        let details = ComparisonDetails::Curve {
            roles: evaluation.roles,
            total_volume_cc: evaluation.total_volume_cc,
            dose_max_gy: evaluation.dose_max,
        };
        Self::aggregate(GeometryKind::Curve, &evaluation.points, config, details, None)
    }

    fn aggregate(
        kind: GeometryKind,
        points: &[PointGamma],
        config: &ToleranceConfig,
        details: ComparisonDetails,
        normalization_note: Option<String>,
    ) -> Self {
        let mut histogram = GammaHistogram::default();
        let mut exclusions = ExclusionCounts::default();
        let mut evaluated_count = 0;
        let mut passed_count = 0;
        let mut sum = 0.0;
        let mut minimum = f64::INFINITY;
        let mut maximum = f64::NEG_INFINITY;

        for point in points {
            match *point {
                PointGamma::Evaluated(gamma) => {
                    evaluated_count += 1;
                    if point.passes() {
                        passed_count += 1;
                    }
                    histogram.add(gamma);
                    sum += gamma;
                    minimum = minimum.min(gamma);
                    maximum = maximum.max(gamma);
                }
                PointGamma::Excluded(reason) => exclusions.add(reason),
            }
        }

        let (pass_fraction_percent, statistics) = if evaluated_count > 0 {
            let n = evaluated_count as f64;
            (
                Some(100.0 * passed_count as f64 / n),
                Some(GammaStatistics {
                    minimum,
                    maximum,
                    mean: sum / n,
                }),
            )
        } else {
            (None, None)
        };

        let mut result = Self {
            kind,
            config: config.clone(),
            details,
            gamma_values: points.iter().map(PointGamma::value).collect(),
            evaluated_count,
            total_count: points.len(),
            passed_count,
            pass_fraction_percent,
            statistics,
            histogram,
            exclusions,
            normalization_note,
            report_text: String::new(),
        };
        result.report_text = TextReport::new(&result).to_string();
        result
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn config(&self) -> &ToleranceConfig {
        &self.config
    }

    pub fn details(&self) -> &ComparisonDetails {
        &self.details
    }

    /// One value per reference point (or baseline bin), NaN where excluded.
    pub fn gamma_values(&self) -> &[f64] {
        &self.gamma_values
    }

    pub fn evaluated_count(&self) -> usize {
        self.evaluated_count
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn passed_count(&self) -> usize {
        self.passed_count
    }

    /// Percentage of evaluated points with gamma ≤ 1, `None` when nothing
    /// was evaluated.
    pub fn pass_fraction_percent(&self) -> Option<f64> {
        self.pass_fraction_percent
    }

    pub fn statistics(&self) -> Option<&GammaStatistics> {
        self.statistics.as_ref()
    }

    pub fn histogram(&self) -> &GammaHistogram {
        &self.histogram
    }

    pub fn exclusions(&self) -> &ExclusionCounts {
        &self.exclusions
    }

    /// Set when the normalization dose could not be used.
    pub fn normalization_note(&self) -> Option<&str> {
        self.normalization_note.as_deref()
    }

    pub fn report_text(&self) -> &str {
        &self.report_text
    }

    /// Gamma values laid out on `reference`'s grid, for display.
    ///
    /// # Errors
    ///
    /// Fails for curve results and when `reference` is not the grid the
    /// result was computed on.
    pub fn to_gamma_field(&self, reference: &DoseField) -> Result<DoseField> {
        if self.kind != GeometryKind::Volumetric {
            return Err(GammaError::InvalidGeometry(
                "curve comparisons have no gamma grid".to_string(),
            ));
        }
        if reference.len() != self.gamma_values.len() {
            return Err(GammaError::ValueCountMismatch {
                expected: self.gamma_values.len(),
                actual: reference.len(),
            });
        }
        DoseField::on_grid_of(reference, self.gamma_values.clone())
    }
}

/// Text report formatter for gamma results
pub struct TextReport<'a> {
    result: &'a GammaResult,
}

impl<'a> TextReport<'a> {
    pub fn new(result: &'a GammaResult) -> Self {
        Self { result }
    }
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        let config = &result.config;

        writeln!(f, "Gamma Comparison ({})", result.kind)?;
        writeln!(f, "========================")?;
        writeln!(f)?;
        match result.kind {
            GeometryKind::Volumetric => writeln!(
                f,
                "Distance to agreement:     {:.3} mm",
                config.spatial_tolerance_mm()
            )?,
            GeometryKind::Curve => writeln!(
                f,
                "Volume difference:         {:.3} %",
                config.volume_difference_tolerance_percent()
            )?,
        }
        writeln!(
            f,
            "Dose difference:           {:.3} %",
            config.dose_difference_tolerance_percent()
        )?;
        if config.use_maximum_dose() {
            writeln!(f, "Reference dose:            maximum dose")?;
        } else {
            writeln!(f, "Reference dose:            {:.3} Gy", config.reference_dose_gy())?;
        }
        if result.kind == GeometryKind::Volumetric {
            writeln!(
                f,
                "Analysis threshold:        {:.3} % ({})",
                config.analysis_threshold_percent(),
                if config.dose_threshold_on_reference_only() {
                    "reference only"
                } else {
                    "reference and compare"
                }
            )?;
            writeln!(f, "Maximum gamma:             {:.3}", config.maximum_gamma())?;
            writeln!(f, "Interpolation:             {:?}", config.interpolation())?;
        }

        match &result.details {
            ComparisonDetails::Volumetric {
                normalization_dose_gy,
                resampled,
                neighborhood_size,
            } => {
                writeln!(f, "Normalization dose:        {normalization_dose_gy:.3} Gy")?;
                writeln!(f, "Compare resampled:         {resampled}")?;
                writeln!(f, "Search neighbourhood:      {neighborhood_size} voxels")?;
            }
            ComparisonDetails::Curve {
                roles,
                total_volume_cc,
                dose_max_gy,
            } => {
                let baseline = match roles {
                    CurveRoles::FirstIsBaseline => "first",
                    CurveRoles::SecondIsBaseline => "second",
                };
                writeln!(f, "Baseline curve:            {baseline}")?;
                writeln!(f, "Total volume:              {total_volume_cc:.3} cc")?;
                writeln!(f, "Maximum dose:              {dose_max_gy:.3} Gy")?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Results")?;
        writeln!(f, "-------")?;
        writeln!(
            f,
            "Evaluated:                 {} of {}",
            result.evaluated_count, result.total_count
        )?;
        match result.pass_fraction_percent {
            Some(pass) => writeln!(
                f,
                "Pass fraction:             {pass:.2} % ({} passed)",
                result.passed_count
            )?,
            None => writeln!(f, "Pass fraction:             n/a (no evaluated points)")?,
        }
        if let Some(note) = &result.normalization_note {
            writeln!(f, "Note:                      {note}")?;
        }
        if let Some(stats) = &result.statistics {
            writeln!(
                f,
                "Gamma min/mean/max:        {:.4} / {:.4} / {:.4}",
                stats.minimum, stats.mean, stats.maximum
            )?;
        }

        let excluded: Vec<_> = Exclusion::ALL
            .iter()
            .map(|reason| (reason, result.exclusions.get(*reason)))
            .filter(|(_, count)| *count > 0)
            .collect();
        if !excluded.is_empty() {
            writeln!(f)?;
            writeln!(f, "Excluded")?;
            writeln!(f, "--------")?;
            for (reason, count) in excluded {
                writeln!(f, "{:<27}{count}", format!("{}:", reason.simple_name()))?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Gamma histogram")?;
        writeln!(f, "---------------")?;
        for (label, count) in GammaHistogram::labels().iter().zip(result.histogram.counts) {
            writeln!(f, "{label:<27}{count}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volumetric(points: Vec<PointGamma>, normalization_dose: f64) -> GammaResult {
        let config = ToleranceConfig::builder()
            .reference_dose_gy(50.0)
            .build()
            .unwrap();
        GammaResult::from_volumetric(
            VolumetricEvaluation {
                points,
                normalization_dose,
                resampled: false,
                neighborhood_size: 27,
            },
            &config,
        )
    }

    #[test]
    fn aggregates_pass_fraction_and_histogram() {
        let result = volumetric(
            vec![
                PointGamma::Evaluated(0.0),
                PointGamma::Evaluated(1.0),
                PointGamma::Evaluated(1.2),
                PointGamma::Evaluated(2.0),
                PointGamma::Excluded(Exclusion::BelowThreshold),
            ],
            50.0,
        );
        assert_eq!(result.total_count(), 5);
        assert_eq!(result.evaluated_count(), 4);
        assert_eq!(result.pass_fraction_percent(), Some(50.0));
        assert_eq!(result.histogram().counts, [1, 1, 1, 1]);
        assert_eq!(result.exclusions().below_threshold, 1);
        assert!(result.gamma_values()[4].is_nan());

        let stats = result.statistics().unwrap();
        assert_eq!(stats.minimum, 0.0);
        assert_eq!(stats.maximum, 2.0);
        assert!((stats.mean - 1.05).abs() < 1e-12);
    }

    #[test]
    fn report_echoes_configuration() {
        let result = volumetric(vec![PointGamma::Evaluated(0.25)], 50.0);
        let text = result.report_text();
        assert!(text.contains("Gamma Comparison (volumetric)"));
        assert!(text.contains("Distance to agreement:     3.000 mm"));
        assert!(text.contains("Reference dose:            50.000 Gy"));
        assert!(text.contains("Evaluated:                 1 of 1"));
        assert!(text.contains("Pass fraction:             100.00 % (1 passed)"));
        assert!(text.contains("[0.0, 0.5)                 1"));
    }

    #[test]
    fn nothing_evaluated_has_no_pass_fraction() {
        let result = volumetric(vec![PointGamma::Excluded(Exclusion::ZeroNormalization); 3], 0.0);
        assert_eq!(result.pass_fraction_percent(), None);
        assert!(result.statistics().is_none());
        assert!(result.normalization_note().is_some());
        assert!(result.report_text().contains("n/a (no evaluated points)"));
        assert!(result.report_text().contains("zero normalization dose:   3"));
    }

    #[test]
    fn gamma_field_requires_matching_grid() {
        let result = volumetric(vec![PointGamma::Evaluated(0.5); 4], 50.0);
        let grid = DoseField::filled([2, 2, 1], [1.0; 3], 0.0)
            .unwrap()
            .with_origin([1.0, 2.0, 3.0]);
        let field = result.to_gamma_field(&grid).unwrap();
        assert_eq!(field.values(), vec![0.5; 4]);
        assert_eq!(field.origin(), [1.0, 2.0, 3.0]);

        let wrong = DoseField::filled([3, 1, 1], [1.0; 3], 0.0).unwrap();
        assert!(result.to_gamma_field(&wrong).is_err());
    }
}
