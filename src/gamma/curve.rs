//! Gamma agreement between two DVH curves.
//!
//! The curve with fewer bins is the baseline; every baseline bin gets the
//! smallest composite distance to any bin of the other curve. The volume
//! term is normalized by the *compare* curve's total volume whichever curve
//! ends up as baseline, and the dose term by a dose maximum supplied by the
//! caller. Gammas are not capped.

use crate::config::ToleranceConfig;
use crate::dvh::{DvhBin, DvhCurve};
use crate::error::{GammaError, Result};
use crate::gamma::PointGamma;

use log::debug;

/// Which of the two arguments played which role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum CurveRoles {
    /// First argument has fewer bins and is the baseline
    FirstIsBaseline,
    /// Second argument has fewer bins, or both have the same count
    SecondIsBaseline,
}

impl CurveRoles {
    /// Fewer bins wins the baseline role; ties make the first argument the
    /// compare curve.
    pub fn select(first: &DvhCurve, second: &DvhCurve) -> Self {
        if first.len() < second.len() {
            CurveRoles::FirstIsBaseline
        } else {
            CurveRoles::SecondIsBaseline
        }
    }

    /// `(baseline, compare)`
    pub fn assign<'a>(
        &self,
        first: &'a DvhCurve,
        second: &'a DvhCurve,
    ) -> (&'a DvhCurve, &'a DvhCurve) {
        match self {
            CurveRoles::FirstIsBaseline => (first, second),
            CurveRoles::SecondIsBaseline => (second, first),
        }
    }
}

/// Per-bin outcomes of a curve comparison.
#[derive(Clone, Debug)]
pub struct CurveEvaluation {
    /// One entry per baseline bin
    pub points: Vec<PointGamma>,
    pub roles: CurveRoles,
    /// Volume used for the volume term, taken from the compare curve (cc)
    pub total_volume_cc: f64,
    /// Dose used for the dose term (Gy)
    pub dose_max: f64,
}

/// Compare two DVH curves. `dose_max` is the maximum of the dose image the
/// curves were computed from.
///
/// # Errors
///
/// Fails before computing anything if either curve is empty, or if
/// `dose_max` or the compare curve's total volume is not strictly positive.
pub fn evaluate(
    first: &DvhCurve,
    second: &DvhCurve,
    dose_max: f64,
    config: &ToleranceConfig,
) -> Result<CurveEvaluation> {
    if first.is_empty() || second.is_empty() {
        return Err(GammaError::EmptyCurve);
    }
    if !dose_max.is_finite() || dose_max <= 0.0 {
        return Err(GammaError::InvalidNormalization {
            name: "dose_max",
            value: dose_max,
        });
    }

    let roles = CurveRoles::select(first, second);
    let (baseline, compare) = roles.assign(first, second);
    let total_volume_cc = compare.total_volume_cc();
    if !total_volume_cc.is_finite() || total_volume_cc <= 0.0 {
        return Err(GammaError::InvalidNormalization {
            name: "total_volume_cc",
            value: total_volume_cc,
        });
    }
    debug!(
        "Comparing {} baseline bins against {} compare bins ({roles:?})",
        baseline.len(),
        compare.len()
    );

    let volume_scale = config.volume_difference_tolerance_percent() * total_volume_cc;
    let dose_scale = config.dose_difference_tolerance_percent() * dose_max;
    let bin_gamma = |b: &DvhBin, c: &DvhBin| {
        let volume_term = 100.0 * (c.volume_percent - b.volume_percent) / volume_scale;
        let dose_term = 100.0 * (c.dose - b.dose) / dose_scale;
        (volume_term * volume_term + dose_term * dose_term).sqrt()
    };

    let points = baseline
        .bins()
        .iter()
        .map(|b| {
            let gamma = compare
                .bins()
                .iter()
                .map(|c| bin_gamma(b, c))
                .fold(f64::INFINITY, f64::min);
            PointGamma::Evaluated(gamma)
        })
        .collect();

    Ok(CurveEvaluation {
        points,
        roles,
        total_volume_cc,
        dose_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ToleranceConfig {
        ToleranceConfig::builder()
            .volume_difference_tolerance_percent(3.0)
            .dose_difference_tolerance_percent(3.0)
            .build()
            .unwrap()
    }

    #[test]
    fn fewer_bins_becomes_baseline() {
        let short = DvhCurve::new([(0.0, 100.0), (10.0, 50.0)], 10.0).unwrap();
        let long = DvhCurve::new([(0.0, 100.0), (5.0, 80.0), (10.0, 50.0)], 40.0).unwrap();

        let evaluation = evaluate(&long, &short, 100.0, &config()).unwrap();
        assert_eq!(evaluation.roles, CurveRoles::SecondIsBaseline);
        assert_eq!(evaluation.points.len(), 2);
        assert_eq!(evaluation.total_volume_cc, 40.0);

        let evaluation = evaluate(&short, &long, 100.0, &config()).unwrap();
        assert_eq!(evaluation.roles, CurveRoles::FirstIsBaseline);
        assert_eq!(evaluation.total_volume_cc, 40.0);
    }

    #[test]
    fn equal_lengths_take_second_as_baseline() {
        let a = DvhCurve::new([(0.0, 100.0), (10.0, 50.0)], 10.0).unwrap();
        let b = DvhCurve::new([(0.0, 100.0), (10.0, 40.0)], 20.0).unwrap();
        let evaluation = evaluate(&a, &b, 100.0, &config()).unwrap();
        assert_eq!(evaluation.roles, CurveRoles::SecondIsBaseline);
        // normalization comes from the first argument, the compare curve
        assert_eq!(evaluation.total_volume_cc, 10.0);
    }

    #[test]
    fn composite_distance_matches_formula() {
        let baseline = DvhCurve::new([(10.0, 50.0)], 100.0).unwrap();
        let compare = DvhCurve::new([(0.0, 100.0), (12.0, 53.0)], 100.0).unwrap();
        let evaluation = evaluate(&compare, &baseline, 100.0, &config()).unwrap();
        // volume: 100*3/(3*100) = 1, dose: 100*2/(3*100) = 2/3
        let expected = (1.0f64 + (2.0f64 / 3.0).powi(2)).sqrt();
        match evaluation.points[0] {
            PointGamma::Evaluated(gamma) => assert!((gamma - expected).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_normalization_is_an_error() {
        let curve = DvhCurve::new([(0.0, 100.0)], 1.0).unwrap();
        assert!(matches!(
            evaluate(&curve, &curve, 0.0, &config()),
            Err(GammaError::InvalidNormalization { name: "dose_max", .. })
        ));
        let empty = DvhCurve::new(Vec::<DvhBin>::new(), 1.0).unwrap();
        assert!(matches!(
            evaluate(&empty, &curve, 10.0, &config()),
            Err(GammaError::EmptyCurve)
        ));
    }
}
