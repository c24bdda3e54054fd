//! Volumetric gamma: one value per reference voxel.
//!
//! The search for each voxel is restricted to compare voxels no farther than
//! `maximum_gamma * DTA`; anything beyond that cannot score below the cap.
//! Cost is `O(N * V)` for `N` reference voxels and `V` voxels inside that
//! radius, and `V` grows with `(maximum_gamma * DTA)³ / voxel volume`. Fine
//! grids with a generous DTA get expensive quickly.

use crate::config::ToleranceConfig;
use crate::dose_field::DoseField;
use crate::error::Result;
use crate::gamma::{Exclusion, PointGamma};
use crate::resampler::Resampler;

use glam::{DMat3, DVec3};
use log::{debug, warn};
use rayon::prelude::*;

/// Slack on the search radius so neighbours exactly on it are kept.
const RADIUS_EPSILON: f64 = 1e-9;

/// Index offset to a candidate and its squared spatial term.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Offset {
    delta: [isize; 3],
    spatial_term_squared: f64,
}

/// The index offsets within the search radius, nearest first.
#[derive(Clone, Debug)]
pub struct Neighborhood {
    offsets: Vec<Offset>,
}

impl Neighborhood {
    /// Offsets whose world distance is at most `radius_mm`, each tagged with
    /// `(distance / spatial_tolerance_mm)²`.
    pub fn new(field: &DoseField, radius_mm: f64, spatial_tolerance_mm: f64) -> Self {
        let spacing = DVec3::from_array(field.spacing());
        let direction = DMat3::from_cols_array_2d(&field.direction()).transpose();
        let [nx, ny, nz] = field.dimensions();
        // never step farther than the grid itself reaches
        let reach =
            |size: usize, step: f64| ((radius_mm / step).floor() as isize).min(size as isize - 1);
        let (rx, ry, rz) = (reach(nx, spacing.x), reach(ny, spacing.y), reach(nz, spacing.z));

        let mut offsets = Vec::new();
        for dk in -rz..=rz {
            for dj in -ry..=ry {
                for di in -rx..=rx {
                    let step = DVec3::new(di as f64, dj as f64, dk as f64) * spacing;
                    let distance = (direction * step).length();
                    if distance <= radius_mm + RADIUS_EPSILON {
                        let spatial_term = distance / spatial_tolerance_mm;
                        offsets.push(Offset {
                            delta: [di, dj, dk],
                            spatial_term_squared: spatial_term * spatial_term,
                        });
                    }
                }
            }
        }
        offsets.sort_by(|a, b| a.spatial_term_squared.total_cmp(&b.spatial_term_squared));

        Self { offsets }
    }

    /// Number of candidate voxels examined per reference voxel at most.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Per-voxel outcomes of a volumetric comparison.
#[derive(Clone, Debug)]
pub struct VolumetricEvaluation {
    pub points: Vec<PointGamma>,
    /// Dose the percentages were taken of (Gy)
    pub normalization_dose: f64,
    /// Whether the compare field had to be resampled
    pub resampled: bool,
    /// Candidates examined per voxel at most
    pub neighborhood_size: usize,
}

/// Run the volumetric gamma evaluation. Both fields are only read.
///
/// # Errors
///
/// Propagates geometry errors from resampling.
pub fn evaluate(
    reference: &DoseField,
    compare: &DoseField,
    config: &ToleranceConfig,
) -> Result<VolumetricEvaluation> {
    let aligned = Resampler::align(reference, compare, config.interpolation())?;
    let resampled = matches!(aligned, std::borrow::Cow::Owned(_));
    let compare: &DoseField = &aligned;

    // reduction completes here, before any worker reads it
    let normalization_dose = config.normalization_dose(|| reference.max_dose());
    if !normalization_dose.is_finite() || normalization_dose <= 0.0 {
        warn!(
            "Normalization dose is {normalization_dose} Gy, no voxel of {} can be evaluated",
            reference.len()
        );
        return Ok(VolumetricEvaluation {
            points: vec![PointGamma::Excluded(Exclusion::ZeroNormalization); reference.len()],
            normalization_dose,
            resampled,
            neighborhood_size: 0,
        });
    }

    let radius_mm = config.maximum_gamma() * config.spatial_tolerance_mm();
    let neighborhood = Neighborhood::new(reference, radius_mm, config.spatial_tolerance_mm());
    debug!(
        "Searching {} candidates per voxel within {radius_mm} mm, normalization dose {} Gy",
        neighborhood.len(),
        normalization_dose
    );

    let evaluator = VoxelEvaluator {
        reference,
        compare,
        neighborhood: &neighborhood,
        threshold_dose: config.analysis_threshold_percent() / 100.0 * normalization_dose,
        dose_tolerance: config.dose_difference_tolerance_percent() / 100.0 * normalization_dose,
        maximum_gamma: config.maximum_gamma(),
        threshold_on_reference_only: config.dose_threshold_on_reference_only(),
    };

    let points: Vec<PointGamma> = (0..reference.len())
        .into_par_iter()
        .map(|flat| evaluator.evaluate(reference.unravel(flat)))
        .collect();

    let no_candidates = points
        .iter()
        .filter(|p| **p == PointGamma::Excluded(Exclusion::NoCandidates))
        .count();
    if no_candidates > 0 {
        warn!("{no_candidates} voxels had no compare data within {radius_mm} mm");
    }

    Ok(VolumetricEvaluation {
        points,
        normalization_dose,
        resampled,
        neighborhood_size: neighborhood.len(),
    })
}

struct VoxelEvaluator<'a> {
    reference: &'a DoseField,
    compare: &'a DoseField,
    neighborhood: &'a Neighborhood,
    threshold_dose: f64,
    dose_tolerance: f64,
    maximum_gamma: f64,
    threshold_on_reference_only: bool,
}

impl VoxelEvaluator<'_> {
    fn evaluate(&self, index: [usize; 3]) -> PointGamma {
        let dose = self.reference.value_at(index);
        if !dose.is_finite() {
            return PointGamma::Excluded(Exclusion::NoData);
        }
        if self.is_below_threshold(dose, index) {
            return PointGamma::Excluded(Exclusion::BelowThreshold);
        }
        if !self.reference.is_active(index) {
            return PointGamma::Excluded(Exclusion::Masked);
        }

        match self.minimum_gamma_squared(dose, index) {
            Some(gamma_squared) => {
                PointGamma::Evaluated(gamma_squared.sqrt().min(self.maximum_gamma))
            }
            None => PointGamma::Excluded(Exclusion::NoCandidates),
        }
    }

    /// Missing compare dose counts as below threshold.
    fn is_below_threshold(&self, dose: f64, index: [usize; 3]) -> bool {
        let below = |value: f64| !(value >= self.threshold_dose);
        below(dose) && (self.threshold_on_reference_only || below(self.compare.value_at(index)))
    }

    fn minimum_gamma_squared(&self, dose: f64, [i, j, k]: [usize; 3]) -> Option<f64> {
        let [nx, ny, nz] = self.compare.dimensions();
        let mut best: Option<f64> = None;

        // offsets are nearest first: once the spatial term alone reaches the
        // best gamma so far, no later candidate can beat it
        for offset in &self.neighborhood.offsets {
            if best.is_some_and(|b| offset.spatial_term_squared >= b) {
                break;
            }
            let [di, dj, dk] = offset.delta;
            let (Some(ci), Some(cj), Some(ck)) = (
                i.checked_add_signed(di).filter(|&v| v < nx),
                j.checked_add_signed(dj).filter(|&v| v < ny),
                k.checked_add_signed(dk).filter(|&v| v < nz),
            ) else {
                continue;
            };
            let candidate = [ci, cj, ck];
            let candidate_dose = self.compare.value_at(candidate);
            if !candidate_dose.is_finite() || !self.compare.is_active(candidate) {
                continue;
            }

            let dose_term = (dose - candidate_dose) / self.dose_tolerance;
            let gamma_squared = offset.spatial_term_squared + dose_term * dose_term;
            if best.is_none_or(|b| gamma_squared < b) {
                best = Some(gamma_squared);
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dta: f64, dd: f64, reference_dose: f64) -> ToleranceConfig {
        ToleranceConfig::builder()
            .spatial_tolerance_mm(dta)
            .dose_difference_tolerance_percent(dd)
            .reference_dose_gy(reference_dose)
            .build()
            .unwrap()
    }

    #[test]
    fn neighborhood_is_sorted_and_bounded() {
        let field = DoseField::filled([10, 10, 10], [1.0, 1.0, 2.0], 0.0).unwrap();
        let neighborhood = Neighborhood::new(&field, 2.0, 1.0);
        assert_eq!(neighborhood.offsets[0].delta, [0, 0, 0]);
        assert!(neighborhood
            .offsets
            .windows(2)
            .all(|w| w[0].spatial_term_squared <= w[1].spatial_term_squared));
        assert!(neighborhood.offsets.iter().all(|o| o.spatial_term_squared <= 4.0 + 1e-6));
        // in-plane disc of radius 2 (13 voxels) plus the two z neighbours
        assert_eq!(neighborhood.len(), 15);
    }

    #[test]
    fn neighborhood_never_exceeds_grid() {
        let field = DoseField::filled([1, 1, 1], [1.0; 3], 0.0).unwrap();
        assert_eq!(Neighborhood::new(&field, 10.0, 1.0).len(), 1);
    }

    #[test]
    fn dose_difference_only() {
        let reference = DoseField::filled([1, 1, 1], [1.0; 3], 100.0).unwrap();
        let compare = DoseField::filled([1, 1, 1], [1.0; 3], 101.5).unwrap();
        let evaluation = evaluate(&reference, &compare, &config(3.0, 3.0, 100.0)).unwrap();
        match evaluation.points[0] {
            PointGamma::Evaluated(gamma) => assert!((gamma - 0.5).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!evaluation.resampled);
    }

    #[test]
    fn gamma_is_capped() {
        let reference = DoseField::filled([3, 1, 1], [1.0; 3], 10.0).unwrap();
        let compare = DoseField::filled([3, 1, 1], [1.0; 3], 90.0).unwrap();
        let evaluation = evaluate(&reference, &compare, &config(1.0, 1.0, 100.0)).unwrap();
        assert!(evaluation.points.iter().all(|p| *p == PointGamma::Evaluated(2.0)));
    }

    #[test]
    fn threshold_on_both_doses() {
        let reference = DoseField::new([2, 1, 1], [1.0; 3], vec![5.0, 5.0]).unwrap();
        let compare = DoseField::new([2, 1, 1], [1.0; 3], vec![5.0, 50.0]).unwrap();
        let reference_only = ToleranceConfig::builder()
            .reference_dose_gy(100.0)
            .analysis_threshold_percent(10.0)
            .build()
            .unwrap();
        let evaluation = evaluate(&reference, &compare, &reference_only).unwrap();
        assert!(evaluation
            .points
            .iter()
            .all(|p| *p == PointGamma::Excluded(Exclusion::BelowThreshold)));

        let either = ToleranceConfig::builder()
            .reference_dose_gy(100.0)
            .analysis_threshold_percent(10.0)
            .dose_threshold_on_reference_only(false)
            .build()
            .unwrap();
        let evaluation = evaluate(&reference, &compare, &either).unwrap();
        assert_eq!(evaluation.points[0], PointGamma::Excluded(Exclusion::BelowThreshold));
        assert!(evaluation.points[1].is_evaluated());
    }

    #[test]
    fn masked_voxels_are_skipped_both_ways() {
        let reference = DoseField::new([3, 1, 1], [1.0; 3], vec![10.0, 10.0, 10.0])
            .unwrap()
            .with_mask(vec![true, false, true])
            .unwrap();
        let compare = DoseField::new([3, 1, 1], [1.0; 3], vec![10.0, 10.0, 20.0])
            .unwrap()
            .with_mask(vec![false, true, true])
            .unwrap();
        let evaluation = evaluate(&reference, &compare, &config(1.0, 3.0, 10.0)).unwrap();
        assert_eq!(evaluation.points[1], PointGamma::Excluded(Exclusion::Masked));
        // voxel 0 cannot pair with itself, its neighbour is one DTA away
        assert_eq!(evaluation.points[0], PointGamma::Evaluated(1.0));
    }

    #[test]
    fn missing_compare_data_means_no_candidates() {
        let reference = DoseField::filled([1, 1, 1], [1.0; 3], 10.0).unwrap();
        let compare = DoseField::filled([1, 1, 1], [1.0; 3], 10.0)
            .unwrap()
            .with_origin([50.0, 0.0, 0.0]);
        let evaluation = evaluate(&reference, &compare, &config(1.0, 3.0, 10.0)).unwrap();
        assert!(evaluation.resampled);
        assert_eq!(evaluation.points[0], PointGamma::Excluded(Exclusion::NoCandidates));
    }

    #[test]
    fn zero_maximum_dose_excludes_everything() {
        let reference = DoseField::filled([2, 2, 1], [1.0; 3], 0.0).unwrap();
        let compare = DoseField::filled([2, 2, 1], [1.0; 3], 1.0).unwrap();
        let config = ToleranceConfig::builder().use_maximum_dose(true).build().unwrap();
        let evaluation = evaluate(&reference, &compare, &config).unwrap();
        assert_eq!(evaluation.normalization_dose, 0.0);
        assert!(evaluation
            .points
            .iter()
            .all(|p| *p == PointGamma::Excluded(Exclusion::ZeroNormalization)));
    }
}
