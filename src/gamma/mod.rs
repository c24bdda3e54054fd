//! Gamma index evaluation.
//!
//! Both variants minimise the same composite distance
//! `sqrt(a² + b²)`, where `a` and `b` are the two axis differences divided
//! by their tolerances:
//!
//! - [`volumetric`]: 3D world distance over DTA, and dose difference over the
//!   dose tolerance, searched over a bounded neighbourhood of each voxel.
//! - [`curve`]: volume difference and dose difference between the bins of
//!   two DVH curves, searched exhaustively.

pub mod curve;
pub mod volumetric;

pub use curve::{CurveEvaluation, CurveRoles};
pub use volumetric::{Neighborhood, VolumetricEvaluation};

/// Gamma for a point that could be evaluated `≤ 1` passes.
pub const PASS_LIMIT: f64 = 1.0;

/// Why a point carries no gamma value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum Exclusion {
    /// Dose under the analysis threshold
    BelowThreshold,
    /// Masked out in the reference field
    Masked,
    /// The reference dose itself is missing
    NoData,
    /// No usable compare voxel within the search radius
    NoCandidates,
    /// The normalization dose resolved to zero
    ZeroNormalization,
}

impl Exclusion {
    pub const ALL: [Exclusion; 5] = [
        Exclusion::BelowThreshold,
        Exclusion::Masked,
        Exclusion::NoData,
        Exclusion::NoCandidates,
        Exclusion::ZeroNormalization,
    ];

    pub fn simple_name(&self) -> &'static str {
        match self {
            Exclusion::BelowThreshold => "below threshold",
            Exclusion::Masked => "masked",
            Exclusion::NoData => "no data",
            Exclusion::NoCandidates => "no candidates",
            Exclusion::ZeroNormalization => "zero normalization dose",
        }
    }
}

/// Outcome of the gamma evaluation at one reference point or baseline bin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointGamma {
    Evaluated(f64),
    Excluded(Exclusion),
}

impl PointGamma {
    /// Gamma value, or NaN for excluded points.
    #[inline]
    pub fn value(&self) -> f64 {
        match self {
            PointGamma::Evaluated(gamma) => *gamma,
            PointGamma::Excluded(_) => f64::NAN,
        }
    }

    #[inline]
    pub fn is_evaluated(&self) -> bool {
        matches!(self, PointGamma::Evaluated(_))
    }

    #[inline]
    pub fn passes(&self) -> bool {
        matches!(self, PointGamma::Evaluated(gamma) if *gamma <= PASS_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_limit_is_inclusive() {
        assert!(PointGamma::Evaluated(1.0).passes());
        assert!(!PointGamma::Evaluated(1.0 + 1e-9).passes());
        assert!(!PointGamma::Excluded(Exclusion::Masked).passes());
        assert!(PointGamma::Excluded(Exclusion::NoCandidates).value().is_nan());
    }
}
