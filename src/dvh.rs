use crate::error::{GammaError, Result};

/// One point of a cumulative dose-volume histogram.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct DvhBin {
    /// Dose (Gy)
    pub dose: f64,
    /// Percentage of the structure receiving at least `dose`
    pub volume_percent: f64,
}

impl DvhBin {
    pub fn new(dose: f64, volume_percent: f64) -> Self {
        Self {
            dose,
            volume_percent,
        }
    }
}

impl From<(f64, f64)> for DvhBin {
    fn from((dose, volume_percent): (f64, f64)) -> Self {
        Self::new(dose, volume_percent)
    }
}

/// A cumulative DVH together with the volume of the structure it describes.
///
/// Doses must be non-negative and strictly increasing. Volumes must lie in
/// `[0, 100]`; they are usually non-increasing but nothing downstream relies
/// on that.
#[derive(Clone, Debug, PartialEq)]
pub struct DvhCurve {
    bins: Vec<DvhBin>,
    total_volume_cc: f64,
}

impl DvhCurve {
    /// # Errors
    ///
    /// Returns [`GammaError::InvalidCurve`] if a bin is out of range or doses
    /// are not strictly increasing, and [`GammaError::InvalidNormalization`]
    /// if `total_volume_cc` is not strictly positive.
    pub fn new(
        bins: impl IntoIterator<Item = impl Into<DvhBin>>,
        total_volume_cc: f64,
    ) -> Result<Self> {
        let bins: Vec<DvhBin> = bins.into_iter().map(Into::into).collect();

        if !total_volume_cc.is_finite() || total_volume_cc <= 0.0 {
            return Err(GammaError::InvalidNormalization {
                name: "total_volume_cc",
                value: total_volume_cc,
            });
        }
        if let Some((index, bin)) = bins.iter().enumerate().find(|(_, bin)| {
            !bin.dose.is_finite()
                || bin.dose < 0.0
                || !(0.0..=100.0).contains(&bin.volume_percent)
        }) {
            return Err(GammaError::InvalidCurve(format!(
                "bin {index} out of range: dose {} Gy, volume {} %",
                bin.dose, bin.volume_percent
            )));
        }
        if let Some(index) = bins.windows(2).position(|pair| pair[1].dose <= pair[0].dose) {
            return Err(GammaError::InvalidCurve(format!(
                "dose must be strictly increasing, bin {} does not exceed bin {index}",
                index + 1
            )));
        }

        Ok(Self {
            bins,
            total_volume_cc,
        })
    }

    pub fn bins(&self) -> &[DvhBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn total_volume_cc(&self) -> f64 {
        self.total_volume_cc
    }
}
