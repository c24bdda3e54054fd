use crate::dose_field::{DoseField, GEOMETRY_TOLERANCE};
use crate::enums::Interpolation;
use crate::error::{GammaError, Result};
use crate::interpolator::Interpolator;

use glam::DVec3;
use log::{debug, info};
use ndarray::Array3;
use rayon::prelude::*;
use std::borrow::Cow;

/// Dose value written where the compare grid has no data.
pub const NO_DATA: f64 = f64::NAN;

/// Maps a compare field onto the grid of a reference field.
pub struct Resampler;

impl Resampler {
    /// Return `compare` on `reference`'s grid, borrowing it unchanged when
    /// the geometries already match.
    pub fn align<'a>(
        reference: &DoseField,
        compare: &'a DoseField,
        interpolation: Interpolation,
    ) -> Result<Cow<'a, DoseField>> {
        if reference.same_geometry(compare, GEOMETRY_TOLERANCE) {
            debug!("Compare grid matches reference grid, skipping resampling");
            return Ok(Cow::Borrowed(compare));
        }
        info!(
            "Resampling compare grid {:?} onto reference grid {:?} ({:?})",
            compare.dimensions(),
            reference.dimensions(),
            interpolation
        );
        Self::resample(reference, compare, interpolation).map(Cow::Owned)
    }

    /// Sample `compare` at every voxel centre of `reference`.
    ///
    /// With nearest sampling, voxels more than half a voxel outside the
    /// compare grid get [`NO_DATA`]; linear sampling takes the edge value
    /// instead. A compare mask is carried over with nearest-neighbour
    /// sampling; outside the compare grid the mask is `false`.
    pub fn resample(
        reference: &DoseField,
        compare: &DoseField,
        interpolation: Interpolation,
    ) -> Result<DoseField> {
        let positions: Vec<DVec3> = (0..reference.len())
            .into_par_iter()
            .map(|flat| {
                let [i, j, k] = reference.unravel(flat);
                let world = reference.index_to_world(DVec3::new(i as f64, j as f64, k as f64));
                compare.world_to_index(world)
            })
            .collect();

        let values: Vec<f64> = positions
            .par_iter()
            .map(|&position| {
                match interpolation {
                    Interpolation::Nearest => {
                        Interpolator::nearest_interpolate(compare.data(), position)
                            .unwrap_or(NO_DATA)
                    }
                    Interpolation::Linear => {
                        Interpolator::trilinear_interpolate(compare.data(), position)
                    }
                }
            })
            .collect();

        let mut resampled = DoseField::on_grid_of(reference, values)?;

        if let Some(mask) = compare.mask() {
            let (nz, ny, nx) = reference.data().dim();
            let flags: Vec<bool> = positions
                .par_iter()
                .map(|&position| Interpolator::nearest_interpolate(mask, position).unwrap_or(false))
                .collect();
            let resampled_mask = Array3::from_shape_vec((nz, ny, nx), flags)
                .map_err(|_| GammaError::MaskShapeMismatch)?;
            resampled.set_mask_array(Some(resampled_mask));
        }

        Ok(resampled)
    }
}
