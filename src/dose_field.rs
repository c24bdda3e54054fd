use crate::enums::Orientation;
use crate::error::{GammaError, Result};

use glam::{DMat3, DVec3};
use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;

/// Tolerance used when deciding whether two grids share the same geometry.
pub const GEOMETRY_TOLERANCE: f64 = 1e-4;

/// A dose distribution sampled on a regular 3D grid.
///
/// Values are stored as an [`Array3`] of shape `(nz, ny, nx)`, so the flat
/// order of [`DoseField::values`] is row-major with x fastest. Voxel
/// `(i, j, k)` sits at `origin + direction * (i * sx, j * sy, k * sz)` in
/// world space (mm).
#[derive(Clone, Debug)]
pub struct DoseField {
    data: Array3<f64>,
    spacing: DVec3,
    origin: DVec3,
    direction: DMat3,
    inverse_direction: DMat3,
    mask: Option<Array3<bool>>,
}

impl DoseField {
    /// Build a field with zero origin and identity direction.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is zero, a spacing component is not
    /// strictly positive, or `values.len() != nx * ny * nz`.
    pub fn new(dimensions: [usize; 3], spacing: [f64; 3], values: Vec<f64>) -> Result<Self> {
        let [nx, ny, nz] = dimensions;
        if dimensions.contains(&0) {
            return Err(GammaError::InvalidGeometry(format!(
                "dimensions must be at least 1 along every axis, got {dimensions:?}"
            )));
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GammaError::InvalidGeometry(format!(
                "spacing must be positive, got {spacing:?}"
            )));
        }
        let expected = nx * ny * nz;
        if values.len() != expected {
            return Err(GammaError::ValueCountMismatch {
                expected,
                actual: values.len(),
            });
        }
        let data = Array3::from_shape_vec((nz, ny, nx), values)
            .map_err(|e| GammaError::InvalidGeometry(e.to_string()))?;

        Ok(Self {
            data,
            spacing: DVec3::from_array(spacing),
            origin: DVec3::ZERO,
            direction: DMat3::IDENTITY,
            inverse_direction: DMat3::IDENTITY,
            mask: None,
        })
    }

    /// Same grid, every voxel set to `value`.
    pub fn filled(dimensions: [usize; 3], spacing: [f64; 3], value: f64) -> Result<Self> {
        let count = dimensions.iter().product();
        Self::new(dimensions, spacing, vec![value; count])
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = DVec3::from_array(origin);
        self
    }

    /// Set the axis orientation. `direction[r][c]` is row `r`, column `c`;
    /// column `c` is the world-space direction of index axis `c`.
    ///
    /// # Errors
    ///
    /// Returns [`GammaError::SingularDirection`] for a singular matrix and
    /// [`GammaError::InvalidGeometry`] when the columns are not orthonormal
    /// within [`GEOMETRY_TOLERANCE`].
    pub fn with_direction(mut self, direction: [[f64; 3]; 3]) -> Result<Self> {
        let matrix = DMat3::from_cols_array_2d(&direction).transpose();
        let determinant = matrix.determinant();
        if !determinant.is_finite() || determinant.abs() < 1e-12 {
            return Err(GammaError::SingularDirection);
        }
        // search reach is derived from spacing alone, so axes must be unit length
        if !(matrix.transpose() * matrix).abs_diff_eq(DMat3::IDENTITY, GEOMETRY_TOLERANCE) {
            return Err(GammaError::InvalidGeometry(format!(
                "direction must be orthonormal, got {direction:?}"
            )));
        }
        self.direction = matrix;
        self.inverse_direction = matrix.inverse();
        Ok(self)
    }

    /// Attach a mask in the same flat order as the values. Voxels with
    /// `false` are neither evaluated nor used as compare candidates.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self> {
        let shape = self.data.raw_dim();
        let mask = Array3::from_shape_vec(shape, mask).map_err(|_| GammaError::MaskShapeMismatch)?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Copy of `geometry`'s grid (dimensions, spacing, origin, direction)
    /// with new values and no mask.
    pub(crate) fn on_grid_of(geometry: &DoseField, values: Vec<f64>) -> Result<Self> {
        let mut field = Self::new(geometry.dimensions(), geometry.spacing(), values)?;
        field.origin = geometry.origin;
        field.direction = geometry.direction;
        field.inverse_direction = geometry.inverse_direction;
        Ok(field)
    }

    pub(crate) fn set_mask_array(&mut self, mask: Option<Array3<bool>>) {
        self.mask = mask;
    }

    /// Get the dimensions of the grid as `[nx, ny, nz]`
    pub fn dimensions(&self) -> [usize; 3] {
        let (nz, ny, nx) = self.data.dim();
        [nx, ny, nz]
    }

    /// Number of voxels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing.to_array()
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin.to_array()
    }

    /// Direction matrix in row-major order.
    pub fn direction(&self) -> [[f64; 3]; 3] {
        self.direction.transpose().to_cols_array_2d()
    }

    /// Get a reference to the underlying data, shaped `(nz, ny, nx)`
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array3<bool>> {
        self.mask.as_ref()
    }

    /// Dose values in flat order (x fastest).
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    #[inline]
    pub fn value_at(&self, [i, j, k]: [usize; 3]) -> f64 {
        self.data[[k, j, i]]
    }

    /// Whether the voxel may take part in the comparison.
    #[inline]
    pub fn is_active(&self, [i, j, k]: [usize; 3]) -> bool {
        self.mask.as_ref().is_none_or(|mask| mask[[k, j, i]])
    }

    #[inline]
    pub fn flat_index(&self, [i, j, k]: [usize; 3]) -> usize {
        let [nx, ny, _] = self.dimensions();
        (k * ny + j) * nx + i
    }

    #[inline]
    pub fn unravel(&self, flat: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dimensions();
        [flat % nx, (flat / nx) % ny, flat / (nx * ny)]
    }

    /// World coordinate (mm) of a possibly fractional index.
    #[inline]
    pub fn index_to_world(&self, index: DVec3) -> DVec3 {
        self.origin + self.direction * (index * self.spacing)
    }

    /// Fractional index of a world coordinate (mm).
    #[inline]
    pub fn world_to_index(&self, world: DVec3) -> DVec3 {
        (self.inverse_direction * (world - self.origin)) / self.spacing
    }

    /// Equal dimensions, spacing, origin and direction within `tolerance`.
    pub fn same_geometry(&self, other: &DoseField, tolerance: f64) -> bool {
        self.dimensions() == other.dimensions()
            && self.spacing.abs_diff_eq(other.spacing, tolerance)
            && self.origin.abs_diff_eq(other.origin, tolerance)
            && self.direction.abs_diff_eq(other.direction, tolerance)
    }

    /// Largest finite dose in the field, or 0 when there is none.
    pub fn max_dose(&self) -> f64 {
        self.data
            .par_iter()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(|| f64::NEG_INFINITY, f64::max)
            .max(0.0)
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Result<ArrayView2<'_, f64>> {
        if !self.is_valid_index(index, orientation) {
            return Err(GammaError::SliceOutOfRange { index, orientation });
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Ok(slice)
    }

    /// Render a slice to 8-bit grayscale, mapping `[0, max_value]` onto
    /// `[0, 255]`. Non-finite values become black.
    pub fn slice_to_image(
        slice: &ArrayView2<'_, f64>,
        max_value: f64,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, max_value))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    #[inline]
    fn normalize_to_u8(value: f64, max_value: f64) -> u8 {
        if !value.is_finite() || max_value <= 0.0 {
            return 0;
        }
        ((value / max_value) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let (nz, ny, nx) = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => nz,
            Orientation::Coronal => ny,
            Orientation::Sagittal => nx,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dimensions: [usize; 3]) -> DoseField {
        let count = dimensions.iter().product();
        let values = (0..count).map(|v| v as f64).collect();
        DoseField::new(dimensions, [1.0, 2.0, 3.0], values).unwrap()
    }

    #[test]
    fn values_are_x_fastest() {
        let field = ramp([3, 2, 2]);
        assert_eq!(field.value_at([1, 0, 0]), 1.0);
        assert_eq!(field.value_at([0, 1, 0]), 3.0);
        assert_eq!(field.value_at([0, 0, 1]), 6.0);
        assert_eq!(field.flat_index([2, 1, 1]), 11);
        assert_eq!(field.unravel(11), [2, 1, 1]);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            DoseField::new([0, 1, 1], [1.0; 3], vec![]),
            Err(GammaError::InvalidGeometry(_))
        ));
        assert!(matches!(
            DoseField::new([1, 1, 1], [1.0, 0.0, 1.0], vec![1.0]),
            Err(GammaError::InvalidGeometry(_))
        ));
        assert!(matches!(
            DoseField::new([2, 1, 1], [1.0; 3], vec![1.0]),
            Err(GammaError::ValueCountMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            DoseField::filled([2, 1, 1], [1.0; 3], 0.0)
                .unwrap()
                .with_mask(vec![true]),
            Err(GammaError::MaskShapeMismatch)
        ));
    }

    #[test]
    fn world_round_trip_with_rotated_direction() {
        let field = ramp([4, 4, 4])
            .with_origin([10.0, -5.0, 2.0])
            .with_direction([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]])
            .unwrap();
        let world = field.index_to_world(DVec3::new(1.0, 0.0, 0.0));
        assert!(world.abs_diff_eq(DVec3::new(10.0, -4.0, 2.0), 1e-12));
        let index = field.world_to_index(world);
        assert!(index.abs_diff_eq(DVec3::new(1.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn rejects_non_orthonormal_direction() {
        let scaled = [[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 0.5]];
        assert!(matches!(
            ramp([2, 2, 2]).with_direction(scaled),
            Err(GammaError::InvalidGeometry(_))
        ));
        let sheared = [[1.0, 0.3, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            ramp([2, 2, 2]).with_direction(sheared),
            Err(GammaError::InvalidGeometry(_))
        ));
        assert!(matches!(
            ramp([2, 2, 2]).with_direction([[0.0; 3]; 3]),
            Err(GammaError::SingularDirection)
        ));
    }

    #[test]
    fn on_grid_of_copies_geometry() {
        let source = ramp([3, 2, 2])
            .with_origin([1.0, 2.0, 3.0])
            .with_direction([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]])
            .unwrap();
        let copy = DoseField::on_grid_of(&source, vec![0.0; 12]).unwrap();
        assert!(copy.same_geometry(&source, 1e-12));
        assert!(copy.mask().is_none());
    }

    #[test]
    fn geometry_comparison_uses_tolerance() {
        let a = ramp([2, 2, 2]);
        let b = ramp([2, 2, 2]).with_origin([5e-5, 0.0, 0.0]);
        let c = ramp([2, 2, 2]).with_origin([1e-2, 0.0, 0.0]);
        assert!(a.same_geometry(&b, GEOMETRY_TOLERANCE));
        assert!(!a.same_geometry(&c, GEOMETRY_TOLERANCE));
    }

    #[test]
    fn max_dose_ignores_nan() {
        let field = DoseField::new([3, 1, 1], [1.0; 3], vec![1.0, f64::NAN, 4.0]).unwrap();
        assert_eq!(field.max_dose(), 4.0);
    }

    #[test]
    fn slices_follow_orientation() {
        let field = ramp([3, 2, 2]);
        assert_eq!(field.get_slice_from_axis(1, Orientation::Axial).unwrap().dim(), (2, 3));
        assert_eq!(field.get_slice_from_axis(0, Orientation::Coronal).unwrap().dim(), (2, 3));
        assert_eq!(field.get_slice_from_axis(2, Orientation::Sagittal).unwrap().dim(), (2, 2));
        assert!(field.get_slice_from_axis(2, Orientation::Axial).is_err());

        let slice = field.get_slice_from_axis(0, Orientation::Axial).unwrap();
        let image = DoseField::slice_to_image(&slice, 5.0).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(2, 1)[0], 255);
    }
}
