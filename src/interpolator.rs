use glam::DVec3;
use ndarray::Array3;

/// Point samplers over an `(nz, ny, nx)` grid addressed by fractional
/// `(x, y, z)` indices.
///
/// Nearest sampling accepts coordinates up to half a voxel outside the grid
/// and yields `None` beyond that. Trilinear sampling clamps every coordinate
/// onto the grid, so off-grid positions take the edge value.
pub(crate) struct Interpolator;

/// Lower/upper neighbour along one axis and the weight of the upper one.
#[derive(Clone, Copy, Debug, PartialEq)]
struct AxisSample {
    lower: usize,
    upper: usize,
    weight: f64,
}

impl Interpolator {
    #[inline]
    fn axis_sample(coordinate: f64, size: usize) -> AxisSample {
        let clamped = coordinate.clamp(0.0, (size - 1) as f64);
        let lower = clamped.floor() as usize;
        let upper = (lower + 1).min(size - 1);
        AxisSample {
            lower,
            upper,
            weight: clamped - lower as f64,
        }
    }

    /// Index of the voxel closest to `index`, if it lies on the grid.
    #[inline]
    pub(crate) fn nearest_index(
        index: DVec3,
        (nz, ny, nx): (usize, usize, usize),
    ) -> Option<[usize; 3]> {
        let snap = |coordinate: f64, size: usize| {
            let last = (size - 1) as f64;
            (-0.5..=last + 0.5)
                .contains(&coordinate)
                .then(|| coordinate.round().clamp(0.0, last) as usize)
        };
        Some([snap(index.x, nx)?, snap(index.y, ny)?, snap(index.z, nz)?])
    }

    #[inline]
    pub(crate) fn nearest_interpolate<T: Copy>(data: &Array3<T>, index: DVec3) -> Option<T> {
        let [i, j, k] = Self::nearest_index(index, data.dim())?;
        Some(data[[k, j, i]])
    }

    #[inline]
    pub(crate) fn trilinear_interpolate(data: &Array3<f64>, index: DVec3) -> f64 {
        let (nz, ny, nx) = data.dim();
        let x = Self::axis_sample(index.x, nx);
        let y = Self::axis_sample(index.y, ny);
        let z = Self::axis_sample(index.z, nz);

        let lerp_x = |k: usize, j: usize| {
            let v0 = data[[k, j, x.lower]];
            if x.weight == 0.0 {
                return v0;
            }
            let v1 = data[[k, j, x.upper]];
            v0.mul_add(1.0 - x.weight, v1 * x.weight)
        };
        let lerp_y = |k: usize| {
            let v0 = lerp_x(k, y.lower);
            if y.weight == 0.0 {
                return v0;
            }
            let v1 = lerp_x(k, y.upper);
            v0.mul_add(1.0 - y.weight, v1 * y.weight)
        };

        let v0 = lerp_y(z.lower);
        if z.weight == 0.0 {
            return v0;
        }
        let v1 = lerp_y(z.upper);
        v0.mul_add(1.0 - z.weight, v1 * z.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Array3<f64> {
        // x fastest: value = x + 10 y + 100 z
        Array3::from_shape_fn((2, 2, 3), |(k, j, i)| (i + 10 * j + 100 * k) as f64)
    }

    #[test]
    fn trilinear_is_exact_on_linear_data() {
        let data = grid();
        let value = Interpolator::trilinear_interpolate(&data, DVec3::new(1.5, 0.25, 0.5));
        assert!((value - (1.5 + 2.5 + 50.0)).abs() < 1e-12);
    }

    #[test]
    fn trilinear_hits_voxel_centres() {
        let data = grid();
        assert_eq!(
            Interpolator::trilinear_interpolate(&data, DVec3::new(2.0, 1.0, 1.0)),
            112.0
        );
    }

    #[test]
    fn trilinear_clamps_to_the_edge() {
        let data = grid();
        assert_eq!(
            Interpolator::trilinear_interpolate(&data, DVec3::new(-0.4, 0.0, 0.0)),
            0.0
        );
        assert_eq!(
            Interpolator::trilinear_interpolate(&data, DVec3::new(2.5, 1.0, 1.0)),
            112.0
        );
        assert_eq!(
            Interpolator::trilinear_interpolate(&data, DVec3::new(7.0, -3.0, 4.0)),
            102.0
        );
        // in range on y, off grid on x
        assert_eq!(
            Interpolator::trilinear_interpolate(&data, DVec3::new(-5.0, 0.5, 0.0)),
            5.0
        );
    }

    #[test]
    fn nearest_stops_half_a_voxel_out() {
        let data = grid();
        assert_eq!(Interpolator::nearest_interpolate(&data, DVec3::new(-0.6, 0.0, 0.0)), None);
        assert_eq!(Interpolator::nearest_interpolate(&data, DVec3::new(2.6, 0.0, 0.0)), None);
        assert_eq!(
            Interpolator::nearest_interpolate(&data, DVec3::new(-0.4, 0.0, 0.0)),
            Some(0.0)
        );
    }

    #[test]
    fn nearest_rounds() {
        let data = grid();
        assert_eq!(
            Interpolator::nearest_interpolate(&data, DVec3::new(1.4, 0.6, -0.2)),
            Some(11.0)
        );
        assert_eq!(
            Interpolator::nearest_index(DVec3::new(2.5, 0.0, 0.0), data.dim()),
            Some([2, 0, 0])
        );
    }
}
