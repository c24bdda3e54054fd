#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Sampling mode used when the compare grid has to be mapped onto the
/// reference grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
}

impl Interpolation {
    pub fn from_linear_flag(use_linear_interpolation: bool) -> Self {
        if use_linear_interpolation {
            Interpolation::Linear
        } else {
            Interpolation::Nearest
        }
    }
}

/// Which composite distance the gamma evaluation works in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum GeometryKind {
    /// 3D space + dose
    Volumetric,
    /// Volume + dose, over two DVH curves
    Curve,
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryKind::Volumetric => write!(f, "volumetric"),
            GeometryKind::Curve => write!(f, "curve"),
        }
    }
}
