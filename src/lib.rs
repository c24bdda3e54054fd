//! # Dose-gamma library
//!
//! This crate answers one question for radiotherapy QA: do two dose
//! distributions, or two dose-volume histograms, agree within a distance
//! and dose tolerance?
//!
//! Two kinds of comparison are supported:
//!  - Volumetric: two [`DoseField`]s on regular 3D grids. Every reference
//!    voxel above the analysis threshold gets a gamma value, the minimum
//!    composite distance to the compare field within a bounded search
//!    radius. If the grids differ, the compare field is resampled onto the
//!    reference grid first (nearest neighbour or trilinear).
//!  - Curve: two [`DvhCurve`]s. Every bin of the shorter curve gets the
//!    minimum composite volume/dose distance to the other curve.
//!
//! The engine does no I/O and keeps no state. Inputs are only read, the
//! [`GammaResult`] is built fresh for every call, and per-voxel work runs
//! on rayon.
//!
//! # Examples
//!
//! ## Comparing a measured dose against a calculated one
//!
//! ```no_run
//! # use dose_gamma::{DoseField, GammaEngine, ToleranceConfig};
//! # fn load() -> (DoseField, DoseField) { unimplemented!() }
//! let (calculated, measured) = load();
//! let config = ToleranceConfig::builder()
//!     .spatial_tolerance_mm(3.0)
//!     .dose_difference_tolerance_percent(3.0)
//!     .use_maximum_dose(true)
//!     .analysis_threshold_percent(10.0)
//!     .build()
//!     .expect("tolerances should be valid");
//! let result = GammaEngine::new(config)
//!     .compare_dose_fields(&calculated, &measured)
//!     .expect("fields should be comparable");
//! println!("{}", result.report_text());
//! ```
//!
//! ## Comparing two DVH curves
//!
//! ```
//! # use dose_gamma::{DvhCurve, GammaEngine, ToleranceConfig};
//! let before = DvhCurve::new([(0.0, 100.0), (10.0, 80.0), (20.0, 50.0)], 100.0).unwrap();
//! let after = before.clone();
//! let config = ToleranceConfig::builder()
//!     .volume_difference_tolerance_percent(3.0)
//!     .dose_difference_tolerance_percent(3.0)
//!     .build()
//!     .unwrap();
//! let result = GammaEngine::new(config)
//!     .compare_dvh_curves(&before, &after, 100.0)
//!     .unwrap();
//! assert_eq!(result.pass_fraction_percent(), Some(100.0));
//! ```

pub mod config;
pub mod dose_field;
pub mod dvh;
pub mod engine;
pub mod enums;
pub mod error;
pub mod gamma;
mod interpolator;
pub mod report;
pub mod resampler;

pub use config::{ToleranceConfig, ToleranceConfigBuilder};
pub use dose_field::DoseField;
pub use dvh::{DvhBin, DvhCurve};
pub use engine::{ComparisonInput, GammaEngine};
pub use enums::{GeometryKind, Interpolation, Orientation};
pub use error::{GammaError, Result};
pub use gamma::{Exclusion, PointGamma};
pub use report::{GammaResult, TextReport};
