use clap::{Parser, ValueEnum};
use dose_gamma::{DoseField, GammaEngine, GammaResult, Orientation, ToleranceConfig};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process;

/// Compare a synthetic Gaussian dose field against a shifted, rescaled copy
#[derive(Parser, Debug)]
#[command(name = "gamma-demo")]
#[command(about = "Gamma-index comparison of two synthetic dose distributions")]
#[command(version)]
struct Cli {
    /// Grid size as nx ny nz
    #[arg(long, num_args = 3, default_values_t = [40, 40, 20])]
    dimensions: Vec<usize>,

    /// Voxel spacing (mm)
    #[arg(long, default_value_t = 2.0)]
    spacing: f64,

    /// Peak dose of the reference field (Gy)
    #[arg(long, default_value_t = 60.0)]
    peak_dose: f64,

    /// Shift of the compare field along x (mm)
    #[arg(long, default_value_t = 1.0)]
    shift_mm: f64,

    /// Dose scale of the compare field
    #[arg(long, default_value_t = 1.02)]
    scale: f64,

    /// Distance to agreement (mm)
    #[arg(long, default_value_t = 3.0)]
    dta: f64,

    /// Dose difference tolerance (%)
    #[arg(long, default_value_t = 3.0)]
    dose_difference: f64,

    /// Fixed reference dose (Gy); the maximum dose is used when omitted
    #[arg(long)]
    reference_dose: Option<f64>,

    /// Analysis threshold (% of the normalization dose)
    #[arg(long, default_value_t = 10.0)]
    threshold: f64,

    /// Gamma cap
    #[arg(long, default_value_t = 2.0)]
    maximum_gamma: f64,

    /// Use nearest neighbour instead of trilinear resampling
    #[arg(long)]
    nearest: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Write the central axial slice of the gamma map as PNG
    #[arg(long, value_name = "FILE")]
    preview: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        error!("Gamma comparison failed: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> dose_gamma::Result<()> {
    let dimensions = [cli.dimensions[0], cli.dimensions[1], cli.dimensions[2]];
    let spacing = [cli.spacing; 3];

    let reference = gaussian_field(dimensions, spacing, cli.peak_dose)?;
    // shifting the origin moves the whole field; the resampler maps it back
    let compare = gaussian_field(dimensions, spacing, cli.peak_dose * cli.scale)?
        .with_origin([cli.shift_mm, 0.0, 0.0]);
    info!(
        "Reference {:?} voxels at {:?} mm, compare shifted {} mm and scaled by {}",
        dimensions, spacing, cli.shift_mm, cli.scale
    );

    let mut builder = ToleranceConfig::builder()
        .spatial_tolerance_mm(cli.dta)
        .dose_difference_tolerance_percent(cli.dose_difference)
        .analysis_threshold_percent(cli.threshold)
        .maximum_gamma(cli.maximum_gamma)
        .use_linear_interpolation(!cli.nearest);
    builder = match cli.reference_dose {
        Some(dose) => builder.reference_dose_gy(dose),
        None => builder.use_maximum_dose(true),
    };
    let config = builder.build()?;

    let result = GammaEngine::new(config).compare_dose_fields(&reference, &compare)?;
    output_result(&result, &cli.format);

    if let Some(path) = &cli.preview {
        write_preview(&result, &reference, path)?;
        info!("Wrote gamma preview to {}", path.display());
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
}

/// Isotropic Gaussian centred in the grid, sigma a quarter of the x extent.
fn gaussian_field(
    dimensions: [usize; 3],
    spacing: [f64; 3],
    peak_dose: f64,
) -> dose_gamma::Result<DoseField> {
    let [nx, ny, nz] = dimensions;
    let centre = [
        (nx as f64 - 1.0) * spacing[0] / 2.0,
        (ny as f64 - 1.0) * spacing[1] / 2.0,
        (nz as f64 - 1.0) * spacing[2] / 2.0,
    ];
    let sigma = nx as f64 * spacing[0] / 4.0;
    let mut values = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let dx = i as f64 * spacing[0] - centre[0];
                let dy = j as f64 * spacing[1] - centre[1];
                let dz = k as f64 * spacing[2] - centre[2];
                let r2 = dx * dx + dy * dy + dz * dz;
                values.push(peak_dose * (-r2 / (2.0 * sigma * sigma)).exp());
            }
        }
    }
    DoseField::new(dimensions, spacing, values)
}

fn output_result(result: &GammaResult, format: &OutputFormat) {
    match format {
        OutputFormat::Text => print!("{}", result.report_text()),
        OutputFormat::Json => output_json(result),
    }
}

#[cfg(feature = "json")]
fn output_json(result: &GammaResult) {
    match serde_json::to_string_pretty(result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: failed to serialize result: {e}");
            process::exit(1);
        }
    }
}

#[cfg(not(feature = "json"))]
fn output_json(_result: &GammaResult) {
    eprintln!("Error: JSON output requires the `json` feature");
    process::exit(1);
}

fn write_preview(
    result: &GammaResult,
    reference: &DoseField,
    path: &Path,
) -> dose_gamma::Result<()> {
    let gamma_field = result.to_gamma_field(reference)?;
    let [_, _, nz] = gamma_field.dimensions();
    let slice = gamma_field.get_slice_from_axis(nz / 2, Orientation::Axial)?;
    match DoseField::slice_to_image(&slice, result.config().maximum_gamma()) {
        Some(image) => image.save(path)?,
        None => error!("Gamma slice could not be converted to an image"),
    }
    Ok(())
}
