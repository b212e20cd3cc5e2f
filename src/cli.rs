use apexmf_rs::config::{FieldConfig, LinkingConfig, Solute, ThresholdRule, Timestep, DEFAULT_AREA_THRESHOLD};
use apexmf_rs::grid::GridSpec;
use apexmf_rs::io::output::OutputKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Linking and post-processing tools for APEX-MODFLOW projects
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the simulation period and the reporting steps it supports
    Period {
        /// Project folder
        project: PathBuf,
    },

    /// Report which simulation outputs have been written
    Outputs { project: PathBuf },

    /// Link subbasins, rivers and observation points to grid cells
    Link(LinkArgs),

    /// Compare a simulated series with observations, or export it alone
    Compare(CompareArgs),
}

#[derive(clap::Args, Debug)]
pub struct LinkArgs {
    pub project: PathBuf,

    /// Subbasin polygons (GeoJSON)
    #[arg(long)]
    pub subbasins: PathBuf,

    /// Grid polygons (GeoJSON); otherwise built from the origin and cell flags
    #[arg(long, conflicts_with = "nrow")]
    pub grid: Option<PathBuf>,

    #[command(flatten)]
    pub spec: GridArgs,

    /// Drop overlaps smaller than this area
    #[arg(long, default_value_t = DEFAULT_AREA_THRESHOLD)]
    pub threshold: f64,

    /// Keep every non-empty overlap
    #[arg(long, conflicts_with = "threshold")]
    pub no_threshold: bool,

    /// Drop overlaps exactly equal to the threshold as well
    #[arg(long)]
    pub keep_above: bool,

    #[arg(long, default_value = "Subbasin")]
    pub subbasin_field: String,

    #[arg(long, default_value = "grid_id")]
    pub grid_field: String,

    /// River lines (GeoJSON); writes the river cells as well
    #[arg(long)]
    pub rivers: Option<PathBuf>,

    #[arg(long, default_value = "Subbasin")]
    pub river_field: String,

    /// Drop river cells holding less river length than this
    #[arg(long, requires = "rivers")]
    pub river_threshold: Option<f64>,

    /// MODFLOW observation points (GeoJSON); writes modflow.obs
    #[arg(long)]
    pub obs_points: Option<PathBuf>,

    #[arg(long, default_value = "obs_id")]
    pub obs_field: String,
}

#[derive(clap::Args, Debug)]
pub struct GridArgs {
    /// X of the upper-left corner
    #[arg(long, requires_all = ["y_origin", "nrow", "ncol", "cell_size"])]
    pub x_origin: Option<f64>,
    /// Y of the upper-left corner
    #[arg(long)]
    pub y_origin: Option<f64>,
    #[arg(long)]
    pub nrow: Option<u32>,
    #[arg(long)]
    pub ncol: Option<u32>,
    /// Cell width, and height unless --cell-height is given
    #[arg(long)]
    pub cell_size: Option<f64>,
    #[arg(long)]
    pub cell_height: Option<f64>,
}

impl GridArgs {
    pub fn grid_spec(&self) -> Option<GridSpec> {
        let cell_width = self.cell_size?;
        Some(GridSpec {
            x_origin: self.x_origin?,
            y_origin: self.y_origin?,
            nrow: self.nrow?,
            ncol: self.ncol?,
            cell_width,
            cell_height: self.cell_height.unwrap_or(cell_width),
        })
    }
}

impl LinkArgs {
    pub fn linking_config(&self) -> LinkingConfig {
        LinkingConfig {
            threshold: (!self.no_threshold).then_some(self.threshold),
            rule: if self.keep_above {
                ThresholdRule::KeepAbove
            } else {
                ThresholdRule::KeepAtOrAbove
            },
            river_threshold: self.river_threshold,
            fields: FieldConfig {
                subbasin_id: self.subbasin_field.clone(),
                grid_id: self.grid_field.clone(),
                river_id: self.river_field.clone(),
                obs_point_id: self.obs_field.clone(),
            },
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct CompareArgs {
    pub project: PathBuf,

    /// Output category; implied by --solute
    #[arg(long, value_enum, required_unless_present = "solute")]
    pub kind: Option<OutputKind>,

    /// Solute label, e.g. "NO3 (Nitrate)"
    #[arg(long)]
    pub solute: Option<Solute>,

    /// Reach, subbasin or cell number
    #[arg(long)]
    pub entity: u32,

    /// Output column; defaults to the solute symbol
    #[arg(long, required_unless_present = "solute")]
    pub variable: Option<String>,

    #[arg(long, value_enum, default_value_t = Timestep::Month)]
    pub report: Timestep,

    /// Observed data file (*.obd)
    #[arg(long, requires = "gauge")]
    pub obs: Option<PathBuf>,

    /// Observed column to compare against
    #[arg(long, requires = "obs")]
    pub gauge: Option<String>,

    /// First year shown
    #[arg(long)]
    pub from_year: Option<i32>,

    /// Write the result to the project's exported_files folder
    #[arg(long)]
    pub export: bool,
}

impl CompareArgs {
    pub fn kind(&self) -> Option<OutputKind> {
        self.solute.map(OutputKind::from).or(self.kind)
    }

    pub fn variable(&self) -> Option<String> {
        self.variable
            .clone()
            .or_else(|| self.solute.map(|s| s.symbol().to_string()))
    }
}

pub fn get_args() -> Command {
    Args::parse().command
}
