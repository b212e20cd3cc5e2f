use crate::error::ReadError;
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Folder layout of one APEX-MODFLOW project, built once when the project is
/// opened and passed to everything that needs a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub org_shps: PathBuf,
    pub apexmf_shps: PathBuf,
    pub table: PathBuf,
    pub model: PathBuf,
    pub modflow: PathBuf,
    pub salinity: PathBuf,
    pub exes: PathBuf,
    pub exported_files: PathBuf,
    pub scenarios: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let model = root.join("APEX-MODFLOW");
        ProjectPaths {
            org_shps: root.join("GIS").join("org_shps"),
            apexmf_shps: root.join("GIS").join("apexmf_shps"),
            table: root.join("GIS").join("Table"),
            modflow: model.join("MODFLOW"),
            salinity: model.join("SALINITY"),
            model,
            exes: root.join("apexmf_exes"),
            exported_files: root.join("exported_files"),
            scenarios: root.join("Scenarios"),
            root,
        }
    }

    /// Like [`ProjectPaths::new`] but requires the project folder to exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ReadError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ReadError::Missing { path: root });
        }
        Ok(Self::new(root))
    }

    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            &self.org_shps,
            &self.apexmf_shps,
            &self.table,
            &self.modflow,
            &self.salinity,
            &self.exes,
            &self.exported_files,
            &self.scenarios,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn outputs_ready(&self, set: OutputSet) -> bool {
        set.required_files()
            .iter()
            .all(|name| self.modflow.join(name).is_file())
    }

    pub fn linkage_db(&self) -> PathBuf {
        self.table.join("apexmf_link.db")
    }
}

/// Groups of simulation outputs that unlock a family of post-processing
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSet {
    Hydrology,
    Solutes,
}

impl OutputSet {
    pub fn required_files(self) -> &'static [&'static str] {
        match self {
            OutputSet::Hydrology => &["amf_MF_recharge.out", "amf_apex_channel.out"],
            OutputSet::Solutes => &["apexmf_link.txt", "amf_RT3D_cNO3_monthly.out"],
        }
    }
}

/// Time granularity of a series. Ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Timestep {
    Day,
    Month,
    Year,
}

impl Timestep {
    pub fn label(self) -> &'static str {
        match self {
            Timestep::Day => "daily",
            Timestep::Month => "monthly",
            Timestep::Year => "annual",
        }
    }
}

impl fmt::Display for Timestep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Attribute names used to read feature ids from the input layers
#[derive(Debug, Clone)]
pub struct FieldConfig {
    pub subbasin_id: String,
    pub grid_id: String,
    pub river_id: String,
    pub obs_point_id: String,
}

impl FieldConfig {
    pub fn new() -> Self {
        FieldConfig {
            subbasin_id: "Subbasin".to_string(),
            grid_id: "grid_id".to_string(),
            river_id: "Subbasin".to_string(),
            obs_point_id: "obs_id".to_string(),
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Which side of the area threshold an overlap exactly equal to it falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdRule {
    /// Drop overlaps with `area < threshold`.
    #[default]
    KeepAtOrAbove,
    /// Drop overlaps with `area <= threshold`.
    KeepAbove,
}

impl ThresholdRule {
    pub fn keeps(self, area: f64, threshold: f64) -> bool {
        match self {
            ThresholdRule::KeepAtOrAbove => area >= threshold,
            ThresholdRule::KeepAbove => area > threshold,
        }
    }
}

pub const DEFAULT_AREA_THRESHOLD: f64 = 900.0;

#[derive(Debug, Clone)]
pub struct LinkingConfig {
    /// Absolute overlap area below which (subbasin, cell) pairs are dropped.
    /// `None` keeps every non-empty overlap.
    pub threshold: Option<f64>,
    pub rule: ThresholdRule,
    /// Minimum river length kept in a cell, under the same rule.
    pub river_threshold: Option<f64>,
    pub fields: FieldConfig,
}

impl LinkingConfig {
    pub fn new() -> Self {
        LinkingConfig {
            threshold: Some(DEFAULT_AREA_THRESHOLD),
            rule: ThresholdRule::default(),
            river_threshold: None,
            fields: FieldConfig::new(),
        }
    }

    /// Threshold bounded to `[0, max_cell_area]`, the range of the slider.
    pub fn bounded_threshold(&self, max_cell_area: f64) -> Option<f64> {
        self.threshold.map(|t| {
            let bounded = t.clamp(0.0, max_cell_area.max(0.0));
            if bounded != t {
                tracing::warn!(
                    requested = t,
                    bounded,
                    "area threshold outside [0, max cell area]"
                );
            }
            bounded
        })
    }
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Chemical species reported by the RT3D and salinity modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Solute {
    Nitrate,
    Phosphorus,
    Sulfate,
    Calcium,
    Magnesium,
    Sodium,
    Potassium,
    Chloride,
    Carbonate,
    Bicarbonate,
}

impl Solute {
    pub const ALL: [Solute; 10] = [
        Solute::Nitrate,
        Solute::Phosphorus,
        Solute::Sulfate,
        Solute::Calcium,
        Solute::Magnesium,
        Solute::Sodium,
        Solute::Potassium,
        Solute::Chloride,
        Solute::Carbonate,
        Solute::Bicarbonate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Solute::Nitrate => "nitrate",
            Solute::Phosphorus => "phosphorus",
            Solute::Sulfate => "sulfate",
            Solute::Calcium => "calcium",
            Solute::Magnesium => "magnesium",
            Solute::Sodium => "sodium",
            Solute::Potassium => "potassium",
            Solute::Chloride => "chloride",
            Solute::Carbonate => "carbonate",
            Solute::Bicarbonate => "bicarbonate",
        }
    }

    /// Column name of the species in the simulation output.
    pub fn symbol(self) -> &'static str {
        match self {
            Solute::Nitrate => "NO3",
            Solute::Phosphorus => "P",
            Solute::Sulfate => "SO4",
            Solute::Calcium => "Ca",
            Solute::Magnesium => "Mg",
            Solute::Sodium => "Na",
            Solute::Potassium => "K",
            Solute::Chloride => "Cl",
            Solute::Carbonate => "CO3",
            Solute::Bicarbonate => "HCO3",
        }
    }

    /// Nitrate and phosphorus come from RT3D; the ions from the salinity module.
    pub fn is_rt3d(self) -> bool {
        matches!(self, Solute::Nitrate | Solute::Phosphorus)
    }
}

impl FromStr for Solute {
    type Err = String;

    /// Accepts a bare name (`nitrate`), a symbol (`NO3`) or a display label
    /// such as `NO3 (Nitrate)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.replace(['(', ')'], " ");
        for token in cleaned.split_whitespace() {
            let found = Solute::ALL.iter().copied().find(|sol| {
                sol.name().eq_ignore_ascii_case(token) || sol.symbol().eq_ignore_ascii_case(token)
            });
            if let Some(sol) = found {
                return Ok(sol);
            }
        }
        Err(format!("unknown solute '{}'", s.trim()))
    }
}

impl fmt::Display for Solute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol(), self.name())
    }
}

pub fn file_name_or_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_layout_matches_folder_names() {
        let paths = ProjectPaths::new("/tmp/proj");
        assert_eq!(paths.model, PathBuf::from("/tmp/proj/APEX-MODFLOW"));
        assert_eq!(paths.modflow, PathBuf::from("/tmp/proj/APEX-MODFLOW/MODFLOW"));
        assert_eq!(paths.table, PathBuf::from("/tmp/proj/GIS/Table"));
        assert_eq!(paths.exported_files, PathBuf::from("/tmp/proj/exported_files"));
    }

    #[test]
    fn open_requires_existing_folder() {
        let err = ProjectPaths::open("/definitely/not/a/project").unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn outputs_ready_checks_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());
        paths.ensure_layout().unwrap();
        assert!(!paths.outputs_ready(OutputSet::Hydrology));
        std::fs::write(paths.modflow.join("amf_MF_recharge.out"), "").unwrap();
        assert!(!paths.outputs_ready(OutputSet::Hydrology));
        std::fs::write(paths.modflow.join("amf_apex_channel.out"), "").unwrap();
        assert!(paths.outputs_ready(OutputSet::Hydrology));
        assert!(!paths.outputs_ready(OutputSet::Solutes));
    }

    #[test]
    fn threshold_rule_boundary() {
        assert!(ThresholdRule::KeepAtOrAbove.keeps(900.0, 900.0));
        assert!(!ThresholdRule::KeepAbove.keeps(900.0, 900.0));
        assert!(!ThresholdRule::KeepAtOrAbove.keeps(899.9, 900.0));
        assert!(ThresholdRule::KeepAbove.keeps(900.1, 900.0));
    }

    #[test]
    fn threshold_is_bounded_by_cell_area() {
        let mut config = LinkingConfig::new();
        assert_eq!(config.bounded_threshold(10_000.0), Some(900.0));
        config.threshold = Some(50_000.0);
        assert_eq!(config.bounded_threshold(10_000.0), Some(10_000.0));
        config.threshold = Some(-5.0);
        assert_eq!(config.bounded_threshold(10_000.0), Some(0.0));
        config.threshold = None;
        assert_eq!(config.bounded_threshold(10_000.0), None);
    }

    #[test]
    fn solute_from_display_label() {
        assert_eq!("NO3 (Nitrate)".parse::<Solute>(), Ok(Solute::Nitrate));
        assert_eq!("SO4 (Sulfate)".parse::<Solute>(), Ok(Solute::Sulfate));
        assert_eq!("hco3".parse::<Solute>(), Ok(Solute::Bicarbonate));
        assert_eq!("chloride".parse::<Solute>(), Ok(Solute::Chloride));
        assert!("Solute".parse::<Solute>().is_err());
    }

    #[test]
    fn timesteps_are_ordered() {
        assert!(Timestep::Day < Timestep::Month);
        assert!(Timestep::Month < Timestep::Year);
        assert_eq!(Timestep::Day.max(Timestep::Year), Timestep::Year);
    }
}
