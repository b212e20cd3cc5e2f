use crate::config::{ProjectPaths, Solute, Timestep};
use crate::error::ReadError;
use clap::ValueEnum;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Category of simulation output handled by post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum OutputKind {
    Streamflow,
    WaterTable,
    Recharge,
    GwSwExchange,
    WaterBalance,
    Head,
    Nitrate,
    Phosphorus,
    Salinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDir {
    Model,
    Modflow,
    Salinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFile {
    Named(&'static str),
    /// First file in the folder with this extension, by name.
    Extension(&'static str),
}

/// Where a whitespace-delimited output file lives and how its columns are
/// laid out. Row indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub dir: OutputDir,
    pub file: OutputFile,
    /// Row holding the column names.
    pub header_row: usize,
    /// First data row.
    pub data_start: usize,
    /// Column present in the data but missing from the header names.
    pub insert_year_at: Option<usize>,
    /// Index of the first selectable variable.
    pub first_variable: usize,
    /// Only rows whose first column equals this tag are kept.
    pub tag: Option<&'static str>,
    /// Step the file is always written at. `None` follows the print code.
    pub fixed_step: Option<Timestep>,
}

impl OutputKind {
    pub fn layout(self) -> OutputLayout {
        let generic = |dir, file| OutputLayout {
            dir,
            file,
            header_row: 0,
            data_start: 1,
            insert_year_at: None,
            first_variable: 2,
            tag: None,
            fixed_step: None,
        };
        match self {
            OutputKind::Streamflow => OutputLayout {
                dir: OutputDir::Model,
                file: OutputFile::Extension("RCH"),
                header_row: 8,
                data_start: 9,
                insert_year_at: Some(2),
                first_variable: 5,
                tag: Some("REACH"),
                fixed_step: None,
            },
            OutputKind::WaterBalance => OutputLayout {
                first_variable: 5,
                ..generic(OutputDir::Model, OutputFile::Extension("DWS"))
            },
            OutputKind::WaterTable => generic(OutputDir::Modflow, OutputFile::Named("amf_MF_obs.out")),
            OutputKind::Recharge => generic(OutputDir::Modflow, OutputFile::Named("amf_MF_recharge.out")),
            OutputKind::GwSwExchange => {
                generic(OutputDir::Modflow, OutputFile::Named("amf_apex_channel.out"))
            }
            OutputKind::Head => generic(OutputDir::Modflow, OutputFile::Named("amf_MF_head.out")),
            OutputKind::Nitrate => OutputLayout {
                fixed_step: Some(Timestep::Month),
                ..generic(OutputDir::Modflow, OutputFile::Named("amf_RT3D_cNO3_monthly.out"))
            },
            OutputKind::Phosphorus => OutputLayout {
                fixed_step: Some(Timestep::Month),
                ..generic(OutputDir::Modflow, OutputFile::Named("amf_RT3D_cP_monthly.out"))
            },
            OutputKind::Salinity => generic(OutputDir::Salinity, OutputFile::Named("salt.output.channel")),
        }
    }
}

impl OutputKind {
    /// File name prefix of exported series.
    pub fn export_prefix(self) -> &'static str {
        match self {
            OutputKind::Streamflow => "apexmf_reach",
            OutputKind::WaterTable => "apexmf_wt",
            OutputKind::Recharge => "apexmf_rech",
            OutputKind::GwSwExchange => "apexmf_gwsw",
            OutputKind::WaterBalance => "apexmf_wb",
            OutputKind::Head => "apexmf_head",
            OutputKind::Nitrate => "apexmf_no3",
            OutputKind::Phosphorus => "apexmf_p",
            OutputKind::Salinity => "apexmf_salt",
        }
    }
}

impl From<Solute> for OutputKind {
    fn from(solute: Solute) -> Self {
        match solute {
            Solute::Nitrate => OutputKind::Nitrate,
            Solute::Phosphorus => OutputKind::Phosphorus,
            _ => OutputKind::Salinity,
        }
    }
}

/// Resolves the concrete output file of a category.
pub fn locate(paths: &ProjectPaths, layout: &OutputLayout) -> Result<PathBuf, ReadError> {
    let dir = match layout.dir {
        OutputDir::Model => &paths.model,
        OutputDir::Modflow => &paths.modflow,
        OutputDir::Salinity => &paths.salinity,
    };
    match layout.file {
        OutputFile::Named(name) => Ok(dir.join(name)),
        OutputFile::Extension(ext) => {
            let entries = std::fs::read_dir(dir).map_err(|e| ReadError::from_io(dir, e))?;
            let mut matches: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
                })
                .collect();
            matches.sort();
            matches.into_iter().next().ok_or_else(|| {
                ReadError::not_ready(dir, format!("no *.{} output file yet", ext))
            })
        }
    }
}

fn open_output(path: &Path) -> Result<BufReader<File>, ReadError> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ReadError::not_ready(path, "simulation has not written this file"))
        }
        Err(e) => Err(ReadError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Column names of the file, with the year column inserted where the layout
/// says the header omits it.
pub fn column_names(path: &Path, layout: &OutputLayout) -> Result<Vec<String>, ReadError> {
    let reader = open_output(path)?;
    let header = reader
        .lines()
        .nth(layout.header_row)
        .transpose()
        .map_err(|e| ReadError::from_io(path, e))?
        .ok_or_else(|| ReadError::not_ready(path, "header not written yet"))?;
    let mut names: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    if let Some(at) = layout.insert_year_at {
        if at > names.len() {
            return Err(ReadError::malformed(
                path,
                layout.header_row + 1,
                format!("header has {} columns, year column expected at {}", names.len(), at),
            ));
        }
        names.insert(at, "YEAR".to_string());
    }
    Ok(names)
}

/// Names offered for variable selection.
pub fn variable_names(path: &Path, layout: &OutputLayout) -> Result<Vec<String>, ReadError> {
    let names = column_names(path, layout)?;
    Ok(names.into_iter().skip(layout.first_variable).collect())
}

fn tag_matches(layout: &OutputLayout, tag: &str) -> bool {
    layout.tag.is_none_or(|t| t == tag)
}

/// Visits `(line number, entity id, columns)` of each data row that passes the
/// tag filter.
fn for_each_row(
    path: &Path,
    layout: &OutputLayout,
    mut visit: impl FnMut(usize, u32, &[&str]) -> Result<(), ReadError>,
) -> Result<(), ReadError> {
    let reader = open_output(path)?;
    for (idx, line) in reader.lines().enumerate().skip(layout.data_start) {
        let line = line.map_err(|e| ReadError::from_io(path, e))?;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 2 || !tag_matches(layout, cols[0]) {
            continue;
        }
        let line_no = idx + 1;
        // Untagged files interleave summary lines that have no numeric id.
        let Ok(entity) = cols[1].parse::<u32>() else {
            if layout.tag.is_some() {
                return Err(ReadError::malformed(
                    path,
                    line_no,
                    format!("entity id '{}' is not an integer", cols[1]),
                ));
            }
            continue;
        };
        visit(line_no, entity, cols.as_slice())?;
    }
    Ok(())
}

/// Sorted distinct entity ids in the file.
pub fn entity_ids(path: &Path, layout: &OutputLayout) -> Result<Vec<u32>, ReadError> {
    let mut ids = BTreeSet::new();
    for_each_row(path, layout, |_, entity, _| {
        ids.insert(entity);
        Ok(())
    })?;
    Ok(ids.into_iter().collect())
}

/// Values of `variable` for `entity`, in file order.
pub fn read_variable(
    path: &Path,
    layout: &OutputLayout,
    entity: u32,
    variable: &str,
) -> Result<Vec<f64>, ReadError> {
    let names = column_names(path, layout)?;
    let col = names
        .iter()
        .enumerate()
        .skip(layout.first_variable)
        .find(|(_, name)| name.as_str() == variable)
        .map(|(i, _)| i)
        .ok_or_else(|| ReadError::UnknownColumn {
            path: path.to_path_buf(),
            column: variable.to_string(),
        })?;

    let mut values = Vec::new();
    for_each_row(path, layout, |line_no, id, cols| {
        if id != entity {
            return Ok(());
        }
        let raw = cols.get(col).ok_or_else(|| {
            ReadError::malformed(path, line_no, format!("row has no column {}", col + 1))
        })?;
        let value = raw.parse::<f64>().map_err(|_| {
            ReadError::malformed(path, line_no, format!("'{}' is not a number", raw))
        })?;
        values.push(value);
        Ok(())
    })?;

    if values.is_empty() {
        return Err(ReadError::not_ready(
            path,
            format!("no rows for entity {} yet", entity),
        ));
    }
    tracing::debug!(path = %path.display(), entity, variable, rows = values.len(), "read output variable");
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RCH_HEADER: &str = "RCID GIS MO DA WYLD FLO_IN FLO_OUT\n";

    fn rch_text(rows: &[&str]) -> String {
        let mut text = String::new();
        for i in 0..8 {
            text.push_str(&format!("APEX reach output line {}\n", i + 1));
        }
        text.push_str(RCH_HEADER);
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn streamflow_columns_include_inserted_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "SITE.RCH", &rch_text(&[]));
        let layout = OutputKind::Streamflow.layout();
        let names = column_names(&path, &layout).unwrap();
        assert_eq!(&names[..4], &["RCID", "GIS", "YEAR", "MO"]);
        assert_eq!(variable_names(&path, &layout).unwrap(), vec!["WYLD", "FLO_IN", "FLO_OUT"]);
    }

    #[test]
    fn reads_one_entity_and_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "SITE.RCH",
            &rch_text(&[
                "REACH 1 2001 1 1 0.1 1.0 1.5",
                "REACH 2 2001 1 1 0.2 2.0 2.5",
                "SUBBS 1 2001 1 1 9.9 9.9 9.9",
                "REACH 1 2001 1 2 0.3 3.0 3.5",
            ]),
        );
        let layout = OutputKind::Streamflow.layout();
        assert_eq!(read_variable(&path, &layout, 1, "FLO_OUT").unwrap(), vec![1.5, 3.5]);
        assert_eq!(entity_ids(&path, &layout).unwrap(), vec![1, 2]);
    }

    #[test]
    fn absent_entity_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "SITE.RCH", &rch_text(&["REACH 1 2001 1 1 0.1 1.0 1.5"]));
        let err = read_variable(&path, &OutputKind::Streamflow.layout(), 5, "FLO_OUT").unwrap_err();
        assert!(err.is_not_ready());
    }

    #[test]
    fn missing_output_file_is_not_ready() {
        let err = read_variable(
            Path::new("/no/such/amf_MF_recharge.out"),
            &OutputKind::Recharge.layout(),
            1,
            "RECH",
        )
        .unwrap_err();
        assert!(err.is_not_ready());
    }

    #[test]
    fn unknown_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "SITE.RCH", &rch_text(&["REACH 1 2001 1 1 0.1 1.0 1.5"]));
        let err = read_variable(&path, &OutputKind::Streamflow.layout(), 1, "SED").unwrap_err();
        assert!(matches!(err, ReadError::UnknownColumn { .. }));
        // Id columns are not selectable variables.
        let err = read_variable(&path, &OutputKind::Streamflow.layout(), 1, "GIS").unwrap_err();
        assert!(matches!(err, ReadError::UnknownColumn { .. }));
    }

    #[test]
    fn bad_number_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "SITE.RCH", &rch_text(&["REACH 1 2001 1 1 0.1 1.0 ***"]));
        let err = read_variable(&path, &OutputKind::Streamflow.layout(), 1, "FLO_OUT").unwrap_err();
        assert!(matches!(err, ReadError::Malformed { line: 10, .. }));
    }

    #[test]
    fn generic_layout_without_tag_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "amf_MF_recharge.out",
            "TYPE CELL RECH\nCELL 10 0.5\nCELL 11 0.7\nCELL 10 0.9\n",
        );
        let layout = OutputKind::Recharge.layout();
        assert_eq!(read_variable(&path, &layout, 10, "RECH").unwrap(), vec![0.5, 0.9]);
    }

    #[test]
    fn locate_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());
        paths.ensure_layout().unwrap();
        let layout = OutputKind::Streamflow.layout();
        assert!(locate(&paths, &layout).unwrap_err().is_not_ready());
        std::fs::write(paths.model.join("b.RCH"), "").unwrap();
        std::fs::write(paths.model.join("a.rch"), "").unwrap();
        assert_eq!(locate(&paths, &layout).unwrap(), paths.model.join("a.rch"));
    }

    #[test]
    fn solutes_map_to_output_kinds() {
        assert_eq!(OutputKind::from(Solute::Nitrate), OutputKind::Nitrate);
        assert_eq!(OutputKind::from(Solute::Chloride), OutputKind::Salinity);
    }
}
