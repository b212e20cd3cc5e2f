use crate::error::ReadError;
use crate::series::TimeSeries;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const MISSING_SENTINEL: f64 = -999.0;

// Cells read as missing, compared ignoring case
const MISSING_MARKERS: [&str; 6] = ["NA", "N/A", "#N/A", "NaN", "null", "None"];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%Y-%m-%d %H:%M:%S"];

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(text, fmt).ok().or_else(|| {
            chrono::NaiveDateTime::parse_from_str(text, fmt)
                .ok()
                .map(|dt| dt.date())
        })
    })
}

fn parse_cell(cell: &str) -> Result<Option<f64>, String> {
    let cell = cell.trim();
    if cell.is_empty() || MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m)) {
        return Ok(None);
    }
    let value = cell
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", cell))?;
    Ok((value != MISSING_SENTINEL && value.is_finite()).then_some(value))
}

/// Date-indexed observations, one column per gauge.
#[derive(Debug, Clone)]
pub struct ObservedTable {
    path: PathBuf,
    gauges: Vec<String>,
    rows: Vec<(NaiveDate, Vec<Option<f64>>)>,
}

impl ObservedTable {
    pub fn read(path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(|e| ReadError::from_io(path, e))?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let headers = rdr
            .headers()
            .map_err(|e| ReadError::malformed(path, 1, e.to_string()))?
            .clone();
        let gauges: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
        if gauges.is_empty() {
            return Err(ReadError::malformed(path, 1, "no gauge columns in header"));
        }

        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        loop {
            match rdr.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {}
                Err(e) => {
                    let line = e.position().map_or(0, |p| p.line() as usize);
                    return Err(ReadError::malformed(path, line, e.to_string()));
                }
            }
            let line = record.position().map_or(0, |p| p.line() as usize);
            let Some(first) = record.get(0) else { continue };
            if first.is_empty() {
                continue;
            }
            let date = parse_date(first)
                .ok_or_else(|| ReadError::malformed(path, line, format!("unparsable date '{}'", first)))?;
            let values = (0..gauges.len())
                .map(|i| parse_cell(record.get(i + 1).unwrap_or("")))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| ReadError::malformed(path, line, reason))?;
            rows.push((date, values));
        }

        tracing::debug!(path = %path.display(), gauges = gauges.len(), rows = rows.len(), "read observed data");
        Ok(ObservedTable {
            path: path.to_path_buf(),
            gauges,
            rows,
        })
    }

    pub fn gauges(&self) -> &[String] {
        &self.gauges
    }

    /// Observations of one gauge with missing values left out.
    pub fn series(&self, gauge: &str) -> Result<TimeSeries, ReadError> {
        let idx = self
            .gauges
            .iter()
            .position(|g| g == gauge)
            .ok_or_else(|| ReadError::UnknownColumn {
                path: self.path.clone(),
                column: gauge.to_string(),
            })?;
        let points = self
            .rows
            .iter()
            .filter_map(|(date, values)| values[idx].map(|v| (*date, v)))
            .collect();
        Ok(TimeSeries::new(gauge, points))
    }
}

/// Observation files offered for a category, e.g. `cha*.obd` for channels.
pub fn list_observation_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ReadError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ReadError::from_io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            p.extension().is_some_and(|ext| ext == "obd") && name.starts_with(prefix)
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_obd(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_gauges_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_obd(
            dir.path(),
            "streamflow.obd",
            "Date\tsub_3\tsub_7\n2001-01-01\t1.5\t-999\n01/02/2001\t\t2.0\n2001-01-03\t3.5\t4.0\n",
        );
        let table = ObservedTable::read(&path).unwrap();
        assert_eq!(table.gauges(), &["sub_3".to_string(), "sub_7".to_string()]);

        let s3 = table.series("sub_3").unwrap();
        assert_eq!(s3.len(), 2);
        assert_eq!(s3.values().collect::<Vec<_>>(), vec![1.5, 3.5]);

        let s7 = table.series("sub_7").unwrap();
        assert_eq!(s7.points()[0].0, NaiveDate::from_ymd_opt(2001, 1, 2).unwrap());
    }

    #[test]
    fn na_markers_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_obd(
            dir.path(),
            "salt.obd",
            "Date\tg1\n2001-01-01\tNA\n2001-01-02\tNaN\n2001-01-03\tn/a\n2001-01-04\t2.5\n2001-01-05\tnull\n",
        );
        let series = ObservedTable::read(&path).unwrap().series("g1").unwrap();
        assert_eq!(series.len(), 1);

        let path = write_obd(dir.path(), "bad.obd", "Date\tg1\n2001-01-01\tdry\n");
        assert!(matches!(
            ObservedTable::read(&path),
            Err(ReadError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn unknown_gauge() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_obd(dir.path(), "cha.obd", "Date\tg1\n2001-01-01\t1\n");
        let table = ObservedTable::read(&path).unwrap();
        assert!(matches!(table.series("g2"), Err(ReadError::UnknownColumn { .. })));
    }

    #[test]
    fn bad_date_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_obd(dir.path(), "cha.obd", "Date\tg1\n2001-01-01\t1\nnot-a-date\t2\n");
        assert!(matches!(
            ObservedTable::read(&path),
            Err(ReadError::Malformed { line: 3, .. })
        ));
    }

    #[test]
    fn missing_file() {
        let err = ObservedTable::read(Path::new("/no/such/streamflow.obd")).unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn lists_prefixed_obd_files() {
        let dir = tempfile::tempdir().unwrap();
        write_obd(dir.path(), "cha_flow.obd", "");
        write_obd(dir.path(), "salt.obd", "");
        write_obd(dir.path(), "cha_notes.txt", "");
        let files = list_observation_files(dir.path(), "cha").unwrap();
        assert_eq!(files, vec![dir.path().join("cha_flow.obd")]);
    }
}
