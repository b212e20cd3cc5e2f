use crate::config::Timestep;
use crate::postprocess::Comparison;
use crate::series::TimeSeries;
use crate::stats::FitStats;
use chrono::{Local, NaiveDate};
use csv::{QuoteStyle, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Export file name: `<prefix>(<entity>)[_ob(<gauge>)]_<step label>.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportName {
    pub prefix: String,
    pub entity: u32,
    pub gauge: Option<String>,
    pub step: Timestep,
}

impl ExportName {
    pub fn new(prefix: impl Into<String>, entity: u32, step: Timestep) -> Self {
        ExportName {
            prefix: prefix.into(),
            entity,
            gauge: None,
            step,
        }
    }

    pub fn with_gauge(mut self, gauge: impl Into<String>) -> Self {
        self.gauge = Some(gauge.into());
        self
    }

    pub fn file_name(&self) -> String {
        match &self.gauge {
            Some(gauge) => format!(
                "{}({})_ob({})_{}.txt",
                self.prefix,
                self.entity,
                gauge,
                self.step.label()
            ),
            None => format!("{}({})_{}.txt", self.prefix, self.entity, self.step.label()),
        }
    }
}

fn provenance(file_name: &str) -> String {
    format!(
        "# {} is created by apexmf_rs {} - {} -",
        file_name,
        env!("CARGO_PKG_VERSION"),
        Local::now().format("%m/%d/%y %H:%M:%S")
    )
}

fn write_table(
    dir: &Path,
    name: &ExportName,
    columns: &[&str],
    rows: impl Iterator<Item = (NaiveDate, Vec<f64>)>,
    stats: &FitStats,
) -> std::io::Result<PathBuf> {
    let file_name = name.file_name();
    let path = dir.join(&file_name);
    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(out, "{}", provenance(&file_name))?;
    {
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .from_writer(&mut out);
        let mut header = vec!["Date"];
        header.extend_from_slice(columns);
        wtr.write_record(&header)?;
        for (date, values) in rows {
            let mut record = vec![date.format("%Y-%m-%d").to_string()];
            record.extend(values.iter().map(|v| format!("{:10.4}", v)));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
    }
    writeln!(out)?;
    writeln!(out, "# Statistics")?;
    write!(out, "{}", stats)?;
    out.flush()?;
    tracing::info!(path = %path.display(), "exported series");
    Ok(path)
}

/// Writes the aligned simulated and observed series with their statistics.
pub fn write_comparison(
    dir: &Path,
    name: &ExportName,
    comparison: &Comparison,
) -> std::io::Result<PathBuf> {
    let aligned = &comparison.aligned;
    write_table(
        dir,
        name,
        &[aligned.sim_name.as_str(), aligned.obs_name.as_str()],
        aligned.rows.iter().map(|r| (r.date, vec![r.sim, r.obs])),
        &comparison.stats,
    )
}

/// Writes a simulated series alone. There is nothing to score it against, so
/// every statistic reads `---`.
pub fn write_series(dir: &Path, name: &ExportName, series: &TimeSeries) -> std::io::Result<PathBuf> {
    write_table(
        dir,
        name,
        &[series.name.as_str()],
        series.points().iter().map(|(date, v)| (*date, vec![*v])),
        &FitStats::undefined(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{AlignedRow, AlignedSeries};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn names_follow_export_pattern() {
        let name = ExportName::new("apexmf_reach", 12, Timestep::Month);
        assert_eq!(name.file_name(), "apexmf_reach(12)_monthly.txt");
        let name = name.with_gauge("sub_12");
        assert_eq!(name.file_name(), "apexmf_reach(12)_ob(sub_12)_monthly.txt");
        let annual = ExportName::new("apexmf_salt", 3, Timestep::Year);
        assert_eq!(annual.file_name(), "apexmf_salt(3)_annual.txt");
    }

    #[test]
    fn comparison_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let aligned = AlignedSeries {
            sim_name: "FLO_OUT(3)".to_string(),
            obs_name: "sub_3".to_string(),
            step: Timestep::Day,
            rows: vec![
                AlignedRow { date: d(2001, 1, 1), sim: 10.0, obs: 8.0 },
                AlignedRow { date: d(2001, 1, 2), sim: 10.0, obs: 8.0 },
                AlignedRow { date: d(2001, 1, 3), sim: 10.0, obs: 8.0 },
            ],
        };
        let comparison = Comparison {
            sim: TimeSeries::new("FLO_OUT(3)", vec![]),
            stats: FitStats::from_aligned(&aligned),
            aligned,
        };
        let name = ExportName::new("apexmf_reach", 3, Timestep::Day).with_gauge("sub_3");
        let path = write_comparison(dir.path(), &name, &comparison).unwrap();
        assert_eq!(path.file_name().unwrap(), "apexmf_reach(3)_ob(sub_3)_daily.txt");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# apexmf_reach(3)_ob(sub_3)_daily.txt is created by apexmf_rs "));
        assert!(lines[0].ends_with(" -"));
        assert_eq!(lines[1], "Date\tFLO_OUT(3)\tsub_3");
        assert_eq!(lines[2], "2001-01-01\t   10.0000\t    8.0000");
        assert_eq!(lines[5], "");
        assert_eq!(lines[6], "# Statistics");
        assert_eq!(lines[7], "Nash–Sutcliffe: ---");
        assert_eq!(lines[8], "R-squared: ---");
        assert_eq!(lines[9], "PBIAS: -25.0000");
    }

    #[test]
    fn series_without_observations_has_undefined_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let series = TimeSeries::new("RECH(5)", vec![(d(2001, 12, 31), 0.5)]);
        let name = ExportName::new("apexmf_rech", 5, Timestep::Year);
        let path = write_series(dir.path(), &name, &series).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Date\tRECH(5)\n2001-12-31\t    0.5000\n\n# Statistics\n"));
        assert!(text.ends_with("Nash–Sutcliffe: ---\nR-squared: ---\nPBIAS: ---\n"));
    }
}
