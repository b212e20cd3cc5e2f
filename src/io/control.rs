use crate::config::Timestep;
use crate::error::ReadError;
use chrono::{Datelike, Duration, NaiveDate};
use std::path::Path;

pub const CONTROL_FILE: &str = "APEXCONT.DAT";

/// Output print code of the control file (0-9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintCode(u8);

impl PrintCode {
    pub fn new(code: u8) -> Option<Self> {
        (code <= 9).then_some(PrintCode(code))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Finest granularity the simulation writes.
    pub fn native_timestep(self) -> Timestep {
        match self.0 {
            0..=2 => Timestep::Year,
            3..=5 => Timestep::Month,
            _ => Timestep::Day,
        }
    }

    /// Aggregation levels available for reporting, finest first.
    pub fn report_timesteps(self) -> Vec<Timestep> {
        let native = self.native_timestep();
        [Timestep::Day, Timestep::Month, Timestep::Year]
            .into_iter()
            .filter(|step| *step >= native)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SimPeriod {
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Run parameters from the first line of the control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunControl {
    pub years: u32,
    pub start_year: i32,
    pub start_month: u32,
    pub start_day: u32,
    pub print_code: PrintCode,
    period: SimPeriod,
}

impl RunControl {
    pub fn period(&self) -> SimPeriod {
        self.period
    }

    pub fn native_timestep(&self) -> Timestep {
        self.print_code.native_timestep()
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ReadError> {
        let (line_no, line) = text
            .lines()
            .enumerate()
            .find(|(_, l)| !l.trim().is_empty())
            .ok_or_else(|| ReadError::malformed(path, 1, "control file is empty"))?;
        let line_no = line_no + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(ReadError::malformed(
                path,
                line_no,
                format!("expected 5 run fields, found {}", fields.len()),
            ));
        }

        let field = |idx: usize, name: &str| -> Result<i64, ReadError> {
            fields[idx].parse::<i64>().map_err(|_| {
                ReadError::malformed(path, line_no, format!("{} '{}' is not an integer", name, fields[idx]))
            })
        };
        let years = field(0, "simulation years")?;
        let start_year = field(1, "start year")?;
        let start_month = field(2, "start month")?;
        let start_day = field(3, "start day")?;
        let code = field(4, "print code")?;

        if years < 1 {
            return Err(ReadError::malformed(path, line_no, "simulation length must be at least one year"));
        }
        let print_code = u8::try_from(code)
            .ok()
            .and_then(PrintCode::new)
            .ok_or_else(|| ReadError::malformed(path, line_no, format!("print code {} outside 0-9", code)))?;

        let invalid_date = || {
            ReadError::malformed(
                path,
                line_no,
                format!("invalid start date {}-{}-{}", start_year, start_month, start_day),
            )
        };
        let first = i32::try_from(start_year)
            .ok()
            .zip(u32::try_from(start_month).ok())
            .and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
            .ok_or_else(invalid_date)?;
        if start_day < 1 {
            return Err(invalid_date());
        }
        // The day is an offset from the first of the month, so it may roll over.
        let start = first
            .checked_add_signed(Duration::days(start_day - 1))
            .ok_or_else(invalid_date)?;
        let end_year = first.year() + (years as i32) - 1;
        let end = NaiveDate::from_ymd_opt(end_year, 12, 31).ok_or_else(invalid_date)?;

        Ok(RunControl {
            years: years as u32,
            start_year: first.year(),
            start_month: first.month(),
            start_day: start_day as u32,
            print_code,
            period: SimPeriod { start, end },
        })
    }
}

/// Reads `APEXCONT.DAT` from the model folder.
pub fn read_control(model_dir: &Path) -> Result<RunControl, ReadError> {
    let path = model_dir.join(CONTROL_FILE);
    let text = std::fs::read_to_string(&path).map_err(|e| ReadError::from_io(&path, e))?;
    let control = RunControl::parse(&text, &path)?;
    tracing::debug!(
        start = %control.period.start,
        end = %control.period.end,
        print_code = control.print_code.value(),
        "read control file"
    );
    Ok(control)
}
