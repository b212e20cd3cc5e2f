use crate::config::Timestep;
use chrono::{Datelike, Duration, Months, NaiveDate};
use std::collections::BTreeMap;

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Last day of the period of `step` containing `date`.
pub fn period_end(date: NaiveDate, step: Timestep) -> NaiveDate {
    match step {
        Timestep::Day => date,
        Timestep::Month => month_end(date),
        Timestep::Year => NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date),
    }
}

/// `count` period labels starting at the first period end on or after `start`.
pub fn date_range(start: NaiveDate, step: Timestep, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut current = period_end(start, step);
    for _ in 0..count {
        dates.push(current);
        let next = match step {
            Timestep::Day => current.checked_add_signed(Duration::days(1)),
            Timestep::Month => current
                .checked_add_signed(Duration::days(1))
                .map(month_end),
            Timestep::Year => NaiveDate::from_ymd_opt(current.year() + 1, 12, 31),
        };
        match next {
            Some(date) => current = date,
            None => break,
        }
    }
    dates
}

/// Number of `step` periods between two dates, both ends included.
pub fn count_periods(start: NaiveDate, end: NaiveDate, step: Timestep) -> usize {
    if end < start {
        return 0;
    }
    match step {
        Timestep::Day => (end - start).num_days() as usize + 1,
        Timestep::Month => {
            let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
            months as usize + 1
        }
        Timestep::Year => (end.year() - start.year()) as usize + 1,
    }
}

/// A named series of values on dates, kept sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub name: String,
    points: Vec<(NaiveDate, f64)>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(date, _)| *date);
        TimeSeries {
            name: name.into(),
            points,
        }
    }

    /// Attaches the simulation's date index to values written one per period.
    pub fn from_periods(
        name: impl Into<String>,
        start: NaiveDate,
        step: Timestep,
        values: &[f64],
    ) -> Self {
        let dates = date_range(start, step, values.len());
        let points = dates.into_iter().zip(values.iter().copied()).collect();
        TimeSeries::new(name, points)
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v)
    }

    /// Mean of each `step` period, labelled by the period end. Non-finite
    /// values are skipped and periods without values are left out.
    pub fn resample_mean(&self, step: Timestep) -> TimeSeries {
        let mut bins: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for (date, value) in &self.points {
            if !value.is_finite() {
                continue;
            }
            let bin = bins.entry(period_end(*date, step)).or_insert((0.0, 0));
            bin.0 += value;
            bin.1 += 1;
        }
        let points = bins
            .into_iter()
            .map(|(date, (sum, n))| (date, sum / n as f64))
            .collect();
        TimeSeries {
            name: self.name.clone(),
            points,
        }
    }

    /// Points with `from <= date <= to`.
    pub fn window(&self, from: NaiveDate, to: NaiveDate) -> TimeSeries {
        let points = self
            .points
            .iter()
            .copied()
            .filter(|(date, _)| *date >= from && *date <= to)
            .collect();
        TimeSeries {
            name: self.name.clone(),
            points,
        }
    }

    /// Points from January 1 of `year` up to `end`.
    pub fn from_year(&self, year: i32, end: NaiveDate) -> TimeSeries {
        match NaiveDate::from_ymd_opt(year, 1, 1) {
            Some(from) => self.window(from, end),
            None => self.clone(),
        }
    }
}

/// Simulated and observed values on the dates both series share.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    pub sim_name: String,
    pub obs_name: String,
    pub step: Timestep,
    pub rows: Vec<AlignedRow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedRow {
    pub date: NaiveDate,
    pub sim: f64,
    pub obs: f64,
}

impl AlignedSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sims(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.sim).collect()
    }

    pub fn obs(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.obs).collect()
    }
}

/// Resamples both series to `max(native, requested)` and inner-joins them on
/// date, dropping rows where either side is missing.
pub fn align(
    sim: &TimeSeries,
    obs: &TimeSeries,
    native: Timestep,
    requested: Timestep,
) -> AlignedSeries {
    let step = native.max(requested);
    let obs_name = obs.name.clone();
    let sim = sim.resample_mean(step);
    let obs: BTreeMap<NaiveDate, f64> = obs.resample_mean(step).points.into_iter().collect();

    let rows = sim
        .points
        .iter()
        .filter_map(|(date, s)| {
            let o = *obs.get(date)?;
            (s.is_finite() && o.is_finite()).then_some(AlignedRow {
                date: *date,
                sim: *s,
                obs: o,
            })
        })
        .collect();

    AlignedSeries {
        sim_name: sim.name,
        obs_name,
        step,
        rows,
    }
}
