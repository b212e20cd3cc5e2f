use crate::config::{ProjectPaths, Timestep};
use crate::error::ReadError;
use crate::io::control::{RunControl, SimPeriod};
use crate::io::output::{self, OutputKind};
use crate::series::{self, AlignedSeries, TimeSeries};
use crate::stats::FitStats;

/// One simulated series to plot or export.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub kind: OutputKind,
    pub entity: u32,
    pub variable: String,
    pub report: Timestep,
    pub from_year: Option<i32>,
}

impl SeriesRequest {
    pub fn new(kind: OutputKind, entity: u32, variable: impl Into<String>, report: Timestep) -> Self {
        SeriesRequest {
            kind,
            entity,
            variable: variable.into(),
            report,
            from_year: None,
        }
    }

    pub fn from_year(mut self, year: i32) -> Self {
        self.from_year = Some(year);
        self
    }
}

/// Number of `step` periods the simulation writes over `period`.
pub fn expected_periods(period: SimPeriod, step: Timestep) -> usize {
    series::count_periods(period.start, period.end, step)
}

/// Step the output of `kind` is written at for this run.
pub fn native_step(control: &RunControl, kind: OutputKind) -> Timestep {
    kind.layout()
        .fixed_step
        .unwrap_or_else(|| control.native_timestep())
}

/// Step a request is reported at; never finer than what was written.
pub fn effective_step(control: &RunControl, request: &SeriesRequest) -> Timestep {
    let native = native_step(control, request.kind);
    if request.report < native {
        tracing::warn!(
            requested = %request.report,
            native = %native,
            "report step finer than the simulation output; using the output step"
        );
    }
    native.max(request.report)
}

/// Reads the requested variable and puts it on the simulation's dates.
pub fn load_simulated(
    paths: &ProjectPaths,
    control: &RunControl,
    request: &SeriesRequest,
) -> Result<TimeSeries, ReadError> {
    let layout = request.kind.layout();
    let path = output::locate(paths, &layout)?;
    let values = output::read_variable(&path, &layout, request.entity, &request.variable)?;

    let native = native_step(control, request.kind);
    let period = control.period();
    let expected = expected_periods(period, native);
    if values.len() < expected {
        return Err(ReadError::not_ready(
            &path,
            format!("{} of {} {} periods written", values.len(), expected, native.label()),
        ));
    }
    if values.len() > expected {
        tracing::warn!(
            path = %path.display(),
            rows = values.len(),
            expected,
            "output has more rows than the run has periods; ignoring the rest"
        );
    }

    let name = format!("{}({})", request.variable, request.entity);
    let mut sim = TimeSeries::from_periods(name, period.start, native, &values[..expected]);
    let step = effective_step(control, request);
    if step != native {
        sim = sim.resample_mean(step);
    }
    if let Some(year) = request.from_year {
        sim = sim.from_year(year, period.end);
    }
    tracing::debug!(kind = ?request.kind, entity = request.entity, points = sim.len(), step = %step, "loaded simulated series");
    Ok(sim)
}

/// Simulated series with its observed counterpart and fit statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub sim: TimeSeries,
    pub aligned: AlignedSeries,
    pub stats: FitStats,
}

pub fn compare(
    paths: &ProjectPaths,
    control: &RunControl,
    request: &SeriesRequest,
    observed: &TimeSeries,
) -> Result<Comparison, ReadError> {
    let sim = load_simulated(paths, control, request)?;
    let step = effective_step(control, request);
    let observed = match request.from_year {
        Some(year) => observed.from_year(year, control.period().end),
        None => observed.clone(),
    };
    let aligned = series::align(&sim, &observed, step, request.report);
    if aligned.is_empty() {
        tracing::warn!(sim = %sim.name, obs = %observed.name, "no overlapping dates between simulated and observed data");
    }
    let stats = FitStats::from_aligned(&aligned);
    Ok(Comparison { sim, aligned, stats })
}

/// Separates "not written yet" from real failures: `NotReady` becomes
/// `Ok(None)` so callers can show the warm-up placeholder instead.
pub fn when_ready<T>(result: Result<T, ReadError>) -> Result<Option<T>, ReadError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_ready() => {
            tracing::info!(error = %e, "simulation output not ready");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
