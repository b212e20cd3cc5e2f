use crate::series::AlignedSeries;
use std::fmt;

/// Goodness-of-fit between simulated and observed values. A statistic is
/// `None` when it is undefined for the data (fewer than two points, a zero
/// denominator, or a non-finite result).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitStats {
    pub nse: Option<f64>,
    pub r_squared: Option<f64>,
    pub pbias: Option<f64>,
}

impl FitStats {
    pub fn undefined() -> Self {
        FitStats::default()
    }

    pub fn from_aligned(aligned: &AlignedSeries) -> Self {
        fit_stats(&aligned.sims(), &aligned.obs())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn finite_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let ratio = numerator / denominator;
    ratio.is_finite().then_some(ratio)
}

/// Nash-Sutcliffe efficiency: `1 - Σ(sim-obs)² / Σ(obs-mean(obs))²`.
pub fn nash_sutcliffe(sim: &[f64], obs: &[f64]) -> Option<f64> {
    if sim.len() != obs.len() || obs.len() < 2 {
        return None;
    }
    let obs_mean = mean(obs);
    let residual: f64 = sim.iter().zip(obs).map(|(s, o)| (s - o).powi(2)).sum();
    let variance: f64 = obs.iter().map(|o| (o - obs_mean).powi(2)).sum();
    finite_ratio(residual, variance).map(|r| 1.0 - r)
}

/// Squared Pearson correlation.
pub fn r_squared(sim: &[f64], obs: &[f64]) -> Option<f64> {
    if sim.len() != obs.len() || obs.len() < 2 {
        return None;
    }
    let obs_mean = mean(obs);
    let sim_mean = mean(sim);
    let covariance: f64 = sim
        .iter()
        .zip(obs)
        .map(|(s, o)| (o - obs_mean) * (s - sim_mean))
        .sum();
    let obs_var: f64 = obs.iter().map(|o| (o - obs_mean).powi(2)).sum();
    let sim_var: f64 = sim.iter().map(|s| (s - sim_mean).powi(2)).sum();
    finite_ratio(covariance.powi(2), obs_var * sim_var)
}

/// Percent bias: `100 · Σ(obs-sim) / Σobs`. Positive values mean the model
/// underestimates.
pub fn pbias(sim: &[f64], obs: &[f64]) -> Option<f64> {
    if sim.len() != obs.len() || obs.len() < 2 {
        return None;
    }
    let diff: f64 = sim.iter().zip(obs).map(|(s, o)| o - s).sum();
    let total: f64 = obs.iter().sum();
    finite_ratio(100.0 * diff, total)
}

pub fn fit_stats(sim: &[f64], obs: &[f64]) -> FitStats {
    if sim.len() != obs.len() || obs.len() < 2 {
        return FitStats::undefined();
    }
    FitStats {
        nse: nash_sutcliffe(sim, obs),
        r_squared: r_squared(sim, obs),
        pbias: pbias(sim, obs),
    }
}

/// Formats a statistic with four decimals, or `---` when undefined.
#[derive(Debug, Clone, Copy)]
pub struct StatValue(pub Option<f64>);

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{:.4}", v),
            None => f.write_str("---"),
        }
    }
}

impl fmt::Display for FitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nash–Sutcliffe: {}", StatValue(self.nse))?;
        writeln!(f, "R-squared: {}", StatValue(self.r_squared))?;
        writeln!(f, "PBIAS: {}", StatValue(self.pbias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_fit() {
        let obs = [1.0, 4.0, 2.5, 8.0, 3.3];
        let stats = fit_stats(&obs, &obs);
        assert!((stats.nse.unwrap() - 1.0).abs() < 1e-12);
        assert!((stats.r_squared.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(stats.pbias, Some(0.0));
    }

    #[test]
    fn pbias_of_constant_overestimate() {
        assert_eq!(pbias(&[10.0, 10.0, 10.0], &[8.0, 8.0, 8.0]), Some(-25.0));
    }

    #[test]
    fn zero_observed_variance_is_undefined() {
        let stats = fit_stats(&[10.0, 11.0, 12.0], &[8.0, 8.0, 8.0]);
        assert_eq!(stats.r_squared, None);
        assert_eq!(stats.nse, None);
        assert!(stats.pbias.is_some());
    }

    #[test]
    fn single_point_is_undefined() {
        assert_eq!(fit_stats(&[1.0], &[2.0]), FitStats::undefined());
        assert_eq!(fit_stats(&[], &[]), FitStats::undefined());
    }

    #[test]
    fn zero_observed_total_leaves_pbias_undefined() {
        assert_eq!(pbias(&[1.0, -1.0], &[2.0, -2.0]), None);
    }

    #[test]
    fn known_values() {
        let sim = [2.0, 3.0, 5.0];
        let obs = [1.0, 3.0, 5.0];
        // residual = 1, variance = 8
        assert!((nash_sutcliffe(&sim, &obs).unwrap() - 0.875).abs() < 1e-12);
        // PBIAS = 100 * (-1) / 9
        assert!((pbias(&sim, &obs).unwrap() + 100.0 / 9.0).abs() < 1e-12);
        let r2 = r_squared(&sim, &obs).unwrap();
        assert!(r2 > 0.9 && r2 <= 1.0);
    }

    #[test]
    fn display_uses_placeholder() {
        let text = FitStats {
            nse: Some(0.5),
            r_squared: None,
            pbias: Some(-25.0),
        }
        .to_string();
        assert_eq!(text, "Nash–Sutcliffe: 0.5000\nR-squared: ---\nPBIAS: -25.0000\n");
    }
}
