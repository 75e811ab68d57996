use std::path::Path;

use serde::Serialize;

use wta_sim::{
    model::Trace,
    monitoring::{TaskStatsCollector, WorkflowStatsCollector},
};

const PERCENTILES: [f64; 7] = [0., 25., 50., 75., 95., 99., 100.];

/// Descriptive statistics of one metric.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub metric: String,
    pub count: usize,
    pub mean: f64,
    #[serde(rename = "std.dev")]
    pub std_dev: f64,
    pub cv: f64,
    #[serde(rename = "geo.mean")]
    pub geometric_mean: f64,
    #[serde(rename = "harm.mean")]
    pub harmonic_mean: f64,
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Percentile with the `(n + 1) * p` position estimate, interpolating between
/// neighbours.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if p == 0. {
        return sorted[0];
    }
    let n = sorted.len() as f64;
    let pos = p * (n + 1.) / 100.;
    if pos < 1. {
        return sorted[0];
    }
    if pos >= n {
        return sorted[sorted.len() - 1];
    }
    let lower = sorted[pos.floor() as usize - 1];
    let upper = sorted[pos.floor() as usize];
    lower + (pos - pos.floor()) * (upper - lower)
}

impl Stats {
    pub fn of(metric: &str, values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let count = sorted.len();
        let n = count as f64;

        let mean = sorted.iter().sum::<f64>() / n;
        let variance = if count > 1 {
            sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.)
        } else {
            0.
        };
        let geometric_mean = (sorted.iter().map(|v| v.ln()).sum::<f64>() / n).exp();
        let harmonic_mean = n / sorted.iter().map(|v| 1. / v).sum::<f64>();
        let p = PERCENTILES.map(|p| percentile(&sorted, p));

        Self {
            metric: metric.to_string(),
            count,
            mean,
            std_dev: variance.sqrt(),
            cv: variance / mean,
            geometric_mean,
            harmonic_mean,
            min: p[0],
            p25: p[1],
            median: p[2],
            p75: p[3],
            p95: p[4],
            p99: p[5],
            max: p[6],
        }
    }
}

pub struct Summary {
    stats: Vec<Stats>,
}

impl Summary {
    /// Task run, wait and response times, bounded slowdowns for bounds from
    /// 1 to 1e9 ticks, and workflow schedule lengths.
    pub fn new(
        trace: &Trace,
        task_stats: &TaskStatsCollector,
        workflow_stats: &WorkflowStatsCollector,
    ) -> Self {
        let mut stats = Vec::new();

        let run_times = trace
            .tasks()
            .iter()
            .map(|t| t.run_time as f64)
            .collect::<Vec<_>>();
        let wait_times = task_stats
            .all_times()
            .iter()
            .map(|t| match (t.start, t.ready) {
                (Some(start), Some(ready)) => (start - ready) as f64,
                _ => f64::NAN,
            })
            .collect::<Vec<_>>();
        let response_times = run_times
            .iter()
            .zip(&wait_times)
            .map(|(run, wait)| run + wait)
            .collect::<Vec<_>>();
        stats.push(Stats::of("Task Run Time", &run_times));
        stats.push(Stats::of("Task Wait Time", &wait_times));
        stats.push(Stats::of("Task Response Time", &response_times));

        for e in 0..10 {
            let bound = 10f64.powi(e);
            let slowdowns = run_times
                .iter()
                .zip(&response_times)
                .map(|(run, response)| (response / run.max(bound)).max(1.))
                .collect::<Vec<_>>();
            stats.push(Stats::of(&format!("Task Bounded Slowdown (1e{} Ticks)", e), &slowdowns));
        }

        let mut schedule_lengths = Vec::new();
        let mut normalized_schedule_lengths = Vec::new();
        for times in workflow_stats.all_times() {
            let (Some(submit), Some(completion)) = (times.submit, times.completion) else {
                continue;
            };
            let schedule_length = (completion - submit) as f64;
            schedule_lengths.push(schedule_length);
            if let Some(earliest) = times.earliest_completion {
                let minimal = (earliest - submit) as f64;
                if minimal > 0. {
                    normalized_schedule_lengths.push(schedule_length / minimal);
                }
            }
        }
        stats.push(Stats::of("Workflow Schedule Length", &schedule_lengths));
        stats.push(Stats::of(
            "Workflow Normalized Schedule Length",
            &normalized_schedule_lengths,
        ));

        Self { stats }
    }

    pub fn print(&self) {
        println!(
            "{:<40} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "metric", "count", "mean", "std.dev", "min", "p25", "median", "p75", "p95", "max"
        );
        for s in &self.stats {
            println!(
                "{:<40} {:>8} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
                s.metric, s.count, s.mean, s.std_dev, s.min, s.p25, s.median, s.p75, s.p95, s.max
            );
        }
    }

    pub fn write_tsv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        for s in &self.stats {
            writer.serialize(s)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_interpolate() {
        let sorted = [1., 2., 3., 4.];
        assert_eq!(percentile(&sorted, 0.), 1.);
        assert_eq!(percentile(&sorted, 50.), 2.5);
        assert_eq!(percentile(&sorted, 100.), 4.);
        assert_eq!(percentile(&sorted, 25.), 1.25);
    }

    #[test]
    fn stats_of_constant_values() {
        let stats = Stats::of("x", &[2., 2., 2.]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 2.);
        assert_eq!(stats.std_dev, 0.);
        assert!((stats.geometric_mean - 2.).abs() < 1e-12);
        assert!((stats.harmonic_mean - 2.).abs() < 1e-12);
        assert_eq!(stats.median, 2.);
    }
}
