//! CPU utilisation from `/proc/stat`
//!
//! The aggregate `cpu` line holds cumulative jiffies per state, so usage is
//! only meaningful as a delta between two reads. The sampler keeps the
//! previous read and must be primed once before the first real sample.

use super::{async_trait, MetricGroup, Sample, Sampler};
use crate::error::SamplerError;
use crate::models::percent_of;
use std::path::PathBuf;
use tokio::fs;

pub const DEFAULT_PROC_STAT_PATH: &str = "/proc/stat";

/// Cumulative CPU time per state, in jiffies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// Parse the aggregate `cpu` line of `/proc/stat` content
    ///
    /// Guest time is already folded into user time by the kernel and is
    /// ignored here.
    pub fn parse(content: &str) -> Result<Self, SamplerError> {
        let malformed = |detail: String| SamplerError::Malformed {
            source_name: DEFAULT_PROC_STAT_PATH.to_string(),
            detail,
        };

        let line = content
            .lines()
            .find(|l| l.split_whitespace().next() == Some("cpu"))
            .ok_or_else(|| malformed("no aggregate cpu line".to_string()))?;

        let values = line
            .split_whitespace()
            .skip(1)
            .map(|v| v.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed(format!("bad counter: {}", e)))?;

        if values.len() < 4 {
            return Err(malformed(format!(
                "expected at least 4 counters, found {}",
                values.len()
            )));
        }

        let at = |i: usize| values.get(i).copied().unwrap_or(0);
        Ok(Self {
            user: at(0),
            nice: at(1),
            system: at(2),
            idle: at(3),
            iowait: at(4),
            irq: at(5),
            softirq: at(6),
            steal: at(7),
        })
    }

    /// Saturates instead of overflowing on corrupt or huge counters
    pub fn total(&self) -> u64 {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    fn user_time(&self) -> u64 {
        self.user.saturating_add(self.nice)
    }

    fn system_time(&self) -> u64 {
        self.system
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
    }
}

/// Utilisation between two reads, as percentages of elapsed CPU time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuUsage {
    pub percent: f64,
    pub user_percent: f64,
    pub system_percent: f64,
}

impl CpuUsage {
    /// Zero elapsed time (or a counter reset) yields zero usage
    pub fn between(previous: &CpuTimes, current: &CpuTimes) -> Self {
        let total = current.total().saturating_sub(previous.total());
        let idle = current.idle.saturating_sub(previous.idle);
        let user = current.user_time().saturating_sub(previous.user_time());
        let system = current.system_time().saturating_sub(previous.system_time());

        Self {
            percent: percent_of(total.saturating_sub(idle), total),
            user_percent: percent_of(user, total),
            system_percent: percent_of(system, total),
        }
    }
}

/// Delta-based CPU sampler
#[derive(Debug)]
pub struct CpuSampler {
    path: PathBuf,
    previous: Option<CpuTimes>,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_PROC_STAT_PATH)
    }

    /// Read from a custom stat path (for testing)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            previous: None,
        }
    }

    async fn read_times(&self) -> Result<CpuTimes, SamplerError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|source| SamplerError::Io {
                path: self.path.clone(),
                source,
            })?;
        CpuTimes::parse(&content)
    }
}

#[async_trait]
impl Sampler for CpuSampler {
    fn group(&self) -> MetricGroup {
        MetricGroup::Cpu
    }

    async fn prime(&mut self) -> Result<(), SamplerError> {
        self.previous = Some(self.read_times().await?);
        Ok(())
    }

    async fn sample(&mut self) -> Result<Vec<Sample>, SamplerError> {
        let current = self.read_times().await?;
        let previous = self.previous.replace(current).ok_or(SamplerError::NoBaseline)?;
        let usage = CpuUsage::between(&previous, &current);

        Ok(vec![
            Sample::new("CpuPercent", usage.percent),
            Sample::new("CpuUserPercent", usage.user_percent),
            Sample::new("CpuSystemPercent", usage.system_percent),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 0 50 800 50 0 0 0 0 0
cpu0 50 0 25 400 25 0 0 0 0 0
intr 12345
ctxt 6789
";

    #[test]
    fn test_parse_aggregate_line() {
        let times = CpuTimes::parse(STAT).unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.system, 50);
        assert_eq!(times.idle, 800);
        assert_eq!(times.iowait, 50);
        assert_eq!(times.total(), 1000);
    }

    #[test]
    fn test_parse_rejects_missing_line() {
        assert!(matches!(
            CpuTimes::parse("cpu0 1 2 3 4\n"),
            Err(SamplerError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_short_line() {
        assert!(CpuTimes::parse("cpu 1 2\n").is_err());
        assert!(CpuTimes::parse("cpu 1 2 x 4\n").is_err());
    }

    #[test]
    fn test_usage_between() {
        let previous = CpuTimes {
            user: 100,
            system: 50,
            idle: 800,
            iowait: 50,
            ..Default::default()
        };
        let current = CpuTimes {
            user: 130,
            nice: 10,
            system: 60,
            idle: 900,
            iowait: 50,
            ..Default::default()
        };

        // total delta 150: user 40, system 10, idle 100
        let usage = CpuUsage::between(&previous, &current);
        assert!((usage.percent - 50.0 * 100.0 / 150.0).abs() < 1e-9);
        assert!((usage.user_percent - 40.0 * 100.0 / 150.0).abs() < 1e-9);
        assert!((usage.system_percent - 10.0 * 100.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_saturated_counters_do_not_overflow() {
        let times = CpuTimes::parse("cpu 18446744073709551615 1 0 0\n").unwrap();
        assert_eq!(times.total(), u64::MAX);

        let previous = CpuTimes {
            user: 10,
            ..Default::default()
        };
        let usage = CpuUsage::between(&previous, &times);
        assert!(usage.percent.is_finite());
        assert!(usage.user_percent.is_finite());
    }

    #[test]
    fn test_usage_with_no_elapsed_time_is_zero() {
        let times = CpuTimes::parse(STAT).unwrap();
        let usage = CpuUsage::between(&times, &times);
        assert_eq!(usage, CpuUsage::default());
    }

    #[tokio::test]
    async fn test_unprimed_sample_is_discarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, STAT).await.unwrap();

        let mut sampler = CpuSampler::with_path(&path);
        assert!(matches!(
            sampler.sample().await,
            Err(SamplerError::NoBaseline)
        ));
        // The discarded read becomes the baseline
        assert_eq!(sampler.sample().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_primed_sample_reports_delta() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, STAT).await.unwrap();

        let mut sampler = CpuSampler::with_path(&path);
        sampler.prime().await.unwrap();

        fs::write(&path, "cpu  150 0 100 850 50 0 0 0 0 0\n")
            .await
            .unwrap();
        let samples = sampler.sample().await.unwrap();

        let names: Vec<_> = samples.iter().map(|s| s.name).collect();
        assert_eq!(names, ["CpuPercent", "CpuUserPercent", "CpuSystemPercent"]);
        // delta: user 50, system 50, idle 50 of 150
        assert!((samples[0].value - 100.0 * 100.0 / 150.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_stat_file() {
        let mut sampler = CpuSampler::with_path("/nonexistent/proc/stat");
        assert!(matches!(
            sampler.prime().await,
            Err(SamplerError::Io { .. })
        ));
    }
}
