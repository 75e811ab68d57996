use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, model::Ticks};

/// Slowdown factor applied to a task and the fraction of power saved by
/// running at the matching lower frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DvfsOption {
    pub slowdown: f64,
    pub power_savings: f64,
}

/// Lookup table from acceptable slowdown to power savings, sorted by slowdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DvfsTable {
    options: Vec<DvfsOption>,
}

impl Default for DvfsTable {
    /// Averages measured over workflow benchmarks at three frequency levels.
    fn default() -> Self {
        Self {
            options: vec![
                DvfsOption {
                    slowdown: 1.0,
                    power_savings: 0.0,
                },
                DvfsOption {
                    slowdown: 1.2286,
                    power_savings: 0.086,
                },
                DvfsOption {
                    slowdown: 1.5344,
                    power_savings: 0.126,
                },
            ],
        }
    }
}

impl DvfsTable {
    pub fn new(mut options: Vec<DvfsOption>) -> Result<Self, ConfigError> {
        options.sort_by(|a, b| a.slowdown.total_cmp(&b.slowdown));
        for option in &options {
            if !(option.slowdown >= 1.0) {
                return Err(ConfigError::InvalidDvfsTable(format!(
                    "slowdown {} must be at least 1.0, anything lower is a speedup",
                    option.slowdown
                )));
            }
            if !(0.0..1.0).contains(&option.power_savings) {
                return Err(ConfigError::InvalidDvfsTable(format!(
                    "power savings {} of slowdown {} must be in [0, 1)",
                    option.power_savings, option.slowdown
                )));
            }
        }
        if options.windows(2).any(|w| w[0].slowdown == w[1].slowdown) {
            return Err(ConfigError::InvalidDvfsTable(
                "slowdown factors must be unique".to_string(),
            ));
        }
        Ok(Self { options })
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn options(&self) -> &[DvfsOption] {
        &self.options
    }

    /// The option with the largest slowdown not above `slowdown`.
    pub fn floor(&self, slowdown: f64) -> Option<&DvfsOption> {
        let idx = self.options.partition_point(|o| o.slowdown <= slowdown);
        idx.checked_sub(1).map(|i| &self.options[i])
    }

    /// Stretches `run_time` as far as `slack` allows and returns the new run
    /// time with the power savings of the chosen frequency.
    ///
    /// The slowdown key is `(run_time + slack) / run_time` clamped to at least
    /// 1.0, and a zero run time always selects the 1.0 entry.
    pub fn slow_down(&self, run_time: Ticks, slack: Ticks) -> (Ticks, f64) {
        let key = if run_time <= 0 {
            1.0
        } else {
            ((run_time + slack) as f64 / run_time as f64).max(1.0)
        };
        match self.floor(key) {
            Some(option) => (
                (run_time as f64 * option.slowdown).ceil() as Ticks,
                option.power_savings,
            ),
            None => (run_time, 0.),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_lookup() {
        let table = DvfsTable::default();
        assert_eq!(table.floor(0.5), None);
        assert_eq!(table.floor(1.0).map(|o| o.slowdown), Some(1.0));
        assert_eq!(table.floor(1.3).map(|o| o.slowdown), Some(1.2286));
        assert_eq!(table.floor(2.0).map(|o| o.slowdown), Some(1.5344));
    }

    #[test]
    fn slowdown_is_bounded_by_slack() {
        let table = DvfsTable::default();
        assert_eq!(table.slow_down(1000, 1000), (1535, 0.126));
        assert_eq!(table.slow_down(1000, 300), (1229, 0.086));
        assert_eq!(table.slow_down(1000, 100), (1000, 0.0));
    }

    // Zero run time and exhausted slack both clamp the key to 1.0.
    #[test]
    fn degenerate_keys_are_clamped() {
        let table = DvfsTable::default();
        assert_eq!(table.slow_down(0, 5000), (0, 0.0));
        assert_eq!(table.slow_down(1000, -400), (1000, 0.0));
    }

    #[test]
    fn validates_entries() {
        assert!(DvfsTable::new(vec![DvfsOption {
            slowdown: 0.9,
            power_savings: 0.
        }])
        .is_err());
        assert!(DvfsTable::new(vec![DvfsOption {
            slowdown: 1.5,
            power_savings: 1.0
        }])
        .is_err());
        let table = DvfsTable::new(vec![
            DvfsOption {
                slowdown: 2.0,
                power_savings: 0.2,
            },
            DvfsOption {
                slowdown: 1.0,
                power_savings: 0.,
            },
        ])
        .unwrap();
        assert_eq!(table.options()[0].slowdown, 1.0);
        assert!(DvfsTable::new(Vec::new()).unwrap().is_empty());
    }
}
