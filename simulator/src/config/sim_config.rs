use serde::{Deserialize, Serialize};

use crate::{allocation::DvfsOption, error::ConfigError, model::Environment};

fn default_placement_policy() -> String {
    "best_fit".to_string()
}

fn default_order_policy() -> String {
    "fcfs".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_placement_policy")]
    pub task_placement_policy: String,
    #[serde(default = "default_order_policy")]
    pub task_order_policy: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_placement_policy: default_placement_policy(),
            task_order_policy: default_order_policy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DvfsConfig {
    pub table: Vec<DvfsOption>,
}

/// Group of identical machines, named `<name_prefix>-<n>` when `count > 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMachineConfig {
    pub name_prefix: String,
    pub count: Option<u32>,
    pub cpus: u32,
    /// Clock rate of the machine. Speeds are normalized against the fastest
    /// clock in the configuration.
    pub base_clock: f64,
    pub tdp: u32,
    #[serde(default)]
    pub dvfs_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    pub cpus: u32,
    pub base_clock: f64,
    pub tdp: u32,
    pub dvfs_enabled: bool,
}

impl MachineConfig {
    pub fn from_group_config(group: &GroupMachineConfig, idx: Option<u32>) -> Self {
        let name = match idx {
            Some(idx) => format!("{}-{}", group.name_prefix, idx),
            None => group.name_prefix.clone(),
        };
        Self {
            name,
            cpus: group.cpus,
            base_clock: group.base_clock,
            tdp: group.tdp,
            dvfs_enabled: group.dvfs_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(default)]
    pub machines: Vec<GroupMachineConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub progress_interval_events: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub dvfs: Option<DvfsConfig>,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
    pub trace: Option<TraceConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

impl SimulationConfig {
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: file_name.to_string(),
            source,
        })
    }

    /// Expands the machine groups into an `Environment`.
    pub fn build_environment(&self) -> Result<Environment, ConfigError> {
        let mut machines_by_cluster = Vec::with_capacity(self.clusters.len());
        for cluster in &self.clusters {
            let mut machines = Vec::new();
            for group in &cluster.machines {
                let invalid = |reason: &str| ConfigError::InvalidMachineGroup {
                    name: group.name_prefix.clone(),
                    reason: reason.to_string(),
                };
                if !(group.base_clock > 0.) {
                    return Err(invalid("base clock must be positive"));
                }
                match group.count {
                    Some(0) => return Err(invalid("count must be positive")),
                    None | Some(1) => machines.push(MachineConfig::from_group_config(group, None)),
                    Some(count) => machines.extend(
                        (0..count).map(|i| MachineConfig::from_group_config(group, Some(i))),
                    ),
                }
            }
            machines_by_cluster.push((cluster.name.as_str(), machines));
        }

        let fastest_clock = machines_by_cluster
            .iter()
            .flat_map(|(_, machines)| machines.iter().map(|m| m.base_clock))
            .fold(0., f64::max);

        let mut environment = Environment::new();
        for (cluster_name, machines) in machines_by_cluster {
            let cluster = environment.create_cluster(cluster_name)?;
            for machine in machines {
                environment.create_machine(
                    &machine.name,
                    cluster,
                    machine.cpus,
                    machine.dvfs_enabled,
                    machine.base_clock / fastest_clock,
                    machine.tdp,
                )?;
            }
        }
        Ok(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
scheduler:
  task_placement_policy: look_ahead
  task_order_policy: ewf
dvfs:
  table:
    - slowdown: 1.0
      power_savings: 0.0
    - slowdown: 2.0
      power_savings: 0.25
clusters:
  - name: main
    machines:
      - name_prefix: fast
        count: 2
        cpus: 16
        base_clock: 4.0
        tdp: 200
      - name_prefix: slow
        cpus: 8
        base_clock: 2.0
        tdp: 65
        dvfs_enabled: true
trace:
  path: trace.yaml
"#;

    #[test]
    fn parses_config_and_builds_environment() {
        let config: SimulationConfig = serde_yaml::from_str(CONFIG).unwrap();
        assert_eq!(config.scheduler.task_order_policy, "ewf");
        assert_eq!(config.dvfs.as_ref().unwrap().table.len(), 2);
        assert_eq!(config.trace.as_ref().unwrap().path, "trace.yaml");
        assert!(config.monitoring.is_none());

        let env = config.build_environment().unwrap();
        let names = env.machines().iter().map(|m| m.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["fast-0", "fast-1", "slow"]);
        assert_eq!(env.machines()[0].normalized_speed(), 1.0);
        assert_eq!(env.machines()[2].normalized_speed(), 0.5);
        assert!(env.machines()[2].dvfs_enabled());
        assert_eq!(env.cluster_by_name("main").unwrap().machines().len(), 3);
    }

    #[test]
    fn scheduler_defaults() {
        let config: SimulationConfig = serde_yaml::from_str("clusters: []").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.scheduler.task_placement_policy, "best_fit");
    }

    #[test]
    fn rejects_empty_groups() {
        let mut config: SimulationConfig = serde_yaml::from_str(CONFIG).unwrap();
        config.clusters[0].machines[0].count = Some(0);
        assert!(matches!(
            config.build_environment(),
            Err(ConfigError::InvalidMachineGroup { .. })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            SimulationConfig::from_file("/nonexistent/config.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
