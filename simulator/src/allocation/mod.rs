//! Task placement and task order policies.

pub mod best_fit;
pub mod dvfs;
pub mod fastest_machine;
pub mod look_ahead;
pub mod order;

use std::str::FromStr;

use serde::Serialize;

pub use best_fit::BestFitPlacement;
pub use dvfs::{DvfsOption, DvfsTable};
pub use fastest_machine::FastestMachinePlacement;
pub use look_ahead::LookAheadPlacement;
pub use order::{QueuedTask, TaskOrderPolicy, TaskOrderPolicyKind};

use crate::{
    config::sim_config::SimulationConfig,
    error::{ConfigError, SimulationError},
    model::{Environment, MachineId, Task, TaskId, Ticks},
    state::MachineState,
};

/// View of the scheduler offered to a placement policy during one pass.
///
/// Machine iterators borrow the callbacks, so they have to be dropped before
/// committing a placement with [`AllocationCallbacks::schedule_task`]; the
/// views change with every commit.
pub trait AllocationCallbacks {
    fn current_time(&self) -> Ticks;

    /// Next eligible task in queue order that was not returned yet in this pass.
    fn next_eligible_task(&mut self) -> Option<TaskId>;

    fn task(&self, task: TaskId) -> &Task;

    fn task_mut(&mut self, task: TaskId) -> &mut Task;

    fn free_resources(&self) -> u64;

    fn machine_states(&self) -> Box<dyn Iterator<Item = &MachineState> + '_>;

    fn machine_states_by_ascending_free_cpu(
        &self,
        minimum_free_cpu: u32,
    ) -> Box<dyn Iterator<Item = &MachineState> + '_>;

    fn machine_states_by_ascending_inefficiency(&self) -> Box<dyn Iterator<Item = &MachineState> + '_>;

    fn machine_states_by_descending_speed(&self) -> Box<dyn Iterator<Item = &MachineState> + '_>;

    /// Runs `resources` cpus worth of `task` on `machine`, finishing after the
    /// task's current run time.
    fn schedule_task(
        &mut self,
        task: TaskId,
        machine: MachineId,
        resources: u32,
    ) -> Result<(), SimulationError>;
}

pub trait PlacementPolicy {
    fn schedule_tasks(&mut self, callbacks: &mut dyn AllocationCallbacks) -> Result<(), SimulationError>;
}

/// Machine fields a policy needs after the machine views are released.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MachineSnapshot {
    pub machine: MachineId,
    pub cpus: u32,
    pub free_cpus: u32,
    pub tdp: u32,
    pub dvfs_enabled: bool,
    pub normalized_speed: f64,
}

impl MachineSnapshot {
    pub fn of(state: &MachineState) -> Self {
        Self {
            machine: state.machine(),
            cpus: state.cpus(),
            free_cpus: state.free_cpus(),
            tdp: state.tdp(),
            dvfs_enabled: state.dvfs_enabled(),
            normalized_speed: state.normalized_speed(),
        }
    }

    /// Energy in Wh spent by `resources` cpus running for `run_time` ms.
    pub fn energy(&self, resources: u32, run_time: f64) -> f64 {
        self.tdp as f64 / self.cpus as f64 * resources as f64 * (run_time / crate::model::MILLIS_PER_HOUR)
    }
}

/// Lowers the slack of a task by the time it already waited past its earliest
/// possible start, never below zero. Applied on every pass the task is seen.
pub(crate) fn decay_slack(task: &mut Task, now: Ticks) {
    task.slack = (task.slack - (now - task.earliest_start_time)).max(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskPlacementPolicyKind {
    BestFit,
    FastestMachine,
    LookAhead,
}

impl TaskPlacementPolicyKind {
    pub const OPTIONS: &'static str = "best_fit, fastest_machine, look_ahead";
}

impl FromStr for TaskPlacementPolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "best_fit" | "bestfit" => Ok(Self::BestFit),
            "fastest_machine" | "fastest" => Ok(Self::FastestMachine),
            "look_ahead" | "lookahead" => Ok(Self::LookAhead),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "task placement policy",
                name: s.to_string(),
                options: Self::OPTIONS.to_string(),
            }),
        }
    }
}

pub enum TaskPlacementPolicy {
    BestFit(BestFitPlacement),
    FastestMachine(FastestMachinePlacement),
    LookAhead(LookAheadPlacement),
}

impl TaskPlacementPolicy {
    pub fn kind(&self) -> TaskPlacementPolicyKind {
        match self {
            TaskPlacementPolicy::BestFit(_) => TaskPlacementPolicyKind::BestFit,
            TaskPlacementPolicy::FastestMachine(_) => TaskPlacementPolicyKind::FastestMachine,
            TaskPlacementPolicy::LookAhead(_) => TaskPlacementPolicyKind::LookAhead,
        }
    }
}

impl PlacementPolicy for TaskPlacementPolicy {
    fn schedule_tasks(&mut self, callbacks: &mut dyn AllocationCallbacks) -> Result<(), SimulationError> {
        match self {
            TaskPlacementPolicy::BestFit(policy) => policy.schedule_tasks(callbacks),
            TaskPlacementPolicy::FastestMachine(policy) => policy.schedule_tasks(callbacks),
            TaskPlacementPolicy::LookAhead(policy) => policy.schedule_tasks(callbacks),
        }
    }
}

/// Policies chosen by configuration, ready to be moved into a `Simulation`.
pub struct PolicySet {
    pub placement: TaskPlacementPolicy,
    pub order: TaskOrderPolicyKind,
}

impl PolicySet {
    pub fn new(
        placement: TaskPlacementPolicyKind,
        order: TaskOrderPolicyKind,
        dvfs: DvfsTable,
        environment: &Environment,
    ) -> Result<Self, ConfigError> {
        let placement = match placement {
            TaskPlacementPolicyKind::BestFit => TaskPlacementPolicy::BestFit(BestFitPlacement),
            TaskPlacementPolicyKind::FastestMachine => {
                TaskPlacementPolicy::FastestMachine(FastestMachinePlacement)
            }
            TaskPlacementPolicyKind::LookAhead => {
                if dvfs.is_empty() {
                    if let Some(machine) = environment.machines().iter().find(|m| m.dvfs_enabled()) {
                        return Err(ConfigError::MissingDvfsTable(machine.id()));
                    }
                }
                TaskPlacementPolicy::LookAhead(LookAheadPlacement::new(dvfs))
            }
        };
        Ok(Self { placement, order })
    }

    pub fn from_config(config: &SimulationConfig, environment: &Environment) -> Result<Self, ConfigError> {
        let placement = config.scheduler.task_placement_policy.parse()?;
        let order = config.scheduler.task_order_policy.parse()?;
        let dvfs = match &config.dvfs {
            Some(dvfs) => DvfsTable::new(dvfs.table.clone())?,
            None => DvfsTable::default(),
        };
        Self::new(placement, order, dvfs, environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_ahead_requires_dvfs_table_for_dvfs_machines() {
        let mut env = Environment::new();
        let c = env.create_cluster("c").unwrap();
        env.create_machine("plain", c, 4, false, 1., 10).unwrap();
        env.create_machine("dvfs", c, 4, true, 1., 10).unwrap();

        let empty = DvfsTable::new(Vec::new()).unwrap();
        assert!(matches!(
            PolicySet::new(
                TaskPlacementPolicyKind::LookAhead,
                TaskOrderPolicyKind::FirstComeFirstServe,
                empty.clone(),
                &env
            ),
            Err(ConfigError::MissingDvfsTable(1))
        ));
        let set = PolicySet::new(
            TaskPlacementPolicyKind::BestFit,
            TaskOrderPolicyKind::ShortestJobFirst,
            empty,
            &env,
        )
        .unwrap();
        assert_eq!(set.placement.kind(), TaskPlacementPolicyKind::BestFit);
    }

    #[test]
    fn unknown_placement_lists_options() {
        let err = "round_robin".parse::<TaskPlacementPolicyKind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown task placement policy `round_robin`, expected one of [best_fit, fastest_machine, look_ahead]"
        );
        assert_eq!(
            "Look-Ahead".parse::<TaskPlacementPolicyKind>().unwrap(),
            TaskPlacementPolicyKind::LookAhead
        );
    }
}
