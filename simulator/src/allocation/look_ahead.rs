use crate::{error::SimulationError, model::Ticks};

use super::{decay_slack, AllocationCallbacks, DvfsTable, MachineSnapshot, PlacementPolicy};

/// Energy-aware placement. Machines are tried from the most power efficient
/// one, skipping machines whose slowdown would exceed the task's slack, and
/// DVFS-capable machines run the task at the lowest frequency its remaining
/// slack allows.
///
/// When the machines within slack cannot host the whole task, the slack check
/// is waived for that task rather than leaving it queued.
#[derive(Debug, Clone)]
pub struct LookAheadPlacement {
    dvfs: DvfsTable,
}

impl LookAheadPlacement {
    pub fn new(dvfs: DvfsTable) -> Self {
        Self { dvfs }
    }

    pub fn dvfs(&self) -> &DvfsTable {
        &self.dvfs
    }
}

impl Default for LookAheadPlacement {
    fn default() -> Self {
        Self::new(DvfsTable::default())
    }
}

fn run_time_on(machine: &MachineSnapshot, base_run_time: Ticks) -> Ticks {
    (base_run_time as f64 / machine.normalized_speed).ceil() as Ticks
}

impl PlacementPolicy for LookAheadPlacement {
    fn schedule_tasks(&mut self, callbacks: &mut dyn AllocationCallbacks) -> Result<(), SimulationError> {
        let now = callbacks.current_time();
        let mut total_free_cpu = callbacks.free_resources();

        while total_free_cpu > 0 {
            let Some(task_id) = callbacks.next_eligible_task() else {
                break;
            };
            let task = callbacks.task_mut(task_id);
            decay_slack(task, now);
            let demand = task.cpu_demand();
            let base_run_time = task.run_time;
            let slack = task.slack;
            if demand as u64 > total_free_cpu {
                continue;
            }

            let machines = callbacks
                .machine_states_by_ascending_inefficiency()
                .map(MachineSnapshot::of)
                .collect::<Vec<_>>();
            let within_slack =
                |m: &MachineSnapshot| run_time_on(m, base_run_time) - base_run_time <= slack;
            let capacity_within_slack: u64 = machines
                .iter()
                .filter(|m| within_slack(m))
                .map(|m| m.free_cpus as u64)
                .sum();
            let waive_slack = capacity_within_slack < demand as u64;

            let mut cores_left = demand;
            let mut slack_used: Ticks = 0;
            for machine in machines.iter().filter(|m| waive_slack || within_slack(m)) {
                if cores_left == 0 {
                    break;
                }
                let resources = machine.free_cpus.min(cores_left);
                let run_time = run_time_on(machine, base_run_time);
                let slack_left = (slack - (run_time - base_run_time)).max(0);

                let (run_time_with_dvfs, power_savings) = if machine.dvfs_enabled {
                    self.dvfs.slow_down(run_time, slack_left)
                } else {
                    (run_time, 0.)
                };
                let energy = machine.energy(resources, base_run_time as f64 / machine.normalized_speed)
                    * (1. - power_savings);

                let task = callbacks.task_mut(task_id);
                task.run_time = task.run_time.max(run_time_with_dvfs);
                task.energy_consumed += energy;
                slack_used = slack_used.max(run_time_with_dvfs - base_run_time);

                callbacks.schedule_task(task_id, machine.machine, resources)?;
                total_free_cpu -= resources as u64;
                cores_left -= resources;
            }

            let task = callbacks.task_mut(task_id);
            task.slack = (slack - slack_used).max(0);
        }
        Ok(())
    }
}
