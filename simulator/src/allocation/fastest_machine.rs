use crate::error::SimulationError;

use super::{decay_slack, AllocationCallbacks, MachineSnapshot, PlacementPolicy};

/// Places tasks on the fastest free machines, splitting a task over several
/// machines when one does not have enough free cpus.
#[derive(Debug, Default, Clone)]
pub struct FastestMachinePlacement;

impl PlacementPolicy for FastestMachinePlacement {
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
            if demand as u64 > total_free_cpu {
                continue;
            }

            let machines = callbacks
                .machine_states_by_descending_speed()
                .map(MachineSnapshot::of)
                .collect::<Vec<_>>();

            let mut cores_left = demand;
            for machine in machines {
                if cores_left == 0 {
                    break;
                }
                let resources = machine.free_cpus.min(cores_left);
                let run_time = base_run_time as f64 / machine.normalized_speed;

                // The slowest fragment decides when the task completes. The
                // stretched time stays on the task, so a requeued attempt is
                // stretched again from it.
                let task = callbacks.task_mut(task_id);
                task.run_time = task.run_time.max(run_time.ceil() as i64);
                task.energy_consumed += machine.energy(resources, run_time);

                callbacks.schedule_task(task_id, machine.machine, resources)?;
                total_free_cpu -= resources as u64;
                cores_left -= resources;
            }
        }
        Ok(())
    }
}
