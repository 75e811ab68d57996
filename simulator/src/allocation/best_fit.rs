use crate::error::SimulationError;

use super::{AllocationCallbacks, PlacementPolicy};

/// Places every task as a whole on the machine with the fewest free cpus that
/// still fits it.
#[derive(Debug, Default, Clone)]
pub struct BestFitPlacement;

impl PlacementPolicy for BestFitPlacement {
    fn schedule_tasks(&mut self, callbacks: &mut dyn AllocationCallbacks) -> Result<(), SimulationError> {
        let mut total_free_cpu = callbacks.free_resources();

        while total_free_cpu > 0 {
            let Some(task) = callbacks.next_eligible_task() else {
                break;
            };
            let demand = callbacks.task(task).cpu_demand();

            let machine = callbacks
                .machine_states_by_ascending_free_cpu(demand)
                .next()
                .map(|state| state.machine());
            if let Some(machine) = machine {
                callbacks.schedule_task(task, machine, demand)?;
                total_free_cpu -= demand as u64;
            }
        }
        Ok(())
    }
}
