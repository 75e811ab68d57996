use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::{
    error::SimulationError,
    model::{Machine, MachineId, TaskId},
};

#[derive(Debug, Clone, Serialize)]
pub struct MachineState {
    machine: MachineId,
    cpus: u32,
    free_cpus: u32,
    tdp: u32,
    dvfs_enabled: bool,
    normalized_speed: f64,
    power_efficiency: f64,
    task_resources: FxHashMap<TaskId, u32>,
}

impl MachineState {
    pub fn new(machine: &Machine) -> Self {
        Self {
            machine: machine.id(),
            cpus: machine.cpus(),
            free_cpus: machine.cpus(),
            tdp: machine.tdp(),
            dvfs_enabled: machine.dvfs_enabled(),
            normalized_speed: machine.normalized_speed(),
            power_efficiency: machine.power_efficiency(),
            task_resources: FxHashMap::default(),
        }
    }

    pub fn machine(&self) -> MachineId {
        self.machine
    }

    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    pub fn free_cpus(&self) -> u32 {
        self.free_cpus
    }

    pub fn tdp(&self) -> u32 {
        self.tdp
    }

    pub fn dvfs_enabled(&self) -> bool {
        self.dvfs_enabled
    }

    pub fn normalized_speed(&self) -> f64 {
        self.normalized_speed
    }

    pub fn power_efficiency(&self) -> f64 {
        self.power_efficiency
    }

    pub fn resources_of(&self, task: TaskId) -> Option<u32> {
        self.task_resources.get(&task).copied()
    }

    pub fn running_tasks(&self) -> impl Iterator<Item = (TaskId, u32)> + '_ {
        self.task_resources.iter().map(|(t, r)| (*t, *r))
    }

    pub fn allocated_cpus(&self) -> u32 {
        self.task_resources.values().sum()
    }

    pub(crate) fn submit_task(&mut self, task: TaskId, resources: u32) -> Result<(), SimulationError> {
        if resources > self.free_cpus {
            return Err(SimulationError::InsufficientResources {
                task,
                machine: self.machine,
                free: self.free_cpus,
                requested: resources,
            });
        }
        if self.task_resources.contains_key(&task) {
            return Err(SimulationError::IllegalTaskTransition {
                task,
                reason: "task is already running on this machine",
            });
        }
        self.free_cpus -= resources;
        self.task_resources.insert(task, resources);
        Ok(())
    }

    /// Releases the resources held by `task`, returning how many were freed.
    pub(crate) fn release_task(&mut self, task: TaskId) -> Result<u32, SimulationError> {
        let resources = self
            .task_resources
            .remove(&task)
            .ok_or(SimulationError::TaskNotOnMachine {
                task,
                machine: self.machine,
            })?;
        self.free_cpus += resources;
        Ok(resources)
    }
}
