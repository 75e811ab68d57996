use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::{
    error::SimulationError,
    model::{MachineId, Task, TaskId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskLifecycle {
    Pending,
    Submitted,
    Running,
    Completed,
}

#[derive(Debug, Clone)]
pub struct TaskState {
    task: TaskId,
    lifecycle: TaskLifecycle,
    attempt: u32,
    unmet_dependencies: FxHashSet<TaskId>,
    // One entry per machine running a fragment of the current attempt.
    running_on: Vec<MachineId>,
}

impl TaskState {
    pub fn new(task: &Task) -> Self {
        Self {
            task: task.id(),
            lifecycle: TaskLifecycle::Pending,
            attempt: 0,
            unmet_dependencies: task.dependencies().iter().copied().collect(),
            running_on: Vec::new(),
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn lifecycle(&self) -> TaskLifecycle {
        self.lifecycle
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn unmet_dependencies(&self) -> &FxHashSet<TaskId> {
        &self.unmet_dependencies
    }

    pub fn running_machine_count(&self) -> usize {
        self.running_on.len()
    }

    pub fn is_running_on(&self, machine: MachineId) -> bool {
        self.running_on.contains(&machine)
    }

    /// Whether a completion of `attempt` on `machine` still refers to a live
    /// fragment of this task.
    pub fn is_current_attempt(&self, attempt: u32, machine: MachineId) -> bool {
        self.attempt == attempt && self.is_running_on(machine)
    }

    fn illegal(&self, reason: &'static str) -> SimulationError {
        SimulationError::IllegalTaskTransition {
            task: self.task,
            reason,
        }
    }

    pub fn submitted(&mut self) -> Result<(), SimulationError> {
        if self.lifecycle != TaskLifecycle::Pending {
            return Err(self.illegal("task can only be submitted if it was pending"));
        }
        self.lifecycle = TaskLifecycle::Submitted;
        Ok(())
    }

    /// Registers a fragment started on `machine`. Returns `true` when this is
    /// the first running fragment, i.e. the task just became running.
    pub fn started(&mut self, machine: MachineId) -> Result<bool, SimulationError> {
        match self.lifecycle {
            TaskLifecycle::Submitted | TaskLifecycle::Running => {}
            _ => return Err(self.illegal("task can only start running if it was submitted")),
        }
        if !self.unmet_dependencies.is_empty() {
            return Err(SimulationError::UnmetDependencies {
                task: self.task,
                unmet: self.unmet_dependencies.len(),
            });
        }
        if self.is_running_on(machine) {
            return Err(self.illegal("task is already running on this machine"));
        }
        self.running_on.push(machine);
        self.lifecycle = TaskLifecycle::Running;
        Ok(self.running_on.len() == 1)
    }

    /// Registers the completion of the fragment on `machine`. Returns `true`
    /// when it was the last one and the task is now completed.
    pub fn attempt_completed(&mut self, machine: MachineId) -> Result<bool, SimulationError> {
        if self.lifecycle != TaskLifecycle::Running {
            return Err(self.illegal("task can only be completed if it was running"));
        }
        self.stop_fragment(machine)?;
        if self.running_on.is_empty() {
            self.lifecycle = TaskLifecycle::Completed;
            return Ok(true);
        }
        Ok(false)
    }

    /// Registers the cancellation of the fragment on `machine`. Returns `true`
    /// when no fragment is left running: the task is submitted again and any
    /// outstanding completion of the cancelled attempt becomes stale.
    pub fn cancelled(&mut self, machine: MachineId) -> Result<bool, SimulationError> {
        match self.lifecycle {
            TaskLifecycle::Submitted | TaskLifecycle::Running => {}
            _ => return Err(self.illegal("task can only be cancelled if it was running")),
        }
        self.stop_fragment(machine)?;
        if self.running_on.is_empty() {
            self.lifecycle = TaskLifecycle::Submitted;
            self.attempt += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn stop_fragment(&mut self, machine: MachineId) -> Result<(), SimulationError> {
        let position = self
            .running_on
            .iter()
            .position(|m| *m == machine)
            .ok_or(SimulationError::TaskNotOnMachine {
                task: self.task,
                machine,
            })?;
        self.running_on.swap_remove(position);
        Ok(())
    }

    pub fn dependency_completed(&mut self, dependency: TaskId) -> Result<(), SimulationError> {
        if !self.unmet_dependencies.remove(&dependency) {
            return Err(SimulationError::UnknownDependency {
                task: self.task,
                dependency,
            });
        }
        Ok(())
    }
}
