//! Mutable per-entity bookkeeping, kept apart from the immutable model.

pub mod machine_state;
pub mod task_state;
pub mod workflow_state;

pub use machine_state::MachineState;
pub use task_state::{TaskLifecycle, TaskState};
pub use workflow_state::{WorkflowLifecycle, WorkflowState};

use crate::{
    error::SimulationError,
    model::{TaskId, Trace, WorkflowId},
};

/// Lifecycle state of every task and workflow, indexed by id. Machine state
/// is owned by the `ClusterManager`.
#[derive(Debug, Clone)]
pub struct SimulationState {
    task_states: Vec<TaskState>,
    workflow_states: Vec<WorkflowState>,
}

impl SimulationState {
    pub fn new(trace: &Trace) -> Self {
        Self {
            task_states: trace.tasks().iter().map(TaskState::new).collect(),
            workflow_states: trace.workflows().iter().map(WorkflowState::new).collect(),
        }
    }

    pub fn task(&self, id: TaskId) -> Result<&TaskState, SimulationError> {
        self.task_states
            .get(id)
            .ok_or(SimulationError::UnknownEntity { kind: "task", id })
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut TaskState, SimulationError> {
        self.task_states
            .get_mut(id)
            .ok_or(SimulationError::UnknownEntity { kind: "task", id })
    }

    pub fn workflow(&self, id: WorkflowId) -> Result<&WorkflowState, SimulationError> {
        self.workflow_states
            .get(id)
            .ok_or(SimulationError::UnknownEntity { kind: "workflow", id })
    }

    pub fn workflow_mut(&mut self, id: WorkflowId) -> Result<&mut WorkflowState, SimulationError> {
        self.workflow_states
            .get_mut(id)
            .ok_or(SimulationError::UnknownEntity { kind: "workflow", id })
    }

    pub fn task_states(&self) -> &[TaskState] {
        &self.task_states
    }

    pub fn workflow_states(&self) -> &[WorkflowState] {
        &self.workflow_states
    }
}
