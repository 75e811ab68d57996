use serde::Serialize;

use crate::{
    error::SimulationError,
    model::{Workflow, WorkflowId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowLifecycle {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone)]
pub struct WorkflowState {
    workflow: WorkflowId,
    lifecycle: WorkflowLifecycle,
    remaining_tasks: usize,
}

impl WorkflowState {
    pub fn new(workflow: &Workflow) -> Self {
        Self {
            workflow: workflow.id(),
            lifecycle: WorkflowLifecycle::Pending,
            remaining_tasks: workflow.tasks().len(),
        }
    }

    pub fn lifecycle(&self) -> WorkflowLifecycle {
        self.lifecycle
    }

    pub fn remaining_tasks(&self) -> usize {
        self.remaining_tasks
    }

    fn illegal(&self, reason: &'static str) -> SimulationError {
        SimulationError::IllegalWorkflowTransition {
            workflow: self.workflow,
            reason,
        }
    }

    pub fn submitted(&mut self) -> Result<(), SimulationError> {
        if self.lifecycle != WorkflowLifecycle::Pending {
            return Err(self.illegal("workflow can only be submitted if it was pending"));
        }
        self.lifecycle = WorkflowLifecycle::InProgress;
        Ok(())
    }

    /// Returns `true` once every task of the workflow has completed.
    pub fn task_completed(&mut self) -> Result<bool, SimulationError> {
        if self.lifecycle != WorkflowLifecycle::InProgress {
            return Err(self.illegal(
                "tasks in a workflow can only complete while the workflow is in progress",
            ));
        }
        if self.remaining_tasks == 0 {
            return Err(self.illegal("all tasks in the workflow were already completed"));
        }
        self.remaining_tasks -= 1;
        Ok(self.remaining_tasks == 0)
    }

    pub fn completed(&mut self) -> Result<(), SimulationError> {
        if self.lifecycle != WorkflowLifecycle::InProgress || self.remaining_tasks > 0 {
            return Err(self.illegal(
                "workflow can only complete if it was in progress and all of its tasks completed",
            ));
        }
        self.lifecycle = WorkflowLifecycle::Completed;
        Ok(())
    }
}
