use std::{cell::RefCell, cmp::Ordering, rc::Rc, str::FromStr};

use serde::Serialize;

use crate::{
    error::ConfigError,
    model::{TaskId, Ticks, WorkflowId},
    monitoring::WorkflowStatsCollector,
    util::Compare,
};

/// Entry of the eligible task queue. Ordering keys are copied from the task
/// when it is enqueued, so later changes to the task cannot reorder the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueuedTask {
    pub task: TaskId,
    pub eligible_time: Ticks,
    pub run_time: Ticks,
    pub workflow: Option<WorkflowId>,
}

/// Names of the order policies accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskOrderPolicyKind {
    FirstComeFirstServe,
    ShortestJobFirst,
    EarliestWorkflowFirst,
}

impl TaskOrderPolicyKind {
    pub const OPTIONS: &'static str = "fcfs, sjf, ewf";
}

impl FromStr for TaskOrderPolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fcfs" | "first_come_first_serve" => Ok(Self::FirstComeFirstServe),
            "sjf" | "shortest_job_first" => Ok(Self::ShortestJobFirst),
            "ewf" | "earliest_workflow_first" => Ok(Self::EarliestWorkflowFirst),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "task order policy",
                name: s.to_string(),
                options: Self::OPTIONS.to_string(),
            }),
        }
    }
}

/// Strict total order over queued tasks. Every variant ends with the task id,
/// so two distinct tasks never compare equal.
#[derive(Clone)]
pub enum TaskOrderPolicy {
    FirstComeFirstServe,
    ShortestJobFirst,
    EarliestWorkflowFirst(Rc<RefCell<WorkflowStatsCollector>>),
}

impl TaskOrderPolicy {
    pub fn kind(&self) -> TaskOrderPolicyKind {
        match self {
            TaskOrderPolicy::FirstComeFirstServe => TaskOrderPolicyKind::FirstComeFirstServe,
            TaskOrderPolicy::ShortestJobFirst => TaskOrderPolicyKind::ShortestJobFirst,
            TaskOrderPolicy::EarliestWorkflowFirst(_) => TaskOrderPolicyKind::EarliestWorkflowFirst,
        }
    }
}

fn first_come_first_serve(a: &QueuedTask, b: &QueuedTask) -> Ordering {
    (a.eligible_time, a.task).cmp(&(b.eligible_time, b.task))
}

fn shortest_job_first(a: &QueuedTask, b: &QueuedTask) -> Ordering {
    (a.run_time, a.eligible_time, a.task).cmp(&(b.run_time, b.eligible_time, b.task))
}

fn earliest_workflow_first(
    stats: &WorkflowStatsCollector,
    a: &QueuedTask,
    b: &QueuedTask,
) -> Ordering {
    match (a.workflow, b.workflow) {
        (Some(wa), Some(wb)) if wa != wb => {
            let submit_time = |workflow: WorkflowId| {
                stats.submit_time(workflow).unwrap_or_else(|| {
                    panic!("submit time of workflow {} is not known", workflow)
                })
            };
            submit_time(wa)
                .cmp(&submit_time(wb))
                .then(wa.cmp(&wb))
                .then_with(|| first_come_first_serve(a, b))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => first_come_first_serve(a, b),
    }
}

impl Compare<QueuedTask> for TaskOrderPolicy {
    fn compare(&self, a: &QueuedTask, b: &QueuedTask) -> Ordering {
        match self {
            TaskOrderPolicy::FirstComeFirstServe => first_come_first_serve(a, b),
            TaskOrderPolicy::ShortestJobFirst => shortest_job_first(a, b),
            TaskOrderPolicy::EarliestWorkflowFirst(stats) => {
                earliest_workflow_first(&stats.borrow(), a, b)
            }
        }
    }
}
