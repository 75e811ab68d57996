use serde::Serialize;

use crate::model::{MachineId, TaskId, Ticks, WorkflowId};

pub type EventId = u64;

/// Kinds of simulation events. Events sharing a timestamp are processed in
/// the order of declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EventType {
    // Handled before any task of the workflow is submitted
    WorkflowSubmitted,
    TaskSubmitted,
    TaskDependenciesMet,
    TaskStarted,
    TaskCancelled,
    TaskAttemptCompleted,
    TaskCompleted,
    // Handled after all tasks of the workflow are completed
    WorkflowCompleted,
    TaskQueueExtended,
    ClusterStateChanged,
    SchedulerReschedule,
    AllTasksCompleted,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::WorkflowSubmitted,
        EventType::TaskSubmitted,
        EventType::TaskDependenciesMet,
        EventType::TaskStarted,
        EventType::TaskCancelled,
        EventType::TaskAttemptCompleted,
        EventType::TaskCompleted,
        EventType::WorkflowCompleted,
        EventType::TaskQueueExtended,
        EventType::ClusterStateChanged,
        EventType::SchedulerReschedule,
        EventType::AllTasksCompleted,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn rank(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EventData {
    WorkflowSubmitted {
        workflow: WorkflowId,
    },
    TaskSubmitted {
        task: TaskId,
    },
    TaskDependenciesMet {
        task: TaskId,
    },
    TaskStarted {
        task: TaskId,
        machine: MachineId,
        resources: u32,
    },
    TaskCancelled {
        task: TaskId,
        machine: MachineId,
    },
    TaskAttemptCompleted {
        task: TaskId,
        attempt: u32,
        machine: MachineId,
        resources: u32,
    },
    TaskCompleted {
        task: TaskId,
        machine: MachineId,
    },
    WorkflowCompleted {
        workflow: WorkflowId,
    },
    TaskQueueExtended,
    ClusterStateChanged,
    SchedulerReschedule,
    AllTasksCompleted,
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::WorkflowSubmitted { .. } => EventType::WorkflowSubmitted,
            EventData::TaskSubmitted { .. } => EventType::TaskSubmitted,
            EventData::TaskDependenciesMet { .. } => EventType::TaskDependenciesMet,
            EventData::TaskStarted { .. } => EventType::TaskStarted,
            EventData::TaskCancelled { .. } => EventType::TaskCancelled,
            EventData::TaskAttemptCompleted { .. } => EventType::TaskAttemptCompleted,
            EventData::TaskCompleted { .. } => EventType::TaskCompleted,
            EventData::WorkflowCompleted { .. } => EventType::WorkflowCompleted,
            EventData::TaskQueueExtended => EventType::TaskQueueExtended,
            EventData::ClusterStateChanged => EventType::ClusterStateChanged,
            EventData::SchedulerReschedule => EventType::SchedulerReschedule,
            EventData::AllTasksCompleted => EventType::AllTasksCompleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub time: Ticks,
    pub data: EventData,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }
}
