//! Error types of the simulator.

use thiserror::Error;

use crate::model::{MachineId, TaskId, Ticks, WorkflowId};

/// Errors raised while building an `Environment` or a `Trace`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("cluster with name \"{0}\" already exists")]
    DuplicateCluster(String),

    #[error("workflow with name \"{0}\" already exists")]
    DuplicateWorkflow(String),

    #[error("task with name \"{name}\" already exists in workflow {workflow}")]
    DuplicateTask { name: String, workflow: WorkflowId },

    #[error("task with name \"{0}\" already exists outside of any workflow")]
    DuplicateStandaloneTask(String),

    #[error("machine with name \"{name}\" already exists in cluster {cluster}")]
    DuplicateMachine { name: String, cluster: usize },

    #[error("no cluster found for id {0}")]
    UnknownCluster(usize),

    #[error("no workflow found for {0}")]
    UnknownWorkflow(String),

    #[error("no task found for {0}")]
    UnknownTask(String),

    #[error("no machine found for {0}")]
    UnknownMachine(String),

    #[error("dependencies can only be added between tasks in the same workflow (task {task} on {dependency})")]
    CrossWorkflowDependency { task: TaskId, dependency: TaskId },

    #[error("adding a dependency to task {task} on task {dependency} creates a cyclic dependency: {cycle}")]
    CyclicDependency {
        task: TaskId,
        dependency: TaskId,
        cycle: String,
    },

    #[error("task \"{0}\" must demand at least one cpu")]
    ZeroCpuDemand(String),

    #[error("machine \"{name}\" is invalid: {reason}")]
    InvalidMachine { name: String, reason: String },
}

/// Errors detected while turning configuration into a runnable simulation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown {kind} `{name}`, expected one of [{options}]")]
    UnknownPolicy {
        kind: &'static str,
        name: String,
        options: String,
    },

    #[error("invalid DVFS table: {0}")]
    InvalidDvfsTable(String),

    #[error("machine {0} has DVFS enabled but no DVFS table is configured")]
    MissingDvfsTable(MachineId),

    #[error("invalid machine group \"{name}\": {reason}")]
    InvalidMachineGroup { name: String, reason: String },

    #[error("no trace configured")]
    MissingTrace,

    #[error("can't read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse YAML from file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Fatal invariant violations. The event loop aborts on the first one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("not enough cpus available on machine {machine} to start task {task} ({free} < {requested})")]
    InsufficientResources {
        task: TaskId,
        machine: MachineId,
        free: u32,
        requested: u32,
    },

    #[error("task {task} was not running on machine {machine}")]
    TaskNotOnMachine { task: TaskId, machine: MachineId },

    #[error("illegal transition of task {task}: {reason}")]
    IllegalTaskTransition { task: TaskId, reason: &'static str },

    #[error("illegal transition of workflow {workflow}: {reason}")]
    IllegalWorkflowTransition {
        workflow: WorkflowId,
        reason: &'static str,
    },

    #[error("task {task} reported dependency {dependency} completed, but it is not an unmet dependency")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("task {task} started with {unmet} unmet dependencies")]
    UnmetDependencies { task: TaskId, unmet: usize },

    #[error("task {task} entered the queue at {time}, before its submission time {submission_time}")]
    EarlyEligibility {
        task: TaskId,
        time: Ticks,
        submission_time: Ticks,
    },

    #[error("current time is {current} but received an event at time {event_time}")]
    ClockRegression { current: Ticks, event_time: Ticks },

    #[error("event type {event_type} not supported by observer {observer}")]
    UnsupportedEvent {
        event_type: String,
        observer: String,
    },

    #[error("no {kind} found for id {id}")]
    UnknownEntity { kind: &'static str, id: usize },

    #[error("not all tasks were completed ({completed} of {total})")]
    IncompleteSimulation { completed: usize, total: usize },

    #[error("simulation result failed sanity check for task {task}: {reason}")]
    SanityCheck { task: TaskId, reason: String },
}
