use std::path::Path;

use serde::Serialize;

use wta_sim::{
    model::{TaskId, Ticks, Trace, WorkflowId},
    monitoring::{TaskStatsCollector, WorkflowStatsCollector},
};

#[derive(Serialize)]
struct TaskRecord<'a> {
    id: TaskId,
    name: &'a str,
    workflow: Option<WorkflowId>,
    cpus: u32,
    original_run_time: Ticks,
    run_time: Ticks,
    energy_consumed: f64,
    submit_time: Option<Ticks>,
    ready_time: Option<Ticks>,
    start_time: Option<Ticks>,
    completion_time: Option<Ticks>,
    earliest_completion_time: Option<Ticks>,
}

#[derive(Serialize)]
struct WorkflowRecord<'a> {
    id: WorkflowId,
    name: &'a str,
    tasks: usize,
    submit_time: Option<Ticks>,
    completion_time: Option<Ticks>,
    earliest_completion_time: Option<Ticks>,
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, csv::Error> {
    csv::WriterBuilder::new().delimiter(b'\t').from_path(path)
}

pub fn write_tasks(path: &Path, trace: &Trace, stats: &TaskStatsCollector) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(path)?;
    for task in trace.tasks() {
        let times = stats.times(task.id()).copied().unwrap_or_default();
        writer.serialize(TaskRecord {
            id: task.id(),
            name: task.name(),
            workflow: task.workflow(),
            cpus: task.cpu_demand(),
            original_run_time: task.original_run_time(),
            run_time: task.run_time,
            energy_consumed: task.energy_consumed,
            submit_time: times.submit,
            ready_time: times.ready,
            start_time: times.start,
            completion_time: times.completion,
            earliest_completion_time: times.earliest_completion,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_workflows(
    path: &Path,
    trace: &Trace,
    stats: &WorkflowStatsCollector,
) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(path)?;
    for workflow in trace.workflows() {
        let times = stats.times(workflow.id()).copied().unwrap_or_default();
        writer.serialize(WorkflowRecord {
            id: workflow.id(),
            name: workflow.name(),
            tasks: workflow.tasks().len(),
            submit_time: times.submit,
            completion_time: times.completion,
            earliest_completion_time: times.earliest_completion,
        })?;
    }
    writer.flush()?;
    Ok(())
}
