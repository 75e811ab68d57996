use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::ModelError;

use super::{TaskId, Ticks, WorkflowId};

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    id: TaskId,
    name: String,
    workflow: Option<WorkflowId>,
    submission_time: Ticks,
    original_run_time: Ticks,
    cpu_demand: u32,
    dependencies: Vec<TaskId>,

    // Adjusted by placement policies while modeling DVFS and slower machines.
    pub run_time: Ticks,
    pub slack: Ticks,
    pub energy_consumed: f64,
    pub earliest_start_time: Ticks,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow(&self) -> Option<WorkflowId> {
        self.workflow
    }

    pub fn submission_time(&self) -> Ticks {
        self.submission_time
    }

    /// Run time as recorded in the trace, before any placement adjustment.
    pub fn original_run_time(&self) -> Ticks {
        self.original_run_time
    }

    pub fn cpu_demand(&self) -> u32 {
        self.cpu_demand
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn id_string(&self) -> String {
        format!(
            "Task(id={}, name='{}', workflow={})",
            self.id,
            self.name,
            self.workflow
                .map(|w| w.to_string())
                .unwrap_or_else(|| "N/A".to_string())
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
    id: WorkflowId,
    name: String,
    tasks: Vec<TaskId>,
    #[serde(skip)]
    tasks_by_name: FxHashMap<String, TaskId>,
}

impl Workflow {
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn task_by_name(&self, name: &str) -> Option<TaskId> {
        self.tasks_by_name.get(name).copied()
    }

    pub fn id_string(&self) -> String {
        format!("Workflow(id={}, name='{}')", self.id, self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    workflows: Vec<Workflow>,
    tasks: Vec<Task>,
    #[serde(skip)]
    workflows_by_name: FxHashMap<String, WorkflowId>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_workflow(&mut self, name: &str) -> Result<WorkflowId, ModelError> {
        if self.workflows_by_name.contains_key(name) {
            return Err(ModelError::DuplicateWorkflow(name.to_string()));
        }
        let id = self.workflows.len();
        self.workflows.push(Workflow {
            id,
            name: name.to_string(),
            tasks: Vec::new(),
            tasks_by_name: FxHashMap::default(),
        });
        self.workflows_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn create_task(
        &mut self,
        name: &str,
        workflow: Option<WorkflowId>,
        run_time: Ticks,
        submission_time: Ticks,
        slack: Ticks,
        cpu_demand: u32,
    ) -> Result<TaskId, ModelError> {
        if cpu_demand == 0 {
            return Err(ModelError::ZeroCpuDemand(name.to_string()));
        }
        let id = self.tasks.len();
        if let Some(workflow_id) = workflow {
            let workflow = self
                .workflows
                .get_mut(workflow_id)
                .ok_or_else(|| ModelError::UnknownWorkflow(format!("id {}", workflow_id)))?;
            if workflow.tasks_by_name.contains_key(name) {
                return Err(ModelError::DuplicateTask {
                    name: name.to_string(),
                    workflow: workflow_id,
                });
            }
            workflow.tasks.push(id);
            workflow.tasks_by_name.insert(name.to_string(), id);
        }

        self.tasks.push(Task {
            id,
            name: name.to_string(),
            workflow,
            submission_time,
            original_run_time: run_time,
            cpu_demand,
            dependencies: Vec::new(),
            run_time,
            slack,
            energy_consumed: 0.,
            earliest_start_time: submission_time,
        });
        Ok(id)
    }

    /// Makes `task` depend on `dependency`. The edge is rejected, and the
    /// trace left untouched, if it would close a cycle.
    pub fn add_dependency(&mut self, task: TaskId, dependency: TaskId) -> Result<(), ModelError> {
        let task_workflow = self.checked_task(task)?.workflow;
        let dependency_workflow = self.checked_task(dependency)?.workflow;
        if task_workflow != dependency_workflow {
            return Err(ModelError::CrossWorkflowDependency { task, dependency });
        }
        if let Some(cycle) = self.find_cycle(task, dependency) {
            return Err(ModelError::CyclicDependency {
                task,
                dependency,
                cycle: self.render_cycle(&cycle),
            });
        }
        let dependencies = &mut self.tasks[task].dependencies;
        if !dependencies.contains(&dependency) {
            dependencies.push(dependency);
        }
        Ok(())
    }

    /// Shortest chain `task -> dependency -> ... -> task` that the new edge
    /// would close, if any.
    fn find_cycle(&self, task: TaskId, dependency: TaskId) -> Option<Vec<TaskId>> {
        if task == dependency {
            return Some(vec![task, task]);
        }

        let mut previous_in_chain = FxHashMap::default();
        previous_in_chain.insert(dependency, task);
        let mut to_check = VecDeque::from([dependency]);

        while let Some(current) = to_check.pop_front() {
            for &dep in &self.tasks[current].dependencies {
                if dep == task {
                    let mut cycle = vec![task, current];
                    let mut backtrack = current;
                    while backtrack != task {
                        backtrack = previous_in_chain[&backtrack];
                        cycle.push(backtrack);
                    }
                    cycle.reverse();
                    return Some(cycle);
                }
                if !previous_in_chain.contains_key(&dep) {
                    previous_in_chain.insert(dep, current);
                    to_check.push_back(dep);
                }
            }
        }
        None
    }

    fn render_cycle(&self, cycle: &[TaskId]) -> String {
        let label = |id: &TaskId| self.tasks[*id].id_string();
        if cycle.len() <= 5 {
            cycle.iter().map(label).collect::<Vec<_>>().join(" -> ")
        } else {
            let n = cycle.len() - 1;
            format!(
                "{} -> {} -> ... -> {} -> {}",
                label(&cycle[0]),
                label(&cycle[1]),
                label(&cycle[n - 1]),
                label(&cycle[n])
            )
        }
    }

    /// Propagates `earliest_start_time` along dependency edges assuming
    /// unlimited resources and original run times.
    pub fn compute_earliest_start_times(&mut self) {
        let mut remaining = self
            .tasks
            .iter()
            .map(|t| t.dependencies.len())
            .collect::<Vec<_>>();
        let dependants = self.reverse_dependencies();

        for task in self.tasks.iter_mut() {
            task.earliest_start_time = task.submission_time;
        }

        let mut ready = (0..self.tasks.len())
            .filter(|id| remaining[*id] == 0)
            .collect::<VecDeque<_>>();
        while let Some(id) = ready.pop_front() {
            let finish = self.tasks[id].earliest_start_time + self.tasks[id].original_run_time;
            for &child in &dependants[id] {
                let child_task = &mut self.tasks[child];
                child_task.earliest_start_time = child_task.earliest_start_time.max(finish);
                remaining[child] -= 1;
                if remaining[child] == 0 {
                    ready.push_back(child);
                }
            }
        }
    }

    /// For every task, the tasks that depend on it.
    pub fn reverse_dependencies(&self) -> Vec<Vec<TaskId>> {
        let mut dependants = vec![Vec::new(); self.tasks.len()];
        for task in &self.tasks {
            for &dep in &task.dependencies {
                dependants[dep].push(task.id);
            }
        }
        dependants
    }

    fn checked_task(&self, id: TaskId) -> Result<&Task, ModelError> {
        self.tasks
            .get(id)
            .ok_or_else(|| ModelError::UnknownTask(format!("id {}", id)))
    }

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn workflow(&self, id: WorkflowId) -> Option<&Workflow> {
        self.workflows.get(id)
    }

    pub fn workflow_by_name(&self, name: &str) -> Option<&Workflow> {
        self.workflows_by_name.get(name).map(|id| &self.workflows[*id])
    }

    pub fn dependency_count(&self) -> usize {
        self.tasks.iter().map(|t| t.dependencies.len()).sum()
    }
}
