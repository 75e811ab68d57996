use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, ModelError},
    model::{TaskId, Ticks, Trace, WorkflowId},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeTaskDefinition {
    pub name: String,
    pub submit_time: Ticks,
    pub run_time: Ticks,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default)]
    pub slack: Ticks,
    /// Names of tasks of the same workflow.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

fn default_cpus() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeWorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<NativeTaskDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeTraceDefinition {
    #[serde(default)]
    pub workflows: Vec<NativeWorkflowDefinition>,
    /// Tasks that belong to no workflow.
    #[serde(default)]
    pub tasks: Vec<NativeTaskDefinition>,
}

/// Reads traces stored as YAML in the simulator's own format.
pub struct NativeTraceReader {
    definition: NativeTraceDefinition,
}

impl NativeTraceReader {
    pub fn new(definition: NativeTraceDefinition) -> Self {
        Self { definition }
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let definition = serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })?;
        Ok(Self::new(definition))
    }

    pub fn definition(&self) -> &NativeTraceDefinition {
        &self.definition
    }

    pub fn read_trace(&self) -> Result<Trace, ModelError> {
        let mut trace = Trace::new();
        for workflow in &self.definition.workflows {
            let id = trace.create_workflow(&workflow.name)?;
            let names = create_tasks(&mut trace, Some(id), &workflow.tasks)?;
            add_dependencies(&mut trace, &names, &workflow.tasks)?;
        }
        let names = create_tasks(&mut trace, None, &self.definition.tasks)?;
        add_dependencies(&mut trace, &names, &self.definition.tasks)?;

        trace.compute_earliest_start_times();
        Ok(trace)
    }
}

fn create_tasks(
    trace: &mut Trace,
    workflow: Option<WorkflowId>,
    tasks: &[NativeTaskDefinition],
) -> Result<FxHashMap<String, TaskId>, ModelError> {
    let mut names = FxHashMap::default();
    for task in tasks {
        if workflow.is_none() && names.contains_key(&task.name) {
            return Err(ModelError::DuplicateStandaloneTask(task.name.clone()));
        }
        let id = trace.create_task(
            &task.name,
            workflow,
            task.run_time,
            task.submit_time,
            task.slack,
            task.cpus,
        )?;
        names.insert(task.name.clone(), id);
    }
    Ok(names)
}

fn add_dependencies(
    trace: &mut Trace,
    names: &FxHashMap<String, TaskId>,
    tasks: &[NativeTaskDefinition],
) -> Result<(), ModelError> {
    for task in tasks {
        let id = names[&task.name];
        for dependency in &task.dependencies {
            let dependency_id = names
                .get(dependency)
                .ok_or_else(|| ModelError::UnknownTask(format!("name \"{}\"", dependency)))?;
            trace.add_dependency(id, *dependency_id)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(yaml: &str) -> Result<Trace, ModelError> {
        NativeTraceReader::new(serde_yaml::from_str(yaml).unwrap()).read_trace()
    }

    #[test]
    fn reads_workflows_and_standalone_tasks() {
        let trace = read(
            r#"
workflows:
  - name: wf
    tasks:
      - name: b
        submit_time: 0
        run_time: 20
        cpus: 2
        dependencies: [a]
      - name: a
        submit_time: 0
        run_time: 10
        slack: 5
tasks:
  - name: lone
    submit_time: 7
    run_time: 3
"#,
        )
        .unwrap();

        assert_eq!(trace.workflows().len(), 1);
        assert_eq!(trace.tasks().len(), 3);
        let wf = trace.workflow_by_name("wf").unwrap();
        let a = wf.task_by_name("a").unwrap();
        let b = wf.task_by_name("b").unwrap();
        assert_eq!(trace.task(b).unwrap().dependencies(), &[a]);
        assert_eq!(trace.task(b).unwrap().cpu_demand(), 2);
        assert_eq!(trace.task(b).unwrap().earliest_start_time, 10);
        assert_eq!(trace.task(a).unwrap().slack, 5);
        assert_eq!(trace.task(2).unwrap().workflow(), None);
        assert_eq!(trace.task(2).unwrap().submission_time(), 7);
    }

    #[test]
    fn rejects_unknown_and_cyclic_dependencies() {
        let unknown = read(
            r#"
workflows:
  - name: wf
    tasks:
      - {name: a, submit_time: 0, run_time: 1, dependencies: [missing]}
"#,
        );
        assert!(matches!(unknown, Err(ModelError::UnknownTask(_))));

        let cyclic = read(
            r#"
workflows:
  - name: wf
    tasks:
      - {name: a, submit_time: 0, run_time: 1, dependencies: [b]}
      - {name: b, submit_time: 0, run_time: 1, dependencies: [a]}
"#,
        );
        assert!(matches!(cyclic, Err(ModelError::CyclicDependency { .. })));
    }

    #[test]
    fn rejects_duplicate_standalone_tasks() {
        let result = read(
            r#"
tasks:
  - {name: a, submit_time: 0, run_time: 1}
  - {name: a, submit_time: 1, run_time: 1}
"#,
        );
        assert_eq!(result.unwrap_err(), ModelError::DuplicateStandaloneTask("a".to_string()));
    }
}
