use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::ModelError;

use super::{ClusterId, MachineId};

#[derive(Debug, Clone, Serialize)]
pub struct Machine {
    id: MachineId,
    name: String,
    cluster: ClusterId,
    cpus: u32,
    dvfs_enabled: bool,
    normalized_speed: f64,
    tdp: u32,
}

impl Machine {
    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    pub fn dvfs_enabled(&self) -> bool {
        self.dvfs_enabled
    }

    /// Speed relative to the fastest machine of the environment, in `(0, 1]`.
    pub fn normalized_speed(&self) -> f64 {
        self.normalized_speed
    }

    pub fn tdp(&self) -> u32 {
        self.tdp
    }

    /// Power drawn per unit of delivered work. Lower is better.
    pub fn power_efficiency(&self) -> f64 {
        self.tdp as f64 / (self.cpus as f64 * self.normalized_speed)
    }

    pub fn id_string(&self) -> String {
        format!(
            "Machine(id={}, name='{}', cluster={})",
            self.id, self.name, self.cluster
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    id: ClusterId,
    name: String,
    machines: Vec<MachineId>,
    #[serde(skip)]
    machines_by_name: FxHashMap<String, MachineId>,
}

impl Cluster {
    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machines(&self) -> &[MachineId] {
        &self.machines
    }

    pub fn machine_by_name(&self, name: &str) -> Option<MachineId> {
        self.machines_by_name.get(name).copied()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Environment {
    clusters: Vec<Cluster>,
    machines: Vec<Machine>,
    #[serde(skip)]
    clusters_by_name: FxHashMap<String, ClusterId>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_cluster(&mut self, name: &str) -> Result<ClusterId, ModelError> {
        if self.clusters_by_name.contains_key(name) {
            return Err(ModelError::DuplicateCluster(name.to_string()));
        }
        let id = self.clusters.len();
        self.clusters.push(Cluster {
            id,
            name: name.to_string(),
            machines: Vec::new(),
            machines_by_name: FxHashMap::default(),
        });
        self.clusters_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn create_machine(
        &mut self,
        name: &str,
        cluster: ClusterId,
        cpus: u32,
        dvfs_enabled: bool,
        normalized_speed: f64,
        tdp: u32,
    ) -> Result<MachineId, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidMachine {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if cpus == 0 {
            return Err(invalid("a machine needs at least one cpu"));
        }
        if !(normalized_speed > 0. && normalized_speed <= 1.) {
            return Err(invalid("normalized speed must be in (0, 1]"));
        }

        let id = self.machines.len();
        let cluster_entry = self
            .clusters
            .get_mut(cluster)
            .ok_or(ModelError::UnknownCluster(cluster))?;
        if cluster_entry.machines_by_name.contains_key(name) {
            return Err(ModelError::DuplicateMachine {
                name: name.to_string(),
                cluster,
            });
        }
        cluster_entry.machines.push(id);
        cluster_entry.machines_by_name.insert(name.to_string(), id);

        self.machines.push(Machine {
            id,
            name: name.to_string(),
            cluster,
            cpus,
            dvfs_enabled,
            normalized_speed,
            tdp,
        });
        Ok(id)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn machine(&self, id: MachineId) -> Option<&Machine> {
        self.machines.get(id)
    }

    pub fn cluster_by_name(&self, name: &str) -> Option<&Cluster> {
        self.clusters_by_name.get(name).map(|id| &self.clusters[*id])
    }

    pub fn total_cpus(&self) -> u64 {
        self.machines.iter().map(|m| m.cpus as u64).sum()
    }
}
