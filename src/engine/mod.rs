mod capacity;
mod error;
mod mutations;
mod projection;
mod queries;
mod sla;
mod workflow;

pub use capacity::{
    allocation, load_band, team_allocation, weekly_heatmap, window_capacity_hours, working_days,
};
pub use error::EngineError;
pub use projection::{project_for_person, project_window};
pub use sla::{at_risk, elapsed_hours, evaluate, SlaVerdict};
pub use workflow::{apply_transition, next_status, prev_status, LINEAR_ORDER};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::persist::{Persistence, StoreError};

/// The engine: a local snapshot of the demand collection plus read-only
/// snapshots of the reference entities, fed by the persistence
/// collaborator. All writes go through the optimistic mutation path in
/// `mutations`; every derived view reads a consistent snapshot and takes
/// `now` explicitly, so recomputing is always safe and reproducible.
pub struct Engine {
    demands: DashMap<Ulid, Demand>,
    areas: RwLock<Vec<Area>>,
    coordinations: RwLock<Vec<Coordination>>,
    people: RwLock<Vec<Person>>,
    categories: RwLock<Vec<Category>>,
    sla_configs: RwLock<Vec<SlaConfig>>,
    persistence: Arc<dyn Persistence>,
    pub config: EngineConfig,
}

impl Engine {
    pub fn new(persistence: Arc<dyn Persistence>, config: EngineConfig) -> Self {
        Self {
            demands: DashMap::new(),
            areas: RwLock::new(Vec::new()),
            coordinations: RwLock::new(Vec::new()),
            people: RwLock::new(Vec::new()),
            categories: RwLock::new(Vec::new()),
            sla_configs: RwLock::new(Vec::new()),
            persistence,
            config,
        }
    }

    /// Pull demands and all reference lists from the collaborator,
    /// replacing the local snapshots wholesale.
    pub async fn hydrate(&self) -> Result<(), EngineError> {
        let demands = self.persistence.list_demands().await.map_err(remote)?;
        self.demands.clear();
        for demand in demands {
            self.demands.insert(demand.id, demand);
        }
        metrics::gauge!(crate::observability::DEMANDS_LOADED).set(self.demands.len() as f64);
        tracing::info!(demands = self.demands.len(), "hydrated demand snapshot");

        self.refresh_config().await
    }

    /// Re-pull the reference entities. Their lifecycle is plain CRUD owned
    /// by the configuration collaborator; the engine only ever reads them.
    pub async fn refresh_config(&self) -> Result<(), EngineError> {
        let areas = self.persistence.list_areas().await.map_err(remote)?;
        let coordinations = self.persistence.list_coordinations().await.map_err(remote)?;
        let people = self.persistence.list_people().await.map_err(remote)?;
        let categories = self.persistence.list_categories().await.map_err(remote)?;
        let sla_configs = self.persistence.list_sla_configs().await.map_err(remote)?;

        *self.areas.write().await = areas;
        *self.coordinations.write().await = coordinations;
        *self.people.write().await = people;
        *self.categories.write().await = categories;
        *self.sla_configs.write().await = sla_configs;
        Ok(())
    }

    /// Deterministic snapshot of the demand collection, ordered by creation
    /// time (id as tiebreak). Derived views are pure functions over this.
    pub fn snapshot(&self) -> Vec<Demand> {
        let mut demands: Vec<Demand> = self.demands.iter().map(|e| e.value().clone()).collect();
        demands.sort_by_key(|d| (d.created_at, d.id));
        demands
    }

    pub fn get_demand(&self, id: Ulid) -> Option<Demand> {
        self.demands.get(&id).map(|e| e.value().clone())
    }

    pub fn demand_count(&self) -> usize {
        self.demands.len()
    }

    pub(crate) fn current(&self, id: Ulid) -> Result<Demand, EngineError> {
        self.get_demand(id).ok_or(EngineError::NotFound(id))
    }

    /// Creation and edits must point at known reference entities.
    pub(crate) async fn check_references(
        &self,
        person_id: Ulid,
        coordination_id: Ulid,
        requester_area_id: Ulid,
    ) -> Result<(), EngineError> {
        if !self.people.read().await.iter().any(|p| p.id == person_id) {
            return Err(EngineError::NotFound(person_id));
        }
        if !self
            .coordinations
            .read()
            .await
            .iter()
            .any(|c| c.id == coordination_id)
        {
            return Err(EngineError::NotFound(coordination_id));
        }
        if !self
            .areas
            .read()
            .await
            .iter()
            .any(|a| a.id == requester_area_id)
        {
            return Err(EngineError::NotFound(requester_area_id));
        }
        Ok(())
    }
}

fn remote(e: StoreError) -> EngineError {
    EngineError::Persistence(e.to_string())
}
