use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// Failure surfaced by the persistence collaborator. Always recoverable by
/// retry; the engine rolls back its optimistic change and reports it.
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    NotFound(Ulid),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
            StoreError::NotFound(id) => write!(f, "record not found: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The remote persistence collaborator, as the engine consumes it: the
/// demand records round-trip through here, the reference entities are
/// maintained elsewhere (a configuration service owns their CRUD) and the
/// engine only ever lists them.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn list_demands(&self) -> Result<Vec<Demand>, StoreError>;
    /// Id is assigned by the caller before invocation.
    async fn create_demand(&self, demand: &Demand) -> Result<Demand, StoreError>;
    /// Full-record replace, keyed by id.
    async fn update_demand(&self, demand: &Demand) -> Result<Demand, StoreError>;
    async fn delete_demand(&self, id: Ulid) -> Result<(), StoreError>;

    async fn list_areas(&self) -> Result<Vec<Area>, StoreError>;
    async fn list_coordinations(&self) -> Result<Vec<Coordination>, StoreError>;
    async fn list_people(&self) -> Result<Vec<Person>, StoreError>;
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn list_sla_configs(&self) -> Result<Vec<SlaConfig>, StoreError>;
}

/// In-process implementation of the collaborator. Used as the reference
/// backend in tests and by embedders that do not need a remote store.
/// Writes can be switched off to exercise the engine's rollback path.
#[derive(Default)]
pub struct InMemoryStore {
    demands: DashMap<Ulid, Demand>,
    areas: DashMap<Ulid, Area>,
    coordinations: DashMap<Ulid, Coordination>,
    people: DashMap<Ulid, Person>,
    categories: DashMap<Ulid, Category>,
    sla_configs: DashMap<Ulid, SlaConfig>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, as a remote outage would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    pub fn demand_count(&self) -> usize {
        self.demands.len()
    }

    pub fn stored_demand(&self, id: Ulid) -> Option<Demand> {
        self.demands.get(&id).map(|e| e.value().clone())
    }

    // Reference entities are owned by the configuration collaborator; these
    // seeding helpers stand in for it.

    pub fn put_area(&self, area: Area) {
        self.areas.insert(area.id, area);
    }

    pub fn put_coordination(&self, coordination: Coordination) {
        self.coordinations.insert(coordination.id, coordination);
    }

    pub fn put_person(&self, person: Person) {
        self.people.insert(person.id, person);
    }

    pub fn put_category(&self, category: Category) {
        self.categories.insert(category.id, category);
    }

    pub fn put_sla_config(&self, config: SlaConfig) {
        self.sla_configs.insert(config.id, config);
    }
}

fn sorted_by_id<T: Clone>(map: &DashMap<Ulid, T>) -> Vec<T> {
    let mut entries: Vec<(Ulid, T)> = map
        .iter()
        .map(|e| (*e.key(), e.value().clone()))
        .collect();
    entries.sort_by_key(|(id, _)| *id);
    entries.into_iter().map(|(_, v)| v).collect()
}

#[async_trait]
impl Persistence for InMemoryStore {
    async fn list_demands(&self) -> Result<Vec<Demand>, StoreError> {
        Ok(sorted_by_id(&self.demands))
    }

    async fn create_demand(&self, demand: &Demand) -> Result<Demand, StoreError> {
        self.check_available()?;
        self.demands.insert(demand.id, demand.clone());
        Ok(demand.clone())
    }

    async fn update_demand(&self, demand: &Demand) -> Result<Demand, StoreError> {
        self.check_available()?;
        if !self.demands.contains_key(&demand.id) {
            return Err(StoreError::NotFound(demand.id));
        }
        self.demands.insert(demand.id, demand.clone());
        Ok(demand.clone())
    }

    async fn delete_demand(&self, id: Ulid) -> Result<(), StoreError> {
        self.check_available()?;
        self.demands
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_areas(&self) -> Result<Vec<Area>, StoreError> {
        Ok(sorted_by_id(&self.areas))
    }

    async fn list_coordinations(&self) -> Result<Vec<Coordination>, StoreError> {
        Ok(sorted_by_id(&self.coordinations))
    }

    async fn list_people(&self) -> Result<Vec<Person>, StoreError> {
        Ok(sorted_by_id(&self.people))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(sorted_by_id(&self.categories))
    }

    async fn list_sla_configs(&self) -> Result<Vec<SlaConfig>, StoreError> {
        Ok(sorted_by_id(&self.sla_configs))
    }
}
