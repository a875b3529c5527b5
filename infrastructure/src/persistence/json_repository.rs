use super::{JsonFileStore, LockRegistry, StoreError};
use application::{ApplicationError, EquipmentRepository, ServiceRequestRepository};
use async_trait::async_trait;
use domain::{Equipment, Record, RecordId, ServiceRequest};
use std::path::Path;
use tracing::{debug, instrument};

/// CRUD over one JSON-backed collection, with id assignment.
///
/// New ids are `max(existing) + 1` (or 1 for an empty collection), computed
/// inside the store's critical section, so deleting the highest record lets
/// its id be handed out again.
#[derive(Debug, Clone)]
pub struct JsonRepository<T> {
    store: JsonFileStore<T>,
}

pub type JsonEquipmentRepository = JsonRepository<Equipment>;
pub type JsonServiceRequestRepository = JsonRepository<ServiceRequest>;

impl<T: Record> JsonRepository<T> {
    pub fn open(path: impl AsRef<Path>, registry: &LockRegistry) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonFileStore::open(path, registry)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub async fn all(&self) -> Result<Vec<T>, StoreError> {
        self.store.read_all().await
    }

    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub async fn find(&self, id: RecordId) -> Result<Option<T>, StoreError> {
        let items = self.store.read_all().await?;
        Ok(items.into_iter().find(|record| record.id() == id))
    }

    #[instrument(skip(self, record), fields(path = %self.path().display()))]
    pub async fn insert(&self, mut record: T) -> Result<T, StoreError> {
        let created = self
            .store
            .try_update(move |items: &mut Vec<T>| -> Result<T, StoreError> {
                record.apply_creation_defaults();
                let id = match items.iter().map(|existing| existing.id()).max() {
                    None => RecordId::FIRST,
                    Some(max) => max.next().ok_or(StoreError::IdsExhausted(max))?,
                };
                record.set_id(id);
                items.push(record.clone());
                Ok(record)
            })
            .await?;
        debug!(id = %created.id(), "Record inserted");
        Ok(created)
    }

    #[instrument(skip(self, record), fields(path = %self.path().display()))]
    pub async fn replace(&self, id: RecordId, mut record: T) -> Result<bool, StoreError> {
        self.store
            .update(move |items| {
                let Some(index) = items.iter().position(|existing| existing.id() == id) else {
                    return false;
                };
                record.set_id(id);
                items[index] = record;
                true
            })
            .await
    }

    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub async fn remove(&self, id: RecordId) -> Result<bool, StoreError> {
        self.store
            .update(move |items| {
                let before = items.len();
                items.retain(|record| record.id() != id);
                items.len() != before
            })
            .await
    }
}

#[async_trait]
impl EquipmentRepository for JsonRepository<Equipment> {
    async fn get_all(&self) -> Result<Vec<Equipment>, ApplicationError> {
        Ok(self.all().await?)
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<Equipment>, ApplicationError> {
        Ok(self.find(id).await?)
    }

    async fn create(&self, equipment: Equipment) -> Result<Equipment, ApplicationError> {
        Ok(self.insert(equipment).await?)
    }

    async fn update(&self, id: RecordId, equipment: Equipment) -> Result<bool, ApplicationError> {
        Ok(self.replace(id, equipment).await?)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, ApplicationError> {
        Ok(self.remove(id).await?)
    }
}

#[async_trait]
impl ServiceRequestRepository for JsonRepository<ServiceRequest> {
    async fn get_all(&self) -> Result<Vec<ServiceRequest>, ApplicationError> {
        Ok(self.all().await?)
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<ServiceRequest>, ApplicationError> {
        Ok(self.find(id).await?)
    }

    async fn create(&self, request: ServiceRequest) -> Result<ServiceRequest, ApplicationError> {
        Ok(self.insert(request).await?)
    }

    async fn update(
        &self,
        id: RecordId,
        request: ServiceRequest,
    ) -> Result<bool, ApplicationError> {
        Ok(self.replace(id, request).await?)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, ApplicationError> {
        Ok(self.remove(id).await?)
    }
}
