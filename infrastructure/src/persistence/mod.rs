pub mod error;
pub mod json_file_store;
pub mod json_repository;
pub mod lock_registry;

pub use error::StoreError;
pub use json_file_store::JsonFileStore;
pub use json_repository::{JsonEquipmentRepository, JsonRepository, JsonServiceRequestRepository};
pub use lock_registry::LockRegistry;
