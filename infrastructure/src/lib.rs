// Module declarations
pub mod persistence;

// Re-export all implementations
pub use persistence::{
    JsonEquipmentRepository, JsonFileStore, JsonRepository, JsonServiceRequestRepository,
    LockRegistry, StoreError,
};
