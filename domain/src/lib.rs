use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod finance;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl DomainError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        DomainError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

// --- Record ID ---

/// Integer identifier, unique within one collection.
/// `0` means "not assigned yet"; the repository assigns real ids on create.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(i32);

impl RecordId {
    /// Id given to the first record of an empty collection.
    pub const FIRST: RecordId = RecordId(1);

    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// The following id, or `None` once `i32::MAX` is reached.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

impl From<RecordId> for i32 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Record capability ---

/// Anything that can live in a JSON-backed collection.
///
/// The store only needs the serde contract; the repository additionally needs
/// to read and assign the identifier, and lets each record kind fill in the
/// fields it defaults on creation.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> RecordId;

    fn set_id(&mut self, id: RecordId);

    /// Fills in server-owned defaults before the record is first stored.
    /// Must be idempotent: values already present are kept.
    fn apply_creation_defaults(&mut self) {}
}

// --- Equipment ---

/// A piece of equipment tracked by the service desk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    #[serde(default)]
    pub id: RecordId,
    pub inventory_number: String,
    pub name: String,
    #[serde(rename = "type")] // Map 'type' JSON key to 'equipment_type' field
    pub equipment_type: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub location: String,
    pub status: String,
    pub purchase_date: DateTime<Utc>,
    pub warranty_end_date: DateTime<Utc>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Record for Equipment {
    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

// --- Service Request ---

/// A service (repair/maintenance) request raised against one piece of equipment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    #[serde(default)]
    pub id: RecordId,
    pub request_number: String,
    /// Must reference an existing equipment record; checked by the caller, not the store.
    pub equipment_id: RecordId,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ServiceRequest {
    /// Stamps `created_at` with the current time unless it is already set.
    pub fn stamp_created_at(&mut self) {
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
    }
}

impl Record for ServiceRequest {
    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn apply_creation_defaults(&mut self) {
        self.stamp_created_at();
    }
}
