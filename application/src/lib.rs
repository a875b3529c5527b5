use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::finance::{self, ProjectCalculation, RealEstateProject, Sensitivity};
use domain::{DomainError, Equipment, RecordId, ServiceRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Equipment not found: {0}")]
    EquipmentNotFound(RecordId),
    #[error("Service request not found: {0}")]
    ServiceRequestNotFound(RecordId),
    #[error("Equipment with id={0} does not exist")]
    InvalidEquipmentReference(RecordId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
}

// --- Infrastructure Interfaces (Traits) ---

/// Collection-level CRUD over equipment records.
///
/// "Not found" is never an error here: lookups return `None`, and
/// update/delete return `false` when the id is absent.
#[async_trait]
pub trait EquipmentRepository: Send + Sync {
    /// Returns every record in insertion order.
    async fn get_all(&self) -> Result<Vec<Equipment>, ApplicationError>;
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Equipment>, ApplicationError>;
    /// Assigns the next id and appends. Any id on the input is overwritten.
    async fn create(&self, equipment: Equipment) -> Result<Equipment, ApplicationError>;
    /// Replaces the record in place, forcing its id to `id`.
    async fn update(&self, id: RecordId, equipment: Equipment) -> Result<bool, ApplicationError>;
    async fn delete(&self, id: RecordId) -> Result<bool, ApplicationError>;
}

/// Collection-level CRUD over service requests. Same contract as [`EquipmentRepository`].
#[async_trait]
pub trait ServiceRequestRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<ServiceRequest>, ApplicationError>;
    async fn get_by_id(&self, id: RecordId) -> Result<Option<ServiceRequest>, ApplicationError>;
    async fn create(&self, request: ServiceRequest) -> Result<ServiceRequest, ApplicationError>;
    async fn update(
        &self,
        id: RecordId,
        request: ServiceRequest,
    ) -> Result<bool, ApplicationError>;
    async fn delete(&self, id: RecordId) -> Result<bool, ApplicationError>;
}

// --- Request/Response Models (Data Transfer Objects - DTOs) ---

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TcoRequest {
    pub initial_cost: f64,
    #[serde(default)]
    pub operating_cost: f64,
    #[serde(default)]
    pub maintenance_cost: f64,
    pub lifetime_years: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TcoResponse {
    pub total_tco: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RoiRequest {
    pub profit: f64,
    pub investment: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RoiResponse {
    pub roi_percent: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaybackRequest {
    pub investment: f64,
    pub annual_income: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaybackResponse {
    pub years: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityRequest {
    pub base_value: f64,
    /// Percent, e.g. 20 for ±20%.
    #[serde(default = "default_change_percentage")]
    pub change_percentage: f64,
}

fn default_change_percentage() -> f64 {
    20.0
}

pub type SensitivityResponse = Sensitivity;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCalculationResponse {
    #[serde(flatten)]
    pub calculation: ProjectCalculation,
    pub efficiency: finance::Efficiency,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Response for the /health endpoint.
#[derive(Serialize, Debug)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub storage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

// --- Application Services (Use Cases) ---

/// Service for managing equipment.
pub struct EquipmentService {
    repo: Arc<dyn EquipmentRepository>,
}

impl EquipmentService {
    pub fn new(repo: Arc<dyn EquipmentRepository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Equipment>, ApplicationError> {
        let items = self.repo.get_all().await?;
        debug!(count = items.len(), "Listed equipment");
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: RecordId) -> Result<Equipment, ApplicationError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            warn!(%id, "Equipment not found");
            ApplicationError::EquipmentNotFound(id)
        })
    }

    #[instrument(skip(self, equipment), fields(inventory_number = %equipment.inventory_number))]
    pub async fn create(&self, equipment: Equipment) -> Result<Equipment, ApplicationError> {
        let created = self.repo.create(equipment).await?;
        info!(id = %created.id, "Equipment created");
        Ok(created)
    }

    #[instrument(skip(self, equipment))]
    pub async fn update(&self, id: RecordId, equipment: Equipment) -> Result<(), ApplicationError> {
        if !self.repo.update(id, equipment).await? {
            warn!(%id, "Update failed: equipment not found");
            return Err(ApplicationError::EquipmentNotFound(id));
        }
        info!(%id, "Equipment updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        if !self.repo.delete(id).await? {
            warn!(%id, "Deletion failed: equipment not found");
            return Err(ApplicationError::EquipmentNotFound(id));
        }
        info!(%id, "Equipment deleted");
        Ok(())
    }
}

/// Service for managing service requests.
///
/// Every request must point at existing equipment. The check reads the
/// equipment collection and then writes the request collection as two
/// separate operations, so equipment deleted in between is not detected.
pub struct ServiceRequestService {
    requests: Arc<dyn ServiceRequestRepository>,
    equipment: Arc<dyn EquipmentRepository>,
}

impl ServiceRequestService {
    pub fn new(
        requests: Arc<dyn ServiceRequestRepository>,
        equipment: Arc<dyn EquipmentRepository>,
    ) -> Self {
        Self {
            requests,
            equipment,
        }
    }

    async fn ensure_equipment_exists(&self, equipment_id: RecordId) -> Result<(), ApplicationError> {
        if self.equipment.get_by_id(equipment_id).await?.is_none() {
            warn!(%equipment_id, "Service request references unknown equipment");
            return Err(ApplicationError::InvalidEquipmentReference(equipment_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ServiceRequest>, ApplicationError> {
        let items = self.requests.get_all().await?;
        debug!(count = items.len(), "Listed service requests");
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: RecordId) -> Result<ServiceRequest, ApplicationError> {
        self.requests.get_by_id(id).await?.ok_or_else(|| {
            warn!(%id, "Service request not found");
            ApplicationError::ServiceRequestNotFound(id)
        })
    }

    #[instrument(skip(self, request), fields(equipment_id = %request.equipment_id))]
    pub async fn create(
        &self,
        mut request: ServiceRequest,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.ensure_equipment_exists(request.equipment_id).await?;

        // The repository stamps it as well when absent; both are no-ops on a set value.
        request.stamp_created_at();

        let created = self.requests.create(request).await?;
        info!(id = %created.id, "Service request created");
        Ok(created)
    }

    #[instrument(skip(self, request), fields(equipment_id = %request.equipment_id))]
    pub async fn update(
        &self,
        id: RecordId,
        request: ServiceRequest,
    ) -> Result<(), ApplicationError> {
        self.ensure_equipment_exists(request.equipment_id).await?;

        if !self.requests.update(id, request).await? {
            warn!(%id, "Update failed: service request not found");
            return Err(ApplicationError::ServiceRequestNotFound(id));
        }
        info!(%id, "Service request updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        if !self.requests.delete(id).await? {
            warn!(%id, "Deletion failed: service request not found");
            return Err(ApplicationError::ServiceRequestNotFound(id));
        }
        info!(%id, "Service request deleted");
        Ok(())
    }
}

/// Stateless finance calculators.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinanceService;

impl FinanceService {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self))]
    pub fn calculate_tco(&self, request: &TcoRequest) -> Result<TcoResponse, ApplicationError> {
        let total_tco = finance::total_cost_of_ownership(
            request.initial_cost,
            request.operating_cost,
            request.maintenance_cost,
            request.lifetime_years,
        )?;
        Ok(TcoResponse { total_tco })
    }

    #[instrument(skip(self))]
    pub fn calculate_roi(&self, request: &RoiRequest) -> Result<RoiResponse, ApplicationError> {
        let roi_percent = finance::return_on_investment(request.profit, request.investment)?;
        Ok(RoiResponse { roi_percent })
    }

    #[instrument(skip(self))]
    pub fn calculate_payback(
        &self,
        request: &PaybackRequest,
    ) -> Result<PaybackResponse, ApplicationError> {
        let years = finance::payback_period(request.investment, request.annual_income)?;
        Ok(PaybackResponse { years })
    }

    #[instrument(skip(self))]
    pub fn analyze_sensitivity(
        &self,
        request: &SensitivityRequest,
    ) -> Result<SensitivityResponse, ApplicationError> {
        Ok(finance::sensitivity(
            request.base_value,
            request.change_percentage,
        )?)
    }

    #[instrument(skip(self, project))]
    pub fn calculate_project(
        &self,
        project: &RealEstateProject,
    ) -> Result<ProjectCalculationResponse, ApplicationError> {
        let calculation = project.calculate()?;
        let efficiency = calculation.efficiency();
        debug!(roi = calculation.roi, ?efficiency, "Project calculated");
        Ok(ProjectCalculationResponse {
            calculation,
            efficiency,
        })
    }
}

/// Checks that both collections can be opened and read.
pub struct HealthService {
    equipment: Arc<dyn EquipmentRepository>,
    requests: Arc<dyn ServiceRequestRepository>,
}

impl HealthService {
    pub fn new(
        equipment: Arc<dyn EquipmentRepository>,
        requests: Arc<dyn ServiceRequestRepository>,
    ) -> Self {
        Self {
            equipment,
            requests,
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self) -> HealthReport {
        // Reading bootstraps missing files and directories.
        let (equipment, requests) =
            tokio::join!(self.equipment.get_all(), self.requests.get_all());

        let error = match (equipment, requests) {
            (Ok(_), Ok(_)) => None,
            (Err(e), _) | (_, Err(e)) => {
                error!("Storage health check failed: {}", e);
                Some(e.to_string())
            }
        };

        HealthReport {
            status: if error.is_none() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            storage: "JSON",
            error,
            timestamp: Utc::now(),
        }
    }
}
