// ./api/src/main.rs
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json as JsonResponse, Response}, // Use JsonResponse for clarity
    routing::{get, post},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use application::{
    ApplicationError, // Base error type
    EquipmentRepository,
    // Services
    EquipmentService,
    FinanceService,
    HealthService,
    // DTOs / Requests
    PaybackRequest,
    RoiRequest,
    SensitivityRequest,
    ServiceRequestRepository,
    ServiceRequestService,
    TcoRequest,
};
use config::AppConfig;
use domain::finance::RealEstateProject;
use domain::{Equipment, RecordId, ServiceRequest};
use infrastructure::{JsonEquipmentRepository, JsonServiceRequestRepository, LockRegistry};

/// Application state shared by all handlers.
#[derive(Clone)]
struct AppState {
    equipment_service: Arc<EquipmentService>,
    service_request_service: Arc<ServiceRequestService>,
    finance_service: FinanceService,
    health_service: Arc<HealthService>,
}

impl AppState {
    fn new(
        equipment_repository: Arc<dyn EquipmentRepository>,
        request_repository: Arc<dyn ServiceRequestRepository>,
    ) -> Self {
        Self {
            equipment_service: Arc::new(EquipmentService::new(equipment_repository.clone())),
            service_request_service: Arc::new(ServiceRequestService::new(
                request_repository.clone(),
                equipment_repository.clone(),
            )),
            finance_service: FinanceService::new(),
            health_service: Arc::new(HealthService::new(
                equipment_repository,
                request_repository,
            )),
        }
    }
}

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // --- Dependency Injection ---
    // 1. Create infrastructure components (one lock registry for the whole process)
    let registry = LockRegistry::new();
    let equipment_repository =
        match JsonEquipmentRepository::open(&config.equipment_file, &registry) {
            Ok(repo) => Arc::new(repo),
            Err(e) => {
                error!("Failed to open equipment storage: {}", e);
                std::process::exit(1);
            }
        };
    let request_repository =
        match JsonServiceRequestRepository::open(&config.service_requests_file, &registry) {
            Ok(repo) => Arc::new(repo),
            Err(e) => {
                error!("Failed to open service request storage: {}", e);
                std::process::exit(1);
            }
        };
    info!(
        equipment_file = %equipment_repository.path().display(),
        service_requests_file = %request_repository.path().display(),
        "JSON storage configured."
    );

    // 2. Create application services and state
    let app_state = AppState::new(equipment_repository, request_repository);
    info!("Application state created.");

    let app = router(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

// --- API Router Definition ---
fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Equipment
        .route(
            "/api/equipment",
            get(list_equipment_handler).post(create_equipment_handler),
        )
        .route(
            "/api/equipment/:id",
            get(get_equipment_handler)
                .put(update_equipment_handler)
                .delete(delete_equipment_handler),
        )
        // Service requests
        .route(
            "/api/servicerequests",
            get(list_service_requests_handler).post(create_service_request_handler),
        )
        .route(
            "/api/servicerequests/:id",
            get(get_service_request_handler)
                .put(update_service_request_handler)
                .delete(delete_service_request_handler),
        )
        // Finance calculators
        .route("/api/finance/tco/calc", post(tco_handler))
        .route("/api/finance/roi/calc", post(roi_handler))
        .route("/api/finance/payback/calc", post(payback_handler))
        .route("/api/finance/sensitivity/calc", post(sensitivity_handler))
        .route("/api/finance/real-estate/calc", post(real_estate_handler))
        // Provide the application state to the handlers
        .with_state(app_state)
}

// --- API Handlers ---

async fn health_check(State(state): State<AppState>) -> Response {
    info!("Health check endpoint called");
    let report = state.health_service.check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, JsonResponse(report)).into_response()
}

/// 201 with a Location header pointing at the new record.
fn created_response<T: Serialize>(collection: &str, id: RecordId, body: T) -> Response {
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/{}/{}", collection, id))],
        JsonResponse(body),
    )
        .into_response()
}

// --- Equipment Handlers ---

/// Handler for listing equipment (GET /api/equipment).
async fn list_equipment_handler(State(state): State<AppState>) -> Response {
    info!("Received request to list equipment");
    match state.equipment_service.list().await {
        Ok(items) => (StatusCode::OK, JsonResponse(items)).into_response(),
        Err(e) => {
            error!("Failed to list equipment via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for fetching one piece of equipment (GET /api/equipment/:id).
async fn get_equipment_handler(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    info!(id, "Received request to get equipment");
    match state.equipment_service.get(RecordId::new(id)).await {
        Ok(equipment) => (StatusCode::OK, JsonResponse(equipment)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

/// Handler for creating equipment (POST /api/equipment).
async fn create_equipment_handler(
    State(state): State<AppState>,
    Json(payload): Json<Equipment>,
) -> Response {
    info!(inventory_number = %payload.inventory_number, "Received request to create equipment");
    match state.equipment_service.create(payload).await {
        Ok(created) => created_response("equipment", created.id, created),
        Err(e) => {
            error!("Failed to create equipment via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for replacing equipment (PUT /api/equipment/:id).
async fn update_equipment_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<Equipment>,
) -> Response {
    info!(id, "Received request to update equipment");
    match state.equipment_service.update(RecordId::new(id), payload).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

/// Handler for deleting equipment (DELETE /api/equipment/:id).
async fn delete_equipment_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Response {
    info!(id, "Received request to delete equipment");
    match state.equipment_service.delete(RecordId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

// --- Service Request Handlers ---

async fn list_service_requests_handler(State(state): State<AppState>) -> Response {
    info!("Received request to list service requests");
    match state.service_request_service.list().await {
        Ok(items) => (StatusCode::OK, JsonResponse(items)).into_response(),
        Err(e) => {
            error!("Failed to list service requests via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn get_service_request_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Response {
    info!(id, "Received request to get service request");
    match state.service_request_service.get(RecordId::new(id)).await {
        Ok(request) => (StatusCode::OK, JsonResponse(request)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

/// Handler for creating a service request (POST /api/servicerequests).
/// The referenced equipment must exist.
async fn create_service_request_handler(
    State(state): State<AppState>,
    Json(payload): Json<ServiceRequest>,
) -> Response {
    info!(equipment_id = %payload.equipment_id, "Received request to create service request");
    match state.service_request_service.create(payload).await {
        Ok(created) => created_response("servicerequests", created.id, created),
        Err(e) => {
            warn!("Failed to create service request via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn update_service_request_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ServiceRequest>,
) -> Response {
    info!(id, "Received request to update service request");
    match state
        .service_request_service
        .update(RecordId::new(id), payload)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn delete_service_request_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Response {
    info!(id, "Received request to delete service request");
    match state.service_request_service.delete(RecordId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

// --- Finance Handlers ---

fn calculation_response<T: Serialize>(result: Result<T, ApplicationError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, JsonResponse(body)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn tco_handler(State(state): State<AppState>, Json(request): Json<TcoRequest>) -> Response {
    calculation_response(state.finance_service.calculate_tco(&request))
}

async fn roi_handler(State(state): State<AppState>, Json(request): Json<RoiRequest>) -> Response {
    calculation_response(state.finance_service.calculate_roi(&request))
}

async fn payback_handler(
    State(state): State<AppState>,
    Json(request): Json<PaybackRequest>,
) -> Response {
    calculation_response(state.finance_service.calculate_payback(&request))
}

async fn sensitivity_handler(
    State(state): State<AppState>,
    Json(request): Json<SensitivityRequest>,
) -> Response {
    calculation_response(state.finance_service.analyze_sensitivity(&request))
}

async fn real_estate_handler(
    State(state): State<AppState>,
    Json(project): Json<RealEstateProject>,
) -> Response {
    calculation_response(state.finance_service.calculate_project(&project))
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Maps ApplicationError to an HTTP status code and a JSON error body.
fn map_application_error_to_response(err: ApplicationError) -> Response {
    let (status, error, message) = match err {
        ApplicationError::EquipmentNotFound(id) => (
            StatusCode::NOT_FOUND,
            "Not found",
            format!("Equipment with id={} not found.", id),
        ),
        ApplicationError::ServiceRequestNotFound(id) => (
            StatusCode::NOT_FOUND,
            "Not found",
            format!("Service request with id={} not found.", id),
        ),
        ApplicationError::InvalidEquipmentReference(id) => (
            StatusCode::BAD_REQUEST,
            "Invalid equipmentId",
            format!("Equipment with id={} not found.", id),
        ),
        ApplicationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "Invalid input", msg),
        ApplicationError::DomainError(domain_err) => {
            warn!("Domain validation failed: {}", domain_err);
            (
                StatusCode::BAD_REQUEST,
                "Validation failed",
                domain_err.to_string(),
            )
        }
        ApplicationError::InfrastructureError(msg) => {
            error!("Underlying infrastructure error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                "An internal server error occurred".to_string(),
            )
        }
    };
    (status, JsonResponse(ErrorBody { error, message })).into_response()
}
