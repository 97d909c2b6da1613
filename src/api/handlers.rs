//! API request handlers
//!
//! Every endpoint answers with an [`ApiResponse`] envelope. Formula errors raised while
//! running test cases are not request errors: they come back inside the test case as
//! `status: "error"`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::core::comparator;
use crate::core::formula::Value;
use crate::core::{BatchResult, Comparison, FormulaCheck, FormulaStats, TestRunner};
use crate::error::{HarnessError, StorageError};
use crate::types::{
    present_value, Formula, FormulaId, InputData, TestCase, TestCaseFilter, TestCaseId,
    TestCaseUpdate,
};

use super::server::AppState;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn status_for(error: &HarnessError) -> StatusCode {
    match error {
        HarnessError::Storage(StorageError::FormulaNotFound(_))
        | HarnessError::Storage(StorageError::TestCaseNotFound(_)) => StatusCode::NOT_FOUND,
        HarnessError::Formula(_) | HarnessError::Validation(_) => StatusCode::BAD_REQUEST,
        HarnessError::Storage(_) | HarnessError::TestsFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn respond<T: Serialize>(result: Result<T, HarnessError>) -> ApiResult<T> {
    match result {
        Ok(data) => Ok(Json(ApiResponse::ok(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "request failed");
            }
            Err((status, Json(ApiResponse::err(e.to_string()))))
        }
    }
}

fn runner(state: &AppState) -> TestRunner<'_, dyn crate::storage::Store> {
    TestRunner::new(state.store.as_ref(), state.config)
}

/// Root endpoint response
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(method: &str, path: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Pricing Forge API Server".to_string(),
        version: state.version.clone(),
        description: "Sandboxed pricing formulas with a persistent test harness".to_string(),
        endpoints: vec![
            endpoint("GET", "/health", "Health check endpoint"),
            endpoint("GET", "/version", "Get server version"),
            endpoint("GET", "/api/v1/formulas", "List formulas"),
            endpoint("GET", "/api/v1/formulas/:id/test-cases", "List a formula's test cases"),
            endpoint("POST", "/api/v1/formulas/:id/test-cases", "Add a test case"),
            endpoint("GET", "/api/v1/formulas/:id/stats", "Pass rate and coverage"),
            endpoint("POST", "/api/v1/formulas/:id/run", "Run all test cases of a formula"),
            endpoint("GET", "/api/v1/test-cases/:id", "Get a test case"),
            endpoint("PATCH", "/api/v1/test-cases/:id", "Edit a test case"),
            endpoint("DELETE", "/api/v1/test-cases/:id", "Delete a test case"),
            endpoint("POST", "/api/v1/test-cases/:id/run", "Run one test case"),
            endpoint("POST", "/api/v1/compare", "Compare an expected and an actual value"),
            endpoint("POST", "/api/v1/check", "Validate a formula source"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: ["formulas", "test-cases", "run", "stats", "compare", "check"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMULAS
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /api/v1/formulas
pub async fn list_formulas(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Formula>> {
    respond(state.store.list_formulas().map_err(HarnessError::from))
}

/// GET /api/v1/formulas/:id/test-cases?status=&sort_by=&sort_order=
pub async fn list_test_cases(
    State(state): State<Arc<AppState>>,
    Path(id): Path<FormulaId>,
    Query(filter): Query<TestCaseFilter>,
) -> ApiResult<Vec<TestCase>> {
    respond(
        state
            .store
            .list_test_cases(id, &filter)
            .map_err(HarnessError::from),
    )
}

/// New test case request
#[derive(Debug, Deserialize)]
pub struct AddTestCaseRequest {
    pub name: String,
    #[serde(default)]
    pub input_data: InputData,
    /// Omit for "no expectation"; `null` expects a null result
    #[serde(default, deserialize_with = "present_value")]
    pub expected_result: Option<JsonValue>,
}

/// POST /api/v1/formulas/:id/test-cases
pub async fn add_test_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<FormulaId>,
    Json(req): Json<AddTestCaseRequest>,
) -> ApiResult<TestCase> {
    respond(runner(&state).add_test_case(id, &req.name, req.input_data, req.expected_result))
}

/// GET /api/v1/formulas/:id/stats
pub async fn formula_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<FormulaId>,
) -> ApiResult<FormulaStats> {
    respond(runner(&state).stats(id))
}

/// POST /api/v1/formulas/:id/run
pub async fn run_formula(
    State(state): State<Arc<AppState>>,
    Path(id): Path<FormulaId>,
) -> ApiResult<BatchResult> {
    respond(runner(&state).run_all(id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEST CASES
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /api/v1/test-cases/:id
pub async fn get_test_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TestCaseId>,
) -> ApiResult<TestCase> {
    respond(state.store.load_test_case(id).map_err(HarnessError::from))
}

/// PATCH /api/v1/test-cases/:id
pub async fn update_test_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TestCaseId>,
    Json(update): Json<TestCaseUpdate>,
) -> ApiResult<TestCase> {
    respond(runner(&state).update_test_case(id, update))
}

/// Deleted test case response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: TestCaseId,
}

/// DELETE /api/v1/test-cases/:id
pub async fn delete_test_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TestCaseId>,
) -> ApiResult<DeleteResponse> {
    respond(
        runner(&state)
            .delete_test_case(id)
            .map(|()| DeleteResponse { deleted: id }),
    )
}

/// POST /api/v1/test-cases/:id/run
pub async fn run_test_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TestCaseId>,
) -> ApiResult<TestCase> {
    respond(runner(&state).run_test(id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATELESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compare request
#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    /// Omit for "no expectation"
    #[serde(default, deserialize_with = "present_value")]
    pub expected: Option<JsonValue>,
    pub actual: JsonValue,
    /// Defaults to the server's configured tolerance
    #[serde(default)]
    pub epsilon: Option<f64>,
}

/// POST /api/v1/compare
pub async fn compare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompareRequest>,
) -> ApiResult<Comparison> {
    let result = Value::from_json("actual", &req.actual)
        .map(|actual| {
            let epsilon = req.epsilon.unwrap_or(state.config.epsilon);
            comparator::compare(req.expected.as_ref(), &actual, epsilon)
        })
        .map_err(|e| HarnessError::Validation(e.to_string()));
    respond(result)
}

/// Check request
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub source: String,
}

/// POST /api/v1/check
pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> ApiResult<FormulaCheck> {
    Ok(Json(ApiResponse::ok(runner(&state).check_formula(&req.source))))
}
