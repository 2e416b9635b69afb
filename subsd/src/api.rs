//! HTTP API for the subscriptions daemon.
//!
//! Provides REST endpoints under `/subscriptions/v1` for:
//! - Create, read (by id or by natural key), update and delete
//! - Filtered, sorted and paginated listing
//! - Total cost over a month window
//!
//! plus `/health`. Dates travel as `MM-YYYY` strings.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use subs_domain::{Month, NewSubscription, Subscription, SubscriptionFilter, SubscriptionId};
use subs_store::{ErrorKind, SubscriptionRepository};

use crate::config::ApiConfig;
use crate::error::{DaemonError, DaemonResult};

const MESSAGE_SUCCESS: &str = "success";

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: SubscriptionRepository + 'static> {
    pub store: Arc<S>,
    /// Page size used when `limit` is absent
    pub default_page_limit: i64,
    /// Upper bound applied to `limit`
    pub max_page_limit: i64,
}

impl<S: SubscriptionRepository + 'static> ApiState<S> {
    /// Build state from the API configuration.
    pub fn new(store: Arc<S>, config: &ApiConfig) -> Self {
        Self {
            store,
            default_page_limit: config.default_page_limit,
            max_page_limit: config.max_page_limit,
        }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of create and update requests.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    /// `MM-YYYY`
    pub start_date: String,
    /// `MM-YYYY`
    #[serde(default)]
    pub end_date: Option<String>,
}

impl SubscriptionRequest {
    fn into_new_subscription(self) -> DaemonResult<NewSubscription> {
        let start_date = Month::parse(&self.start_date)?;
        let end_date = self.end_date.as_deref().map(Month::parse).transpose()?;

        Ok(NewSubscription::new(self.service_name, self.price, self.user_id, start_date, end_date)?)
    }
}

/// Subscription as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionView {
    pub id: SubscriptionId,
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: Month,
    pub end_date: Option<Month>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            service_name: sub.service,
            price: sub.cost,
            user_id: sub.user_id,
            start_date: sub.start_date,
            end_date: sub.end_date,
        }
    }
}

/// Response carrying the id a write touched.
#[derive(Debug, Serialize, Deserialize)]
pub struct BasicResponse {
    pub message: String,
    pub id: SubscriptionId,
}

/// Response carrying one subscription.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub message: String,
    pub subscription: SubscriptionView,
}

/// Pagination metadata of a listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
    pub sum_cost: i64,
}

/// Listing response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub message: String,
    pub subscriptions: Vec<SubscriptionView>,
    pub meta: Metadata,
}

/// Total cost response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CostResponse {
    pub message: String,
    pub sum_cost: i64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query string shared by lookup, listing and total cost.
///
/// Everything arrives as text so malformed values produce a JSON error body.
#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    pub service: Option<String>,
    #[serde(rename = "userID")]
    pub user_id: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub price: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: SubscriptionRepository + 'static,
{
    let subscriptions = Router::new()
        .route("/create", post(create_handler))
        .route("/get/query", get(get_by_params_handler))
        .route("/get/:id", get(get_by_id_handler))
        .route("/update/:id", patch(update_handler))
        .route("/delete/:id", delete(delete_handler))
        .route("/list", get(list_handler))
        .route("/total", get(total_cost_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/subscriptions/v1", subscriptions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a subscription.
async fn create_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    body: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BasicResponse>), ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let new = parse_body(body).map_err(to_error_response)?;

    let id = state.store.create(&new).await.map_err(|e| to_error_response(e.into()))?;

    Ok((
        StatusCode::CREATED,
        Json(BasicResponse {
            message: MESSAGE_SUCCESS.to_string(),
            id,
        }),
    ))
}

/// Get a subscription by id.
async fn get_by_id_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionResponse>, ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let id = parse_id(&id).map_err(to_error_response)?;

    let subscription = state.store.read_by_id(id).await.map_err(|e| to_error_response(e.into()))?;

    Ok(Json(SubscriptionResponse {
        message: MESSAGE_SUCCESS.to_string(),
        subscription: subscription.into(),
    }))
}

/// Get a subscription by `service`, `userID` and `startDate`.
async fn get_by_params_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<SubscriptionResponse>, ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let filter = filter_from_query(&query).map_err(to_error_response)?;

    if filter.natural_key().is_none() {
        return Err(to_error_response(DaemonError::BadRequest(format!(
            "missing query parameters: {}",
            filter.missing_key_fields().join(", ")
        ))));
    }

    let subscription = state
        .store
        .read_by_params(&filter)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    Ok(Json(SubscriptionResponse {
        message: MESSAGE_SUCCESS.to_string(),
        subscription: subscription.into(),
    }))
}

/// Replace a subscription.
async fn update_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> Result<Json<BasicResponse>, ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let id = parse_id(&id).map_err(to_error_response)?;
    let updated = parse_body(body).map_err(to_error_response)?;

    state.store.update(id, &updated).await.map_err(|e| to_error_response(e.into()))?;

    Ok(Json(BasicResponse {
        message: MESSAGE_SUCCESS.to_string(),
        id,
    }))
}

/// Delete a subscription.
async fn delete_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<BasicResponse>, ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let id = parse_id(&id).map_err(to_error_response)?;

    state.store.delete_by_id(id).await.map_err(|e| to_error_response(e.into()))?;

    Ok(Json(BasicResponse {
        message: MESSAGE_SUCCESS.to_string(),
        id,
    }))
}

/// List subscriptions with filtering, ordering and pagination.
async fn list_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<ListResponse>, ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let filter = filter_from_query(&query).map_err(to_error_response)?;
    let (page, limit) = page_and_limit(&query, &state).map_err(to_error_response)?;
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| DaemonError::BadRequest(format!("page out of range: {}", page)))
        .map_err(to_error_response)?;
    let filter = filter.limit(limit).offset(offset);

    let result = state.store.list(&filter).await.map_err(|e| to_error_response(e.into()))?;

    let meta = Metadata {
        total: result.total,
        page,
        limit,
        pages: count_pages(result.total, limit),
        sum_cost: result.sum_cost,
    };
    debug!(?meta, "listing assembled");

    Ok(Json(ListResponse {
        message: MESSAGE_SUCCESS.to_string(),
        subscriptions: result.subscriptions.into_iter().map(SubscriptionView::from).collect(),
        meta,
    }))
}

/// Total cost over `[startDate, endDate]`.
async fn total_cost_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<CostResponse>, ApiError>
where
    S: SubscriptionRepository + 'static,
{
    let filter = filter_from_query(&query).map_err(to_error_response)?;

    if filter.start_date.is_none() || filter.end_date.is_none() {
        return Err(to_error_response(DaemonError::BadRequest(
            "startDate and endDate are required (MM-YYYY)".to_string(),
        )));
    }

    let sum_cost = state
        .store
        .get_total_cost(&filter)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    info!(sum_cost, "total cost served");

    Ok(Json(CostResponse {
        message: MESSAGE_SUCCESS.to_string(),
        sum_cost,
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> ApiError {
    let status = match &error {
        DaemonError::Store(e) => match e.kind() {
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::WrongParams => StatusCode::BAD_REQUEST,
            ErrorKind::Store if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        },
        DaemonError::Domain(_) | DaemonError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DaemonError::Config(_) | DaemonError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn parse_body(body: Result<Json<SubscriptionRequest>, JsonRejection>) -> DaemonResult<NewSubscription> {
    let Json(request) = body.map_err(|e| DaemonError::BadRequest(e.body_text()))?;
    request.into_new_subscription()
}

fn parse_id(raw: &str) -> DaemonResult<SubscriptionId> {
    raw.parse::<SubscriptionId>()
        .map_err(|_| DaemonError::BadRequest(format!("invalid subscription id: {}", raw)))
}

/// Build a filter from the query string; empty values count as absent.
fn filter_from_query(query: &SubscriptionQuery) -> DaemonResult<SubscriptionFilter> {
    let mut filter = SubscriptionFilter::new();

    if let Some(service) = non_empty(&query.service) {
        filter = filter.service(service);
    }
    if let Some(raw) = non_empty(&query.user_id) {
        let user_id = Uuid::parse_str(raw)
            .map_err(|_| DaemonError::BadRequest(format!("invalid userID: {}", raw)))?;
        filter = filter.user(user_id);
    }
    if let Some(raw) = non_empty(&query.start_date) {
        filter = filter.start_date(Month::parse(raw)?);
    }
    if let Some(raw) = non_empty(&query.end_date) {
        filter = filter.end_date(Month::parse(raw)?);
    }
    if let Some(raw) = non_empty(&query.price) {
        let cost = raw
            .parse::<i32>()
            .map_err(|_| DaemonError::BadRequest(format!("invalid price: {}", raw)))?;
        filter = filter.cost(cost);
    }
    if let Some(sort) = non_empty(&query.sort) {
        filter = filter.sort(sort);
    }

    Ok(filter)
}

/// Resolve `(page, limit)`: page is at least 1, limit falls back to the
/// configured default and is capped at the configured maximum.
fn page_and_limit<S>(query: &SubscriptionQuery, state: &ApiState<S>) -> DaemonResult<(i64, i64)>
where
    S: SubscriptionRepository + 'static,
{
    let parse = |name: &str, raw: &Option<String>| -> DaemonResult<Option<i64>> {
        non_empty(raw)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| DaemonError::BadRequest(format!("invalid {}: {}", name, v)))
            })
            .transpose()
    };

    let page = parse("page", &query.page)?.unwrap_or(1).max(1);
    let limit = match parse("limit", &query.limit)? {
        Some(limit) if limit > 0 => limit.min(state.max_page_limit),
        _ => state.default_page_limit,
    };

    Ok((page, limit))
}

fn count_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Tests
// =============================================================================
