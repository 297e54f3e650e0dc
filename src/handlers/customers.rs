use super::common::{
    created_response, default_page, default_per_page, map_service_error, no_content_response,
    page_offset, success_response, validate_input,
};
use crate::{
    errors::ApiError, handlers::AppState, services::customers::CustomerInput,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub customer_code: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
}

impl From<CustomerRequest> for CustomerInput {
    fn from(req: CustomerRequest) -> Self {
        CustomerInput {
            name: req.name,
            customer_code: req.customer_code,
            address: req.address,
            city: req.city,
            province: req.province,
            contact_name: req.contact_name,
            contact_phone: req.contact_phone,
            contact_email: req.contact_email,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let customer = state
        .services
        .customers
        .create_customer(payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(created_response(customer))
}

async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = state
        .services
        .customers
        .get_customer(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Customer {} not found", id)))?;
    Ok(success_response(customer))
}

async fn list_customers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let customers = state
        .services
        .customers
        .list_customers(
            query.search,
            query.per_page,
            page_offset(query.page, query.per_page),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(customers))
}

async fn update_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<CustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let customer = state
        .services
        .customers
        .update_customer(id, payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(customer))
}

async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .customers
        .delete_customer(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

pub fn customer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_customer))
        .route("/", get(list_customers))
        .route("/:id", get(get_customer))
        .route("/:id", put(update_customer))
        .route("/:id", delete(delete_customer))
}
