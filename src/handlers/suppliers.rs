use super::common::{
    created_response, default_page, default_per_page, map_service_error, no_content_response,
    page_offset, success_response, validate_input,
};
use crate::{
    errors::ApiError, handlers::AppState, services::suppliers::SupplierInput,
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
pub struct SupplierRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub supplier_code: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
}

impl From<SupplierRequest> for SupplierInput {
    fn from(req: SupplierRequest) -> Self {
        SupplierInput {
            name: req.name,
            supplier_code: req.supplier_code,
            contact_name: req.contact_name,
            contact_phone: req.contact_phone,
            contact_email: req.contact_email,
            address: req.address,
            city: req.city,
            province: req.province,
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

async fn create_supplier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SupplierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .create_supplier(payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(created_response(supplier))
}

async fn get_supplier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = state
        .services
        .suppliers
        .get_supplier(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Supplier {} not found", id)))?;
    Ok(success_response(supplier))
}

async fn list_suppliers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let suppliers = state
        .services
        .suppliers
        .list_suppliers(
            query.search,
            query.per_page,
            page_offset(query.page, query.per_page),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(suppliers))
}

async fn update_supplier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<SupplierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .update_supplier(id, payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(supplier))
}

async fn delete_supplier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .suppliers
        .delete_supplier(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn link_manufacturer(
    State(state): State<Arc<AppState>>,
    Path((id, manufacturer_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let link = state
        .services
        .suppliers
        .link_manufacturer(id, manufacturer_id)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(link))
}

async fn unlink_manufacturer(
    State(state): State<Arc<AppState>>,
    Path((id, manufacturer_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .suppliers
        .unlink_manufacturer(id, manufacturer_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn list_linked_manufacturers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let manufacturers = state
        .services
        .suppliers
        .list_linked_manufacturers(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(manufacturers))
}

pub fn supplier_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_supplier))
        .route("/", get(list_suppliers))
        .route("/:id", get(get_supplier))
        .route("/:id", put(update_supplier))
        .route("/:id", delete(delete_supplier))
        .route("/:id/manufacturers", get(list_linked_manufacturers))
        .route("/:id/manufacturers/:manufacturer_id", post(link_manufacturer))
        .route(
            "/:id/manufacturers/:manufacturer_id",
            delete(unlink_manufacturer),
        )
}
