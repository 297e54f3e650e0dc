use super::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
    PaginationParams,
};
use crate::{errors::ApiError, handlers::AppState};
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
pub struct ManufacturerRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
}

async fn create_manufacturer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ManufacturerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let manufacturer = state
        .services
        .manufacturers
        .create_manufacturer(payload.name)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(manufacturer))
}

async fn get_manufacturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let manufacturer = state
        .services
        .manufacturers
        .get_manufacturer(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Manufacturer {} not found", id)))?;
    Ok(success_response(manufacturer))
}

async fn list_manufacturers(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let manufacturers = state
        .services
        .manufacturers
        .list_manufacturers(pagination.per_page, pagination.offset())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(manufacturers))
}

async fn update_manufacturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<ManufacturerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let manufacturer = state
        .services
        .manufacturers
        .update_manufacturer(id, payload.name)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(manufacturer))
}

async fn delete_manufacturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .manufacturers
        .delete_manufacturer(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

pub fn manufacturer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_manufacturer))
        .route("/", get(list_manufacturers))
        .route("/:id", get(get_manufacturer))
        .route("/:id", put(update_manufacturer))
        .route("/:id", delete(delete_manufacturer))
}
