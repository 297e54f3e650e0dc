use super::common::{
    created_response, default_page, default_per_page, map_service_error, no_content_response,
    page_offset, success_response, validate_input,
};
use crate::{
    entities::part::UnitType, errors::ApiError, handlers::AppState, services::parts::PartInput,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct PartRequest {
    #[validate(length(min = 1))]
    pub part_number: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub manufacturer_id: i32,
    #[serde(default = "default_unit")]
    pub unit: UnitType,
    #[serde(default)]
    pub labour: Decimal,
}

fn default_unit() -> UnitType {
    UnitType::E
}

impl From<PartRequest> for PartInput {
    fn from(req: PartRequest) -> Self {
        PartInput {
            part_number: req.part_number,
            description: req.description,
            manufacturer_id: req.manufacturer_id,
            unit: req.unit,
            labour: req.labour,
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

async fn create_part(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let part = state
        .services
        .parts
        .create_part(payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(created_response(part))
}

async fn get_part(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let part = state
        .services
        .parts
        .get_part(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Part {} not found", id)))?;
    Ok(success_response(part))
}

async fn list_parts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let parts = state
        .services
        .parts
        .list_parts(
            query.search,
            query.per_page,
            page_offset(query.page, query.per_page),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(parts))
}

async fn update_part(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<PartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let part = state
        .services
        .parts
        .update_part(id, payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(part))
}

async fn delete_part(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .parts
        .delete_part(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

pub fn part_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_part))
        .route("/", get(list_parts))
        .route("/:id", get(get_part))
        .route("/:id", put(update_part))
        .route("/:id", delete(delete_part))
}
