use super::common::{
    default_page, default_per_page, download_response, map_service_error, no_content_response,
    page_offset, success_response, validate_input,
};
use crate::{
    entities::rfq::RfqStatus,
    errors::ApiError,
    export::{self, CSV_MIME, XLSX_MIME},
    handlers::{AppState, CurrentUser},
    services::rfqs::{ItemQuote, RfqItemUpdate},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<RfqStatus>,
    pub supplier_id: Option<i32>,
    pub bom_id: Option<i32>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    pub bom_id: i32,
    /// Explicit manufacturer→supplier assignment; omit to use the
    /// auto-derived plan when it is unambiguous.
    #[serde(default)]
    pub assignments: Option<HashMap<i32, i32>>,
}

#[derive(Debug, Deserialize)]
pub struct RfqItemUpdateRequest {
    pub id: i32,
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    #[serde(default)]
    pub items: Vec<RfqItemUpdateRequest>,
    #[serde(default)]
    pub delete_ids: Vec<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuoteRequest {
    pub id: i32,
    pub uom: Option<String>,
    pub price: Option<Decimal>,
    pub eta: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordQuoteRequest {
    pub items: Vec<ItemQuoteRequest>,
}

async fn list_rfqs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rfqs = state
        .services
        .rfqs
        .list_rfqs(
            query.status,
            query.supplier_id,
            query.bom_id,
            query.per_page,
            page_offset(query.page, query.per_page),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rfqs))
}

/// Planning step: either an auto-derived manufacturer→supplier assignment,
/// or the option lists the caller must disambiguate.
async fn plan_generation(
    State(state): State<Arc<AppState>>,
    Path(bom_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = state
        .services
        .rfqs
        .plan_generation(bom_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(plan))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let assignments = match payload.assignments {
        Some(assignments) => assignments,
        None => {
            // No explicit selection: only an unambiguous plan can proceed.
            match state
                .services
                .rfqs
                .plan_generation(payload.bom_id)
                .await
                .map_err(map_service_error)?
            {
                crate::services::rfqs::GenerationPlan::Auto { assignments } => assignments,
                plan @ crate::services::rfqs::GenerationPlan::SelectionRequired { .. } => {
                    return Ok(success_response(plan));
                }
            }
        }
    };

    let rfq_ids = state
        .services
        .rfqs
        .generate(payload.bom_id, assignments, &user.0)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "rfq_ids": rfq_ids,
        "message": "RFQs generated successfully"
    })))
}

async fn get_rfq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .rfqs
        .get_details(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(details))
}

async fn delete_rfq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .rfqs
        .delete_rfq(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn update_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<BulkUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updates = payload
        .items
        .into_iter()
        .map(|item| RfqItemUpdate {
            id: item.id,
            quantity: item.quantity,
            notes: item.notes,
        })
        .collect();
    state
        .services
        .rfqs
        .update_items(id, updates, payload.delete_ids)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({
        "message": "RFQ items updated successfully"
    })))
}

async fn send_rfq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let rfq = state
        .services
        .rfqs
        .send(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rfq))
}

async fn record_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<RecordQuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quotes = payload
        .items
        .into_iter()
        .map(|item| ItemQuote {
            id: item.id,
            uom: item.uom,
            price: item.price,
            eta: item.eta,
        })
        .collect();
    let rfq = state
        .services
        .rfqs
        .record_quote(id, quotes)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rfq))
}

async fn cancel_rfq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let rfq = state
        .services
        .rfqs
        .cancel(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rfq))
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let (number, rows) = state
        .services
        .rfqs
        .export_rows(id)
        .await
        .map_err(map_service_error)?;
    let csv = export::rfq_items_csv(&rows)
        .map_err(|e| ApiError::ServiceError(e.into()))?;
    Ok(download_response(
        &format!("{}.csv", number),
        CSV_MIME,
        csv.into_bytes(),
    ))
}

async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let (number, rows) = state
        .services
        .rfqs
        .export_rows(id)
        .await
        .map_err(map_service_error)?;
    let bytes = export::rfq_items_workbook(&number, &rows)
        .map_err(|e| ApiError::ServiceError(e.into()))?;
    Ok(download_response(
        &format!("{}.xlsx", number),
        XLSX_MIME,
        bytes,
    ))
}

pub fn rfq_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_rfqs))
        .route("/generate", post(generate))
        .route("/plan/:bom_id", get(plan_generation))
        .route("/:id", get(get_rfq))
        .route("/:id", delete(delete_rfq))
        .route("/:id/items", put(update_items))
        .route("/:id/send", post(send_rfq))
        .route("/:id/quote", post(record_quote))
        .route("/:id/cancel", post(cancel_rfq))
        .route("/:id/export/csv", get(export_csv))
        .route("/:id/export/xlsx", get(export_xlsx))
}
