use super::common::{
    created_response, default_page, default_per_page, download_response, map_service_error,
    no_content_response, page_offset, success_response, validate_input,
};
use crate::{
    entities::bom::BomStatus,
    errors::ApiError,
    export::{self, CSV_MIME, XLSX_MIME},
    handlers::{AppState, CurrentUser},
    services::boms::{CreateBom, UpdateBomHeader},
};
use axum::{
    extract::{Json, Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBomRequest {
    pub customer_id: i32,
    pub job_id: Option<i32>,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBomRequest {
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub job_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BomItemRequest {
    pub part_id: i32,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<BomStatus>,
    pub customer_id: Option<i32>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

/// Column designations for CSV/XLSX imports, 0-based.
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub part_column: usize,
    #[serde(default = "default_quantity_column")]
    pub quantity_column: usize,
}

fn default_quantity_column() -> usize {
    1
}

async fn create_bom(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<CreateBomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let bom = state
        .services
        .boms
        .create_bom(
            CreateBom {
                customer_id: payload.customer_id,
                job_id: payload.job_id,
                description: payload.description,
                notes: payload.notes,
            },
            &user.0,
        )
        .await
        .map_err(map_service_error)?;
    Ok(created_response(bom))
}

async fn list_boms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let boms = state
        .services
        .boms
        .list_boms(
            query.status,
            query.customer_id,
            query.per_page,
            page_offset(query.page, query.per_page),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(boms))
}

async fn get_bom(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .boms
        .get_details(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(details))
}

async fn update_bom(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateBomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let bom = state
        .services
        .boms
        .update_header(
            id,
            UpdateBomHeader {
                description: payload.description,
                notes: payload.notes,
                job_id: payload.job_id,
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(bom))
}

async fn delete_bom(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .boms
        .delete_bom(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .services
        .boms
        .list_items(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(items))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<BomItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .boms
        .add_item(id, payload.part_id, payload.quantity, payload.notes)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(item))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<i32>,
    Json(payload): Json<BomItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .boms
        .update_item(item_id, payload.part_id, payload.quantity, payload.notes)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .boms
        .delete_item(item_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn list_draft_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let drafts = state
        .services
        .boms
        .list_draft_items(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(drafts))
}

async fn confirm_draft_item(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .boms
        .confirm_draft_item(draft_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({
        "message": "Part added to BOM successfully"
    })))
}

async fn reject_draft_item(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .boms
        .reject_draft_item(draft_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// One uploaded file per request: CSV and XLSX take the column
/// designations from the query string, image/PDF goes through OCR.
async fn import_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Query(query): Query<ImportQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_name = None;
    let mut data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(str::to_string);
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let data = data.filter(|d| !d.is_empty()).ok_or_else(|| {
        ApiError::BadRequest("Please select a valid file".into())
    })?;
    let file_name = file_name.unwrap_or_default().to_lowercase();
    let extension = file_name.rsplit('.').next().unwrap_or_default();

    let summary = match extension {
        "csv" => {
            state
                .services
                .imports
                .import_csv(id, &data, query.part_column, query.quantity_column)
                .await
        }
        "xlsx" => {
            state
                .services
                .imports
                .import_xlsx(id, data, query.part_column, query.quantity_column)
                .await
        }
        "jpg" | "jpeg" | "png" | "pdf" => state.services.imports.import_ocr(id, data).await,
        _ => {
            return Err(ApiError::BadRequest(
                "Invalid file format. Please upload a CSV, Excel, or Image/PDF file.".into(),
            ))
        }
    }
    .map_err(map_service_error)?;

    Ok(success_response(summary))
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let (bom, rows) = state
        .services
        .boms
        .export_rows(id)
        .await
        .map_err(map_service_error)?;
    let csv = export::bom_items_csv(&rows)
        .map_err(|e| ApiError::ServiceError(e.into()))?;
    Ok(download_response(
        &format!("{}.csv", bom.number()),
        CSV_MIME,
        csv.into_bytes(),
    ))
}

async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let (bom, rows) = state
        .services
        .boms
        .export_rows(id)
        .await
        .map_err(map_service_error)?;
    let number = bom.number();
    let bytes = export::bom_items_workbook(&number, &rows)
        .map_err(|e| ApiError::ServiceError(e.into()))?;
    Ok(download_response(
        &format!("{}.xlsx", number),
        XLSX_MIME,
        bytes,
    ))
}

pub fn bom_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_bom))
        .route("/", get(list_boms))
        .route("/:id", get(get_bom))
        .route("/:id", put(update_bom))
        .route("/:id", delete(delete_bom))
        .route("/:id/items", get(list_items))
        .route("/:id/items", post(add_item))
        .route("/items/:item_id", put(update_item))
        .route("/items/:item_id", delete(delete_item))
        .route("/:id/draft-items", get(list_draft_items))
        .route("/draft-items/:draft_id/confirm", post(confirm_draft_item))
        .route("/draft-items/:draft_id", delete(reject_draft_item))
        .route("/:id/import", post(import_items))
        .route("/:id/export/csv", get(export_csv))
        .route("/:id/export/xlsx", get(export_xlsx))
}
