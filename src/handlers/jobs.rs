use super::common::{
    created_response, default_page, default_per_page, map_service_error, no_content_response,
    page_offset, success_response, validate_input,
};
use crate::{
    entities::job::JobStatus,
    errors::ApiError,
    handlers::{AppState, CurrentUser},
    services::jobs::JobInput,
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
pub struct JobRequest {
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub customer_id: i32,
    pub contact_name: Option<String>,
    #[serde(default = "default_status")]
    pub status: JobStatus,
}

fn default_status() -> JobStatus {
    JobStatus::Pending
}

impl From<JobRequest> for JobInput {
    fn from(req: JobRequest) -> Self {
        JobInput {
            number: req.number,
            description: req.description,
            customer_id: req.customer_id,
            contact_name: req.contact_name,
            status: req.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<i32>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<JobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let job = state
        .services
        .jobs
        .create_job(payload.into(), &user.0)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(job))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .services
        .jobs
        .get_job(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", id)))?;
    Ok(success_response(job))
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state
        .services
        .jobs
        .list_jobs(
            query.customer_id,
            query.per_page,
            page_offset(query.page, query.per_page),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(jobs))
}

async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<JobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let job = state
        .services
        .jobs
        .update_job(id, payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(job))
}

async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .jobs
        .delete_job(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_job))
        .route("/", get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id", put(update_job))
        .route("/:id", delete(delete_job))
}
