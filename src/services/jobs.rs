use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{
        bom, customer,
        job::{self, JobStatus},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone)]
pub struct JobInput {
    pub number: String,
    pub description: String,
    pub customer_id: i32,
    pub contact_name: Option<String>,
    pub status: JobStatus,
}

/// Service for managing customer jobs
#[derive(Clone)]
pub struct JobService {
    db: Arc<DbPool>,
}

impl JobService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create_job(
        &self,
        input: JobInput,
        user_id: &str,
    ) -> Result<job::Model, ServiceError> {
        let db = &*self.db;

        if input.number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Please enter a job number".into(),
            ));
        }

        customer::Entity::find_by_id(input.customer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", input.customer_id))
            })?;

        let clash = job::Entity::find()
            .filter(job::Column::Number.eq(input.number.clone()))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A job with this number already exists".into(),
            ));
        }

        let now = Utc::now();
        let created = job::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            number: Set(input.number),
            description: Set(input.description),
            customer_id: Set(input.customer_id),
            contact_name: Set(input.contact_name),
            status: Set(input.status),
            user_id: Set(user_id.to_string()),
            start_date: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(job_id = created.id, number = %created.number, "Job created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_job(&self, id: i32) -> Result<Option<job::Model>, ServiceError> {
        Ok(job::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_jobs(
        &self,
        customer_id: Option<i32>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<job::Model>, ServiceError> {
        let mut query = job::Entity::find().order_by_asc(job::Column::Number);
        if let Some(cid) = customer_id {
            query = query.filter(job::Column::CustomerId.eq(cid));
        }
        Ok(query.limit(limit).offset(offset).all(&*self.db).await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_job(&self, id: i32, input: JobInput) -> Result<job::Model, ServiceError> {
        let db = &*self.db;

        let existing = job::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Job {} not found", id)))?;

        customer::Entity::find_by_id(input.customer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", input.customer_id))
            })?;

        let clash = job::Entity::find()
            .filter(job::Column::Number.eq(input.number.clone()))
            .filter(job::Column::Id.ne(id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A job with this number already exists".into(),
            ));
        }

        let mut active: job::ActiveModel = existing.into();
        active.number = Set(input.number);
        active.description = Set(input.description);
        active.customer_id = Set(input.customer_id);
        active.contact_name = Set(input.contact_name);
        active.status = Set(input.status);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(job_id = id, "Job updated");
        Ok(updated)
    }

    /// Deleting a job is refused while BOMs still reference it.
    #[instrument(skip(self))]
    pub async fn delete_job(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        job::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Job {} not found", id)))?;

        let boms = bom::Entity::find()
            .filter(bom::Column::JobId.eq(id))
            .count(db)
            .await?;
        if boms > 0 {
            return Err(ServiceError::Conflict(
                "Job has BOMs and cannot be deleted".into(),
            ));
        }

        job::Entity::delete_by_id(id).exec(db).await?;
        info!(job_id = id, "Job deleted");
        Ok(())
    }
}
