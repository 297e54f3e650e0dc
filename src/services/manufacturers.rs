use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{manufacturer, part, supplier_manufacturer},
    errors::ServiceError,
};

/// Service for managing manufacturers
#[derive(Clone)]
pub struct ManufacturerService {
    db: Arc<DbPool>,
}

impl ManufacturerService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_manufacturer(
        &self,
        name: String,
    ) -> Result<manufacturer::Model, ServiceError> {
        let db = &*self.db;

        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Manufacturer name is required".into(),
            ));
        }

        let clash = manufacturer::Entity::find()
            .filter(manufacturer::Column::Name.eq(name.clone()))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A manufacturer with this name already exists".into(),
            ));
        }

        let now = Utc::now();
        let created = manufacturer::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(name),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(manufacturer_id = created.id, "Manufacturer created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_manufacturer(
        &self,
        id: i32,
    ) -> Result<Option<manufacturer::Model>, ServiceError> {
        Ok(manufacturer::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_manufacturers(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<manufacturer::Model>, ServiceError> {
        Ok(manufacturer::Entity::find()
            .order_by_asc(manufacturer::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn update_manufacturer(
        &self,
        id: i32,
        name: String,
    ) -> Result<manufacturer::Model, ServiceError> {
        let db = &*self.db;

        let existing = manufacturer::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Manufacturer {} not found", id)))?;

        let clash = manufacturer::Entity::find()
            .filter(manufacturer::Column::Name.eq(name.clone()))
            .filter(manufacturer::Column::Id.ne(id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A manufacturer with this name already exists".into(),
            ));
        }

        let mut active: manufacturer::ActiveModel = existing.into();
        active.name = Set(name);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(manufacturer_id = id, "Manufacturer updated");
        Ok(updated)
    }

    /// Deleting a manufacturer is refused while parts or supplier links
    /// still reference it.
    #[instrument(skip(self))]
    pub async fn delete_manufacturer(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        manufacturer::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Manufacturer {} not found", id)))?;

        let parts = part::Entity::find()
            .filter(part::Column::ManufacturerId.eq(id))
            .count(db)
            .await?;
        let links = supplier_manufacturer::Entity::find()
            .filter(supplier_manufacturer::Column::ManufacturerId.eq(id))
            .count(db)
            .await?;
        if parts > 0 || links > 0 {
            return Err(ServiceError::Conflict(
                "Manufacturer has parts or supplier links and cannot be deleted".into(),
            ));
        }

        manufacturer::Entity::delete_by_id(id).exec(db).await?;
        info!(manufacturer_id = id, "Manufacturer deleted");
        Ok(())
    }
}
