use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{
        bom_item, manufacturer,
        part::{self, UnitType},
    },
    errors::ServiceError,
    services::imports::normalize_part_number,
};

#[derive(Debug, Clone)]
pub struct PartInput {
    pub part_number: String,
    pub description: String,
    pub manufacturer_id: i32,
    pub unit: UnitType,
    pub labour: Decimal,
}

/// Service for the parts catalog
#[derive(Clone)]
pub struct PartService {
    db: Arc<DbPool>,
}

impl PartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Part numbers are stored normalized so imports can match them with a
    /// plain equality lookup.
    #[instrument(skip(self, input))]
    pub async fn create_part(&self, input: PartInput) -> Result<part::Model, ServiceError> {
        let db = &*self.db;

        let part_number = normalize_part_number(&input.part_number);
        if part_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "Part number must contain at least one letter or digit".into(),
            ));
        }
        if input.labour < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Labour cannot be negative".into(),
            ));
        }

        manufacturer::Entity::find_by_id(input.manufacturer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Manufacturer {} not found",
                    input.manufacturer_id
                ))
            })?;

        let clash = part::Entity::find()
            .filter(part::Column::PartNumber.eq(part_number.clone()))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A part with number {} already exists",
                part_number
            )));
        }

        let now = Utc::now();
        let created = part::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            part_number: Set(part_number),
            description: Set(input.description),
            manufacturer_id: Set(input.manufacturer_id),
            unit: Set(input.unit),
            labour: Set(input.labour),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(part_id = created.id, part_number = %created.part_number, "Part created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_part(&self, id: i32) -> Result<Option<part::Model>, ServiceError> {
        Ok(part::Entity::find_by_id(id).one(&*self.db).await?)
    }

    /// Exact-match catalog lookup by normalized part number.
    #[instrument(skip(self))]
    pub async fn find_by_part_number(
        &self,
        part_number: &str,
    ) -> Result<Option<part::Model>, ServiceError> {
        let normalized = normalize_part_number(part_number);
        Ok(part::Entity::find()
            .filter(part::Column::PartNumber.eq(normalized))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_parts(
        &self,
        search: Option<String>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<part::Model>, ServiceError> {
        let mut query = part::Entity::find().order_by_asc(part::Column::PartNumber);
        if let Some(term) = search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(
                part::Column::PartNumber
                    .contains(term.clone())
                    .or(part::Column::Description.contains(term)),
            );
        }
        Ok(query.limit(limit).offset(offset).all(&*self.db).await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_part(&self, id: i32, input: PartInput) -> Result<part::Model, ServiceError> {
        let db = &*self.db;

        let existing = part::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))?;

        let part_number = normalize_part_number(&input.part_number);
        if part_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "Part number must contain at least one letter or digit".into(),
            ));
        }

        manufacturer::Entity::find_by_id(input.manufacturer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Manufacturer {} not found",
                    input.manufacturer_id
                ))
            })?;

        let clash = part::Entity::find()
            .filter(part::Column::PartNumber.eq(part_number.clone()))
            .filter(part::Column::Id.ne(id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A part with number {} already exists",
                part_number
            )));
        }

        let mut active: part::ActiveModel = existing.into();
        active.part_number = Set(part_number);
        active.description = Set(input.description);
        active.manufacturer_id = Set(input.manufacturer_id);
        active.unit = Set(input.unit);
        active.labour = Set(input.labour);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(part_id = id, "Part updated");
        Ok(updated)
    }

    /// Deleting a part is refused while BOM lines still reference it.
    #[instrument(skip(self))]
    pub async fn delete_part(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        part::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))?;

        let references = bom_item::Entity::find()
            .filter(bom_item::Column::PartId.eq(id))
            .count(db)
            .await?;
        if references > 0 {
            return Err(ServiceError::Conflict(
                "Part is referenced by BOM items and cannot be deleted".into(),
            ));
        }

        part::Entity::delete_by_id(id).exec(db).await?;
        info!(part_id = id, "Part deleted");
        Ok(())
    }
}
