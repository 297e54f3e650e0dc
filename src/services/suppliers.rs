use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{manufacturer, rfq, supplier, supplier_manufacturer},
    errors::ServiceError,
};

#[derive(Debug, Clone)]
pub struct SupplierInput {
    pub name: String,
    pub supplier_code: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
}

/// Service for managing suppliers and their manufacturer links
#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DbPool>,
}

impl SupplierService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create_supplier(
        &self,
        input: SupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        let db = &*self.db;
        validate_input(&input)?;

        let clash = supplier::Entity::find()
            .filter(
                supplier::Column::Name
                    .eq(input.name.clone())
                    .or(supplier::Column::SupplierCode.eq(input.supplier_code.clone())),
            )
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A supplier with this name or code already exists".into(),
            ));
        }

        let now = Utc::now();
        let created = supplier::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(input.name),
            supplier_code: Set(input.supplier_code),
            contact_name: Set(input.contact_name),
            contact_phone: Set(input.contact_phone),
            contact_email: Set(input.contact_email),
            address: Set(input.address),
            city: Set(input.city),
            province: Set(input.province),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(supplier_id = created.id, "Supplier created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_supplier(&self, id: i32) -> Result<Option<supplier::Model>, ServiceError> {
        Ok(supplier::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_suppliers(
        &self,
        search: Option<String>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<supplier::Model>, ServiceError> {
        let mut query = supplier::Entity::find().order_by_asc(supplier::Column::Name);
        if let Some(term) = search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(
                supplier::Column::Name
                    .contains(term.clone())
                    .or(supplier::Column::SupplierCode.contains(term)),
            );
        }
        Ok(query.limit(limit).offset(offset).all(&*self.db).await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_supplier(
        &self,
        id: i32,
        input: SupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        let db = &*self.db;
        validate_input(&input)?;

        let existing = supplier::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))?;

        let clash = supplier::Entity::find()
            .filter(
                supplier::Column::Name
                    .eq(input.name.clone())
                    .or(supplier::Column::SupplierCode.eq(input.supplier_code.clone())),
            )
            .filter(supplier::Column::Id.ne(id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A supplier with this name or code already exists".into(),
            ));
        }

        let mut active: supplier::ActiveModel = existing.into();
        active.name = Set(input.name);
        active.supplier_code = Set(input.supplier_code);
        active.contact_name = Set(input.contact_name);
        active.contact_phone = Set(input.contact_phone);
        active.contact_email = Set(input.contact_email);
        active.address = Set(input.address);
        active.city = Set(input.city);
        active.province = Set(input.province);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(supplier_id = id, "Supplier updated");
        Ok(updated)
    }

    /// Deleting a supplier is refused while RFQs reference it; manufacturer
    /// links are removed with it.
    #[instrument(skip(self))]
    pub async fn delete_supplier(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        supplier::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))?;

        let rfqs = rfq::Entity::find()
            .filter(rfq::Column::SupplierId.eq(id))
            .count(db)
            .await?;
        if rfqs > 0 {
            return Err(ServiceError::Conflict(
                "Supplier has RFQs and cannot be deleted".into(),
            ));
        }

        let txn = db.begin().await?;
        supplier_manufacturer::Entity::delete_many()
            .filter(supplier_manufacturer::Column::SupplierId.eq(id))
            .exec(&txn)
            .await?;
        supplier::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(supplier_id = id, "Supplier deleted");
        Ok(())
    }

    /// Asserts that this supplier can supply the manufacturer's parts.
    #[instrument(skip(self))]
    pub async fn link_manufacturer(
        &self,
        supplier_id: i32,
        manufacturer_id: i32,
    ) -> Result<supplier_manufacturer::Model, ServiceError> {
        let db = &*self.db;

        supplier::Entity::find_by_id(supplier_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", supplier_id)))?;
        manufacturer::Entity::find_by_id(manufacturer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Manufacturer {} not found", manufacturer_id))
            })?;

        let existing = supplier_manufacturer::Entity::find()
            .filter(supplier_manufacturer::Column::SupplierId.eq(supplier_id))
            .filter(supplier_manufacturer::Column::ManufacturerId.eq(manufacturer_id))
            .one(db)
            .await?;
        if let Some(link) = existing {
            return Ok(link);
        }

        let created = supplier_manufacturer::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            supplier_id: Set(supplier_id),
            manufacturer_id: Set(manufacturer_id),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        info!(supplier_id, manufacturer_id, "Supplier linked to manufacturer");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn unlink_manufacturer(
        &self,
        supplier_id: i32,
        manufacturer_id: i32,
    ) -> Result<(), ServiceError> {
        let db = &*self.db;
        let link = supplier_manufacturer::Entity::find()
            .filter(supplier_manufacturer::Column::SupplierId.eq(supplier_id))
            .filter(supplier_manufacturer::Column::ManufacturerId.eq(manufacturer_id))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Supplier {} is not linked to manufacturer {}",
                    supplier_id, manufacturer_id
                ))
            })?;

        supplier_manufacturer::Entity::delete_by_id(link.id)
            .exec(db)
            .await?;
        info!(supplier_id, manufacturer_id, "Supplier unlinked from manufacturer");
        Ok(())
    }

    /// Manufacturers this supplier can source.
    #[instrument(skip(self))]
    pub async fn list_linked_manufacturers(
        &self,
        supplier_id: i32,
    ) -> Result<Vec<manufacturer::Model>, ServiceError> {
        let db = &*self.db;
        let links = supplier_manufacturer::Entity::find()
            .filter(supplier_manufacturer::Column::SupplierId.eq(supplier_id))
            .all(db)
            .await?;
        let manufacturer_ids: Vec<i32> = links.iter().map(|l| l.manufacturer_id).collect();
        if manufacturer_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(manufacturer::Entity::find()
            .filter(manufacturer::Column::Id.is_in(manufacturer_ids))
            .order_by_asc(manufacturer::Column::Name)
            .all(db)
            .await?)
    }
}

fn validate_input(input: &SupplierInput) -> Result<(), ServiceError> {
    if input.name.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Please enter a supplier name".into(),
        ));
    }
    if input.supplier_code.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Please enter a supplier code".into(),
        ));
    }
    if input.contact_email.trim().is_empty() || !input.contact_email.contains('@') {
        return Err(ServiceError::ValidationError(
            "Please enter a valid supplier email".into(),
        ));
    }
    Ok(())
}
