use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{bom, customer, job},
    errors::ServiceError,
};

#[derive(Debug, Clone)]
pub struct CustomerInput {
    pub name: String,
    pub customer_code: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

/// Service for managing customers
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create_customer(
        &self,
        input: CustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        let db = &*self.db;
        validate_input(&input)?;

        let clash = customer::Entity::find()
            .filter(
                customer::Column::CustomerCode
                    .eq(input.customer_code.clone())
                    .or(customer::Column::Name.eq(input.name.clone())),
            )
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A customer with this name or code already exists".into(),
            ));
        }

        let now = Utc::now();
        let created = customer::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(input.name),
            customer_code: Set(input.customer_code),
            address: Set(input.address),
            city: Set(input.city),
            province: Set(input.province),
            contact_name: Set(input.contact_name),
            contact_phone: Set(input.contact_phone),
            contact_email: Set(input.contact_email),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(customer_id = created.id, "Customer created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, id: i32) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        search: Option<String>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<customer::Model>, ServiceError> {
        let mut query = customer::Entity::find().order_by_asc(customer::Column::Name);
        if let Some(term) = search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(
                customer::Column::Name
                    .contains(term.clone())
                    .or(customer::Column::CustomerCode.contains(term)),
            );
        }
        Ok(query.limit(limit).offset(offset).all(&*self.db).await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_customer(
        &self,
        id: i32,
        input: CustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        let db = &*self.db;
        validate_input(&input)?;

        let existing = customer::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))?;

        let clash = customer::Entity::find()
            .filter(
                customer::Column::CustomerCode
                    .eq(input.customer_code.clone())
                    .or(customer::Column::Name.eq(input.name.clone())),
            )
            .filter(customer::Column::Id.ne(id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "A customer with this name or code already exists".into(),
            ));
        }

        let mut active: customer::ActiveModel = existing.into();
        active.name = Set(input.name);
        active.customer_code = Set(input.customer_code);
        active.address = Set(input.address);
        active.city = Set(input.city);
        active.province = Set(input.province);
        active.contact_name = Set(input.contact_name);
        active.contact_phone = Set(input.contact_phone);
        active.contact_email = Set(input.contact_email);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(customer_id = id, "Customer updated");
        Ok(updated)
    }

    /// Deleting a customer is refused while jobs or BOMs still reference it.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        customer::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))?;

        let jobs = job::Entity::find()
            .filter(job::Column::CustomerId.eq(id))
            .count(db)
            .await?;
        let boms = bom::Entity::find()
            .filter(bom::Column::CustomerId.eq(id))
            .count(db)
            .await?;
        if jobs > 0 || boms > 0 {
            return Err(ServiceError::Conflict(
                "Customer has jobs or BOMs and cannot be deleted".into(),
            ));
        }

        customer::Entity::delete_by_id(id).exec(db).await?;
        info!(customer_id = id, "Customer deleted");
        Ok(())
    }
}

fn validate_input(input: &CustomerInput) -> Result<(), ServiceError> {
    if input.name.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Please enter a customer name".into(),
        ));
    }
    if input.customer_code.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Please enter a customer code".into(),
        ));
    }
    Ok(())
}
