use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{
        bom::{self, BomStatus},
        bom_item, customer, draft_bom_item, job, manufacturer, part, rfq, rfq_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    export::BomExportRow,
};

#[derive(Debug, Clone)]
pub struct CreateBom {
    pub customer_id: i32,
    pub job_id: Option<i32>,
    pub description: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateBomHeader {
    pub description: String,
    pub notes: Option<String>,
    pub job_id: Option<i32>,
}

/// A resolved line joined with its part and manufacturer.
#[derive(Debug, Clone, Serialize)]
pub struct BomItemDetail {
    pub id: i32,
    pub part_id: i32,
    pub part_number: String,
    pub description: String,
    pub manufacturer_id: i32,
    pub manufacturer: String,
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BomDetails {
    pub bom: bom::Model,
    pub number: String,
    pub items: Vec<BomItemDetail>,
    pub draft_items: Vec<draft_bom_item::Model>,
    pub rfq_ids: Vec<i32>,
}

/// Outcome of recomputing a BOM's derived state.
pub(crate) struct BomRefresh {
    pub bom: bom::Model,
    pub status_change: Option<(BomStatus, BomStatus)>,
}

/// Recomputes the BOM status from its current RFQ/draft/item sets and
/// persists it, optionally bumping the version. Runs on the mutation's
/// connection so the write shares its transaction.
pub(crate) async fn refresh_bom_state<C: ConnectionTrait>(
    conn: &C,
    bom_model: bom::Model,
    bump_version: bool,
) -> Result<BomRefresh, ServiceError> {
    let rfqs = rfq::Entity::find()
        .filter(rfq::Column::BomId.eq(bom_model.id))
        .count(conn)
        .await?;
    let drafts = draft_bom_item::Entity::find()
        .filter(draft_bom_item::Column::BomId.eq(bom_model.id))
        .count(conn)
        .await?;
    let items = bom_item::Entity::find()
        .filter(bom_item::Column::BomId.eq(bom_model.id))
        .count(conn)
        .await?;

    let old_status = bom_model.status;
    let new_status = BomStatus::derive(rfqs > 0, drafts > 0, items > 0);
    let new_version = if bump_version {
        bom::next_version(bom_model.version)
    } else {
        bom_model.version
    };

    let mut active: bom::ActiveModel = bom_model.into();
    active.status = Set(new_status);
    active.version = Set(new_version);
    active.updated_at = Set(Utc::now());
    let updated = active.update(conn).await?;

    Ok(BomRefresh {
        bom: updated,
        status_change: (old_status != new_status).then_some((old_status, new_status)),
    })
}

/// Service for the BOM aggregate: header, resolved lines, draft lines.
#[derive(Clone)]
pub struct BomService {
    db: Arc<DbPool>,
    events: EventSender,
}

impl BomService {
    pub fn new(db: Arc<DbPool>, events: EventSender) -> Self {
        Self { db, events }
    }

    async fn emit_status_change(&self, bom_id: i32, change: Option<(BomStatus, BomStatus)>) {
        if let Some((old, new)) = change {
            self.events
                .send_or_log(Event::BomStatusChanged {
                    bom_id,
                    old_status: old.as_str().to_string(),
                    new_status: new.as_str().to_string(),
                })
                .await;
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create_bom(
        &self,
        input: CreateBom,
        user_id: &str,
    ) -> Result<bom::Model, ServiceError> {
        let db = &*self.db;

        if input.description.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Please enter a description".into(),
            ));
        }
        if let Some(notes) = &input.notes {
            if notes.len() > 500 {
                return Err(ServiceError::ValidationError(
                    "Notes cannot exceed 500 characters".into(),
                ));
            }
        }

        customer::Entity::find_by_id(input.customer_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", input.customer_id))
            })?;

        if let Some(job_id) = input.job_id {
            let job_model = job::Entity::find_by_id(job_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Job {} not found", job_id)))?;
            if job_model.customer_id != input.customer_id {
                return Err(ServiceError::ValidationError(
                    "Job does not belong to the selected customer".into(),
                ));
            }
        }

        let now = Utc::now();
        let created = bom::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            customer_id: Set(input.customer_id),
            job_id: Set(input.job_id),
            description: Set(input.description),
            user_id: Set(user_id.to_string()),
            status: Set(BomStatus::Draft),
            notes: Set(input.notes),
            version: Set(dec!(1.0)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(bom_id = created.id, number = %created.number(), "BOM created");
        self.events.send_or_log(Event::BomCreated(created.id)).await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_bom(&self, id: i32) -> Result<Option<bom::Model>, ServiceError> {
        Ok(bom::Entity::find_by_id(id).one(&*self.db).await?)
    }

    async fn require_bom(&self, id: i32) -> Result<bom::Model, ServiceError> {
        self.get_bom(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_boms(
        &self,
        status: Option<BomStatus>,
        customer_id: Option<i32>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<bom::Model>, ServiceError> {
        let mut query = bom::Entity::find().order_by_desc(bom::Column::Id);
        if let Some(status) = status {
            query = query.filter(bom::Column::Status.eq(status));
        }
        if let Some(customer_id) = customer_id {
            query = query.filter(bom::Column::CustomerId.eq(customer_id));
        }
        Ok(query.limit(limit).offset(offset).all(&*self.db).await?)
    }

    /// Resolved lines joined with part and manufacturer data.
    #[instrument(skip(self))]
    pub async fn list_items(&self, bom_id: i32) -> Result<Vec<BomItemDetail>, ServiceError> {
        let db = &*self.db;
        self.require_bom(bom_id).await?;

        let items = bom_item::Entity::find()
            .filter(bom_item::Column::BomId.eq(bom_id))
            .all(db)
            .await?;

        let part_ids: Vec<i32> = items.iter().map(|i| i.part_id).collect();
        let parts: HashMap<i32, part::Model> = if part_ids.is_empty() {
            HashMap::new()
        } else {
            part::Entity::find()
                .filter(part::Column::Id.is_in(part_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let manufacturer_ids: Vec<i32> = parts.values().map(|p| p.manufacturer_id).collect();
        let manufacturers: HashMap<i32, manufacturer::Model> = if manufacturer_ids.is_empty() {
            HashMap::new()
        } else {
            manufacturer::Entity::find()
                .filter(manufacturer::Column::Id.is_in(manufacturer_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect()
        };

        let mut details: Vec<BomItemDetail> = items
            .into_iter()
            .filter_map(|item| {
                let part = parts.get(&item.part_id)?;
                Some(BomItemDetail {
                    id: item.id,
                    part_id: part.id,
                    part_number: part.part_number.clone(),
                    description: part.description.clone(),
                    manufacturer_id: part.manufacturer_id,
                    manufacturer: manufacturers
                        .get(&part.manufacturer_id)
                        .map(|m| m.name.clone())
                        .unwrap_or_default(),
                    quantity: item.quantity,
                    notes: item.notes,
                })
            })
            .collect();
        details.sort_by(|a, b| a.part_number.cmp(&b.part_number));
        Ok(details)
    }

    #[instrument(skip(self))]
    pub async fn get_details(&self, bom_id: i32) -> Result<BomDetails, ServiceError> {
        let bom_model = self.require_bom(bom_id).await?;
        let items = self.list_items(bom_id).await?;
        let draft_items = self.list_draft_items(bom_id).await?;
        let rfq_ids = rfq::Entity::find()
            .filter(rfq::Column::BomId.eq(bom_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        Ok(BomDetails {
            number: bom_model.number(),
            bom: bom_model,
            items,
            draft_items,
            rfq_ids,
        })
    }

    /// Rows for the CSV/XLSX item exports.
    #[instrument(skip(self))]
    pub async fn export_rows(
        &self,
        bom_id: i32,
    ) -> Result<(bom::Model, Vec<BomExportRow>), ServiceError> {
        let bom_model = self.require_bom(bom_id).await?;
        let rows = self
            .list_items(bom_id)
            .await?
            .into_iter()
            .map(|item| BomExportRow {
                part_number: item.part_number,
                description: item.description,
                quantity: item.quantity,
                manufacturer: item.manufacturer,
            })
            .collect();
        Ok((bom_model, rows))
    }

    /// Header-only edit; line content is untouched, so the version stays.
    #[instrument(skip(self, input))]
    pub async fn update_header(
        &self,
        bom_id: i32,
        input: UpdateBomHeader,
    ) -> Result<bom::Model, ServiceError> {
        let db = &*self.db;
        let bom_model = self.require_bom(bom_id).await?;

        if input.description.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Please enter a description".into(),
            ));
        }
        if let Some(job_id) = input.job_id {
            let job_model = job::Entity::find_by_id(job_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Job {} not found", job_id)))?;
            if job_model.customer_id != bom_model.customer_id {
                return Err(ServiceError::ValidationError(
                    "Job does not belong to the BOM's customer".into(),
                ));
            }
        }

        let mut active: bom::ActiveModel = bom_model.into();
        active.description = Set(input.description);
        active.notes = Set(input.notes);
        active.job_id = Set(input.job_id);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(bom_id, "BOM header updated");
        Ok(updated)
    }

    /// Deletes the BOM with its lines and drafts. Refused while RFQs exist:
    /// their item snapshots reference this BOM's lines.
    #[instrument(skip(self))]
    pub async fn delete_bom(&self, bom_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        self.require_bom(bom_id).await?;

        let rfqs = rfq::Entity::find()
            .filter(rfq::Column::BomId.eq(bom_id))
            .count(db)
            .await?;
        if rfqs > 0 {
            return Err(ServiceError::Conflict(
                "BOM has RFQs and cannot be deleted".into(),
            ));
        }

        let txn = db.begin().await?;
        bom_item::Entity::delete_many()
            .filter(bom_item::Column::BomId.eq(bom_id))
            .exec(&txn)
            .await?;
        draft_bom_item::Entity::delete_many()
            .filter(draft_bom_item::Column::BomId.eq(bom_id))
            .exec(&txn)
            .await?;
        bom::Entity::delete_by_id(bom_id).exec(&txn).await?;
        txn.commit().await?;

        info!(bom_id, "BOM deleted");
        self.events.send_or_log(Event::BomDeleted(bom_id)).await;
        Ok(())
    }

    /// Adds a single resolved line. Duplicate (BOM, Part) pairs are a
    /// field-level validation error on this form-backed path.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        bom_id: i32,
        part_id: i32,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<bom_item::Model, ServiceError> {
        let db = &*self.db;
        let bom_model = self.require_bom(bom_id).await?;

        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        part::Entity::find_by_id(part_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))?;

        let duplicate = bom_item::Entity::find()
            .filter(bom_item::Column::BomId.eq(bom_id))
            .filter(bom_item::Column::PartId.eq(part_id))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(
                "This part has already been added to the BOM".into(),
            ));
        }

        let txn = db.begin().await?;
        let now = Utc::now();
        let created = bom_item::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            bom_id: Set(bom_id),
            part_id: Set(part_id),
            quantity: Set(quantity),
            notes: Set(notes.filter(|n| !n.trim().is_empty())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        let refresh = refresh_bom_state(&txn, bom_model, true).await?;
        txn.commit().await?;

        info!(bom_id, part_id, quantity, "BOM item added");
        self.emit_status_change(bom_id, refresh.status_change).await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        item_id: i32,
        part_id: i32,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<bom_item::Model, ServiceError> {
        let db = &*self.db;

        let item = bom_item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM item {} not found", item_id)))?;
        let bom_model = self.require_bom(item.bom_id).await?;

        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        part::Entity::find_by_id(part_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))?;

        let duplicate = bom_item::Entity::find()
            .filter(bom_item::Column::BomId.eq(item.bom_id))
            .filter(bom_item::Column::PartId.eq(part_id))
            .filter(bom_item::Column::Id.ne(item_id))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(
                "This part has already been added to the BOM".into(),
            ));
        }

        let bom_id = item.bom_id;
        let txn = db.begin().await?;
        let mut active: bom_item::ActiveModel = item.into();
        active.part_id = Set(part_id);
        active.quantity = Set(quantity);
        active.notes = Set(notes.filter(|n| !n.trim().is_empty()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        let refresh = refresh_bom_state(&txn, bom_model, true).await?;
        txn.commit().await?;

        info!(bom_id, item_id, "BOM item updated");
        self.emit_status_change(bom_id, refresh.status_change).await;
        Ok(updated)
    }

    /// Deleting a line is refused on a locked BOM and while an RFQ item
    /// still snapshots it.
    #[instrument(skip(self))]
    pub async fn delete_item(&self, item_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;

        let item = bom_item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM item {} not found", item_id)))?;
        let bom_model = self.require_bom(item.bom_id).await?;

        if bom_model.status == BomStatus::Locked {
            return Err(ServiceError::InvalidStatus(
                "Cannot delete items from a locked BOM".into(),
            ));
        }
        let references = rfq_item::Entity::find()
            .filter(rfq_item::Column::BomItemId.eq(item_id))
            .count(db)
            .await?;
        if references > 0 {
            return Err(ServiceError::Conflict(
                "BOM item is referenced by RFQ items and cannot be deleted".into(),
            ));
        }

        let bom_id = item.bom_id;
        let txn = db.begin().await?;
        bom_item::Entity::delete_by_id(item_id).exec(&txn).await?;
        let refresh = refresh_bom_state(&txn, bom_model, true).await?;
        txn.commit().await?;

        info!(bom_id, item_id, "BOM item deleted");
        self.emit_status_change(bom_id, refresh.status_change).await;
        Ok(())
    }

    /// Unresolved draft lines awaiting review.
    #[instrument(skip(self))]
    pub async fn list_draft_items(
        &self,
        bom_id: i32,
    ) -> Result<Vec<draft_bom_item::Model>, ServiceError> {
        Ok(draft_bom_item::Entity::find()
            .filter(draft_bom_item::Column::BomId.eq(bom_id))
            .filter(draft_bom_item::Column::IsResolved.eq(false))
            .order_by_asc(draft_bom_item::Column::PartNumber)
            .all(&*self.db)
            .await?)
    }

    /// Promotes a draft against a now-existing catalog part. Quantity folds
    /// into an existing line for the same part.
    #[instrument(skip(self))]
    pub async fn confirm_draft_item(&self, draft_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;

        let draft = draft_bom_item::Entity::find_by_id(draft_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Draft item {} not found", draft_id)))?;
        let bom_model = self.require_bom(draft.bom_id).await?;

        let part = part::Entity::find()
            .filter(part::Column::PartNumber.eq(draft.part_number.clone()))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Part {} still does not exist in the catalog",
                    draft.part_number
                ))
            })?;

        let bom_id = draft.bom_id;
        let part_number = draft.part_number.clone();
        let txn = db.begin().await?;

        let existing = bom_item::Entity::find()
            .filter(bom_item::Column::BomId.eq(bom_id))
            .filter(bom_item::Column::PartId.eq(part.id))
            .one(&txn)
            .await?;
        match existing {
            Some(item) => {
                let quantity = item.quantity + draft.quantity;
                let mut active: bom_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?;
            }
            None => {
                let now = Utc::now();
                bom_item::ActiveModel {
                    id: sea_orm::ActiveValue::NotSet,
                    bom_id: Set(bom_id),
                    part_id: Set(part.id),
                    quantity: Set(draft.quantity),
                    notes: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        draft_bom_item::Entity::delete_by_id(draft_id)
            .exec(&txn)
            .await?;
        let refresh = refresh_bom_state(&txn, bom_model, true).await?;
        txn.commit().await?;

        info!(bom_id, draft_id, part_number = %part_number, "Draft item confirmed");
        self.events
            .send_or_log(Event::DraftItemResolved {
                bom_id,
                part_number,
            })
            .await;
        self.emit_status_change(bom_id, refresh.status_change).await;
        Ok(())
    }

    /// Drops a draft without promoting it.
    #[instrument(skip(self))]
    pub async fn reject_draft_item(&self, draft_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;

        let draft = draft_bom_item::Entity::find_by_id(draft_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Draft item {} not found", draft_id)))?;
        let bom_model = self.require_bom(draft.bom_id).await?;

        let bom_id = draft.bom_id;
        let txn = db.begin().await?;
        draft_bom_item::Entity::delete_by_id(draft_id)
            .exec(&txn)
            .await?;
        let refresh = refresh_bom_state(&txn, bom_model, true).await?;
        txn.commit().await?;

        info!(bom_id, draft_id, "Draft item rejected");
        self.emit_status_change(bom_id, refresh.status_change).await;
        Ok(())
    }
}
