//! RFQ generation and lifecycle. Generation groups a Ready BOM's lines by
//! manufacturer→supplier routing and creates one draft RFQ per supplier;
//! sending composes the quote-request document and only flips the status
//! after the mail transport accepts it.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{
        bom::{self, BomStatus},
        bom_item, manufacturer, part,
        rfq::{self, RfqStatus},
        rfq_item, supplier, supplier_manufacturer,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    export::{
        quote_request_workbook, rfq_email_html, rfq_email_subject, RfqExportRow, RfqMailContext,
        XLSX_MIME,
    },
    mailer::{EmailAttachment, Mailer, OutboundEmail},
    services::boms::refresh_bom_state,
};

/// Groups routing rows by manufacturer: which suppliers could quote each
/// manufacturer's parts.
pub fn group_suppliers_by_manufacturer(mappings: &[(i32, i32)]) -> BTreeMap<i32, Vec<i32>> {
    let mut grouped: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
    for (manufacturer_id, supplier_id) in mappings {
        grouped.entry(*manufacturer_id).or_default().push(*supplier_id);
    }
    grouped
}

/// Inverts a complete manufacturer→supplier assignment into per-supplier
/// manufacturer sets, one RFQ per key.
pub fn group_assignments_by_supplier(assignments: &HashMap<i32, i32>) -> BTreeMap<i32, Vec<i32>> {
    let mut grouped: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
    for (manufacturer_id, supplier_id) in assignments {
        grouped.entry(*supplier_id).or_default().push(*manufacturer_id);
    }
    for manufacturers in grouped.values_mut() {
        manufacturers.sort_unstable();
    }
    grouped
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplierOption {
    pub supplier_id: i32,
    pub supplier_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManufacturerSupplierOptions {
    pub manufacturer_id: i32,
    pub manufacturer_name: String,
    pub options: Vec<SupplierOption>,
}

/// Outcome of the planning step: either an unambiguous assignment, or the
/// option lists the caller must choose from.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationPlan {
    Auto { assignments: HashMap<i32, i32> },
    SelectionRequired {
        options: Vec<ManufacturerSupplierOptions>,
    },
}

#[derive(Debug, Clone)]
pub struct RfqItemUpdate {
    pub id: i32,
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItemQuote {
    pub id: i32,
    pub uom: Option<String>,
    pub price: Option<Decimal>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RfqItemDetail {
    pub id: i32,
    pub bom_item_id: i32,
    pub part_number: String,
    pub description: String,
    pub manufacturer: String,
    pub quantity: i32,
    pub uom: Option<String>,
    pub price: Option<Decimal>,
    pub eta: Option<String>,
    pub notes: Option<String>,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RfqDetails {
    pub rfq: rfq::Model,
    pub number: String,
    pub bom_number: String,
    pub bom_description: String,
    pub supplier_name: String,
    pub supplier_email: String,
    pub items: Vec<RfqItemDetail>,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RfqSummary {
    pub id: i32,
    pub number: String,
    pub bom_id: i32,
    pub bom_number: String,
    pub supplier_id: i32,
    pub supplier_name: String,
    pub status: RfqStatus,
    pub created_by: String,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Service for RFQ generation, lifecycle and dispatch
#[derive(Clone)]
pub struct RfqService {
    db: Arc<DbPool>,
    events: EventSender,
    mailer: Arc<dyn Mailer>,
    mail_from: String,
}

impl RfqService {
    pub fn new(
        db: Arc<DbPool>,
        events: EventSender,
        mailer: Arc<dyn Mailer>,
        mail_from: String,
    ) -> Self {
        Self {
            db,
            events,
            mailer,
            mail_from,
        }
    }

    async fn require_rfq(&self, id: i32) -> Result<rfq::Model, ServiceError> {
        rfq::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("RFQ {} not found", id)))
    }

    /// The Ready gate applies to the planning entry point; the generation
    /// step itself stays re-entrant so an assignment can be re-applied
    /// without duplicating RFQ items after the BOM has locked.
    async fn require_bom_with_items(
        &self,
        bom_id: i32,
        require_ready: bool,
    ) -> Result<(bom::Model, Vec<(bom_item::Model, i32)>), ServiceError> {
        let db = &*self.db;
        let bom_model = bom::Entity::find_by_id(bom_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;

        let items = bom_item::Entity::find()
            .filter(bom_item::Column::BomId.eq(bom_id))
            .all(db)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("BOM has no items".into()));
        }
        if require_ready && bom_model.status != BomStatus::Ready {
            return Err(ServiceError::InvalidStatus(
                "Only BOMs in Ready status can generate RFQs".into(),
            ));
        }

        let part_ids: Vec<i32> = items.iter().map(|i| i.part_id).collect();
        let parts: HashMap<i32, part::Model> = part::Entity::find()
            .filter(part::Column::Id.is_in(part_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let items_with_manufacturer = items
            .into_iter()
            .filter_map(|item| {
                let manufacturer_id = parts.get(&item.part_id)?.manufacturer_id;
                Some((item, manufacturer_id))
            })
            .collect();

        Ok((bom_model, items_with_manufacturer))
    }

    /// Planning step: derive the manufacturer→supplier assignment, or
    /// report the options when any manufacturer is ambiguous.
    /// Manufacturers with no supplier mapping are omitted — their lines are
    /// not quoted.
    #[instrument(skip(self))]
    pub async fn plan_generation(&self, bom_id: i32) -> Result<GenerationPlan, ServiceError> {
        let db = &*self.db;
        let (_bom, items) = self.require_bom_with_items(bom_id, true).await?;

        let manufacturer_ids: BTreeSet<i32> = items.iter().map(|(_, m)| *m).collect();
        let mappings: Vec<(i32, i32)> = supplier_manufacturer::Entity::find()
            .filter(
                supplier_manufacturer::Column::ManufacturerId
                    .is_in(manufacturer_ids.iter().copied().collect::<Vec<_>>()),
            )
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.manufacturer_id, m.supplier_id))
            .collect();

        let grouped = group_suppliers_by_manufacturer(&mappings);
        let ambiguous = grouped.values().any(|suppliers| suppliers.len() > 1);

        if !ambiguous {
            let assignments: HashMap<i32, i32> = grouped
                .into_iter()
                .filter_map(|(manufacturer_id, suppliers)| {
                    suppliers.first().map(|s| (manufacturer_id, *s))
                })
                .collect();
            return Ok(GenerationPlan::Auto { assignments });
        }

        let manufacturer_names: HashMap<i32, String> = manufacturer::Entity::find()
            .filter(
                manufacturer::Column::Id
                    .is_in(grouped.keys().copied().collect::<Vec<_>>()),
            )
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();
        let supplier_ids: BTreeSet<i32> =
            grouped.values().flatten().copied().collect();
        let supplier_names: HashMap<i32, String> = supplier::Entity::find()
            .filter(supplier::Column::Id.is_in(supplier_ids.into_iter().collect::<Vec<_>>()))
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();

        let options = grouped
            .into_iter()
            .map(|(manufacturer_id, suppliers)| ManufacturerSupplierOptions {
                manufacturer_id,
                manufacturer_name: manufacturer_names
                    .get(&manufacturer_id)
                    .cloned()
                    .unwrap_or_default(),
                options: suppliers
                    .into_iter()
                    .map(|supplier_id| SupplierOption {
                        supplier_id,
                        supplier_name: supplier_names
                            .get(&supplier_id)
                            .cloned()
                            .unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        Ok(GenerationPlan::SelectionRequired { options })
    }

    /// Generation step: one draft RFQ per supplier with an RFQ item per
    /// covered BOM line. Idempotent on (RFQ, BOMItem); re-running with
    /// the same assignment adds nothing. All writes in one transaction.
    #[instrument(skip(self, assignments))]
    pub async fn generate(
        &self,
        bom_id: i32,
        assignments: HashMap<i32, i32>,
        user_id: &str,
    ) -> Result<Vec<i32>, ServiceError> {
        if assignments.is_empty() {
            return Err(ServiceError::BadRequest(
                "No suppliers selected. Please select at least one.".into(),
            ));
        }

        let db = &*self.db;
        let (bom_model, items) = self.require_bom_with_items(bom_id, false).await?;
        let supplier_groups = group_assignments_by_supplier(&assignments);

        let txn = db.begin().await?;
        let mut rfq_ids = Vec::new();

        for (supplier_id, manufacturer_ids) in &supplier_groups {
            supplier::Entity::find_by_id(*supplier_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Supplier {} not found", supplier_id))
                })?;

            let existing = rfq::Entity::find()
                .filter(rfq::Column::BomId.eq(bom_id))
                .filter(rfq::Column::SupplierId.eq(*supplier_id))
                .one(&txn)
                .await?;

            let rfq_model = match existing {
                Some(found) => found,
                None => {
                    let now = Utc::now();
                    rfq::ActiveModel {
                        id: sea_orm::ActiveValue::NotSet,
                        bom_id: Set(bom_id),
                        supplier_id: Set(*supplier_id),
                        user_id: Set(user_id.to_string()),
                        status: Set(RfqStatus::Draft),
                        due_date: Set(now + Duration::days(1)),
                        sent_date: Set(None),
                        notes: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await?
                }
            };
            rfq_ids.push(rfq_model.id);

            for (item, manufacturer_id) in &items {
                if !manufacturer_ids.contains(manufacturer_id) {
                    continue;
                }
                let duplicate = rfq_item::Entity::find()
                    .filter(rfq_item::Column::RfqId.eq(rfq_model.id))
                    .filter(rfq_item::Column::BomItemId.eq(item.id))
                    .one(&txn)
                    .await?;
                if duplicate.is_none() {
                    let now = Utc::now();
                    rfq_item::ActiveModel {
                        id: sea_orm::ActiveValue::NotSet,
                        rfq_id: Set(rfq_model.id),
                        bom_item_id: Set(item.id),
                        quantity: Set(item.quantity),
                        uom: Set(None),
                        price: Set(None),
                        eta: Set(None),
                        notes: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await?;
                }
            }
        }

        let refresh = refresh_bom_state(&txn, bom_model, false).await?;
        txn.commit().await?;

        info!(bom_id, count = rfq_ids.len(), "RFQs generated");
        self.events
            .send_or_log(Event::RfqsGenerated {
                bom_id,
                rfq_ids: rfq_ids.clone(),
            })
            .await;
        if let Some((old, new)) = refresh.status_change {
            self.events
                .send_or_log(Event::BomStatusChanged {
                    bom_id,
                    old_status: old.as_str().to_string(),
                    new_status: new.as_str().to_string(),
                })
                .await;
        }

        Ok(rfq_ids)
    }

    #[instrument(skip(self))]
    pub async fn get_rfq(&self, id: i32) -> Result<Option<rfq::Model>, ServiceError> {
        Ok(rfq::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_rfqs(
        &self,
        status: Option<RfqStatus>,
        supplier_id: Option<i32>,
        bom_id: Option<i32>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<RfqSummary>, ServiceError> {
        let db = &*self.db;
        let mut query = rfq::Entity::find().order_by_desc(rfq::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(rfq::Column::Status.eq(status));
        }
        if let Some(supplier_id) = supplier_id {
            query = query.filter(rfq::Column::SupplierId.eq(supplier_id));
        }
        if let Some(bom_id) = bom_id {
            query = query.filter(rfq::Column::BomId.eq(bom_id));
        }
        let rfqs = query.limit(limit).offset(offset).all(db).await?;

        let supplier_ids: BTreeSet<i32> = rfqs.iter().map(|r| r.supplier_id).collect();
        let suppliers: HashMap<i32, String> = if supplier_ids.is_empty() {
            HashMap::new()
        } else {
            supplier::Entity::find()
                .filter(supplier::Column::Id.is_in(supplier_ids.into_iter().collect::<Vec<_>>()))
                .all(db)
                .await?
                .into_iter()
                .map(|s| (s.id, s.name))
                .collect()
        };

        Ok(rfqs
            .into_iter()
            .map(|r| RfqSummary {
                number: r.number(),
                bom_number: bom::format_bom_number(r.bom_id),
                supplier_name: suppliers.get(&r.supplier_id).cloned().unwrap_or_default(),
                id: r.id,
                bom_id: r.bom_id,
                supplier_id: r.supplier_id,
                status: r.status,
                created_by: r.user_id,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect())
    }

    /// Full detail: supplier, BOM, and item rows joined with their parts,
    /// including per-line and total quoted value.
    #[instrument(skip(self))]
    pub async fn get_details(&self, id: i32) -> Result<RfqDetails, ServiceError> {
        let db = &*self.db;
        let rfq_model = self.require_rfq(id).await?;

        let supplier_model = supplier::Entity::find_by_id(rfq_model.supplier_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier {} not found", rfq_model.supplier_id))
            })?;
        let bom_model = bom::Entity::find_by_id(rfq_model.bom_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("BOM {} not found", rfq_model.bom_id))
            })?;

        let rfq_items = rfq_item::Entity::find()
            .filter(rfq_item::Column::RfqId.eq(id))
            .all(db)
            .await?;

        let bom_item_ids: Vec<i32> = rfq_items.iter().map(|i| i.bom_item_id).collect();
        let bom_items: HashMap<i32, bom_item::Model> = if bom_item_ids.is_empty() {
            HashMap::new()
        } else {
            bom_item::Entity::find()
                .filter(bom_item::Column::Id.is_in(bom_item_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|i| (i.id, i))
                .collect()
        };
        let part_ids: Vec<i32> = bom_items.values().map(|i| i.part_id).collect();
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
        let manufacturers: HashMap<i32, String> = if manufacturer_ids.is_empty() {
            HashMap::new()
        } else {
            manufacturer::Entity::find()
                .filter(manufacturer::Column::Id.is_in(manufacturer_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|m| (m.id, m.name))
                .collect()
        };

        let mut items: Vec<RfqItemDetail> = rfq_items
            .into_iter()
            .filter_map(|item| {
                let bom_item = bom_items.get(&item.bom_item_id)?;
                let part = parts.get(&bom_item.part_id)?;
                let line_total =
                    item.price.unwrap_or(Decimal::ZERO) * Decimal::from(item.quantity);
                Some(RfqItemDetail {
                    id: item.id,
                    bom_item_id: item.bom_item_id,
                    part_number: part.part_number.clone(),
                    description: part.description.clone(),
                    manufacturer: manufacturers
                        .get(&part.manufacturer_id)
                        .cloned()
                        .unwrap_or_default(),
                    quantity: item.quantity,
                    uom: item.uom,
                    price: item.price,
                    eta: item.eta,
                    notes: item.notes,
                    line_total,
                })
            })
            .collect();
        items.sort_by(|a, b| a.part_number.cmp(&b.part_number));

        let total = items.iter().map(|i| i.line_total).sum();

        Ok(RfqDetails {
            number: rfq_model.number(),
            bom_number: bom::format_bom_number(rfq_model.bom_id),
            bom_description: bom_model.description,
            supplier_name: supplier_model.name,
            supplier_email: supplier_model.contact_email,
            rfq: rfq_model,
            items,
            total,
        })
    }

    /// Rows for the CSV/XLSX exports.
    #[instrument(skip(self))]
    pub async fn export_rows(
        &self,
        id: i32,
    ) -> Result<(String, Vec<RfqExportRow>), ServiceError> {
        let details = self.get_details(id).await?;
        let rows = details
            .items
            .iter()
            .map(|item| RfqExportRow {
                part_number: item.part_number.clone(),
                description: item.description.clone(),
                quantity: item.quantity,
                uom: item.uom.clone(),
                manufacturer: item.manufacturer.clone(),
                supplier: details.supplier_name.clone(),
                price: item.price,
                eta: item.eta.clone(),
            })
            .collect();
        Ok((details.number, rows))
    }

    /// Quantity/notes edits and deletions, allowed in Draft only.
    #[instrument(skip(self, updates, delete_ids))]
    pub async fn update_items(
        &self,
        rfq_id: i32,
        updates: Vec<RfqItemUpdate>,
        delete_ids: Vec<i32>,
    ) -> Result<(), ServiceError> {
        if updates.is_empty() && delete_ids.is_empty() {
            return Err(ServiceError::BadRequest("No changes detected".into()));
        }

        let db = &*self.db;
        let rfq_model = self.require_rfq(rfq_id).await?;
        if rfq_model.status != RfqStatus::Draft {
            return Err(ServiceError::InvalidStatus(
                "You cannot edit RFQ items after sending the RFQ".into(),
            ));
        }

        let txn = db.begin().await?;
        if !delete_ids.is_empty() {
            rfq_item::Entity::delete_many()
                .filter(rfq_item::Column::RfqId.eq(rfq_id))
                .filter(rfq_item::Column::Id.is_in(delete_ids))
                .exec(&txn)
                .await?;
        }
        for update in updates {
            if update.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "Quantity must be at least 1".into(),
                ));
            }
            let item = rfq_item::Entity::find_by_id(update.id)
                .filter(rfq_item::Column::RfqId.eq(rfq_id))
                .one(&txn)
                .await?;
            // Deleted-in-same-batch or foreign items are skipped
            let Some(item) = item else { continue };
            let mut active: rfq_item::ActiveModel = item.into();
            active.quantity = Set(update.quantity);
            active.notes = Set(update.notes);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let mut active: rfq::ActiveModel = rfq_model.into();
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        info!(rfq_id, "RFQ items updated");
        Ok(())
    }

    /// Records the supplier's quote (price/UOM/ETA per line) on a Sent RFQ
    /// and transitions it to Received.
    #[instrument(skip(self, quotes))]
    pub async fn record_quote(
        &self,
        rfq_id: i32,
        quotes: Vec<ItemQuote>,
    ) -> Result<rfq::Model, ServiceError> {
        let db = &*self.db;
        let rfq_model = self.require_rfq(rfq_id).await?;
        if rfq_model.status != RfqStatus::Sent {
            return Err(ServiceError::InvalidStatus(
                "Quotes can only be recorded for sent RFQs".into(),
            ));
        }

        let txn = db.begin().await?;
        for quote in quotes {
            let item = rfq_item::Entity::find_by_id(quote.id)
                .filter(rfq_item::Column::RfqId.eq(rfq_id))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("RFQ item {} not found", quote.id))
                })?;
            let mut active: rfq_item::ActiveModel = item.into();
            active.uom = Set(quote.uom);
            active.price = Set(quote.price);
            active.eta = Set(quote.eta);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let mut active: rfq::ActiveModel = rfq_model.into();
        active.status = Set(RfqStatus::Received);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(rfq_id, "RFQ quote recorded");
        self.events.send_or_log(Event::RfqReceived(rfq_id)).await;
        Ok(updated)
    }

    /// Sent → Canceled. A draft RFQ is deleted instead.
    #[instrument(skip(self))]
    pub async fn cancel(&self, rfq_id: i32) -> Result<rfq::Model, ServiceError> {
        let rfq_model = self.require_rfq(rfq_id).await?;
        if rfq_model.status != RfqStatus::Sent {
            return Err(ServiceError::InvalidStatus(
                "Only sent RFQs can be canceled".into(),
            ));
        }

        let mut active: rfq::ActiveModel = rfq_model.into();
        active.status = Set(RfqStatus::Canceled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(rfq_id, "RFQ canceled");
        self.events.send_or_log(Event::RfqCanceled(rfq_id)).await;
        Ok(updated)
    }

    /// Deletes a draft RFQ with its items and recomputes the BOM status —
    /// removing the last RFQ drops the BOM out of Locked.
    #[instrument(skip(self))]
    pub async fn delete_rfq(&self, rfq_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        let rfq_model = self.require_rfq(rfq_id).await?;
        if rfq_model.status != RfqStatus::Draft {
            return Err(ServiceError::InvalidStatus(
                "Only draft RFQs can be deleted".into(),
            ));
        }

        let bom_model = bom::Entity::find_by_id(rfq_model.bom_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("BOM {} not found", rfq_model.bom_id))
            })?;

        let bom_id = rfq_model.bom_id;
        let txn = db.begin().await?;
        rfq_item::Entity::delete_many()
            .filter(rfq_item::Column::RfqId.eq(rfq_id))
            .exec(&txn)
            .await?;
        rfq::Entity::delete_by_id(rfq_id).exec(&txn).await?;
        let refresh = refresh_bom_state(&txn, bom_model, false).await?;
        txn.commit().await?;

        info!(rfq_id, bom_id, "RFQ deleted");
        self.events.send_or_log(Event::RfqDeleted(rfq_id)).await;
        if let Some((old, new)) = refresh.status_change {
            self.events
                .send_or_log(Event::BomStatusChanged {
                    bom_id,
                    old_status: old.as_str().to_string(),
                    new_status: new.as_str().to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Composes the quote request (HTML body + spreadsheet attachment) and
    /// dispatches it to the supplier contact. Status and sent date change
    /// only after the transport confirms the hand-off; a dispatch failure
    /// leaves the RFQ in Draft.
    #[instrument(skip(self))]
    pub async fn send(&self, rfq_id: i32) -> Result<rfq::Model, ServiceError> {
        let details = self.get_details(rfq_id).await?;
        if details.rfq.status != RfqStatus::Draft {
            return Err(ServiceError::InvalidStatus(
                "Only draft RFQs can be sent".into(),
            ));
        }

        let rows: Vec<RfqExportRow> = details
            .items
            .iter()
            .map(|item| RfqExportRow {
                part_number: item.part_number.clone(),
                description: item.description.clone(),
                quantity: item.quantity,
                uom: item.uom.clone(),
                manufacturer: item.manufacturer.clone(),
                supplier: details.supplier_name.clone(),
                price: item.price,
                eta: item.eta.clone(),
            })
            .collect();

        let ctx = RfqMailContext {
            rfq_number: details.number.clone(),
            supplier_name: details.supplier_name.clone(),
            created_by: details.rfq.user_id.clone(),
            bom_description: details.bom_description.clone(),
            due_date: details.rfq.due_date,
        };
        let workbook = quote_request_workbook(&details.number, &rows)?;
        let mail = OutboundEmail {
            from: self.mail_from.clone(),
            to: details.supplier_email.clone(),
            subject: rfq_email_subject(&ctx),
            html_body: rfq_email_html(&ctx, &rows),
            attachment: Some(EmailAttachment {
                filename: format!("{}.xlsx", details.number),
                content_type: XLSX_MIME.to_string(),
                bytes: workbook,
            }),
        };

        self.mailer
            .send(&mail)
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        // Dispatch confirmed; only now advance the persisted state.
        let now = Utc::now();
        let mut active: rfq::ActiveModel = details.rfq.into();
        active.status = Set(RfqStatus::Sent);
        active.sent_date = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&*self.db).await?;

        info!(rfq_id, "RFQ sent");
        self.events.send_or_log(Event::RfqSent(rfq_id)).await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_grouping_inverts_to_supplier_sets() {
        let mut assignments = HashMap::new();
        assignments.insert(1, 10); // manufacturer 1 -> supplier 10
        assignments.insert(2, 10);
        assignments.insert(3, 20);

        let grouped = group_assignments_by_supplier(&assignments);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get(&10), Some(&vec![1, 2]));
        assert_eq!(grouped.get(&20), Some(&vec![3]));
    }

    #[test]
    fn manufacturer_grouping_collects_all_candidates() {
        let mappings = vec![(1, 10), (1, 20), (2, 10)];
        let grouped = group_suppliers_by_manufacturer(&mappings);
        assert_eq!(grouped.get(&1), Some(&vec![10, 20]));
        assert_eq!(grouped.get(&2), Some(&vec![10]));
    }
}
