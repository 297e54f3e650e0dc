// Catalog store
pub mod customers;
pub mod jobs;
pub mod manufacturers;
pub mod parts;
pub mod suppliers;

// BOM aggregate and import reconciliation
pub mod boms;
pub mod imports;

// RFQ generation and lifecycle
pub mod rfqs;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::mailer::Mailer;
use crate::ocr::OcrClient;
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub customers: Arc<customers::CustomerService>,
    pub jobs: Arc<jobs::JobService>,
    pub manufacturers: Arc<manufacturers::ManufacturerService>,
    pub suppliers: Arc<suppliers::SupplierService>,
    pub parts: Arc<parts::PartService>,
    pub boms: Arc<boms::BomService>,
    pub imports: Arc<imports::ImportService>,
    pub rfqs: Arc<rfqs::RfqService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        ocr: Arc<dyn OcrClient>,
        mailer: Arc<dyn Mailer>,
        mail_from: String,
    ) -> Self {
        Self {
            customers: Arc::new(customers::CustomerService::new(db.clone())),
            jobs: Arc::new(jobs::JobService::new(db.clone())),
            manufacturers: Arc::new(manufacturers::ManufacturerService::new(db.clone())),
            suppliers: Arc::new(suppliers::SupplierService::new(db.clone())),
            parts: Arc::new(parts::PartService::new(db.clone())),
            boms: Arc::new(boms::BomService::new(db.clone(), event_sender.clone())),
            imports: Arc::new(imports::ImportService::new(
                db.clone(),
                event_sender.clone(),
                ocr,
            )),
            rfqs: Arc::new(rfqs::RfqService::new(db, event_sender, mailer, mail_from)),
        }
    }
}
