//! Shared fixtures: an in-memory SQLite database with the schema derived
//! from the entities, service container wiring, and test doubles for the
//! OCR and mail collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use bomlink_api::entities::{
    bom, bom_item, customer, draft_bom_item, job, manufacturer, part, rfq, rfq_item, supplier,
    supplier_manufacturer,
};
use bomlink_api::events::{Event, EventSender};
use bomlink_api::mailer::{Mailer, MailerError, OutboundEmail};
use bomlink_api::ocr::{OcrClient, OcrError};
use bomlink_api::services::boms::CreateBom;
use bomlink_api::services::customers::CustomerInput;
use bomlink_api::services::parts::PartInput;
use bomlink_api::services::suppliers::SupplierInput;
use bomlink_api::services::AppServices;

/// Fresh in-memory database with the full schema. A single pooled
/// connection keeps every statement on the same memory instance.
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();

    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();
    db.execute(backend.build(&schema.create_table_from_entity(customer::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(job::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(manufacturer::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(supplier::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(
        supplier_manufacturer::Entity,
    )))
    .await
    .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(part::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(bom::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(bom_item::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(draft_bom_item::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(rfq::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(rfq_item::Entity)))
        .await
        .unwrap();
    db
}

/// Mail double: records accepted messages, fails on demand.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutboundEmail) -> Result<(), MailerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailerError::Rejected("simulated transport failure".into()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// OCR double returning a fixed extraction.
pub struct StaticOcr(pub String);

#[async_trait]
impl OcrClient for StaticOcr {
    async fn extract_text(&self, _bytes: Vec<u8>) -> Result<String, OcrError> {
        Ok(self.0.clone())
    }
}

/// OCR double that always fails.
pub struct FailingOcr;

#[async_trait]
impl OcrClient for FailingOcr {
    async fn extract_text(&self, _bytes: Vec<u8>) -> Result<String, OcrError> {
        Err(OcrError::Rejected("scanner offline".into()))
    }
}

pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub mailer: Arc<RecordingMailer>,
    pub events: EventSender,
    _event_rx: mpsc::Receiver<Event>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_ocr_text("").await
    }

    pub async fn with_ocr_text(text: &str) -> Self {
        let db = Arc::new(setup_db().await);
        let (tx, rx) = mpsc::channel(256);
        let events = EventSender::new(tx);
        let mailer = Arc::new(RecordingMailer::default());
        let services = AppServices::new(
            db.clone(),
            events.clone(),
            Arc::new(StaticOcr(text.to_string())),
            mailer.clone(),
            "quotes@bomlink.local".to_string(),
        );
        Self {
            db,
            services,
            mailer,
            events,
            _event_rx: rx,
        }
    }
}

pub async fn seed_customer(services: &AppServices) -> customer::Model {
    services
        .customers
        .create_customer(CustomerInput {
            name: "Northwind Controls".into(),
            customer_code: "NWC".into(),
            address: None,
            city: None,
            province: None,
            contact_name: Some("John Doe".into()),
            contact_phone: None,
            contact_email: Some("purchasing@northwind.example".into()),
        })
        .await
        .unwrap()
}

pub async fn seed_manufacturer(services: &AppServices, name: &str) -> manufacturer::Model {
    services
        .manufacturers
        .create_manufacturer(name.to_string())
        .await
        .unwrap()
}

pub async fn seed_supplier(services: &AppServices, name: &str, code: &str) -> supplier::Model {
    services
        .suppliers
        .create_supplier(SupplierInput {
            name: name.to_string(),
            supplier_code: code.to_string(),
            contact_name: None,
            contact_phone: None,
            contact_email: format!("sales@{}.example", code.to_lowercase()),
            address: None,
            city: None,
            province: None,
        })
        .await
        .unwrap()
}

pub async fn seed_part(
    services: &AppServices,
    part_number: &str,
    description: &str,
    manufacturer_id: i32,
) -> part::Model {
    services
        .parts
        .create_part(PartInput {
            part_number: part_number.to_string(),
            description: description.to_string(),
            manufacturer_id,
            unit: part::UnitType::E,
            labour: dec!(0.5),
        })
        .await
        .unwrap()
}

pub async fn seed_bom(services: &AppServices, customer_id: i32) -> bom::Model {
    services
        .boms
        .create_bom(
            CreateBom {
                customer_id,
                job_id: None,
                description: "Panel shop retrofit".into(),
                notes: None,
            },
            "jdoe",
        )
        .await
        .unwrap()
}
