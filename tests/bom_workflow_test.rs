//! BOM aggregate workflow: import reconciliation, draft review, status
//! recomputation and version tracking against a live (in-memory) store.

mod common;

use assert_matches::assert_matches;
use common::*;
use rust_decimal_macros::dec;

use bomlink_api::entities::bom::BomStatus;
use bomlink_api::errors::ServiceError;

const CSV: &[u8] = b"PartNumber,Qty\nABC-123,2\nabc123,3\nUNKNOWN-9,4\nBAD,zero\nGHOST,0\n";

#[tokio::test]
async fn new_bom_starts_as_draft_version_one() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;

    let bom = seed_bom(services, customer.id).await;
    assert_eq!(bom.status, BomStatus::Draft);
    assert_eq!(bom.version, dec!(1.0));
    assert_eq!(bom.number(), format!("BOM-{:06}", bom.id));
}

#[tokio::test]
async fn import_batch_reconciles_against_catalog() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    seed_part(services, "ABC123", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;

    let summary = services.imports.import_csv(bom.id, CSV, 0, 1).await.unwrap();

    // ABC-123 and abc123 normalize to one group of quantity 5; UNKNOWN-9
    // has no catalog match; the zero and non-numeric rows contribute nothing.
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.drafted, vec!["UNKNOWN9".to_string()]);
    assert_eq!(summary.processed, 2);
    assert!(summary.needs_review);

    let items = services.boms.list_items(bom.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].part_number, "ABC123");
    assert_eq!(items[0].quantity, 5);
    assert_eq!(items[0].manufacturer, "Acme");

    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Incomplete);
    assert_eq!(bom.version.round_dp(1), dec!(1.1));
}

#[tokio::test]
async fn reimport_accumulates_into_existing_lines_and_drafts() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    seed_part(services, "ABC123", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;

    services.imports.import_csv(bom.id, CSV, 0, 1).await.unwrap();
    services.imports.import_csv(bom.id, CSV, 0, 1).await.unwrap();

    let items = services.boms.list_items(bom.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 10);

    let drafts = services.boms.list_draft_items(bom.id).await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].part_number, "UNKNOWN9");
    assert_eq!(drafts[0].quantity, 8);

    // One version bump per batch, not per row
    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.version.round_dp(1), dec!(1.2));
}

#[tokio::test]
async fn empty_batch_still_bumps_version_once() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let bom = seed_bom(services, customer.id).await;

    let summary = services
        .imports
        .import_csv(bom.id, b"PartNumber,Qty\n", 0, 1)
        .await
        .unwrap();
    assert_eq!(summary.processed, 0);
    assert!(!summary.needs_review);

    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Draft);
    assert_eq!(bom.version.round_dp(1), dec!(1.1));
}

#[tokio::test]
async fn draft_confirmation_requires_catalog_part() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    seed_part(services, "ABC123", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;
    services.imports.import_csv(bom.id, CSV, 0, 1).await.unwrap();

    let drafts = services.boms.list_draft_items(bom.id).await.unwrap();
    let draft_id = drafts[0].id;

    // Part still missing: confirmation is rejected, BOM stays Incomplete
    let err = services.boms.confirm_draft_item(draft_id).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Catalog catches up; confirmation promotes the draft
    seed_part(services, "UNKNOWN9", "Relay", acme.id).await;
    services.boms.confirm_draft_item(draft_id).await.unwrap();

    let items = services.boms.list_items(bom.id).await.unwrap();
    assert_eq!(items.len(), 2);
    let promoted = items.iter().find(|i| i.part_number == "UNKNOWN9").unwrap();
    assert_eq!(promoted.quantity, 4);

    assert!(services
        .boms
        .list_draft_items(bom.id)
        .await
        .unwrap()
        .is_empty());
    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Ready);
}

#[tokio::test]
async fn rejecting_last_draft_recomputes_status() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    seed_part(services, "ABC123", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;
    services.imports.import_csv(bom.id, CSV, 0, 1).await.unwrap();

    let drafts = services.boms.list_draft_items(bom.id).await.unwrap();
    services.boms.reject_draft_item(drafts[0].id).await.unwrap();

    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Ready);
}

#[tokio::test]
async fn single_item_form_rejects_duplicates_and_bad_quantities() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    let breaker = seed_part(services, "P1001", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;

    services
        .boms
        .add_item(bom.id, breaker.id, 2, None)
        .await
        .unwrap();

    let err = services
        .boms
        .add_item(bom.id, breaker.id, 1, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = services.boms.add_item(bom.id, breaker.id, 0, None).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = services.boms.add_item(bom.id, 9999, 1, None).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn part_in_use_cannot_be_deleted() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    let breaker = seed_part(services, "P1001", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;
    services
        .boms
        .add_item(bom.id, breaker.id, 2, None)
        .await
        .unwrap();

    let err = services.parts.delete_part(breaker.id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn deleting_last_item_resets_to_draft() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    let breaker = seed_part(services, "P1001", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;
    let item = services
        .boms
        .add_item(bom.id, breaker.id, 2, None)
        .await
        .unwrap();

    services.boms.delete_item(item.id).await.unwrap();

    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Draft);
    assert_eq!(bom.version.round_dp(1), dec!(1.2));
}

#[tokio::test]
async fn bom_export_rows_mirror_item_table() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    let breaker = seed_part(services, "P1001", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;
    services
        .boms
        .add_item(bom.id, breaker.id, 3, None)
        .await
        .unwrap();

    let (bom_model, rows) = services.boms.export_rows(bom.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].part_number, "P1001");
    assert_eq!(rows[0].quantity, 3);
    assert_eq!(rows[0].manufacturer, "Acme");

    let csv = bomlink_api::export::bom_items_csv(&rows).unwrap();
    assert!(csv.starts_with("PartNumber,Description,Quantity,Manufacturer"));
    assert!(csv.contains("P1001,Circuit Breaker,3,Acme"));
    assert_eq!(bom_model.number(), format!("BOM-{:06}", bom_model.id));
}
