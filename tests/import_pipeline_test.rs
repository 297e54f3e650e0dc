//! Import pipeline front-ends: spreadsheet and OCR ingestion end-to-end,
//! plus property tests over the normalization/aggregation helpers.

mod common;

use assert_matches::assert_matches;
use common::*;
use proptest::prelude::*;
use rstest::rstest;
use rust_decimal_macros::dec;
use rust_xlsxwriter::Workbook;
use std::sync::Arc;
use tokio::sync::mpsc;

use bomlink_api::entities::bom::BomStatus;
use bomlink_api::errors::ServiceError;
use bomlink_api::events::EventSender;
use bomlink_api::services::imports::{
    aggregate_raw_rows, normalize_part_number, parse_quantity, ImportService,
};

fn sample_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Part Number").unwrap();
    sheet.write_string(0, 1, "Qty").unwrap();
    sheet.write_string(1, 0, "ABC-123").unwrap();
    sheet.write_number(1, 1, 2.0).unwrap();
    sheet.write_string(2, 0, "abc123").unwrap();
    sheet.write_number(2, 1, 3.0).unwrap();
    sheet.write_string(3, 0, "GHOST").unwrap();
    sheet.write_number(3, 1, 0.0).unwrap();
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn xlsx_import_shares_the_csv_contract() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    seed_part(services, "ABC123", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;

    let summary = services
        .imports
        .import_xlsx(bom.id, sample_workbook(), 0, 1)
        .await
        .unwrap();
    assert_eq!(summary.matched, 1);
    assert!(summary.drafted.is_empty());
    assert!(!summary.needs_review);

    let items = services.boms.list_items(bom.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].part_number, "ABC123");
    assert_eq!(items[0].quantity, 5);
}

#[tokio::test]
async fn ocr_import_pairs_alternating_lines() {
    let ctx = TestContext::with_ocr_text("P1001\n4\nP1002\n2\n").await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    seed_part(services, "P1001", "Circuit Breaker", acme.id).await;
    let bom = seed_bom(services, customer.id).await;

    let summary = services.imports.import_ocr(bom.id, vec![0u8; 4]).await.unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.drafted, vec!["P1002".to_string()]);
    assert_eq!(summary.processed, 2);

    let items = services.boms.list_items(bom.id).await.unwrap();
    assert_eq!(items[0].quantity, 4);
    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Incomplete);
}

#[tokio::test]
async fn ocr_failure_persists_nothing() {
    let ctx = TestContext::new().await;
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let bom = seed_bom(services, customer.id).await;

    let (tx, _rx) = mpsc::channel(16);
    let imports = ImportService::new(
        ctx.db.clone(),
        EventSender::new(tx),
        Arc::new(FailingOcr),
    );

    let err = imports.import_ocr(bom.id, vec![0u8; 4]).await.unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));

    // The external call happens before any write: no items, no drafts,
    // no version bump.
    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Draft);
    assert_eq!(bom.version.round_dp(1), dec!(1.0));
    assert!(services.boms.list_items(bom.id).await.unwrap().is_empty());
    assert!(services
        .boms
        .list_draft_items(bom.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn import_into_missing_bom_is_not_found() {
    let ctx = TestContext::new().await;
    let err = ctx
        .services
        .imports
        .import_csv(404, b"PartNumber,Qty\nP1,1\n", 0, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[rstest]
#[case("5", Some(5))]
#[case(" 7 ", Some(7))]
#[case("0", None)]
#[case("-1", None)]
#[case("four", None)]
#[case("", None)]
#[case("2.5", None)]
fn quantity_parsing_accepts_positive_integers_only(
    #[case] raw: &str,
    #[case] expected: Option<i32>,
) {
    assert_eq!(parse_quantity(raw), expected);
}

proptest! {
    #[test]
    fn normalized_part_numbers_are_uppercase_alphanumeric(raw in ".{0,40}") {
        let normalized = normalize_part_number(&raw);
        prop_assert!(normalized
            .chars()
            .all(|c| c.is_alphanumeric() && !c.is_lowercase()));
    }

    #[test]
    fn normalization_is_idempotent(raw in ".{0,40}") {
        let once = normalize_part_number(&raw);
        prop_assert_eq!(normalize_part_number(&once), once.clone());
    }

    #[test]
    fn aggregation_total_matches_sum_of_valid_rows(
        rows in proptest::collection::vec(("[A-Za-z0-9-]{1,8}", 0i32..100), 0..20)
    ) {
        let expected: i64 = rows
            .iter()
            .filter(|(part, qty)| !normalize_part_number(part).is_empty() && *qty >= 1)
            .map(|(_, qty)| *qty as i64)
            .sum();
        let agg = aggregate_raw_rows(
            rows.into_iter().map(|(part, qty)| (part, qty.to_string())),
        );
        let total: i64 = agg.values().map(|q| *q as i64).sum();
        prop_assert_eq!(total, expected);
    }
}
