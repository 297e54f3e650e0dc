//! RFQ generation and lifecycle: supplier routing, idempotent generation,
//! lock/unlock recomputation, and dispatch gating on the mail transport.

mod common;

use assert_matches::assert_matches;
use common::*;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::Ordering;

use bomlink_api::entities::bom::BomStatus;
use bomlink_api::entities::rfq::RfqStatus;
use bomlink_api::errors::ServiceError;
use bomlink_api::services::rfqs::{GenerationPlan, ItemQuote, RfqItemUpdate};

/// Ready BOM with two manufacturers, each mapped to its own supplier:
/// Acme (2 lines) -> Electro Supply, Bolt Co (1 line) -> Fastenal.
struct Fixture {
    bom_id: i32,
    electro_id: i32,
    fastenal_id: i32,
    acme_id: i32,
    bolt_id: i32,
}

async fn ready_bom(ctx: &TestContext) -> Fixture {
    let services = &ctx.services;
    let customer = seed_customer(services).await;
    let acme = seed_manufacturer(services, "Acme").await;
    let bolt = seed_manufacturer(services, "Bolt Co").await;
    let electro = seed_supplier(services, "Electro Supply", "ELS").await;
    let fastenal = seed_supplier(services, "Fastenal", "FST").await;
    services
        .suppliers
        .link_manufacturer(electro.id, acme.id)
        .await
        .unwrap();
    services
        .suppliers
        .link_manufacturer(fastenal.id, bolt.id)
        .await
        .unwrap();

    let breaker = seed_part(services, "P1001", "Circuit Breaker", acme.id).await;
    let relay = seed_part(services, "P1002", "Relay", acme.id).await;
    let screw = seed_part(services, "P2001", "M4 Screw", bolt.id).await;

    let bom = seed_bom(services, customer.id).await;
    services.boms.add_item(bom.id, breaker.id, 4, None).await.unwrap();
    services.boms.add_item(bom.id, relay.id, 2, None).await.unwrap();
    services.boms.add_item(bom.id, screw.id, 100, None).await.unwrap();

    let bom = services.boms.get_bom(bom.id).await.unwrap().unwrap();
    assert_eq!(bom.status, BomStatus::Ready);

    Fixture {
        bom_id: bom.id,
        electro_id: electro.id,
        fastenal_id: fastenal.id,
        acme_id: acme.id,
        bolt_id: bolt.id,
    }
}

async fn generate_all(ctx: &TestContext, fixture: &Fixture) -> Vec<i32> {
    let plan = ctx
        .services
        .rfqs
        .plan_generation(fixture.bom_id)
        .await
        .unwrap();
    let assignments = match plan {
        GenerationPlan::Auto { assignments } => assignments,
        GenerationPlan::SelectionRequired { .. } => panic!("expected unambiguous plan"),
    };
    ctx.services
        .rfqs
        .generate(fixture.bom_id, assignments, "jdoe")
        .await
        .unwrap()
}

#[tokio::test]
async fn unambiguous_plan_auto_assigns_suppliers() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;

    let plan = ctx
        .services
        .rfqs
        .plan_generation(fixture.bom_id)
        .await
        .unwrap();
    match plan {
        GenerationPlan::Auto { assignments } => {
            assert_eq!(assignments.len(), 2);
            assert_eq!(assignments.get(&fixture.acme_id), Some(&fixture.electro_id));
            assert_eq!(assignments.get(&fixture.bolt_id), Some(&fixture.fastenal_id));
        }
        GenerationPlan::SelectionRequired { .. } => panic!("expected auto plan"),
    }
}

#[tokio::test]
async fn ambiguous_mapping_requires_selection() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;

    // Second supplier for Acme makes the routing ambiguous
    ctx.services
        .suppliers
        .link_manufacturer(fixture.fastenal_id, fixture.acme_id)
        .await
        .unwrap();

    let plan = ctx
        .services
        .rfqs
        .plan_generation(fixture.bom_id)
        .await
        .unwrap();
    match plan {
        GenerationPlan::SelectionRequired { options } => {
            let acme = options
                .iter()
                .find(|o| o.manufacturer_id == fixture.acme_id)
                .unwrap();
            assert_eq!(acme.options.len(), 2);
        }
        GenerationPlan::Auto { .. } => panic!("expected selection to be required"),
    }
}

#[tokio::test]
async fn generation_groups_items_by_supplier_and_locks_the_bom() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;

    let rfq_ids = generate_all(&ctx, &fixture).await;
    assert_eq!(rfq_ids.len(), 2);

    let bom = ctx
        .services
        .boms
        .get_bom(fixture.bom_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bom.status, BomStatus::Locked);

    let electro_rfq = ctx
        .services
        .rfqs
        .list_rfqs(None, Some(fixture.electro_id), None, 20, 0)
        .await
        .unwrap();
    assert_eq!(electro_rfq.len(), 1);
    let details = ctx.services.rfqs.get_details(electro_rfq[0].id).await.unwrap();
    assert_eq!(details.rfq.status, RfqStatus::Draft);
    assert_eq!(details.items.len(), 2);
    let breaker = details
        .items
        .iter()
        .find(|i| i.part_number == "P1001")
        .unwrap();
    assert_eq!(breaker.quantity, 4);

    let fastenal_rfq = ctx
        .services
        .rfqs
        .list_rfqs(None, Some(fixture.fastenal_id), None, 20, 0)
        .await
        .unwrap();
    let details = ctx.services.rfqs.get_details(fastenal_rfq[0].id).await.unwrap();
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].quantity, 100);
}

#[tokio::test]
async fn regeneration_is_idempotent_on_rfq_and_item() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;

    let mut first = generate_all(&ctx, &fixture).await;
    first.sort_unstable();
    let mut counts_before = Vec::new();
    for rfq_id in &first {
        let details = ctx.services.rfqs.get_details(*rfq_id).await.unwrap();
        assert!(!details.items.is_empty());
        counts_before.push(details.items.len());
    }

    // Same assignment again: no new RFQs, no duplicated items
    let mut assignments = HashMap::new();
    assignments.insert(fixture.acme_id, fixture.electro_id);
    assignments.insert(fixture.bolt_id, fixture.fastenal_id);
    let mut second = ctx
        .services
        .rfqs
        .generate(fixture.bom_id, assignments, "jdoe")
        .await
        .unwrap();
    second.sort_unstable();
    assert_eq!(first, second);

    for (rfq_id, count_before) in second.iter().zip(counts_before) {
        let details = ctx.services.rfqs.get_details(*rfq_id).await.unwrap();
        assert_eq!(details.items.len(), count_before);
    }
}

#[tokio::test]
async fn unmapped_manufacturer_lines_are_not_quoted() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let services = &ctx.services;

    // A third manufacturer with a line on the BOM but no supplier mapping
    let ghost = seed_manufacturer(services, "Ghost Industrial").await;
    let widget = seed_part(services, "G9000", "Widget", ghost.id).await;
    services
        .boms
        .add_item(fixture.bom_id, widget.id, 7, None)
        .await
        .unwrap();

    let rfq_ids = generate_all(&ctx, &fixture).await;
    for rfq_id in rfq_ids {
        let details = services.rfqs.get_details(rfq_id).await.unwrap();
        assert!(details.items.iter().all(|i| i.part_number != "G9000"));
    }
}

#[tokio::test]
async fn deleting_all_rfqs_unlocks_the_bom() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;

    ctx.services.rfqs.delete_rfq(rfq_ids[0]).await.unwrap();
    let bom = ctx
        .services
        .boms
        .get_bom(fixture.bom_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bom.status, BomStatus::Locked);

    ctx.services.rfqs.delete_rfq(rfq_ids[1]).await.unwrap();
    let bom = ctx
        .services
        .boms
        .get_bom(fixture.bom_id)
        .await
        .unwrap()
        .unwrap();
    // Locked is not sticky: the last RFQ's deletion recomputes the status
    assert_eq!(bom.status, BomStatus::Ready);
}

#[tokio::test]
async fn locked_bom_refuses_item_deletion_and_bom_deletion() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    generate_all(&ctx, &fixture).await;

    let items = ctx.services.boms.list_items(fixture.bom_id).await.unwrap();
    let err = ctx.services.boms.delete_item(items[0].id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    let err = ctx.services.boms.delete_bom(fixture.bom_id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn send_failure_leaves_rfq_in_draft() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;
    let rfq_id = rfq_ids[0];

    ctx.mailer.fail.store(true, Ordering::SeqCst);
    let err = ctx.services.rfqs.send(rfq_id).await.unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));

    let rfq = ctx.services.rfqs.get_rfq(rfq_id).await.unwrap().unwrap();
    assert_eq!(rfq.status, RfqStatus::Draft);
    assert!(rfq.sent_date.is_none());
    assert!(ctx.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn send_composes_quote_request_and_flips_status() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;
    let rfq_id = rfq_ids[0];

    let sent = ctx.services.rfqs.send(rfq_id).await.unwrap();
    assert_eq!(sent.status, RfqStatus::Sent);
    assert!(sent.sent_date.is_some());

    let mails = ctx.mailer.sent.lock().unwrap();
    assert_eq!(mails.len(), 1);
    let mail = &mails[0];
    let number = format!("RFQ-{:06}", rfq_id);
    assert!(mail.subject.contains(&number));
    assert!(mail.html_body.contains(&number));
    let attachment = mail.attachment.as_ref().unwrap();
    assert_eq!(attachment.filename, format!("{}.xlsx", number));
    // XLSX attachments are zip archives
    assert_eq!(&attachment.bytes[..2], b"PK");

    // Sending twice is rejected and the sent date is untouched
    drop(mails);
    let err = ctx.services.rfqs.send(rfq_id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn item_edits_are_draft_only() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;
    let rfq_id = rfq_ids[0];
    let details = ctx.services.rfqs.get_details(rfq_id).await.unwrap();
    let item_id = details.items[0].id;

    // Draft: quantity edits and deletions allowed
    ctx.services
        .rfqs
        .update_items(
            rfq_id,
            vec![RfqItemUpdate {
                id: item_id,
                quantity: 9,
                notes: Some("rush".into()),
            }],
            vec![],
        )
        .await
        .unwrap();
    let details = ctx.services.rfqs.get_details(rfq_id).await.unwrap();
    let edited = details.items.iter().find(|i| i.id == item_id).unwrap();
    assert_eq!(edited.quantity, 9);

    ctx.services.rfqs.send(rfq_id).await.unwrap();

    let err = ctx
        .services
        .rfqs
        .update_items(
            rfq_id,
            vec![RfqItemUpdate {
                id: item_id,
                quantity: 1,
                notes: None,
            }],
            vec![],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    let err = ctx.services.rfqs.delete_rfq(rfq_id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn quote_recording_requires_sent_and_transitions_to_received() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;
    let rfq_id = rfq_ids[0];
    let details = ctx.services.rfqs.get_details(rfq_id).await.unwrap();
    let item_id = details.items[0].id;

    let quote = vec![ItemQuote {
        id: item_id,
        uom: Some("E".into()),
        price: Some(dec!(12.50)),
        eta: Some("2 weeks".into()),
    }];

    // Draft: rejected
    let err = ctx
        .services
        .rfqs
        .record_quote(rfq_id, quote.clone())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    ctx.services.rfqs.send(rfq_id).await.unwrap();
    let received = ctx.services.rfqs.record_quote(rfq_id, quote).await.unwrap();
    assert_eq!(received.status, RfqStatus::Received);

    let details = ctx.services.rfqs.get_details(rfq_id).await.unwrap();
    let quoted = details.items.iter().find(|i| i.id == item_id).unwrap();
    assert_eq!(quoted.price.unwrap().round_dp(2), dec!(12.50));
    // First item of the Electro RFQ is P1001 with quantity 4
    assert_eq!(quoted.quantity, 4);
    assert_eq!(quoted.line_total.round_dp(2), dec!(50.00));
    assert_eq!(details.total.round_dp(2), dec!(50.00));

    // Received is terminal for cancelation
    let err = ctx.services.rfqs.cancel(rfq_id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn cancel_is_reachable_from_sent_only() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;
    let rfq_id = rfq_ids[0];

    let err = ctx.services.rfqs.cancel(rfq_id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    ctx.services.rfqs.send(rfq_id).await.unwrap();
    let canceled = ctx.services.rfqs.cancel(rfq_id).await.unwrap();
    assert_eq!(canceled.status, RfqStatus::Canceled);
}

#[tokio::test]
async fn rfq_export_rows_carry_supplier_columns() {
    let ctx = TestContext::new().await;
    let fixture = ready_bom(&ctx).await;
    let rfq_ids = generate_all(&ctx, &fixture).await;
    let rfq_id = rfq_ids[0];

    let (number, rows) = ctx.services.rfqs.export_rows(rfq_id).await.unwrap();
    assert_eq!(number, format!("RFQ-{:06}", rfq_id));
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| !r.supplier.is_empty()));

    let csv = bomlink_api::export::rfq_items_csv(&rows).unwrap();
    assert!(csv.starts_with("PartNumber,Description,Quantity,UOM,Manufacturer,Supplier,Price,ETA"));
}
