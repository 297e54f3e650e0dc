//! Import reconciliation pipeline: takes (part-number, quantity) rows from
//! CSV, spreadsheet or OCR text, aggregates them by normalized part number,
//! and merges them into a BOM — resolved lines where the catalog matches,
//! draft lines where it does not.

use calamine::{Data, Reader, Xlsx};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{bom_item, draft_bom_item, part},
    errors::ServiceError,
    events::{Event, EventSender},
    ocr::OcrClient,
    services::boms::refresh_bom_state,
};

/// Strips everything that is not a letter or digit and uppercases the rest.
/// The empty result means the token carried no usable part number.
pub fn normalize_part_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Quantities must be positive integers; anything else drops the row.
pub fn parse_quantity(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok().filter(|q| *q >= 1)
}

/// Accumulates quantities by normalized part number. Rows with an empty
/// normalized token or an unparseable/non-positive quantity contribute
/// nothing (row-level tolerance).
pub fn aggregate_raw_rows<I>(rows: I) -> BTreeMap<String, i32>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut quantities = BTreeMap::new();
    for (part_raw, quantity_raw) in rows {
        let key = normalize_part_number(&part_raw);
        if key.is_empty() {
            continue;
        }
        let Some(quantity) = parse_quantity(&quantity_raw) else {
            continue;
        };
        let entry = quantities.entry(key).or_insert(0i32);
        *entry = entry.saturating_add(quantity);
    }
    quantities
}

/// Same aggregation for rows whose quantity is already numeric (OCR path).
pub fn aggregate_parsed_rows<I>(rows: I) -> BTreeMap<String, i32>
where
    I: IntoIterator<Item = (String, i32)>,
{
    let mut quantities = BTreeMap::new();
    for (part_raw, quantity) in rows {
        let key = normalize_part_number(&part_raw);
        if key.is_empty() || quantity < 1 {
            continue;
        }
        let entry = quantities.entry(key).or_insert(0i32);
        *entry = entry.saturating_add(quantity);
    }
    quantities
}

/// Scans OCR text with a sliding two-line window: every consecutive line
/// pair whose second line parses as an integer is a (part, quantity)
/// candidate. The window does not consume matched lines, so a quantity
/// line can itself become the next candidate's part number — this is a
/// positional heuristic for strictly alternating two-column layouts, not a
/// table extractor.
pub fn parse_ocr_line_pairs(text: &str) -> Vec<(String, i32)> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut pairs = Vec::new();
    for window in lines.windows(2) {
        let part = window[0];
        if let Ok(quantity) = window[1].parse::<i32>() {
            if !part.is_empty() {
                pairs.push((part.to_string(), quantity));
            }
        }
    }
    pairs
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

/// Result of one import batch.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    /// Matched-or-drafted part-number groups
    pub processed: usize,
    /// Groups attached as resolved lines
    pub matched: usize,
    /// Part numbers parked as drafts for review
    pub drafted: Vec<String>,
    /// True when any group went to drafts
    pub needs_review: bool,
}

/// Service running the import pipeline against a BOM.
#[derive(Clone)]
pub struct ImportService {
    db: Arc<DbPool>,
    events: EventSender,
    ocr: Arc<dyn OcrClient>,
}

impl ImportService {
    pub fn new(db: Arc<DbPool>, events: EventSender, ocr: Arc<dyn OcrClient>) -> Self {
        Self { db, events, ocr }
    }

    /// Delimited text with a header row; the caller designates the 0-based
    /// part-number and quantity columns.
    #[instrument(skip(self, bytes))]
    pub async fn import_csv(
        &self,
        bom_id: i32,
        bytes: &[u8],
        part_column: usize,
        quantity_column: usize,
    ) -> Result<ImportSummary, ServiceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            // Malformed rows are skipped, same as unparseable ones
            let Ok(record) = record else { continue };
            let part = record.get(part_column).unwrap_or_default().to_string();
            let quantity = record.get(quantity_column).unwrap_or_default().to_string();
            rows.push((part, quantity));
        }

        self.apply_to_bom(bom_id, aggregate_raw_rows(rows)).await
    }

    /// First worksheet of an XLSX workbook; same column-index contract as
    /// CSV, first row treated as header.
    #[instrument(skip(self, bytes))]
    pub async fn import_xlsx(
        &self,
        bom_id: i32,
        bytes: Vec<u8>,
        part_column: usize,
        quantity_column: usize,
    ) -> Result<ImportSummary, ServiceError> {
        let mut workbook = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| ServiceError::BadRequest(format!("Could not read spreadsheet: {}", e)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ServiceError::BadRequest("Spreadsheet has no worksheets".into()))?
            .map_err(|e| ServiceError::BadRequest(format!("Could not read spreadsheet: {}", e)))?;

        let rows: Vec<(String, String)> = range
            .rows()
            .skip(1)
            .map(|row| {
                (
                    row.get(part_column).map(cell_text).unwrap_or_default(),
                    row.get(quantity_column).map(cell_text).unwrap_or_default(),
                )
            })
            .collect();

        self.apply_to_bom(bom_id, aggregate_raw_rows(rows)).await
    }

    /// Image/PDF via the OCR collaborator. The external call happens before
    /// any database write, so an OCR failure leaves the BOM untouched.
    #[instrument(skip(self, bytes))]
    pub async fn import_ocr(
        &self,
        bom_id: i32,
        bytes: Vec<u8>,
    ) -> Result<ImportSummary, ServiceError> {
        let text = self
            .ocr
            .extract_text(bytes)
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        let pairs = parse_ocr_line_pairs(&text);
        self.apply_to_bom(bom_id, aggregate_parsed_rows(pairs)).await
    }

    /// Merges an aggregated batch into the BOM: exact catalog matches
    /// upsert resolved lines, the rest upsert drafts. One status recompute
    /// and one version bump per batch, all in one transaction.
    #[instrument(skip(self, quantities))]
    pub async fn apply_to_bom(
        &self,
        bom_id: i32,
        quantities: BTreeMap<String, i32>,
    ) -> Result<ImportSummary, ServiceError> {
        let db = &*self.db;
        let bom_model = crate::entities::bom::Entity::find_by_id(bom_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;

        let mut matched = 0usize;
        let mut drafted = Vec::new();

        let txn = db.begin().await?;
        for (part_number, quantity) in &quantities {
            let catalog_part = part::Entity::find()
                .filter(part::Column::PartNumber.eq(part_number.clone()))
                .one(&txn)
                .await?;

            match catalog_part {
                Some(catalog_part) => {
                    let existing = bom_item::Entity::find()
                        .filter(bom_item::Column::BomId.eq(bom_id))
                        .filter(bom_item::Column::PartId.eq(catalog_part.id))
                        .one(&txn)
                        .await?;
                    match existing {
                        Some(item) => {
                            let total = item.quantity.saturating_add(*quantity);
                            let mut active: bom_item::ActiveModel = item.into();
                            active.quantity = Set(total);
                            active.updated_at = Set(Utc::now());
                            active.update(&txn).await?;
                        }
                        None => {
                            let now = Utc::now();
                            bom_item::ActiveModel {
                                id: sea_orm::ActiveValue::NotSet,
                                bom_id: Set(bom_id),
                                part_id: Set(catalog_part.id),
                                quantity: Set(*quantity),
                                notes: Set(None),
                                created_at: Set(now),
                                updated_at: Set(now),
                            }
                            .insert(&txn)
                            .await?;
                        }
                    }
                    matched += 1;
                }
                None => {
                    let existing = draft_bom_item::Entity::find()
                        .filter(draft_bom_item::Column::BomId.eq(bom_id))
                        .filter(draft_bom_item::Column::PartNumber.eq(part_number.clone()))
                        .one(&txn)
                        .await?;
                    match existing {
                        Some(draft) => {
                            let total = draft.quantity.saturating_add(*quantity);
                            let mut active: draft_bom_item::ActiveModel = draft.into();
                            active.quantity = Set(total);
                            active.update(&txn).await?;
                        }
                        None => {
                            draft_bom_item::ActiveModel {
                                id: sea_orm::ActiveValue::NotSet,
                                bom_id: Set(bom_id),
                                part_number: Set(part_number.clone()),
                                quantity: Set(*quantity),
                                is_resolved: Set(false),
                                created_at: Set(Utc::now()),
                            }
                            .insert(&txn)
                            .await?;
                        }
                    }
                    drafted.push(part_number.clone());
                }
            }
        }

        let refresh = refresh_bom_state(&txn, bom_model, true).await?;
        txn.commit().await?;

        let summary = ImportSummary {
            processed: matched + drafted.len(),
            matched,
            needs_review: !drafted.is_empty(),
            drafted,
        };

        info!(
            bom_id,
            processed = summary.processed,
            matched = summary.matched,
            drafted = summary.drafted.len(),
            "Import batch applied"
        );
        self.events
            .send_or_log(Event::BomItemsImported {
                bom_id,
                processed: summary.processed,
                drafted: summary.drafted.len(),
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

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_and_uppercases() {
        assert_eq!(normalize_part_number("ABC-123"), "ABC123");
        assert_eq!(normalize_part_number("abc123"), "ABC123");
        assert_eq!(normalize_part_number("  p/n 10.5 "), "PN105");
        assert_eq!(normalize_part_number("---"), "");
        assert_eq!(normalize_part_number(""), "");
    }

    #[test]
    fn variant_spellings_aggregate_to_one_group() {
        let rows = vec![
            ("ABC-123".to_string(), "2".to_string()),
            ("abc123".to_string(), "3".to_string()),
        ];
        let agg = aggregate_raw_rows(rows);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.get("ABC123"), Some(&5));
    }

    #[test]
    fn bad_quantities_contribute_nothing() {
        let rows = vec![
            ("P1".to_string(), "0".to_string()),
            ("P2".to_string(), "-4".to_string()),
            ("P3".to_string(), "four".to_string()),
            ("P4".to_string(), "".to_string()),
            ("".to_string(), "7".to_string()),
            ("P5".to_string(), "2".to_string()),
        ];
        let agg = aggregate_raw_rows(rows);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.get("P5"), Some(&2));
    }

    #[test]
    fn ocr_pairs_alternating_lines() {
        let text = "P1001\n4\nP1002\n2\n";
        let pairs = parse_ocr_line_pairs(text);
        assert_eq!(
            pairs,
            vec![("P1001".to_string(), 4), ("P1002".to_string(), 2)]
        );
    }

    #[test]
    fn ocr_window_does_not_consume_quantity_lines() {
        // Two adjacent numeric lines make the first quantity double as the
        // next candidate's part number; the aggregate step then treats "4"
        // as a (numeric) part number. Literal behavior of the heuristic.
        let pairs = parse_ocr_line_pairs("P1001\n4\n7\nP1002");
        assert_eq!(pairs, vec![("P1001".to_string(), 4), ("4".to_string(), 7)]);
    }

    #[test]
    fn ocr_skips_non_numeric_followers() {
        let pairs = parse_ocr_line_pairs("P1001\nP1002\n3");
        assert_eq!(pairs, vec![("P1002".to_string(), 3)]);
    }

    #[test]
    fn ocr_negative_quantities_parse_but_aggregate_drops_them() {
        let pairs = parse_ocr_line_pairs("P1001\n-2");
        assert_eq!(pairs, vec![("P1001".to_string(), -2)]);
        let agg = aggregate_parsed_rows(pairs);
        assert!(agg.is_empty());
    }

    #[test]
    fn csv_cells_and_numeric_spreadsheet_cells_read_alike() {
        assert_eq!(cell_text(&Data::String(" P1001 ".into())), "P1001");
        assert_eq!(cell_text(&Data::Float(5.0)), "5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
