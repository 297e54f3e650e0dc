//! Document builders for BOM and RFQ tables: CSV and XLSX exports, the
//! quote-request spreadsheet attached to outbound RFQ mail, and the mail
//! body itself. Pure functions over already-loaded rows.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook};

pub const XLSX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_MIME: &str = "text/csv";

/// One resolved BOM line joined with its part and manufacturer.
#[derive(Debug, Clone)]
pub struct BomExportRow {
    pub part_number: String,
    pub description: String,
    pub quantity: i32,
    pub manufacturer: String,
}

/// One RFQ line joined with its BOM item, part, manufacturer and supplier.
#[derive(Debug, Clone)]
pub struct RfqExportRow {
    pub part_number: String,
    pub description: String,
    pub quantity: i32,
    pub uom: Option<String>,
    pub manufacturer: String,
    pub supplier: String,
    pub price: Option<Decimal>,
    pub eta: Option<String>,
}

fn finish_csv(wtr: csv::Writer<Vec<u8>>) -> anyhow::Result<String> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow!("csv flush failed: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// CSV export of a BOM's item table.
pub fn bom_items_csv(rows: &[BomExportRow]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["PartNumber", "Description", "Quantity", "Manufacturer"])?;
    for row in rows {
        wtr.write_record([
            row.part_number.as_str(),
            row.description.as_str(),
            &row.quantity.to_string(),
            row.manufacturer.as_str(),
        ])?;
    }
    finish_csv(wtr)
}

/// XLSX export of a BOM's item table. The sheet carries the BOM number.
pub fn bom_items_workbook(bom_number: &str, rows: &[BomExportRow]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(bom_number)?;

    let headers = ["Part Number", "Description", "Quantity", "Manufacturer"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, &row.part_number)?;
        sheet.write_string(r, 1, &row.description)?;
        sheet.write_number(r, 2, row.quantity as f64)?;
        sheet.write_string(r, 3, &row.manufacturer)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// CSV export of an RFQ's item table, including the supplier-filled columns.
pub fn rfq_items_csv(rows: &[RfqExportRow]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "PartNumber",
        "Description",
        "Quantity",
        "UOM",
        "Manufacturer",
        "Supplier",
        "Price",
        "ETA",
    ])?;
    for row in rows {
        wtr.write_record([
            row.part_number.as_str(),
            row.description.as_str(),
            &row.quantity.to_string(),
            row.uom.as_deref().unwrap_or(""),
            row.manufacturer.as_str(),
            row.supplier.as_str(),
            &row.price.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            row.eta.as_deref().unwrap_or(""),
        ])?;
    }
    finish_csv(wtr)
}

/// XLSX export of an RFQ's item table, including the supplier-filled columns.
pub fn rfq_items_workbook(rfq_number: &str, rows: &[RfqExportRow]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(rfq_number)?;

    let headers = [
        "Part Number",
        "Description",
        "Quantity",
        "UOM",
        "Manufacturer",
        "Supplier",
        "Price",
        "ETA",
    ];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    let money = Format::new().set_num_format("$#,##0.00");
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, &row.part_number)?;
        sheet.write_string(r, 1, &row.description)?;
        sheet.write_number(r, 2, row.quantity as f64)?;
        sheet.write_string(r, 3, row.uom.as_deref().unwrap_or(""))?;
        sheet.write_string(r, 4, &row.manufacturer)?;
        sheet.write_string(r, 5, &row.supplier)?;
        if let Some(price) = row.price {
            sheet.write_number_with_format(r, 6, decimal_to_f64(price), &money)?;
        }
        sheet.write_string(r, 7, row.eta.as_deref().unwrap_or(""))?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// The spreadsheet attached to the outbound quote request: part number,
/// description, quantity, manufacturer, and blank price/UOM/ETA columns for
/// the supplier to fill.
pub fn quote_request_workbook(
    rfq_number: &str,
    rows: &[RfqExportRow],
) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(rfq_number)?;

    let headers = [
        "Part Number",
        "Description",
        "Quantity",
        "Manufacturer",
        "Price",
        "UOM",
        "ETA",
    ];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    let money = Format::new().set_num_format("$#,##0.00");
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, &row.part_number)?;
        sheet.write_string(r, 1, &row.description)?;
        sheet.write_number(r, 2, row.quantity as f64)?;
        sheet.write_string(r, 3, &row.manufacturer)?;
        if let Some(price) = row.price {
            sheet.write_number_with_format(r, 4, decimal_to_f64(price), &money)?;
        }
        sheet.write_string(r, 5, row.uom.as_deref().unwrap_or(""))?;
        sheet.write_string(r, 6, row.eta.as_deref().unwrap_or(""))?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

/// Context for composing the outbound quote-request mail.
#[derive(Debug, Clone)]
pub struct RfqMailContext {
    pub rfq_number: String,
    pub supplier_name: String,
    pub created_by: String,
    pub bom_description: String,
    pub due_date: DateTime<Utc>,
}

/// Subject line: `RFQ-000007 - jdoe - Panel shop retrofit`.
pub fn rfq_email_subject(ctx: &RfqMailContext) -> String {
    format!(
        "{} - {} - {}",
        ctx.rfq_number, ctx.created_by, ctx.bom_description
    )
}

/// HTML body of the quote request, with the requested items tabulated.
pub fn rfq_email_html(ctx: &RfqMailContext, rows: &[RfqExportRow]) -> String {
    let mut body = String::new();
    body.push_str(&format!("<p>Dear {},</p>\n", ctx.supplier_name));
    body.push_str("<p>Please find attached the RFQ details.</p>\n");
    body.push_str(&format!(
        "<p><strong>RFQ Number:</strong> {}</p>\n",
        ctx.rfq_number
    ));
    body.push_str(&format!(
        "<p><strong>Created By:</strong> {}</p>\n",
        ctx.created_by
    ));
    body.push_str(&format!(
        "<p><strong>Supplier:</strong> {}</p>\n",
        ctx.supplier_name
    ));
    body.push_str(&format!(
        "<p><strong>Due Date:</strong> {}</p>\n",
        ctx.due_date.format("%Y-%m-%d")
    ));
    body.push_str("<p><strong>Requested Items:</strong></p>\n");
    body.push_str(
        "<table border='1' cellpadding='5' cellspacing='0' \
         style='border-collapse: collapse; width: 100%; text-align: left;'>\n\
         <tr style='background-color: #f2f2f2; font-weight: bold;'>\
         <th>Part Number</th><th>Description</th><th>Quantity</th>\
         <th>Manufacturer</th><th>Price</th><th>UOM</th><th>ETA</th></tr>\n",
    );
    for row in rows {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            row.part_number,
            row.description,
            row.quantity,
            row.manufacturer,
            row.price.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            row.uom.as_deref().unwrap_or(""),
            row.eta.as_deref().unwrap_or(""),
        ));
    }
    body.push_str("</table>\n<p>Kind Regards,</p>\n");
    body.push_str(&format!("<p>{}</p>\n", ctx.created_by));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_rfq_rows() -> Vec<RfqExportRow> {
        vec![
            RfqExportRow {
                part_number: "P1001".into(),
                description: "Circuit Breaker".into(),
                quantity: 4,
                uom: None,
                manufacturer: "Acme".into(),
                supplier: "Electro Supply".into(),
                price: None,
                eta: None,
            },
            RfqExportRow {
                part_number: "P1002".into(),
                description: "Relay".into(),
                quantity: 2,
                uom: Some("E".into()),
                manufacturer: "Acme".into(),
                supplier: "Electro Supply".into(),
                price: Some(dec!(12.50)),
                eta: Some("2 weeks".into()),
            },
        ]
    }

    #[test]
    fn bom_csv_has_header_and_rows() {
        let rows = vec![BomExportRow {
            part_number: "P1001".into(),
            description: "Circuit Breaker".into(),
            quantity: 4,
            manufacturer: "Acme".into(),
        }];
        let csv = bom_items_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("PartNumber,Description,Quantity,Manufacturer")
        );
        assert_eq!(lines.next(), Some("P1001,Circuit Breaker,4,Acme"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn rfq_csv_blank_supplier_columns_until_quoted() {
        let csv = rfq_items_csv(&sample_rfq_rows()).unwrap();
        let mut lines = csv.lines();
        lines.next(); // header
        assert_eq!(
            lines.next(),
            Some("P1001,Circuit Breaker,4,,Acme,Electro Supply,,")
        );
        assert_eq!(
            lines.next(),
            Some("P1002,Relay,2,E,Acme,Electro Supply,12.50,2 weeks")
        );
    }

    #[test]
    fn workbooks_produce_nonempty_xlsx() {
        let rows = sample_rfq_rows();
        let quote = quote_request_workbook("RFQ-000007", &rows).unwrap();
        let export = rfq_items_workbook("RFQ-000007", &rows).unwrap();
        // XLSX files are zip archives
        assert_eq!(&quote[..2], b"PK");
        assert_eq!(&export[..2], b"PK");
    }

    #[test]
    fn email_subject_and_body_carry_rfq_number() {
        let ctx = RfqMailContext {
            rfq_number: "RFQ-000007".into(),
            supplier_name: "Electro Supply".into(),
            created_by: "jdoe".into(),
            bom_description: "Panel shop retrofit".into(),
            due_date: Utc::now(),
        };
        let subject = rfq_email_subject(&ctx);
        assert_eq!(subject, "RFQ-000007 - jdoe - Panel shop retrofit");

        let html = rfq_email_html(&ctx, &sample_rfq_rows());
        assert!(html.contains("RFQ-000007"));
        assert!(html.contains("Dear Electro Supply,"));
        assert!(html.contains("<td>P1001</td>"));
    }
}
