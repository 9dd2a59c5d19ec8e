//! Tab-separated report payloads: header normalization, row shaping and
//! folding rows into stores.

use crate::store::KeyedDiskStore;
use crate::types::{InventoryRow, KeyBy, MwsError, Order, OrderItem, Result};
use chrono::{DateTime, Utc};
use csv::{ByteRecord, Reader, ReaderBuilder};
use rust_decimal::{Decimal, RoundingStrategy};
use std::io::Read;
use std::str::FromStr;
use tracing::debug;

pub const ORDER_ID_COLUMN: &str = "amazon-order-id";
pub const ORDER_DATE_COLUMN: &str = "purchase-date";

pub fn tsv_reader<R: Read>(source: R) -> Reader<R> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(source)
}

/// Lower-cased, trimmed header row. Fails when the payload has none.
pub fn read_header<R: Read>(reader: &mut Reader<R>) -> Result<Vec<String>> {
    let mut record = ByteRecord::new();
    if !reader.read_byte_record(&mut record)? {
        return Err(MwsError::InvalidReportFormat("Missing header row".to_string()));
    }
    Ok(record
        .iter()
        .map(|cell| decode_cell(cell).trim().to_lowercase())
        .collect())
}

pub fn require_columns(header: &[String], required: &[&str]) -> Result<()> {
    for column in required {
        if !header.iter().any(|name| name == column) {
            return Err(MwsError::InvalidReportFormat(format!(
                "Invalid format of header, missing column {}",
                column
            )));
        }
    }
    Ok(())
}

/// Pairs a data row with the header, padding short rows with empty cells and
/// dropping cells past the header length.
pub fn combine(header: &[String], record: &ByteRecord) -> InventoryRow {
    header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cell = record.get(i).map(decode_cell).unwrap_or_default();
            (name.clone(), cell)
        })
        .collect()
}

/// Reports are usually UTF-8; older ones arrive as ISO-8859-1.
fn decode_cell(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Calls `visit` for every data row, already combined with the header.
pub fn for_each_row<R, F>(source: R, required: &[&str], mut visit: F) -> Result<Vec<String>>
where
    R: Read,
    F: FnMut(InventoryRow) -> Result<()>,
{
    let mut reader = tsv_reader(source);
    let header = read_header(&mut reader)?;
    require_columns(&header, required)?;

    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        visit(combine(&header, &record))?;
    }
    Ok(header)
}

/// Stores every row under its `sku` or `asin` cell. Returns the number of rows.
pub fn fold_inventory<R: Read>(
    source: R,
    key_by: KeyBy,
    store: &mut KeyedDiskStore<InventoryRow>,
) -> Result<usize> {
    let mut rows = 0;
    let key_column = key_by.column();
    for_each_row(source, &["sku", "asin"], |row| {
        let key = row.get(key_column).cloned().unwrap_or_default();
        store.set(key, &row)?;
        rows += 1;
        Ok(())
    })?;
    debug!("Folded {} inventory rows keyed by {}", rows, key_column);
    Ok(rows)
}

/// Groups order lines by order id. Lines of an order already in `store` are
/// appended to it. Returns the number of lines.
pub fn fold_orders<R: Read>(source: R, store: &mut KeyedDiskStore<Order>) -> Result<usize> {
    let mut lines = 0;
    for_each_row(source, &[ORDER_ID_COLUMN, ORDER_DATE_COLUMN], |row| {
        let id = cell(&row, ORDER_ID_COLUMN);
        let mut order = match store.get(&id)? {
            Some(order) => order,
            None => order_from_row(&row),
        };
        order.items.push(item_from_row(&row));
        store.set(&id, &order)?;
        lines += 1;
        Ok(())
    })?;
    debug!("Folded {} order lines into {} orders", lines, store.len());
    Ok(lines)
}

fn order_from_row(row: &InventoryRow) -> Order {
    Order {
        id: cell(row, ORDER_ID_COLUMN),
        date: DateTime::parse_from_rfc3339(row.get(ORDER_DATE_COLUMN).map_or("", |s| s.trim()))
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        fba: cell(row, "fulfillment-channel").eq_ignore_ascii_case("amazon"),
        status: cell(row, "order-status"),
        ship_service_level: cell(row, "ship-service-level"),
        city: cell(row, "ship-city"),
        state: cell(row, "ship-state"),
        postal_code: cell(row, "ship-postal-code"),
        country: cell(row, "ship-country"),
        items: Vec::new(),
    }
}

fn item_from_row(row: &InventoryRow) -> OrderItem {
    let money = |name: &str| money(row.get(name).map_or("", |s| s.as_str()));
    OrderItem {
        asin: cell(row, "asin"),
        sku: cell(row, "sku"),
        title: cell(row, "product-name"),
        qty: crate::types::leading_integer(row.get("quantity").map_or("", |s| s.as_str())).unwrap_or(0),
        price: money("item-price"),
        shipping: money("shipping-price"),
        handling: money("gift-wrap-price"),
        tax: add_money(add_money(money("item-tax"), money("shipping-tax")), money("gift-wrap-tax")),
        discount: add_money(money("item-promotion-discount"), money("ship-promotion-discount")),
    }
}

fn cell(row: &InventoryRow, name: &str) -> String {
    row.get(name).map(|value| value.trim().to_string()).unwrap_or_default()
}

/// Two decimal places, truncated. Anything unparsable is zero.
pub fn money(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim())
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

pub fn add_money(a: Decimal, b: Decimal) -> Decimal {
    (a + b).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}
