use mws_client::report_format::{add_money, combine, for_each_row, fold_inventory, money, read_header, tsv_reader};
use mws_client::{InventoryRow, KeyBy, KeyedDiskStore, MwsError};
use rust_decimal::Decimal;
use std::str::FromStr;

fn store(tmp: &tempfile::TempDir) -> KeyedDiskStore<InventoryRow> {
    KeyedDiskStore::temporary_in(tmp.path()).unwrap()
}

#[test]
fn test_inventory_keyed_by_sku_or_asin() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = "sku\tasin\nA1\tB1\n";

    let mut by_sku = store(&tmp);
    assert_eq!(fold_inventory(payload.as_bytes(), KeyBy::Sku, &mut by_sku).unwrap(), 1);
    let row = by_sku.get("A1").unwrap().unwrap();
    assert_eq!(row.get("sku").map(String::as_str), Some("A1"));
    assert_eq!(row.get("asin").map(String::as_str), Some("B1"));
    assert_eq!(row.len(), 2);

    let mut by_asin = store(&tmp);
    fold_inventory(payload.as_bytes(), KeyBy::Asin, &mut by_asin).unwrap();
    assert_eq!(by_asin.get("B1").unwrap(), Some(row));
    assert!(!by_asin.contains("A1").unwrap());
}

#[test]
fn test_rows_are_padded_and_truncated() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = " SKU\tAsin \tQuantity\nS1\tA1\nS2\tA2\t5\textra\tcells\n";
    let mut rows = store(&tmp);
    fold_inventory(payload.as_bytes(), KeyBy::Sku, &mut rows).unwrap();

    let short = rows.get("S1").unwrap().unwrap();
    assert_eq!(short.get("quantity").map(String::as_str), Some(""));
    let long = rows.get("S2").unwrap().unwrap();
    assert_eq!(long.len(), 3);
    assert_eq!(long.get("quantity").map(String::as_str), Some("5"));
}

#[test]
fn test_missing_columns_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rows = store(&tmp);
    let result = fold_inventory("sku\tprice\nS1\t1\n".as_bytes(), KeyBy::Sku, &mut rows);
    assert!(matches!(result, Err(MwsError::InvalidReportFormat(message)) if message.contains("asin")));

    let result = fold_inventory("".as_bytes(), KeyBy::Sku, &mut rows);
    assert!(matches!(result, Err(MwsError::InvalidReportFormat(_))));
    assert!(rows.is_empty());
}

#[test]
fn test_quotes_and_latin1_cells_are_kept() {
    let mut payload = b"sku\titem-name\n".to_vec();
    payload.extend_from_slice(b"S1\t12\" \"Deluxe\" pan\n");
    payload.extend_from_slice(b"S2\tCr\xe8me br\xfbl\xe9e\n");

    let mut names = Vec::new();
    let header = for_each_row(payload.as_slice(), &["sku"], |row| {
        names.push(row["item-name"].clone());
        Ok(())
    })
    .unwrap();
    assert_eq!(header, vec!["sku", "item-name"]);
    assert_eq!(names, vec!["12\" \"Deluxe\" pan", "Crème brûlée"]);
}

#[test]
fn test_combine_with_header() {
    let mut reader = tsv_reader("a\tb\tc\n1\t2\n".as_bytes());
    let header = read_header(&mut reader).unwrap();
    let mut record = csv::ByteRecord::new();
    assert!(reader.read_byte_record(&mut record).unwrap());
    let row = combine(&header, &record);
    assert_eq!(row.get("a").map(String::as_str), Some("1"));
    assert_eq!(row.get("c").map(String::as_str), Some(""));
}

#[test]
fn test_money_is_truncated_to_cents() {
    assert_eq!(money("19.999"), Decimal::from_str("19.99").unwrap());
    assert_eq!(money(" -0.019 "), Decimal::from_str("-0.01").unwrap());
    assert_eq!(money(""), Decimal::ZERO);
    assert_eq!(money("n/a"), Decimal::ZERO);
    assert_eq!(
        add_money(Decimal::from_str("0.10").unwrap(), Decimal::from_str("0.20").unwrap()),
        Decimal::from_str("0.30").unwrap()
    );
}
