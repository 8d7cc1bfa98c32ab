use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{info, warn};
use rust_decimal::Decimal;

use crate::{
    cli::VerifyArgs,
    error::PipelineError,
    io_utils,
    record::{CleanRecord, HeaderMap, ISO_DATE_FORMAT, RawRecord},
    repair,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub row: u64,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub rows: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn execute(args: &VerifyArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let report = verify_file(&args.input, delimiter, encoding)?;
    for violation in &report.violations {
        warn!("Row {}: {}", violation.row, violation.message);
    }
    if let Some(first) = report.violations.first() {
        return Err(PipelineError::Integrity(format!(
            "{} violation(s) in {:?}; first at row {}: {}",
            report.violations.len(),
            args.input,
            first.row,
            first.message
        ))
        .into());
    }
    info!("✓ {:?} holds every published invariant ({} row(s))", args.input, report.rows);
    Ok(())
}

/// Re-reads a published CSV and collects every invariant violation by row number.
pub fn verify_file(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<VerifyReport> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let map = HeaderMap::resolve(&headers)
        .with_context(|| format!("Validating headers for {path:?}"))?;

    let mut report = VerifyReport::default();
    let mut parsed = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let row = idx as u64 + 2;
        let record = record.with_context(|| format!("Reading row {row} in {path:?}"))?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        report.rows += 1;
        match CleanRecord::from_row(&map, &decoded, row) {
            Ok(clean) => {
                let raw = RawRecord::from_row(&map, &decoded);
                let date_text = raw.transaction_date.as_deref().map_or("", str::trim);
                for message in check_record(&clean, date_text) {
                    report.violations.push(Violation { row, message });
                }
                parsed.push((row, clean));
            }
            Err(err) => report.violations.push(Violation {
                row,
                message: err.to_string(),
            }),
        }
    }

    let mut first_seen = HashMap::with_capacity(parsed.len());
    for (row, record) in &parsed {
        if let Some(previous) = first_seen.insert(record.key(), *row) {
            report.violations.push(Violation {
                row: *row,
                message: format!("duplicates the transaction key of row {previous}"),
            });
        }
    }
    report.violations.sort_by_key(|v| v.row);
    Ok(report)
}

/// Row-local checks; key uniqueness is handled by the caller.
pub fn check_record(record: &CleanRecord, date_text: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let expected = repair::repair(
        Some(record.quantity),
        record.unit_price,
        Some(record.discount_amount),
        None,
    );
    if record.total_amount != expected.total {
        problems.push(format!(
            "total_amount {} does not match quantity x unit_price ({})",
            record.total_amount, expected.total
        ));
    }
    if record.discount_amount < Decimal::ZERO
        || record.discount_amount > record.total_amount.max(Decimal::ZERO)
    {
        problems.push(format!(
            "discount_amount {} is outside [0, {}]",
            record.discount_amount,
            record.total_amount.max(Decimal::ZERO)
        ));
    }
    if record.final_amount != (record.total_amount - record.discount_amount).max(Decimal::ZERO) {
        problems.push(format!(
            "final_amount {} does not equal total minus discount",
            record.final_amount
        ));
    }
    if record.loyalty_points.is_some_and(|points| points < 0) {
        problems.push("loyalty_points is negative".to_string());
    }
    if [&record.store_name, &record.aisle, &record.product_name]
        .iter()
        .any(|text| text.trim().is_empty())
    {
        problems.push("text field is blank".to_string());
    }
    if record.transaction_date.format(ISO_DATE_FORMAT).to_string() != date_text {
        problems.push(format!("transaction_date '{date_text}' is not a canonical ISO date"));
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;
    use tempfile::tempdir;

    const HEADER: &str = concat!(
        "customer_id,store_name,transaction_date,aisle,product_name,quantity,",
        "unit_price,total_amount,discount_amount,final_amount,loyalty_points\n",
    );

    fn verify(rows: &str) -> VerifyReport {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clean.csv");
        std::fs::write(&path, format!("{HEADER}{rows}")).unwrap();
        verify_file(&path, b',', UTF_8).unwrap()
    }

    #[test]
    fn consistent_dataset_passes() {
        let report = verify(
            "1,North,2024-01-01,Dairy,Milk,2,1.50,3.00,0.00,3.00,0\n\
             ,South,2024-01-02,UNKNOWN,Eggs,1,,0.00,0.00,0.00,\n",
        );
        assert_eq!(report.rows, 2);
        assert!(report.is_clean(), "{:?}", report.violations);
    }

    #[test]
    fn money_inconsistency_is_reported_with_row_number() {
        let report = verify(
            "1,North,2024-01-01,Dairy,Milk,2,1.50,3.00,0.00,3.00,0\n\
             2,North,2024-01-01,Dairy,Bread,1,2.00,5.00,0.00,5.00,0\n",
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].row, 3);
        assert!(report.violations[0].message.contains("total_amount"));
    }

    #[test]
    fn duplicate_keys_and_negative_loyalty_are_caught() {
        let report = verify(
            "1,North,2024-01-01,Dairy,Milk,2,1.50,3.00,0.00,3.00,-1\n\
             1,North,2024-01-01,Frozen,Milk,2,1.50,3.00,0.00,3.00,0\n",
        );
        let rows: Vec<u64> = report.violations.iter().map(|v| v.row).collect();
        assert_eq!(rows, vec![2, 3]);
        assert!(report.violations[1].message.contains("row 2"));
    }

    #[test]
    fn padded_cells_are_read_as_their_trimmed_values() {
        let report = verify("1, North , 2024-01-01 ,Dairy,Milk,2,1.50,3.00,0.00,3.00,0\n");
        assert!(report.is_clean(), "{:?}", report.violations);
    }

    #[test]
    fn unparseable_rows_become_violations() {
        let report = verify("1,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0.00,3.00,0\n");
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].message.contains("transaction_date"));
    }
}
