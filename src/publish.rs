//! Stage 5: materialize the immutable, indexed analytical dataset.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{info, warn};
use serde::Serialize;

use crate::{
    error::PipelineError,
    index::{DatasetIndex, LookupQuery},
    io_utils,
    record::{COLUMNS, CleanRecord, HeaderMap, StagingRecord},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub published: usize,
    /// Exact duplicates caught by the final safety net.
    pub exact_duplicates_removed: usize,
}

/// Cleaned records plus their lookup index. Read-only once built.
#[derive(Debug, Clone)]
pub struct CleanDataset {
    records: Vec<CleanRecord>,
    index: DatasetIndex,
}

impl CleanDataset {
    /// Converts the repaired working set into published records.
    pub fn publish(
        staging: Vec<StagingRecord>,
    ) -> Result<(Self, PublishOutcome), PipelineError> {
        let converted = staging
            .into_iter()
            .map(to_clean)
            .collect::<Result<Vec<_>, _>>()?;
        let before = converted.len();

        let mut seen = HashSet::with_capacity(before);
        let records: Vec<CleanRecord> = converted
            .into_iter()
            .filter(|record| {
                let fresh = seen.insert(record.clone());
                if !fresh {
                    warn!(
                        "Dropping exact duplicate at publication: {:?}",
                        record.key()
                    );
                }
                fresh
            })
            .collect();

        let dataset = Self::from_records(records)?;
        let outcome = PublishOutcome {
            published: dataset.len(),
            exact_duplicates_removed: before - dataset.len(),
        };
        info!(
            "Published {} row(s); safety net removed {}",
            outcome.published, outcome.exact_duplicates_removed
        );
        Ok((dataset, outcome))
    }

    /// Indexes already-clean records, enforcing key uniqueness.
    pub fn from_records(records: Vec<CleanRecord>) -> Result<Self, PipelineError> {
        let mut keys = HashSet::with_capacity(records.len());
        for record in &records {
            if !keys.insert(record.key()) {
                return Err(PipelineError::Integrity(format!(
                    "duplicate transaction key {:?} survived deduplication",
                    record.key()
                )));
            }
        }
        drop(keys);
        let index = DatasetIndex::build(&records);
        Ok(CleanDataset { records, index })
    }

    pub fn load(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let records = read_clean_records(path, delimiter, encoding)?;
        Self::from_records(records).with_context(|| format!("Indexing dataset {path:?}"))
    }

    pub fn records(&self) -> &[CleanRecord] {
        &self.records
    }

    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lookup(&self, query: &LookupQuery) -> Vec<&CleanRecord> {
        lookup_with(&self.index, &self.records, query)
    }

    pub fn write(&self, path: Option<&Path>, delimiter: u8) -> Result<usize> {
        io_utils::write_table(
            path,
            delimiter,
            &COLUMNS,
            self.records.iter().map(CleanRecord::to_row),
        )
    }
}

/// Resolves a query through `index` against `records` (which the index must describe).
pub fn lookup_with<'a>(
    index: &DatasetIndex,
    records: &'a [CleanRecord],
    query: &LookupQuery,
) -> Vec<&'a CleanRecord> {
    index
        .select(query)
        .into_iter()
        .filter_map(|row| records.get(row))
        .collect()
}

/// Reads a published CSV without re-checking invariants.
pub fn read_clean_records(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<CleanRecord>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let map = HeaderMap::resolve(&headers)
        .with_context(|| format!("Validating headers for {path:?}"))?;
    let mut records = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let row_number = idx as u64 + 2;
        let record = record.with_context(|| format!("Reading row {row_number} in {path:?}"))?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        records.push(
            CleanRecord::from_row(&map, &decoded, row_number)
                .with_context(|| format!("Parsing row {row_number} in {path:?}"))?,
        );
    }
    Ok(records)
}

fn to_clean(record: StagingRecord) -> Result<CleanRecord, PipelineError> {
    let identity = record.identity;
    let missing = |what: &str| {
        PipelineError::Integrity(format!("row {identity} reached publication without {what}"))
    };
    Ok(CleanRecord {
        customer_id: record.customer_id,
        store_name: record.store_name.ok_or_else(|| missing("a store name"))?,
        transaction_date: record
            .transaction_date
            .ok_or_else(|| missing("a normalized date"))?,
        aisle: record.aisle.ok_or_else(|| missing("an aisle"))?,
        product_name: record.product_name.ok_or_else(|| missing("a product name"))?,
        quantity: record.quantity.ok_or_else(|| missing("a quantity"))?,
        unit_price: record.unit_price,
        total_amount: record.total_amount.ok_or_else(|| missing("a total"))?,
        discount_amount: record.discount_amount.ok_or_else(|| missing("a discount"))?,
        final_amount: record.final_amount.ok_or_else(|| missing("a final amount"))?,
        loyalty_points: record.loyalty_points,
    })
}
