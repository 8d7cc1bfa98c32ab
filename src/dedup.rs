//! Stage 2: collapse repeated transactions to their most recent occurrence.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;

use crate::{error::PipelineError, normalize::filled_text, record::StagingRecord};

/// Which representation of the transaction date participates in the grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateBasis {
    /// The typed date produced by normalization.
    Normalized,
    /// The date text as ingested. Format variants of one day form separate groups.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DateKey<'a> {
    Parsed(NaiveDate),
    Text(Option<&'a str>),
}

/// Customer, store, date, product and quantity, with text and quantity taken as
/// they will be published so blanks and the sentinel compare equal.
type GroupKey<'a> = (Option<i64>, &'a str, DateKey<'a>, &'a str, i64);

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    pub kept: usize,
    /// Identities removed, ascending.
    pub discarded: Vec<u64>,
    pub duplicate_groups: usize,
}

fn group_key<'a>(
    record: &'a StagingRecord,
    basis: DateBasis,
    sentinel: &'a str,
) -> Result<GroupKey<'a>, PipelineError> {
    let date = match basis {
        DateBasis::Normalized => DateKey::Parsed(record.transaction_date.ok_or_else(|| {
            PipelineError::Integrity(format!(
                "row {} reached deduplication without a normalized date",
                record.identity
            ))
        })?),
        DateBasis::Raw => DateKey::Text(record.transaction_date_raw.as_deref()),
    };
    Ok((
        record.customer_id,
        filled_text(record.store_name.as_deref(), sentinel),
        date,
        filled_text(record.product_name.as_deref(), sentinel),
        record.quantity.unwrap_or(0),
    ))
}

/// Rank within a group: later date first, then later identity. `None` dates tie.
fn outranks(candidate: &StagingRecord, current: &StagingRecord) -> bool {
    (candidate.transaction_date, candidate.identity) > (current.transaction_date, current.identity)
}

/// Keeps one record per grouping key. Survivors stay in ingest order.
///
/// Blank store and product names key as `sentinel` and a null quantity as zero,
/// matching what the fill stage will publish.
pub fn deduplicate(
    records: Vec<StagingRecord>,
    basis: DateBasis,
    sentinel: &str,
) -> Result<(Vec<StagingRecord>, DedupOutcome), PipelineError> {
    let mut best: HashMap<GroupKey<'_>, usize> = HashMap::with_capacity(records.len());
    let mut group_sizes: HashMap<GroupKey<'_>, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        let key = group_key(record, basis, sentinel)?;
        *group_sizes.entry(key).or_insert(0) += 1;
        best.entry(key)
            .and_modify(|current| {
                if outranks(record, &records[*current]) {
                    *current = idx;
                }
            })
            .or_insert(idx);
    }
    let duplicate_groups = group_sizes.values().filter(|size| **size > 1).count();
    let survivors: HashSet<usize> = best.into_values().collect();
    drop(group_sizes);

    let mut kept = Vec::with_capacity(survivors.len());
    let mut discarded = Vec::new();
    for (idx, record) in records.into_iter().enumerate() {
        if survivors.contains(&idx) {
            kept.push(record);
        } else {
            debug!("Discarding duplicate row {}", record.identity);
            discarded.push(record.identity);
        }
    }
    discarded.sort_unstable();
    info!(
        "Deduplicated on {:?} dates: kept {} row(s), discarded {} across {} group(s)",
        basis,
        kept.len(),
        discarded.len(),
        duplicate_groups
    );
    let outcome = DedupOutcome {
        kept: kept.len(),
        discarded,
        duplicate_groups,
    };
    Ok((kept, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SENTINEL: &str = "UNKNOWN";

    fn record(identity: u64, customer: i64, date_text: &str, quantity: i64) -> StagingRecord {
        let parts: Vec<u32> = date_text.split('-').map(|p| p.parse().unwrap()).collect();
        StagingRecord {
            identity,
            customer_id: Some(customer),
            store_name: Some("Northside".to_string()),
            transaction_date_raw: Some(date_text.to_string()),
            transaction_date: NaiveDate::from_ymd_opt(parts[2] as i32, parts[1], parts[0]),
            aisle: Some("Produce".to_string()),
            product_name: Some("Apples".to_string()),
            quantity: Some(quantity),
            unit_price: None,
            total_amount: None,
            discount_amount: None,
            final_amount: None,
            loyalty_points: None,
            pricing_issue: false,
            discount_issue: false,
            loyalty_corrected: false,
        }
    }

    #[test]
    fn later_identity_wins_among_exact_duplicates() {
        let records = vec![record(5, 1, "01-01-2024", 2), record(9, 1, "01-01-2024", 2)];
        let (kept, outcome) = deduplicate(records, DateBasis::Normalized, SENTINEL).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identity, 9);
        assert_eq!(outcome.discarded, vec![5]);
        assert_eq!(outcome.duplicate_groups, 1);
    }

    #[test]
    fn differing_quantity_is_not_a_duplicate() {
        let records = vec![record(1, 1, "01-01-2024", 2), record(2, 1, "01-01-2024", 3)];
        let (kept, outcome) = deduplicate(records, DateBasis::Normalized, SENTINEL).unwrap();
        assert_eq!(kept.len(), 2);
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn raw_basis_splits_format_variants() {
        let mut variant = record(2, 1, "01-01-2024", 2);
        variant.transaction_date_raw = Some("1-1-2024".to_string());
        let records = vec![record(1, 1, "01-01-2024", 2), variant];

        let (raw_kept, _) = deduplicate(records.clone(), DateBasis::Raw, SENTINEL).unwrap();
        assert_eq!(raw_kept.len(), 2);

        let (normalized_kept, _) = deduplicate(records, DateBasis::Normalized, SENTINEL).unwrap();
        assert_eq!(normalized_kept.len(), 1);
        assert_eq!(normalized_kept[0].identity, 2);
    }

    #[test]
    fn raw_basis_ranks_by_identity_without_parsed_dates() {
        let mut first = record(3, 1, "01-01-2024", 1);
        let mut second = record(8, 1, "01-01-2024", 1);
        first.transaction_date = None;
        second.transaction_date = None;
        let (kept, _) = deduplicate(vec![second, first], DateBasis::Raw, SENTINEL).unwrap();
        assert_eq!(kept[0].identity, 8);
    }

    #[test]
    fn normalized_basis_requires_parsed_dates() {
        let mut pending = record(1, 1, "01-01-2024", 1);
        pending.transaction_date = None;
        let err = deduplicate(vec![pending], DateBasis::Normalized, SENTINEL).unwrap_err();
        assert!(matches!(err, PipelineError::Integrity(_)));
    }

    #[test]
    fn survivors_keep_ingest_order() {
        let records = vec![
            record(1, 3, "02-01-2024", 1),
            record(2, 1, "01-01-2024", 1),
            record(3, 3, "02-01-2024", 1),
            record(4, 2, "01-01-2024", 1),
        ];
        let (kept, _) = deduplicate(records, DateBasis::Normalized, SENTINEL).unwrap();
        let ids: Vec<u64> = kept.iter().map(|r| r.identity).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn blank_text_groups_with_the_sentinel() {
        let mut blank = record(1, 1, "01-01-2024", 2);
        blank.store_name = None;
        blank.aisle = Some("Dairy".to_string());
        let mut named = record(2, 1, "01-01-2024", 2);
        named.store_name = Some(SENTINEL.to_string());
        named.aisle = Some("Frozen".to_string());
        let (kept, outcome) =
            deduplicate(vec![blank, named], DateBasis::Normalized, SENTINEL).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identity, 2);
        assert_eq!(outcome.discarded, vec![1]);
    }

    #[test]
    fn null_quantity_groups_with_zero() {
        let mut missing = record(1, 1, "01-01-2024", 0);
        missing.quantity = None;
        let zero = record(2, 1, "01-01-2024", 0);
        let (kept, _) = deduplicate(vec![missing, zero], DateBasis::Normalized, SENTINEL).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identity, 2);
    }

    proptest! {
        #[test]
        fn deduplication_is_idempotent(
            rows in proptest::collection::vec((0i64..4, 1u32..4, 0i64..3), 0..40)
        ) {
            let records: Vec<StagingRecord> = rows
                .iter()
                .enumerate()
                .map(|(idx, (customer, day, quantity))| {
                    record(idx as u64 + 1, *customer, &format!("{day:02}-01-2024"), *quantity)
                })
                .collect();
            let (once, _) = deduplicate(records, DateBasis::Normalized, SENTINEL).unwrap();
            let (twice, outcome) =
                deduplicate(once.clone(), DateBasis::Normalized, SENTINEL).unwrap();
            prop_assert_eq!(&once, &twice);
            prop_assert!(outcome.discarded.is_empty());
        }
    }
}
