//! Linear batch run over one raw snapshot.
//!
//! The working set is a `Vec<StagingRecord>` moved from stage to stage; no
//! stage observes another's intermediate state. Dates are normalized before
//! deduplication unless `dedup_on_raw_dates` asks for the legacy order.

use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use serde::Serialize;

use crate::{
    config::PipelineConfig,
    dedup::{self, DateBasis, DedupOutcome},
    ingest::{self, RawBatch},
    io_utils,
    normalize::{self, DateNormalizer, FillCounts},
    publish::{CleanDataset, PublishOutcome},
    quarantine::Quarantine,
    record::{StagingRecord, format_money},
    repair::{self, RepairCounts},
};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_sha256: String,
    pub stage_order: Vec<&'static str>,
    pub dedup_basis: DateBasis,
    pub raw_rows: usize,
    pub quarantined: usize,
    pub dedup: DedupOutcome,
    pub fills: FillCounts,
    pub repairs: RepairCounts,
    pub publish: PublishOutcome,
}

impl RunSummary {
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating summary file {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Writing summary to {path:?}"))
    }
}

/// Flags and identity of one repaired staging row, kept for offline audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub identity: u64,
    pub customer_id: Option<i64>,
    pub store_name: String,
    pub transaction_date: Option<NaiveDate>,
    pub product_name: String,
    pub quantity: i64,
    pub total_amount: String,
    pub discount_amount: String,
    pub final_amount: String,
    pub pricing_issue: bool,
    pub discount_issue: bool,
    pub loyalty_corrected: bool,
}

impl AuditEntry {
    const HEADERS: [&'static str; 12] = [
        "identity",
        "customer_id",
        "store_name",
        "transaction_date",
        "product_name",
        "quantity",
        "total_amount",
        "discount_amount",
        "final_amount",
        "pricing_issue",
        "discount_issue",
        "loyalty_corrected",
    ];

    fn from_staging(record: &StagingRecord) -> Self {
        let money =
            |value: Option<rust_decimal::Decimal>| value.map(format_money).unwrap_or_default();
        AuditEntry {
            identity: record.identity,
            customer_id: record.customer_id,
            store_name: record.store_name.clone().unwrap_or_default(),
            transaction_date: record.transaction_date,
            product_name: record.product_name.clone().unwrap_or_default(),
            quantity: record.quantity.unwrap_or_default(),
            total_amount: money(record.total_amount),
            discount_amount: money(record.discount_amount),
            final_amount: money(record.final_amount),
            pricing_issue: record.pricing_issue,
            discount_issue: record.discount_issue,
            loyalty_corrected: record.loyalty_corrected,
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.pricing_issue || self.discount_issue || self.loyalty_corrected
    }

    fn to_row(&self) -> Vec<String> {
        let flag = |value: bool| if value { "1" } else { "0" }.to_string();
        vec![
            self.identity.to_string(),
            self.customer_id.map(|v| v.to_string()).unwrap_or_default(),
            self.store_name.clone(),
            self.transaction_date
                .map(|d| d.format(crate::record::ISO_DATE_FORMAT).to_string())
                .unwrap_or_default(),
            self.product_name.clone(),
            self.quantity.to_string(),
            self.total_amount.clone(),
            self.discount_amount.clone(),
            self.final_amount.clone(),
            flag(self.pricing_issue),
            flag(self.discount_issue),
            flag(self.loyalty_corrected),
        ]
    }
}

pub fn write_audit(entries: &[AuditEntry], path: &Path, delimiter: u8) -> Result<usize> {
    io_utils::write_table(
        Some(path),
        delimiter,
        &AuditEntry::HEADERS,
        entries.iter().map(AuditEntry::to_row),
    )
}

#[derive(Debug)]
pub struct PipelineRun {
    pub raw: RawBatch,
    pub audit: Vec<AuditEntry>,
    pub quarantine: Quarantine,
    pub dataset: CleanDataset,
    pub summary: RunSummary,
}

pub fn run(raw: RawBatch, config: &PipelineConfig) -> Result<PipelineRun> {
    config.validate()?;
    let normalizer = DateNormalizer::new(&config.date_format)?;
    let mut quarantine = Quarantine::new(config.malformed);

    let staged = ingest::stage(&raw.records, &mut quarantine).context("Staging raw rows")?;
    info!("Staged {} of {} raw row(s)", staged.len(), raw.len());

    let (basis, stage_order) = if config.dedup_on_raw_dates {
        info!("Deduplicating on raw date text before normalization");
        (
            DateBasis::Raw,
            vec!["ingest", "deduplicate", "normalize_dates", "fill_missing", "repair", "publish"],
        )
    } else {
        (
            DateBasis::Normalized,
            vec!["ingest", "normalize_dates", "deduplicate", "fill_missing", "repair", "publish"],
        )
    };

    let sentinel = config.unknown_sentinel.as_str();
    let (deduped, dedup_outcome) = match basis {
        DateBasis::Normalized => {
            let dated =
                normalize::normalize_dates(staged, &normalizer, &raw.records, &mut quarantine)
                    .context("Normalizing transaction dates")?;
            dedup::deduplicate(dated, basis, sentinel)?
        }
        DateBasis::Raw => {
            let (deduped, outcome) = dedup::deduplicate(staged, basis, sentinel)?;
            let dated =
                normalize::normalize_dates(deduped, &normalizer, &raw.records, &mut quarantine)
                    .context("Normalizing transaction dates")?;
            (dated, outcome)
        }
    };

    let (filled, fills) = normalize::fill_missing(deduped, &config.unknown_sentinel);
    let (repaired, repairs) = repair::repair_records(filled);
    let audit = repaired.iter().map(AuditEntry::from_staging).collect::<Vec<_>>();
    let (dataset, publish) = CleanDataset::publish(repaired).context("Publishing dataset")?;

    let summary = RunSummary {
        input_sha256: raw.digest.clone(),
        stage_order,
        dedup_basis: basis,
        raw_rows: raw.len(),
        quarantined: quarantine.len(),
        dedup: dedup_outcome,
        fills,
        repairs,
        publish,
    };
    Ok(PipelineRun {
        raw,
        audit,
        quarantine,
        dataset,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MalformedPolicy;
    use encoding_rs::UTF_8;
    use rust_decimal::Decimal;

    const HEADER: &str = concat!(
        "customer_id,store_name,transaction_date,aisle,product_name,quantity,",
        "unit_price,total_amount,discount_amount,final_amount,loyalty_points\n",
    );

    fn batch(rows: &[&str]) -> RawBatch {
        let mut input = HEADER.to_string();
        for row in rows {
            input.push_str(row);
            input.push('\n');
        }
        ingest::parse_raw(input.as_bytes(), b',', UTF_8).unwrap()
    }

    #[test]
    fn end_to_end_scenarios_hold() {
        let raw = batch(&[
            "1,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,0",
            "1,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,0",
            "2,South,02-01-2024,Bakery,Bread,3,10.00,30.00,40.00,0.00,5",
            "3,,03-01-2024,,Eggs,1,,4.00,,4.00,1",
            "4,North,04-01-2024,Produce,Apples,5,9.40,47.00,0,47.00,-5",
        ]);
        let run = run(raw, &PipelineConfig::default()).unwrap();
        let records = run.dataset.records();
        assert_eq!(records.len(), 4);
        assert_eq!(run.summary.dedup.discarded, vec![1]);

        let bread = records.iter().find(|r| r.product_name == "Bread").unwrap();
        assert_eq!(bread.total_amount, Decimal::new(3000, 2));
        assert_eq!(bread.discount_amount, Decimal::new(3000, 2));
        assert_eq!(bread.final_amount, Decimal::ZERO);

        let eggs = records.iter().find(|r| r.product_name == "Eggs").unwrap();
        assert_eq!(eggs.store_name, "UNKNOWN");
        assert_eq!(eggs.aisle, "UNKNOWN");
        assert_eq!(eggs.total_amount, Decimal::ZERO);
        assert_eq!(eggs.unit_price, None);

        let apples = records.iter().find(|r| r.product_name == "Apples").unwrap();
        assert_eq!(apples.loyalty_points, Some(4));

        let flagged: Vec<u64> = run
            .audit
            .iter()
            .filter(|entry| entry.is_flagged())
            .map(|entry| entry.identity)
            .collect();
        assert_eq!(flagged, vec![3, 4, 5]);
        assert!(run.audit.iter().any(|e| e.identity == 3 && e.discount_issue));
        assert!(run.audit.iter().any(|e| e.identity == 4 && e.pricing_issue));
        assert!(run.audit.iter().any(|e| e.identity == 5 && e.loyalty_corrected));
    }

    #[test]
    fn malformed_date_is_fatal_by_default() {
        let raw = batch(&["1,North,2024-01-01,Dairy,Milk,2,1.50,3.00,0,3.00,0"]);
        let err = run(raw, &PipelineConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("2024-01-01"));
    }

    #[test]
    fn malformed_date_can_be_quarantined() {
        let raw = batch(&[
            "1,North,2024-01-01,Dairy,Milk,2,1.50,3.00,0,3.00,0",
            "2,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,0",
        ]);
        let config = PipelineConfig {
            malformed: MalformedPolicy::Quarantine,
            ..PipelineConfig::default()
        };
        let run = run(raw, &config).unwrap();
        assert_eq!(run.dataset.len(), 1);
        assert_eq!(run.summary.quarantined, 1);
        assert_eq!(run.quarantine.rows()[0].identity, 1);
    }

    #[test]
    fn blank_store_deduplicates_against_the_sentinel() {
        let raw = batch(&[
            "1,,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,0",
            "1,UNKNOWN,01-01-2024,Frozen,Milk,2,1.50,3.00,0,3.00,0",
        ]);
        let run = run(raw, &PipelineConfig::default()).unwrap();
        assert_eq!(run.dataset.len(), 1);
        assert_eq!(run.summary.dedup.discarded, vec![1]);
        assert_eq!(run.dataset.records()[0].aisle, "Frozen");
        assert_eq!(run.summary.publish.exact_duplicates_removed, 0);
    }

    #[test]
    fn raw_date_order_is_recorded_in_summary() {
        let raw = batch(&[
            "1,North,01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,0",
            "1,North, 01-01-2024,Dairy,Milk,2,1.50,3.00,0,3.00,0",
        ]);
        let config = PipelineConfig {
            dedup_on_raw_dates: true,
            ..PipelineConfig::default()
        };
        let run = run(raw, &config).unwrap();
        assert_eq!(run.summary.dedup_basis, DateBasis::Raw);
        assert_eq!(run.summary.stage_order[1], "deduplicate");
        // text is trimmed at staging, so both rows share the raw key
        assert_eq!(run.dataset.len(), 1);
    }
}
