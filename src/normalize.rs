//! Stage 3: date normalization and missing-value fill.

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use log::{debug, info};
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    error::PipelineError,
    quarantine::Quarantine,
    record::{RawRecord, StagingRecord, TRANSACTION_DATE},
};

/// Strict parser for the raw transaction date text.
///
/// chrono alone accepts single-digit days and months for `%d`/`%m`, so the
/// text is first matched against a fixed-width pattern derived from the format.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    format: String,
    pattern: Regex,
}

impl DateNormalizer {
    pub fn new(format: &str) -> Result<Self> {
        let pattern = Regex::new(&fixed_width_pattern(format)?)?;
        Ok(DateNormalizer {
            format: format.to_string(),
            pattern,
        })
    }

    pub fn parse(&self, identity: u64, text: Option<&str>) -> Result<NaiveDate, PipelineError> {
        let value = text.map(str::trim).unwrap_or("");
        if value.is_empty() {
            return Err(PipelineError::format(
                identity,
                TRANSACTION_DATE,
                value,
                "date is missing",
            ));
        }
        if !self.pattern.is_match(value) {
            return Err(PipelineError::format(
                identity,
                TRANSACTION_DATE,
                value,
                format!("expected format {}", self.format),
            ));
        }
        NaiveDate::parse_from_str(value, &self.format).map_err(|err| {
            PipelineError::format(identity, TRANSACTION_DATE, value, err.to_string())
        })
    }
}

fn fixed_width_pattern(format: &str) -> Result<String> {
    let mut pattern = String::from("^");
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            pattern.push_str(&regex::escape(&ch.to_string()));
            continue;
        }
        match chars.next() {
            Some('d') | Some('m') | Some('y') => pattern.push_str(r"\d{2}"),
            Some('Y') => pattern.push_str(r"\d{4}"),
            Some('%') => pattern.push('%'),
            Some(other) => {
                return Err(anyhow!(
                    "Unsupported specifier '%{other}' in date format '{format}'"
                ));
            }
            None => return Err(anyhow!("Date format '{format}' ends with a bare '%'")),
        }
    }
    pattern.push('$');
    Ok(pattern)
}

/// Parses every record's date text, routing failures through the quarantine policy.
pub fn normalize_dates(
    records: Vec<StagingRecord>,
    normalizer: &DateNormalizer,
    raw: &[RawRecord],
    quarantine: &mut Quarantine,
) -> Result<Vec<StagingRecord>> {
    let before = records.len();
    let mut normalized = Vec::with_capacity(before);
    for mut record in records {
        match normalizer.parse(record.identity, record.transaction_date_raw.as_deref()) {
            Ok(date) => {
                record.transaction_date = Some(date);
                normalized.push(record);
            }
            Err(err) => {
                let source = raw
                    .get(record.identity as usize - 1)
                    .ok_or_else(|| anyhow!("No raw row for identity {}", record.identity))?;
                quarantine.absorb(record.identity, source, err)?;
            }
        }
    }
    info!(
        "Normalized dates on {} row(s); {} quarantined",
        normalized.len(),
        before - normalized.len()
    );
    Ok(normalized)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FillCounts {
    pub store_name: usize,
    pub aisle: usize,
    pub product_name: usize,
    pub quantity: usize,
    pub discount_amount: usize,
}

/// Replaces blank text with `sentinel` and null quantity/discount with zero.
/// Unit price and totals are left alone for the repair stage.
pub fn fill_missing(
    mut records: Vec<StagingRecord>,
    sentinel: &str,
) -> (Vec<StagingRecord>, FillCounts) {
    let mut counts = FillCounts::default();
    for record in records.iter_mut() {
        counts.store_name += fill_text(&mut record.store_name, sentinel) as usize;
        counts.aisle += fill_text(&mut record.aisle, sentinel) as usize;
        counts.product_name += fill_text(&mut record.product_name, sentinel) as usize;
        if record.quantity.is_none() {
            record.quantity = Some(0);
            counts.quantity += 1;
        }
        if record.discount_amount.is_none() {
            record.discount_amount = Some(Decimal::ZERO);
            counts.discount_amount += 1;
        }
    }
    debug!("Missing-value fill counts: {counts:?}");
    (records, counts)
}

/// The value `fill_missing` publishes for a text field: trimmed, or `sentinel` when blank.
pub fn filled_text<'a>(field: Option<&'a str>, sentinel: &'a str) -> &'a str {
    field
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(sentinel)
}

fn fill_text(field: &mut Option<String>, sentinel: &str) -> bool {
    let blank = field.as_deref().is_none_or(|text| text.trim().is_empty());
    *field = Some(filled_text(field.as_deref(), sentinel).to_string());
    blank
}
