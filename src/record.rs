//! Transaction record shapes used across the pipeline.
//!
//! - [`RawRecord`]: the row exactly as ingested, every cell optional text.
//! - [`StagingRecord`]: typed working copy carrying the synthetic identity and
//!   the quality flags. Owned and mutated by the pipeline stages.
//! - [`CleanRecord`]: the published, immutable analytical row.
//!
//! Money is always `rust_decimal::Decimal` with two fractional digits on output.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const CUSTOMER_ID: &str = "customer_id";
pub const STORE_NAME: &str = "store_name";
pub const TRANSACTION_DATE: &str = "transaction_date";
pub const AISLE: &str = "aisle";
pub const PRODUCT_NAME: &str = "product_name";
pub const QUANTITY: &str = "quantity";
pub const UNIT_PRICE: &str = "unit_price";
pub const TOTAL_AMOUNT: &str = "total_amount";
pub const DISCOUNT_AMOUNT: &str = "discount_amount";
pub const FINAL_AMOUNT: &str = "final_amount";
pub const LOYALTY_POINTS: &str = "loyalty_points";

/// Column order of both the raw feed and the published dataset.
pub const COLUMNS: [&str; 11] = [
    CUSTOMER_ID,
    STORE_NAME,
    TRANSACTION_DATE,
    AISLE,
    PRODUCT_NAME,
    QUANTITY,
    UNIT_PRICE,
    TOTAL_AMOUNT,
    DISCOUNT_AMOUNT,
    FINAL_AMOUNT,
    LOYALTY_POINTS,
];

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Positions of the required columns within a header row.
#[derive(Debug, Clone, Copy)]
pub struct HeaderMap {
    positions: [usize; COLUMNS.len()],
}

impl HeaderMap {
    /// Resolves every required column, matching names case-insensitively.
    pub fn resolve(headers: &[String]) -> Result<Self, PipelineError> {
        let mut positions = [0usize; COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(COLUMNS.iter()) {
            *slot = headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(column))
                .ok_or_else(|| PipelineError::MissingColumn {
                    column: column.to_string(),
                })?;
        }
        Ok(HeaderMap { positions })
    }

    /// Returns the cell for `column` (an index into [`COLUMNS`]) as read, `None` when blank.
    fn cell(&self, row: &[String], column: usize) -> Option<String> {
        row.get(self.positions[column])
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub customer_id: Option<String>,
    pub store_name: Option<String>,
    pub transaction_date: Option<String>,
    pub aisle: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub total_amount: Option<String>,
    pub discount_amount: Option<String>,
    pub final_amount: Option<String>,
    pub loyalty_points: Option<String>,
}

impl RawRecord {
    pub fn from_row(map: &HeaderMap, row: &[String]) -> Self {
        RawRecord {
            customer_id: map.cell(row, 0),
            store_name: map.cell(row, 1),
            transaction_date: map.cell(row, 2),
            aisle: map.cell(row, 3),
            product_name: map.cell(row, 4),
            quantity: map.cell(row, 5),
            unit_price: map.cell(row, 6),
            total_amount: map.cell(row, 7),
            discount_amount: map.cell(row, 8),
            final_amount: map.cell(row, 9),
            loyalty_points: map.cell(row, 10),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        [
            &self.customer_id,
            &self.store_name,
            &self.transaction_date,
            &self.aisle,
            &self.product_name,
            &self.quantity,
            &self.unit_price,
            &self.total_amount,
            &self.discount_amount,
            &self.final_amount,
            &self.loyalty_points,
        ]
        .into_iter()
        .map(|cell| cell.clone().unwrap_or_default())
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRecord {
    pub identity: u64,
    pub customer_id: Option<i64>,
    pub store_name: Option<String>,
    /// Date text as ingested, kept for dedup keys and quarantine reporting.
    pub transaction_date_raw: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub aisle: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub final_amount: Option<Decimal>,
    pub loyalty_points: Option<i64>,
    pub pricing_issue: bool,
    pub discount_issue: bool,
    pub loyalty_corrected: bool,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

impl StagingRecord {
    /// Types the numeric cells of a raw row and trims its text. Dates stay textual
    /// until normalization.
    pub fn from_raw(identity: u64, raw: &RawRecord) -> Result<Self, PipelineError> {
        Ok(StagingRecord {
            identity,
            customer_id: parse_integer(identity, CUSTOMER_ID, raw.customer_id.as_deref())?,
            store_name: trimmed(raw.store_name.as_deref()),
            transaction_date_raw: trimmed(raw.transaction_date.as_deref()),
            transaction_date: None,
            aisle: trimmed(raw.aisle.as_deref()),
            product_name: trimmed(raw.product_name.as_deref()),
            quantity: parse_integer(identity, QUANTITY, raw.quantity.as_deref())?,
            unit_price: parse_money(identity, UNIT_PRICE, raw.unit_price.as_deref())?,
            total_amount: parse_money(identity, TOTAL_AMOUNT, raw.total_amount.as_deref())?,
            discount_amount: parse_money(
                identity,
                DISCOUNT_AMOUNT,
                raw.discount_amount.as_deref(),
            )?,
            final_amount: parse_money(identity, FINAL_AMOUNT, raw.final_amount.as_deref())?,
            loyalty_points: parse_integer(
                identity,
                LOYALTY_POINTS,
                raw.loyalty_points.as_deref(),
            )?,
            pricing_issue: false,
            discount_issue: false,
            loyalty_corrected: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CleanRecord {
    pub customer_id: Option<i64>,
    pub store_name: String,
    pub transaction_date: NaiveDate,
    pub aisle: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub loyalty_points: Option<i64>,
}

/// Business identity of a cleaned transaction.
pub type RecordKey<'a> = (Option<i64>, &'a str, NaiveDate, &'a str, i64);

impl CleanRecord {
    pub fn key(&self) -> RecordKey<'_> {
        (
            self.customer_id,
            self.store_name.as_str(),
            self.transaction_date,
            self.product_name.as_str(),
            self.quantity,
        )
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.customer_id.map(|v| v.to_string()).unwrap_or_default(),
            self.store_name.clone(),
            self.transaction_date.format(ISO_DATE_FORMAT).to_string(),
            self.aisle.clone(),
            self.product_name.clone(),
            self.quantity.to_string(),
            self.unit_price.map(format_money).unwrap_or_default(),
            format_money(self.total_amount),
            format_money(self.discount_amount),
            format_money(self.final_amount),
            self.loyalty_points.map(|v| v.to_string()).unwrap_or_default(),
        ]
    }

    /// Reads a row of a published dataset. `row_number` is used for error messages only.
    pub fn from_row(
        map: &HeaderMap,
        row: &[String],
        row_number: u64,
    ) -> Result<Self, PipelineError> {
        let raw = RawRecord::from_row(map, row);
        let required_text = |column: &'static str,
                             value: Option<String>|
         -> Result<String, PipelineError> {
            trimmed(value.as_deref())
                .ok_or_else(|| PipelineError::format(row_number, column, "", "value is blank"))
        };
        let required_money = |column: &'static str,
                              value: Option<&str>|
         -> Result<Decimal, PipelineError> {
            parse_money(row_number, column, value)?
                .ok_or_else(|| PipelineError::format(row_number, column, "", "value is blank"))
        };
        let date_text = required_text(TRANSACTION_DATE, raw.transaction_date.clone())?;
        let transaction_date = NaiveDate::parse_from_str(&date_text, ISO_DATE_FORMAT)
            .map_err(|err| {
                PipelineError::format(row_number, TRANSACTION_DATE, &date_text, err.to_string())
            })?;
        Ok(CleanRecord {
            customer_id: parse_integer(row_number, CUSTOMER_ID, raw.customer_id.as_deref())?,
            store_name: required_text(STORE_NAME, raw.store_name)?,
            transaction_date,
            aisle: required_text(AISLE, raw.aisle)?,
            product_name: required_text(PRODUCT_NAME, raw.product_name)?,
            quantity: parse_integer(row_number, QUANTITY, raw.quantity.as_deref())?
                .ok_or_else(|| PipelineError::format(row_number, QUANTITY, "", "value is blank"))?,
            unit_price: parse_money(row_number, UNIT_PRICE, raw.unit_price.as_deref())?,
            total_amount: required_money(TOTAL_AMOUNT, raw.total_amount.as_deref())?,
            discount_amount: required_money(DISCOUNT_AMOUNT, raw.discount_amount.as_deref())?,
            final_amount: required_money(FINAL_AMOUNT, raw.final_amount.as_deref())?,
            loyalty_points: parse_integer(
                row_number,
                LOYALTY_POINTS,
                raw.loyalty_points.as_deref(),
            )?,
        })
    }
}

pub fn parse_integer(
    identity: u64,
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<i64>, PipelineError> {
    let Some(text) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    text.parse::<i64>()
        .map(Some)
        .map_err(|err| PipelineError::format(identity, column, text, err.to_string()))
}

/// Parses a decimal amount, tolerating a leading `$` and `,` thousands separators.
pub fn parse_money(
    identity: u64,
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<Decimal>, PipelineError> {
    let Some(text) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ','))
        .collect();
    Decimal::from_str(&cleaned)
        .map(Some)
        .map_err(|err| PipelineError::format(identity, column, text, err.to_string()))
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_money(value: Decimal) -> String {
    let mut rounded = round_money(value);
    rounded.rescale(2);
    rounded.to_string()
}
