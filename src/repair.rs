//! Stage 4: recompute monetary fields from quantity and unit price.
//!
//! Ingested totals are never trusted. The original values only feed the
//! quality flags, which must be evaluated before anything is overwritten.

use log::{debug, info};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;

use crate::record::{StagingRecord, round_money};

const POINTS_PER_UNIT: Decimal = Decimal::TEN;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IssueFlags {
    pub pricing: bool,
    pub discount: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repair {
    pub total: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
    pub flags: IssueFlags,
}

/// Derives total, clamped discount and final amount for one transaction line.
///
/// `pricing` is raised for a missing, zero or negative unit price. `discount`
/// is raised when the original discount exceeds the original total (both
/// present) or is negative. The discount is clamped into `[0, total]`, and a
/// negative total clamps it to zero.
pub fn repair(
    quantity: Option<i64>,
    unit_price: Option<Decimal>,
    discount_amount: Option<Decimal>,
    total_amount: Option<Decimal>,
) -> Repair {
    let mut pricing = unit_price.is_none_or(|price| price <= Decimal::ZERO);
    let discount_flag = match (discount_amount, total_amount) {
        (Some(discount), Some(total)) if discount > total => true,
        (Some(discount), _) => discount < Decimal::ZERO,
        _ => false,
    };

    let price = unit_price.unwrap_or(Decimal::ZERO);
    let total = match Decimal::from(quantity.unwrap_or(0)).checked_mul(price) {
        Some(product) => round_money(product),
        // out of Decimal range: treat as unpriced
        None => {
            pricing = true;
            Decimal::ZERO
        }
    };
    let discount = round_money(discount_amount.unwrap_or(Decimal::ZERO))
        .min(total)
        .max(Decimal::ZERO);
    let final_amount = (total - discount).max(Decimal::ZERO);

    Repair {
        total,
        discount,
        final_amount,
        flags: IssueFlags {
            pricing,
            discount: discount_flag,
        },
    }
}

/// Replaces negative points with `floor(final_amount / 10)`. Other values pass through.
pub fn correct_loyalty(points: Option<i64>, final_amount: Decimal) -> (Option<i64>, bool) {
    match points {
        Some(value) if value < 0 => {
            let fair = (final_amount / POINTS_PER_UNIT).floor().to_i64().unwrap_or(0);
            (Some(fair.max(0)), true)
        }
        other => (other, false),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairCounts {
    pub pricing_issues: usize,
    pub discount_issues: usize,
    pub loyalty_corrected: usize,
    /// Rows whose ingested total disagreed with the recomputed one.
    pub totals_changed: usize,
    pub finals_changed: usize,
}

pub fn repair_records(mut records: Vec<StagingRecord>) -> (Vec<StagingRecord>, RepairCounts) {
    let mut counts = RepairCounts::default();
    for record in records.iter_mut() {
        let outcome = repair(
            record.quantity,
            record.unit_price,
            record.discount_amount,
            record.total_amount,
        );
        if record.total_amount != Some(outcome.total) {
            counts.totals_changed += 1;
        }
        if record.final_amount != Some(outcome.final_amount) {
            counts.finals_changed += 1;
        }
        record.pricing_issue = outcome.flags.pricing;
        record.discount_issue = outcome.flags.discount;
        record.total_amount = Some(outcome.total);
        record.discount_amount = Some(outcome.discount);
        record.final_amount = Some(outcome.final_amount);

        let (points, corrected) = correct_loyalty(record.loyalty_points, outcome.final_amount);
        record.loyalty_points = points;
        record.loyalty_corrected = corrected;

        if outcome.flags.pricing || outcome.flags.discount || corrected {
            debug!(
                "Row {} flagged: pricing={} discount={} loyalty_corrected={}",
                record.identity, outcome.flags.pricing, outcome.flags.discount, corrected
            );
        }
        counts.pricing_issues += outcome.flags.pricing as usize;
        counts.discount_issues += outcome.flags.discount as usize;
        counts.loyalty_corrected += corrected as usize;
    }
    info!(
        "Repaired {} row(s): {} pricing issue(s), {} discount issue(s), {} loyalty correction(s)",
        records.len(),
        counts.pricing_issues,
        counts.discount_issues,
        counts.loyalty_corrected
    );
    (records, counts)
}
