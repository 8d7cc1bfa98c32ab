//! Fixed battery of read-only reports over a cleaned dataset.
//!
//! Every report is a pure aggregation: the same dataset always yields the
//! same table, with ties broken on the grouping key.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate, Weekday};
use clap::ValueEnum;
use itertools::Itertools;
use log::info;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    cli::{ReportArgs, ReportFormat},
    config::PipelineConfig,
    io_utils,
    publish::CleanDataset,
    record::{
        AISLE, COLUMNS, CUSTOMER_ID, CleanRecord, DISCOUNT_AMOUNT, FINAL_AMOUNT, ISO_DATE_FORMAT,
        LOYALTY_POINTS, PRODUCT_NAME, QUANTITY, STORE_NAME, TOTAL_AMOUNT, UNIT_PRICE, format_money,
    },
    table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ReportKind {
    RecordCount,
    NullAudit,
    DateCoverage,
    SalesSummary,
    SalesByStore,
    TopProducts,
    CustomerRepeat,
    CustomerLtv,
    DiscountImpact,
    DailyTrend,
    MonthlyTrend,
    WeekdayTrend,
    BasketSize,
    LoyaltyEngagement,
}

impl ReportKind {
    pub const ALL: [ReportKind; 14] = [
        ReportKind::RecordCount,
        ReportKind::NullAudit,
        ReportKind::DateCoverage,
        ReportKind::SalesSummary,
        ReportKind::SalesByStore,
        ReportKind::TopProducts,
        ReportKind::CustomerRepeat,
        ReportKind::CustomerLtv,
        ReportKind::DiscountImpact,
        ReportKind::DailyTrend,
        ReportKind::MonthlyTrend,
        ReportKind::WeekdayTrend,
        ReportKind::BasketSize,
        ReportKind::LoyaltyEngagement,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportKind::RecordCount => "record_count",
            ReportKind::NullAudit => "null_audit",
            ReportKind::DateCoverage => "date_coverage",
            ReportKind::SalesSummary => "sales_summary",
            ReportKind::SalesByStore => "sales_by_store",
            ReportKind::TopProducts => "top_products",
            ReportKind::CustomerRepeat => "customer_repeat",
            ReportKind::CustomerLtv => "customer_ltv",
            ReportKind::DiscountImpact => "discount_impact",
            ReportKind::DailyTrend => "daily_trend",
            ReportKind::MonthlyTrend => "monthly_trend",
            ReportKind::WeekdayTrend => "weekday_trend",
            ReportKind::BasketSize => "basket_size",
            ReportKind::LoyaltyEngagement => "loyalty_engagement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub top_products: usize,
    pub top_customers: usize,
    pub unknown_sentinel: String,
}

impl From<&PipelineConfig> for ReportSettings {
    fn from(config: &PipelineConfig) -> Self {
        ReportSettings {
            top_products: config.top_products,
            top_customers: config.top_customers,
            unknown_sentinel: config.unknown_sentinel.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTable {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    fn new(kind: ReportKind, headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        ReportTable {
            name: kind.name(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }
}

/// Builds one report. Fails instead of panicking when a sum leaves the numeric range.
pub fn build(
    kind: ReportKind,
    records: &[CleanRecord],
    settings: &ReportSettings,
) -> Result<ReportTable> {
    match kind {
        ReportKind::RecordCount => Ok(record_count(records)),
        ReportKind::NullAudit => Ok(null_audit(records, &settings.unknown_sentinel)),
        ReportKind::DateCoverage => Ok(date_coverage(records)),
        ReportKind::SalesSummary => sales_summary(records),
        ReportKind::SalesByStore => sales_by_store(records),
        ReportKind::TopProducts => top_products(records, settings.top_products),
        ReportKind::CustomerRepeat => Ok(customer_repeat(records)),
        ReportKind::CustomerLtv => customer_ltv(records, settings.top_customers),
        ReportKind::DiscountImpact => discount_impact(records),
        ReportKind::DailyTrend => daily_trend(records),
        ReportKind::MonthlyTrend => monthly_trend(records),
        ReportKind::WeekdayTrend => weekday_trend(records),
        ReportKind::BasketSize => basket_size(records),
        ReportKind::LoyaltyEngagement => loyalty_engagement(records, settings.top_customers),
    }
}

pub fn execute(args: &ReportArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let mut config = PipelineConfig::load_or_default(args.config.as_deref())?;
    if let Some(top) = args.top_products {
        config.top_products = top;
    }
    if let Some(top) = args.top_customers {
        config.top_customers = top;
    }
    config.validate()?;
    let settings = ReportSettings::from(&config);

    let dataset = CleanDataset::load(&args.input, delimiter, encoding)
        .with_context(|| format!("Loading cleaned dataset {:?}", args.input))?;
    let kinds: Vec<ReportKind> = if args.reports.is_empty() {
        ReportKind::ALL.to_vec()
    } else {
        args.reports.iter().copied().unique().collect()
    };
    let tables = kinds
        .iter()
        .map(|kind| {
            build(*kind, dataset.records(), &settings)
                .with_context(|| format!("Building report '{}'", kind.name()))
        })
        .collect::<Result<Vec<_>>>()?;

    match args.format {
        ReportFormat::Table => {
            let rendered = tables
                .iter()
                .map(|t| {
                    let body = table::render_table(&t.headers, &t.rows);
                    format!("== {} ==\n{}", t.name, body)
                })
                .join("\n");
            match args.output.as_deref() {
                Some(path) if !io_utils::is_dash(path) => fs::write(path, rendered)
                    .with_context(|| format!("Writing reports to {path:?}"))?,
                _ => print!("{rendered}"),
            }
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&tables).context("Serializing reports")?;
            match args.output.as_deref() {
                Some(path) if !io_utils::is_dash(path) => fs::write(path, json)
                    .with_context(|| format!("Writing reports to {path:?}"))?,
                _ => println!("{json}"),
            }
        }
        ReportFormat::Csv => match args.output.as_deref() {
            Some(dir) if !io_utils::is_dash(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Creating report directory {dir:?}"))?;
                for t in &tables {
                    write_csv(t, Some(&dir.join(format!("{}.csv", t.name))))?;
                }
            }
            _ => {
                for t in &tables {
                    println!("# {}", t.name);
                    write_csv(t, None)?;
                }
            }
        },
    }
    info!(
        "Rendered {} report(s) over {} cleaned row(s)",
        tables.len(),
        dataset.len()
    );
    Ok(())
}

fn write_csv(report: &ReportTable, path: Option<&Path>) -> Result<()> {
    let headers = report.headers.iter().map(String::as_str).collect::<Vec<_>>();
    io_utils::write_table(path, b',', &headers, report.rows.iter().cloned())
        .with_context(|| format!("Writing report '{}'", report.name))?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
struct SalesTotals {
    transactions: usize,
    units: i64,
    gross: Decimal,
    discount: Decimal,
    net: Decimal,
}

impl SalesTotals {
    fn add(&mut self, record: &CleanRecord) -> Result<()> {
        self.transactions += 1;
        self.units = add_count(self.units, record.quantity, QUANTITY)?;
        self.gross = add_money(self.gross, record.total_amount, TOTAL_AMOUNT)?;
        self.discount = add_money(self.discount, record.discount_amount, DISCOUNT_AMOUNT)?;
        self.net = add_money(self.net, record.final_amount, FINAL_AMOUNT)?;
        Ok(())
    }

    fn of<'a>(records: impl IntoIterator<Item = &'a CleanRecord>) -> Result<Self> {
        let mut totals = SalesTotals::default();
        for record in records {
            totals.add(record)?;
        }
        Ok(totals)
    }

    fn avg_net(&self) -> Decimal {
        ratio(self.net, self.transactions)
    }
}

fn add_money(sum: Decimal, value: Decimal, column: &str) -> Result<Decimal> {
    sum.checked_add(value)
        .ok_or_else(|| anyhow!("sum of {column} overflowed the decimal range"))
}

fn add_count(sum: i64, value: i64, column: &str) -> Result<i64> {
    sum.checked_add(value)
        .ok_or_else(|| anyhow!("sum of {column} overflowed a 64-bit integer"))
}

/// Totals per group, keyed by the group label.
fn grouped_totals<'a>(
    groups: HashMap<&'a str, Vec<&'a CleanRecord>>,
) -> Result<Vec<(&'a str, SalesTotals)>> {
    groups
        .into_iter()
        .map(|(label, group)| Ok((label, SalesTotals::of(group)?)))
        .collect()
}

fn ratio(numerator: Decimal, denominator: usize) -> Decimal {
    if denominator == 0 {
        Decimal::ZERO
    } else {
        numerator / Decimal::from(denominator as u64)
    }
}

fn iso(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

fn record_count(records: &[CleanRecord]) -> ReportTable {
    let distinct = |f: fn(&CleanRecord) -> String| records.iter().map(f).unique().count();
    let customers = records
        .iter()
        .filter_map(|r| r.customer_id)
        .collect::<HashSet<_>>()
        .len();
    let rows = vec![
        vec!["records".to_string(), records.len().to_string()],
        vec!["distinct_customers".to_string(), customers.to_string()],
        vec![
            "distinct_stores".to_string(),
            distinct(|r| r.store_name.clone()).to_string(),
        ],
        vec![
            "distinct_products".to_string(),
            distinct(|r| r.product_name.clone()).to_string(),
        ],
    ];
    ReportTable::new(ReportKind::RecordCount, &["metric", "value"], rows)
}

fn null_audit(records: &[CleanRecord], sentinel: &str) -> ReportTable {
    let count = |pred: &dyn Fn(&CleanRecord) -> bool| records.iter().filter(|r| pred(r)).count();
    let rows = COLUMNS
        .iter()
        .map(|column| {
            let (nulls, unknown) = match *column {
                CUSTOMER_ID => (count(&|r| r.customer_id.is_none()), 0),
                STORE_NAME => (0, count(&|r| r.store_name == sentinel)),
                AISLE => (0, count(&|r| r.aisle == sentinel)),
                PRODUCT_NAME => (0, count(&|r| r.product_name == sentinel)),
                UNIT_PRICE => (count(&|r| r.unit_price.is_none()), 0),
                LOYALTY_POINTS => (count(&|r| r.loyalty_points.is_none()), 0),
                _ => (0, 0),
            };
            vec![column.to_string(), nulls.to_string(), unknown.to_string()]
        })
        .collect();
    ReportTable::new(ReportKind::NullAudit, &["column", "nulls", "unknown"], rows)
}

fn date_coverage(records: &[CleanRecord]) -> ReportTable {
    let dates = records
        .iter()
        .map(|r| r.transaction_date)
        .collect::<HashSet<_>>();
    let row = match (dates.iter().min(), dates.iter().max()) {
        (Some(first), Some(last)) => vec![
            iso(*first),
            iso(*last),
            dates.len().to_string(),
            ((*last - *first).num_days() + 1).to_string(),
        ],
        _ => vec![String::new(), String::new(), "0".to_string(), "0".to_string()],
    };
    ReportTable::new(
        ReportKind::DateCoverage,
        &["first_date", "last_date", "distinct_days", "span_days"],
        vec![row],
    )
}

fn sales_summary(records: &[CleanRecord]) -> Result<ReportTable> {
    let totals = SalesTotals::of(records)?;
    Ok(ReportTable::new(
        ReportKind::SalesSummary,
        &["transactions", "units", "gross_sales", "total_discount", "net_sales"],
        vec![vec![
            totals.transactions.to_string(),
            totals.units.to_string(),
            format_money(totals.gross),
            format_money(totals.discount),
            format_money(totals.net),
        ]],
    ))
}

fn sales_by_store(records: &[CleanRecord]) -> Result<ReportTable> {
    let groups = records
        .iter()
        .map(|r| (r.store_name.as_str(), r))
        .into_group_map();
    let rows = grouped_totals(groups)?
        .into_iter()
        .sorted_by(|(a_store, a), (b_store, b)| {
            b.net.cmp(&a.net).then_with(|| a_store.cmp(b_store))
        })
        .map(|(store, totals)| {
            vec![
                store.to_string(),
                totals.transactions.to_string(),
                totals.units.to_string(),
                format_money(totals.gross),
                format_money(totals.discount),
                format_money(totals.net),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::SalesByStore,
        &[
            "store_name",
            "transactions",
            "units",
            "gross_sales",
            "total_discount",
            "net_sales",
        ],
        rows,
    ))
}

fn top_products(records: &[CleanRecord], limit: usize) -> Result<ReportTable> {
    let groups = records
        .iter()
        .map(|r| (r.product_name.as_str(), r))
        .into_group_map();
    let rows = grouped_totals(groups)?
        .into_iter()
        .sorted_by(|(a_name, a), (b_name, b)| b.net.cmp(&a.net).then_with(|| a_name.cmp(b_name)))
        .take(limit)
        .map(|(product, totals)| {
            vec![
                product.to_string(),
                totals.units.to_string(),
                format_money(totals.net),
                totals.transactions.to_string(),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::TopProducts,
        &["product_name", "units", "net_sales", "transactions"],
        rows,
    ))
}

fn per_customer(records: &[CleanRecord]) -> HashMap<i64, Vec<&CleanRecord>> {
    records
        .iter()
        .filter_map(|r| r.customer_id.map(|customer| (customer, r)))
        .into_group_map()
}

fn customer_repeat(records: &[CleanRecord]) -> ReportTable {
    let customers = per_customer(records);
    let repeat = customers.values().filter(|txns| txns.len() > 1).count();
    let one_time = customers.len() - repeat;
    let share = |n: usize| {
        format!(
            "{}%",
            format_money(ratio(Decimal::from(n as u64 * 100), customers.len()))
        )
    };
    ReportTable::new(
        ReportKind::CustomerRepeat,
        &["segment", "customers", "share"],
        vec![
            vec!["repeat".to_string(), repeat.to_string(), share(repeat)],
            vec!["one_time".to_string(), one_time.to_string(), share(one_time)],
        ],
    )
}

fn customer_ltv(records: &[CleanRecord], limit: usize) -> Result<ReportTable> {
    let customers = per_customer(records)
        .into_iter()
        .map(|(customer, txns)| {
            let first = txns.iter().map(|r| r.transaction_date).min();
            let last = txns.iter().map(|r| r.transaction_date).max();
            Ok((customer, first, last, SalesTotals::of(txns)?))
        })
        .collect::<Result<Vec<_>>>()?;
    let rows = customers
        .into_iter()
        .sorted_by(|a, b| b.3.net.cmp(&a.3.net).then_with(|| a.0.cmp(&b.0)))
        .take(limit)
        .map(|(customer, first, last, totals)| {
            vec![
                customer.to_string(),
                totals.transactions.to_string(),
                first.map(iso).unwrap_or_default(),
                last.map(iso).unwrap_or_default(),
                format_money(totals.net),
                format_money(totals.avg_net()),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::CustomerLtv,
        &[
            "customer_id",
            "transactions",
            "first_purchase",
            "last_purchase",
            "lifetime_value",
            "avg_transaction",
        ],
        rows,
    ))
}

const DISCOUNT_BUCKETS: [&str; 5] = ["none", "0-10%", "10-25%", "25-50%", "50%+"];

fn discount_bucket(record: &CleanRecord) -> usize {
    if record.discount_amount <= Decimal::ZERO || record.total_amount <= Decimal::ZERO {
        return 0;
    }
    let share = record.discount_amount / record.total_amount;
    if share <= Decimal::new(10, 2) {
        1
    } else if share <= Decimal::new(25, 2) {
        2
    } else if share <= Decimal::new(50, 2) {
        3
    } else {
        4
    }
}

fn discount_impact(records: &[CleanRecord]) -> Result<ReportTable> {
    let mut buckets = [SalesTotals::default(); DISCOUNT_BUCKETS.len()];
    for record in records {
        buckets[discount_bucket(record)].add(record)?;
    }
    let rows = DISCOUNT_BUCKETS
        .iter()
        .zip(buckets.iter())
        .map(|(label, totals)| {
            vec![
                label.to_string(),
                totals.transactions.to_string(),
                format_money(totals.gross),
                format_money(totals.discount),
                format_money(totals.net),
                format_money(totals.avg_net()),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::DiscountImpact,
        &[
            "discount_bucket",
            "transactions",
            "gross_sales",
            "total_discount",
            "net_sales",
            "avg_net",
        ],
        rows,
    ))
}

fn trend_rows<K: Ord>(
    records: &[CleanRecord],
    key: impl Fn(&CleanRecord) -> K,
    label: impl Fn(&K) -> String,
) -> Result<Vec<Vec<String>>> {
    let mut grouped: BTreeMap<K, SalesTotals> = BTreeMap::new();
    for record in records {
        grouped.entry(key(record)).or_default().add(record)?;
    }
    let rows = grouped
        .iter()
        .map(|(k, totals)| {
            vec![
                label(k),
                totals.transactions.to_string(),
                format_money(totals.net),
            ]
        })
        .collect();
    Ok(rows)
}

fn daily_trend(records: &[CleanRecord]) -> Result<ReportTable> {
    let rows = trend_rows(records, |r| r.transaction_date, |d| iso(*d))?;
    Ok(ReportTable::new(
        ReportKind::DailyTrend,
        &["date", "transactions", "net_sales"],
        rows,
    ))
}

fn monthly_trend(records: &[CleanRecord]) -> Result<ReportTable> {
    let rows = trend_rows(
        records,
        |r| (r.transaction_date.year(), r.transaction_date.month()),
        |(year, month)| format!("{year:04}-{month:02}"),
    )?;
    Ok(ReportTable::new(
        ReportKind::MonthlyTrend,
        &["month", "transactions", "net_sales"],
        rows,
    ))
}

fn weekday_trend(records: &[CleanRecord]) -> Result<ReportTable> {
    let mut days = [SalesTotals::default(); 7];
    for record in records {
        let day = record.transaction_date.weekday().num_days_from_monday() as usize;
        days[day].add(record)?;
    }
    let names = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    let rows = names
        .iter()
        .zip(days.iter())
        .map(|(day, totals)| {
            vec![
                day.to_string(),
                totals.transactions.to_string(),
                format_money(totals.net),
                format_money(totals.avg_net()),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::WeekdayTrend,
        &["weekday", "transactions", "net_sales", "avg_net"],
        rows,
    ))
}

fn basket_size(records: &[CleanRecord]) -> Result<ReportTable> {
    let baskets = records
        .iter()
        .map(|r| ((r.store_name.as_str(), r.customer_id, r.transaction_date), r))
        .into_group_map();
    let mut stores: BTreeMap<&str, (usize, i64, Decimal)> = BTreeMap::new();
    for ((store, _, _), items) in &baskets {
        let entry = stores.entry(*store).or_default();
        entry.0 += 1;
        for item in items {
            entry.1 = add_count(entry.1, item.quantity, QUANTITY)?;
            entry.2 = add_money(entry.2, item.final_amount, FINAL_AMOUNT)?;
        }
    }
    let rows = stores
        .into_iter()
        .map(|(store, (count, units, net))| {
            (store, count, ratio(Decimal::from(units), count), ratio(net, count))
        })
        .sorted_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)))
        .map(|(store, count, avg_items, avg_net)| {
            vec![
                store.to_string(),
                count.to_string(),
                format_money(avg_items),
                format_money(avg_net),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::BasketSize,
        &["store_name", "baskets", "avg_items", "avg_basket_value"],
        rows,
    ))
}

fn loyalty_engagement(records: &[CleanRecord], limit: usize) -> Result<ReportTable> {
    let customers = per_customer(records)
        .into_iter()
        .map(|(customer, txns)| {
            let points = txns
                .iter()
                .filter_map(|r| r.loyalty_points)
                .try_fold(0i64, |sum, points| add_count(sum, points, LOYALTY_POINTS))?;
            Ok((customer, points, txns.len()))
        })
        .collect::<Result<Vec<_>>>()?;
    let rows = customers
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(limit)
        .map(|(customer, points, transactions)| {
            vec![
                customer.to_string(),
                points.to_string(),
                transactions.to_string(),
                format_money(ratio(Decimal::from(points), transactions)),
            ]
        })
        .collect();
    Ok(ReportTable::new(
        ReportKind::LoyaltyEngagement,
        &[
            "customer_id",
            "loyalty_points",
            "transactions",
            "points_per_transaction",
        ],
        rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        customer: Option<i64>,
        store: &str,
        date: (i32, u32, u32),
        product: &str,
        qty: i64,
        price: i64,
        discount: i64,
    ) -> CleanRecord {
        let unit_price = Decimal::new(price, 2);
        let total = unit_price * Decimal::from(qty);
        let discount = Decimal::new(discount, 2);
        CleanRecord {
            customer_id: customer,
            store_name: store.to_string(),
            transaction_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            aisle: "UNKNOWN".to_string(),
            product_name: product.to_string(),
            quantity: qty,
            unit_price: Some(unit_price),
            total_amount: total,
            discount_amount: discount,
            final_amount: total - discount,
            loyalty_points: Some(qty * 2),
        }
    }

    fn sample() -> Vec<CleanRecord> {
        vec![
            // Monday 2024-01-01
            record(Some(1), "North", (2024, 1, 1), "Milk", 2, 150, 0),
            record(Some(1), "North", (2024, 1, 1), "Bread", 1, 300, 100),
            record(Some(2), "South", (2024, 1, 3), "Milk", 4, 150, 30),
            record(Some(1), "South", (2024, 2, 10), "Eggs", 1, 500, 0),
            record(None, "North", (2024, 2, 10), "Milk", 1, 150, 0),
        ]
    }

    fn settings() -> ReportSettings {
        ReportSettings::from(&PipelineConfig::default())
    }

    fn run(kind: ReportKind) -> ReportTable {
        build(kind, &sample(), &settings()).unwrap()
    }

    #[test]
    fn sales_summary_totals_match_records() {
        let table = run(ReportKind::SalesSummary);
        assert_eq!(table.rows[0], vec!["5", "9", "18.50", "1.30", "17.20"]);
    }

    #[test]
    fn sales_by_store_orders_by_net_descending() {
        let table = run(ReportKind::SalesByStore);
        assert_eq!(table.rows[0][0], "South");
        assert_eq!(table.rows[0][5], "10.70");
        assert_eq!(table.rows[1][0], "North");
        assert_eq!(table.rows[1][5], "6.50");
    }

    #[test]
    fn top_products_honours_limit() {
        let mut settings = settings();
        settings.top_products = 1;
        let table = build(ReportKind::TopProducts, &sample(), &settings).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0], vec!["Milk", "7", "10.20", "3"]);
    }

    #[test]
    fn customer_segments_ignore_anonymous_rows() {
        let table = run(ReportKind::CustomerRepeat);
        assert_eq!(table.rows[0], vec!["repeat", "1", "50.00%"]);
        assert_eq!(table.rows[1], vec!["one_time", "1", "50.00%"]);
    }

    #[test]
    fn customer_ltv_ranks_by_lifetime_net() {
        let table = run(ReportKind::CustomerLtv);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0],
            vec!["1", "3", "2024-01-01", "2024-02-10", "10.00", "3.33"]
        );
    }

    #[test]
    fn discount_impact_buckets_by_share_of_total() {
        let table = run(ReportKind::DiscountImpact);
        let counts: Vec<&str> = table.rows.iter().map(|r| r[1].as_str()).collect();
        // bread 1.00/3.00 = 33%, milk 0.30/6.00 = 5%
        assert_eq!(counts, vec!["3", "1", "0", "1", "0"]);
    }

    #[test]
    fn trends_group_by_calendar_units() {
        let monthly = run(ReportKind::MonthlyTrend);
        assert_eq!(monthly.rows[0], vec!["2024-01", "3", "10.70"]);
        assert_eq!(monthly.rows[1], vec!["2024-02", "2", "6.50"]);
        assert_eq!(monthly.rows.len(), 2);
        let weekday = run(ReportKind::WeekdayTrend);
        assert_eq!(weekday.rows.len(), 7);
        assert_eq!(weekday.rows[0][0], "Mon");
        assert_eq!(weekday.rows[0][1], "2");
        let daily = run(ReportKind::DailyTrend);
        assert_eq!(daily.rows.len(), 3);
    }

    #[test]
    fn date_coverage_spans_first_to_last() {
        let table = run(ReportKind::DateCoverage);
        assert_eq!(table.rows[0], vec!["2024-01-01", "2024-02-10", "3", "41"]);
        let empty = build(ReportKind::DateCoverage, &[], &settings()).unwrap();
        assert_eq!(empty.rows[0][2], "0");
    }

    #[test]
    fn null_audit_counts_nulls_and_sentinels() {
        let table = run(ReportKind::NullAudit);
        let row = |name: &str| table.rows.iter().find(|r| r[0] == name).unwrap().clone();
        assert_eq!(row("customer_id")[1], "1");
        assert_eq!(row("aisle")[2], "5");
        assert_eq!(row("store_name")[2], "0");
    }

    #[test]
    fn basket_size_groups_customer_store_day() {
        let table = run(ReportKind::BasketSize);
        // South: two single-line baskets (4 and 1 items); North: {2+1}, {1}
        assert_eq!(table.rows[0], vec!["South", "2", "2.50", "5.35"]);
        assert_eq!(table.rows[1], vec!["North", "2", "2.00", "3.25"]);
    }

    #[test]
    fn loyalty_engagement_ranks_points() {
        let table = run(ReportKind::LoyaltyEngagement);
        // tie on points falls back to customer id
        assert_eq!(table.rows[0], vec!["1", "8", "3", "2.67"]);
        assert_eq!(table.rows[1], vec!["2", "8", "1", "8.00"]);
    }

    #[test]
    fn record_count_reports_distinct_dimensions() {
        let table = run(ReportKind::RecordCount);
        assert_eq!(table.rows[0][1], "5");
        assert_eq!(table.rows[1][1], "2");
        assert_eq!(table.rows[2][1], "2");
        assert_eq!(table.rows[3][1], "3");
    }

    #[test]
    fn money_sums_beyond_decimal_range_fail_instead_of_panicking() {
        let mut huge = record(Some(1), "North", (2024, 1, 1), "Gold", 1, 0, 0);
        huge.total_amount = Decimal::MAX;
        huge.final_amount = Decimal::MAX;
        let mut twin = huge.clone();
        twin.product_name = "Platinum".to_string();
        let records = vec![huge, twin];
        for kind in [
            ReportKind::SalesSummary,
            ReportKind::SalesByStore,
            ReportKind::DailyTrend,
            ReportKind::WeekdayTrend,
            ReportKind::BasketSize,
        ] {
            let err = build(kind, &records, &settings()).unwrap_err();
            assert!(err.to_string().contains("overflowed"), "{kind:?}: {err}");
        }
        // per-product groups hold one row each, so they stay in range
        assert!(build(ReportKind::TopProducts, &records, &settings()).is_ok());
    }

    #[test]
    fn unit_and_point_sums_beyond_i64_fail() {
        let mut first = record(Some(1), "North", (2024, 1, 1), "Milk", 1, 100, 0);
        first.quantity = i64::MAX;
        first.loyalty_points = Some(i64::MAX);
        let mut second = first.clone();
        second.product_name = "Bread".to_string();
        let records = vec![first, second];
        let err = build(ReportKind::SalesSummary, &records, &settings()).unwrap_err();
        assert!(err.to_string().contains("quantity"));
        let err = build(ReportKind::LoyaltyEngagement, &records, &settings()).unwrap_err();
        assert!(err.to_string().contains("loyalty_points"));
    }

    #[test]
    fn every_kind_has_a_unique_name() {
        let names: HashSet<&str> = ReportKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), ReportKind::ALL.len());
    }
}
