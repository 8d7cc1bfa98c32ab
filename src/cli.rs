use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{config::MalformedPolicy, record::ISO_DATE_FORMAT, reports::ReportKind};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean and analyse grocery point-of-sale exports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the cleaning pipeline over a raw transaction export
    Clean(CleanArgs),
    /// Render analytical reports over a cleaned dataset
    Report(ReportArgs),
    /// Check a cleaned dataset against the published invariants
    Verify(VerifyArgs),
    /// Filter a cleaned dataset by customer, store, product or date range
    Lookup(LookupArgs),
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Raw transaction CSV (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Cleaned CSV destination (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Write the lookup index sidecar to this path
    #[arg(short = 'x', long = "index")]
    pub index: Option<PathBuf>,
    /// Write per-row quality flags to this CSV
    #[arg(long)]
    pub audit: Option<PathBuf>,
    /// Write quarantined rows to this CSV
    #[arg(long)]
    pub quarantine: Option<PathBuf>,
    /// Write the JSON run summary to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,
    /// YAML pipeline configuration
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// How to treat unparseable dates and numbers (overrides the config file)
    #[arg(long, value_enum)]
    pub malformed: Option<MalformedPolicy>,
    /// Deduplicate on the raw date text, before dates are normalized
    #[arg(long = "dedup-on-raw-dates")]
    pub dedup_on_raw_dates: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Table,
    Csv,
    Json,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Cleaned CSV produced by `clean`
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Reports to render (repeatable; all when omitted)
    #[arg(short = 'r', long = "report", value_enum, action = clap::ArgAction::Append)]
    pub reports: Vec<ReportKind>,
    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
    /// Destination file; a directory for `--format csv`
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// YAML pipeline configuration supplying report limits
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Rows kept by the top_products report
    #[arg(long = "top-products")]
    pub top_products: Option<usize>,
    /// Rows kept by the customer_ltv and loyalty_engagement reports
    #[arg(long = "top-customers")]
    pub top_customers: Option<usize>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Cleaned CSV to check
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Cleaned CSV produced by `clean`
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Index sidecar written by `clean --index` (built in memory when omitted)
    #[arg(short = 'x', long = "index")]
    pub index: Option<PathBuf>,
    #[arg(long)]
    pub customer: Option<i64>,
    #[arg(long)]
    pub store: Option<String>,
    #[arg(long)]
    pub product: Option<String>,
    /// Earliest transaction date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_iso_date)]
    pub from: Option<NaiveDate>,
    /// Latest transaction date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_iso_date)]
    pub to: Option<NaiveDate>,
    /// Render matches as an aligned text table instead of CSV
    #[arg(long)]
    pub table: bool,
    /// Destination file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_iso_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE_FORMAT)
        .map_err(|err| format!("Expected a YYYY-MM-DD date: {err}"))
}
