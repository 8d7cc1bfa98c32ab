pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod index;
pub mod ingest;
pub mod io_utils;
pub mod lookup;
pub mod normalize;
pub mod pipeline;
pub mod publish;
pub mod quarantine;
pub mod record;
pub mod repair;
pub mod reports;
pub mod table;
pub mod verify;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("pos_cleaner", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Clean(args) => handle_clean(&args),
        Commands::Report(args) => reports::execute(&args),
        Commands::Verify(args) => verify::execute(&args),
        Commands::Lookup(args) => lookup::execute(&args),
    }
}

fn handle_clean(args: &cli::CleanArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Cleaning '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );

    let mut config = PipelineConfig::load_or_default(args.config.as_deref())?;
    if let Some(policy) = args.malformed {
        config.malformed = policy;
    }
    if args.dedup_on_raw_dates {
        config.dedup_on_raw_dates = true;
    }
    debug!("Effective configuration: {config:?}");

    let raw = ingest::load_raw(&args.input, delimiter, encoding)?;
    let run = pipeline::run(raw, &config)
        .with_context(|| format!("Cleaning {:?}", args.input))?;

    let output_delimiter = io_utils::resolve_output_delimiter(args.output.as_deref(), delimiter);
    let written = run.dataset.write(args.output.as_deref(), output_delimiter)?;
    info!(
        "Wrote {} cleaned row(s) to {}",
        written,
        io_utils::describe_destination(args.output.as_deref())
    );

    if let Some(path) = &args.index {
        run.dataset
            .index()
            .save(path)
            .with_context(|| format!("Writing index to {path:?}"))?;
        info!(
            "Index over {} row(s) and {} date(s) written to {:?}",
            run.dataset.index().row_count(),
            run.dataset.index().distinct_dates(),
            path
        );
    }
    if let Some(path) = &args.audit {
        let audit_delimiter = io_utils::resolve_output_delimiter(Some(path), output_delimiter);
        let rows = pipeline::write_audit(&run.audit, path, audit_delimiter)?;
        let flagged = run.audit.iter().filter(|entry| entry.is_flagged()).count();
        info!("Audit of {rows} row(s) ({flagged} flagged) written to {path:?}");
    }
    match &args.quarantine {
        Some(path) => {
            let quarantine_delimiter = io_utils::resolve_output_delimiter(Some(path), delimiter);
            let rows = run.quarantine.write(path, quarantine_delimiter)?;
            info!("Quarantine of {rows} row(s) written to {path:?}");
        }
        None if !run.quarantine.is_empty() => warn!(
            "{} row(s) were quarantined; pass --quarantine to keep them",
            run.quarantine.len()
        ),
        None => {}
    }
    if let Some(path) = &args.summary {
        run.summary.save(path)?;
        info!("Run summary written to {path:?}");
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
