use anyhow::{Context, Result, ensure};
use log::info;

use crate::{
    cli::LookupArgs,
    index::{DatasetIndex, LookupQuery},
    io_utils,
    publish::{self, CleanDataset},
    record::{COLUMNS, CleanRecord},
    table,
};

pub fn execute(args: &LookupArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let query = LookupQuery {
        customer: args.customer,
        store: args.store.clone(),
        product: args.product.clone(),
        from: args.from,
        to: args.to,
    };

    if query.is_empty() {
        info!("No filters given; every row matches");
    }

    let matches: Vec<CleanRecord> = match args.index.as_deref() {
        Some(index_path) => {
            let index = DatasetIndex::load(index_path)
                .with_context(|| format!("Loading index {index_path:?}"))?;
            let records = publish::read_clean_records(&args.input, delimiter, encoding)?;
            ensure!(
                index.row_count() == records.len(),
                "Index {:?} describes {} row(s) but {:?} holds {}; rebuild it with `clean --index`",
                index_path,
                index.row_count(),
                args.input,
                records.len()
            );
            publish::lookup_with(&index, &records, &query)
                .into_iter()
                .cloned()
                .collect()
        }
        None => {
            let dataset = CleanDataset::load(&args.input, delimiter, encoding)?;
            dataset.lookup(&query).into_iter().cloned().collect()
        }
    };

    let rows = matches.iter().map(CleanRecord::to_row).collect::<Vec<_>>();
    if args.table {
        let headers = COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        match args.output.as_deref() {
            Some(path) if !io_utils::is_dash(path) => {
                std::fs::write(path, table::render_table(&headers, &rows))
                    .with_context(|| format!("Writing lookup table to {path:?}"))?
            }
            _ => table::print_table(&headers, &rows),
        }
    } else {
        let output_delimiter =
            io_utils::resolve_output_delimiter(args.output.as_deref(), delimiter);
        io_utils::write_table(args.output.as_deref(), output_delimiter, &COLUMNS, rows)?;
    }
    info!(
        "Lookup matched {} row(s) -> {}",
        matches.len(),
        io_utils::describe_destination(args.output.as_deref())
    );
    Ok(())
}
