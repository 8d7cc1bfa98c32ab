//! Stage 1: load the raw feed verbatim and assign synthetic identities.

use std::{
    io::{Cursor, Read},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::{
    io_utils,
    quarantine::Quarantine,
    record::{HeaderMap, RawRecord, StagingRecord},
};

/// Immutable snapshot of the raw feed. Kept for the audit trail.
#[derive(Debug)]
pub struct RawBatch {
    pub records: Vec<RawRecord>,
    /// SHA-256 of the input bytes, hex encoded.
    pub digest: String,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn load_raw(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<RawBatch> {
    let mut bytes = Vec::new();
    if io_utils::is_dash(path) {
        std::io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading raw feed from stdin")?;
    } else {
        bytes = std::fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
    }
    let batch = parse_raw(&bytes, delimiter, encoding)
        .with_context(|| format!("Reading raw feed {path:?}"))?;
    let source = if io_utils::is_dash(path) {
        "stdin".to_string()
    } else {
        path.display().to_string()
    };
    info!(
        "Ingested {} raw row(s) from {} (sha256 {})",
        batch.len(),
        source,
        batch.digest
    );
    Ok(batch)
}

pub fn parse_raw(bytes: &[u8], delimiter: u8, encoding: &'static Encoding) -> Result<RawBatch> {
    let digest = format!("{:x}", Sha256::digest(bytes));
    if bytes.is_empty() {
        return Ok(RawBatch {
            records: Vec::new(),
            digest,
        });
    }
    let mut reader = io_utils::open_csv_reader(Cursor::new(bytes), delimiter);
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let map = HeaderMap::resolve(&headers).context("Validating input headers")?;
    debug!("Raw headers: {:?}", headers);

    let mut records = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", idx + 2))?;
        records.push(RawRecord::from_row(&map, &decoded));
    }
    Ok(RawBatch { records, digest })
}

/// Types every raw row into the working set. Identities are 1-based file order.
pub fn stage(raw: &[RawRecord], quarantine: &mut Quarantine) -> Result<Vec<StagingRecord>> {
    let mut staged = Vec::with_capacity(raw.len());
    for (idx, record) in raw.iter().enumerate() {
        let identity = idx as u64 + 1;
        match StagingRecord::from_raw(identity, record) {
            Ok(row) => staged.push(row),
            Err(err) => quarantine.absorb(identity, record, err)?,
        }
    }
    Ok(staged)
}
