use std::path::Path;

use anyhow::Result;
use log::warn;
use serde::Serialize;

use crate::{
    config::MalformedPolicy,
    error::PipelineError,
    io_utils,
    record::{COLUMNS, RawRecord},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedRow {
    pub identity: u64,
    pub reason: String,
    pub raw: RawRecord,
}

/// Rows pulled out of the working set by the malformed-row policy.
#[derive(Debug, Default)]
pub struct Quarantine {
    policy: MalformedPolicy,
    rows: Vec<QuarantinedRow>,
}

impl Quarantine {
    pub fn new(policy: MalformedPolicy) -> Self {
        Quarantine {
            policy,
            rows: Vec::new(),
        }
    }

    /// Records a format error, or hands it back when the policy is `reject`.
    pub fn absorb(
        &mut self,
        identity: u64,
        raw: &RawRecord,
        error: PipelineError,
    ) -> Result<(), PipelineError> {
        if self.policy == MalformedPolicy::Reject || !error.is_format() {
            return Err(error);
        }
        warn!("Quarantining row {identity}: {error}");
        self.rows.push(QuarantinedRow {
            identity,
            reason: error.to_string(),
            raw: raw.clone(),
        });
        Ok(())
    }

    pub fn rows(&self) -> &[QuarantinedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write(&self, path: &Path, delimiter: u8) -> Result<usize> {
        let mut headers = vec!["identity", "reason"];
        headers.extend(COLUMNS);
        let rows = self.rows.iter().map(|row| {
            let mut cells = vec![row.identity.to_string(), row.reason.clone()];
            cells.extend(row.raw.to_row());
            cells
        });
        io_utils::write_table(Some(path), delimiter, &headers, rows)
    }
}
