//! Secondary lookup structures over a published dataset.
//!
//! Each map points a key at the ascending row positions holding it. The index
//! can be persisted next to the cleaned CSV as a versioned `bincode` sidecar.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::BufWriter,
    ops::Bound,
    path::Path,
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, record::CleanRecord};

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    pub customer: Option<i64>,
    pub store: Option<String>,
    pub product: Option<String>,
    /// Inclusive lower date bound.
    pub from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub to: Option<NaiveDate>,
}

impl LookupQuery {
    pub fn is_empty(&self) -> bool {
        self.customer.is_none()
            && self.store.is_none()
            && self.product.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetIndex {
    version: u32,
    row_count: usize,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
    by_customer: BTreeMap<i64, Vec<usize>>,
    by_store: BTreeMap<String, Vec<usize>>,
    by_product: BTreeMap<String, Vec<usize>>,
}

impl DatasetIndex {
    pub fn build(records: &[CleanRecord]) -> Self {
        let mut index = DatasetIndex {
            version: INDEX_VERSION,
            row_count: records.len(),
            by_date: BTreeMap::new(),
            by_customer: BTreeMap::new(),
            by_store: BTreeMap::new(),
            by_product: BTreeMap::new(),
        };
        for (row, record) in records.iter().enumerate() {
            index
                .by_date
                .entry(record.transaction_date)
                .or_default()
                .push(row);
            if let Some(customer) = record.customer_id {
                index.by_customer.entry(customer).or_default().push(row);
            }
            index
                .by_store
                .entry(record.store_name.clone())
                .or_default()
                .push(row);
            index
                .by_product
                .entry(record.product_name.clone())
                .or_default()
                .push(row);
        }
        index
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating index file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .context("Writing index file")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Opening index file {path:?}"))?;
        let (index, _): (DatasetIndex, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .with_context(|| format!("Reading index file {path:?}"))?;
        if index.version != INDEX_VERSION {
            return Err(PipelineError::IndexVersion {
                found: index.version,
                expected: INDEX_VERSION,
            }
            .into());
        }
        Ok(index)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn customer(&self, customer: i64) -> &[usize] {
        self.by_customer
            .get(&customer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn store(&self, store: &str) -> &[usize] {
        self.by_store.get(store).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn product(&self, product: &str) -> &[usize] {
        self.by_product
            .get(product)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Rows dated within the inclusive bounds, in date order.
    pub fn date_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> impl Iterator<Item = usize> + '_ {
        let lower = from.map_or(Bound::Unbounded, Bound::Included);
        let upper = to.map_or(Bound::Unbounded, Bound::Included);
        let empty = matches!((from, to), (Some(a), Some(b)) if a > b);
        let range = if empty {
            None
        } else {
            Some(self.by_date.range((lower, upper)))
        };
        range
            .into_iter()
            .flatten()
            .flat_map(|(_, rows)| rows.iter().copied())
    }

    pub fn distinct_dates(&self) -> usize {
        self.by_date.len()
    }

    /// Row positions matching every populated filter, ascending.
    pub fn select(&self, query: &LookupQuery) -> Vec<usize> {
        let mut selected: Option<BTreeSet<usize>> = None;
        let mut narrow = |rows: BTreeSet<usize>| {
            selected = Some(match selected.take() {
                Some(current) => current.intersection(&rows).copied().collect(),
                None => rows,
            });
        };
        if let Some(customer) = query.customer {
            narrow(self.customer(customer).iter().copied().collect());
        }
        if let Some(store) = query.store.as_deref() {
            narrow(self.store(store).iter().copied().collect());
        }
        if let Some(product) = query.product.as_deref() {
            narrow(self.product(product).iter().copied().collect());
        }
        if query.from.is_some() || query.to.is_some() {
            narrow(self.date_range(query.from, query.to).collect());
        }
        match selected {
            Some(rows) => rows.into_iter().collect(),
            None => (0..self.row_count).collect(),
        }
    }
}
