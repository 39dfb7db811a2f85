//! Sources of interaction records.
//!
//! The core only sees `Vec<InteractionRecord>`; where the records come from is
//! the loader's business. No loader carries an implicit default path.

use std::path::{Path, PathBuf};

use ahash::AHashSet;
use tracing::info;

use crate::error::Result;
use crate::interaction::InteractionRecord;

pub trait DataLoader {
    /// Load every interaction record, in source order.
    fn load_records(&self) -> Result<Vec<InteractionRecord>>;

    /// Items the user has ordered, first-seen order, without repeats.
    fn user_history(&self, user_id: i64) -> Result<Vec<i64>> {
        Ok(user_history(&self.load_records()?, user_id))
    }
}

/// Reads a CSV file with the header `user_id,item_id,order_count`.
/// Extra columns are ignored.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    path: PathBuf,
}

impl CsvLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataLoader for CsvLoader {
    fn load_records(&self) -> Result<Vec<InteractionRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;
        let records = reader
            .deserialize::<InteractionRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        info!(path = %self.path.display(), records = records.len(), "loaded interaction records");
        Ok(records)
    }
}

/// In-memory record source, mostly for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    records: Vec<InteractionRecord>,
}

impl MemoryLoader {
    pub fn new(records: Vec<InteractionRecord>) -> Self {
        Self { records }
    }
}

impl DataLoader for MemoryLoader {
    fn load_records(&self) -> Result<Vec<InteractionRecord>> {
        Ok(self.records.clone())
    }
}

/// Item ids ordered by `user_id`, deduplicated, in first-seen order.
pub fn user_history(records: &[InteractionRecord], user_id: i64) -> Vec<i64> {
    let mut seen = AHashSet::new();
    records
        .iter()
        .filter(|r| r.user_id == user_id)
        .filter_map(|r| seen.insert(r.item_id).then_some(r.item_id))
        .collect()
}
