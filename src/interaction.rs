//! Interaction records and the sparse user × item matrix built from them.
//!
//! The matrix is stored in CSR form (`indptr`, `indices`, `data`), so its
//! memory cost grows with the number of observed non-zero cells rather than
//! with `n_users * n_items`.
//!
//! Index positions are assigned in ascending id order, which makes `build`
//! reproducible regardless of record order.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RecError, Result};

/// One observed (user, item, order count) triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: i64,
    pub item_id: i64,
    pub order_count: f32,
}

impl InteractionRecord {
    pub fn new(user_id: i64, item_id: i64, order_count: f32) -> Self {
        Self {
            user_id,
            item_id,
            order_count,
        }
    }
}

/// Ordered mapping from external ids to dense positions `0..len`.
///
/// Serializes as the sorted id list; the position map is rebuilt on load and
/// an unsorted or duplicated list is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct IdIndex {
    ids: Vec<i64>,
    positions: AHashMap<i64, u32>,
}

impl IdIndex {
    /// Build from any id sequence. Duplicates collapse; order is ascending.
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self::from_sorted(ids)
    }

    fn from_sorted(ids: Vec<i64>) -> Self {
        let positions = ids
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos as u32))
            .collect();
        Self { ids, positions }
    }

    #[inline]
    pub fn position(&self, id: i64) -> Option<usize> {
        self.positions.get(&id).map(|&p| p as usize)
    }

    #[inline]
    pub fn id_at(&self, pos: usize) -> Option<i64> {
        self.ids.get(pos).copied()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.positions.contains_key(&id)
    }

    /// External ids in position order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl PartialEq for IdIndex {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl TryFrom<Vec<i64>> for IdIndex {
    type Error = String;

    fn try_from(ids: Vec<i64>) -> std::result::Result<Self, Self::Error> {
        if let Some(w) = ids.windows(2).find(|w| w[0] >= w[1]) {
            return Err(format!(
                "id index is not strictly ascending: {} followed by {}",
                w[0], w[1]
            ));
        }
        Ok(Self::from_sorted(ids))
    }
}

impl From<IdIndex> for Vec<i64> {
    fn from(index: IdIndex) -> Self {
        index.ids
    }
}

/// Sparse user × item matrix in CSR layout.
///
/// Rows are user positions, columns are item positions. Within each row the
/// column indices are strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    indptr: Vec<i64>,
    indices: Vec<i32>,
    data: Vec<f32>,
    n_users: usize,
    n_items: usize,
    overwritten: usize,
}

impl InteractionMatrix {
    pub fn n_users(&self) -> usize {
        self.n_users
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_users, self.n_items)
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Duplicate cells whose earlier value was replaced during `build`.
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    pub fn indptr(&self) -> &[i64] {
        &self.indptr
    }

    pub fn indices(&self) -> &[i32] {
        &self.indices
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Column indices and values of row `u`.
    pub fn row(&self, u: usize) -> (&[i32], &[f32]) {
        let start = self.indptr[u] as usize;
        let end = self.indptr[u + 1] as usize;
        (&self.indices[start..end], &self.data[start..end])
    }

    /// Value at `(u, i)`; zero when the cell was never observed.
    pub fn get(&self, u: usize, i: usize) -> f32 {
        if u >= self.n_users || i >= self.n_items {
            return 0.0;
        }
        let (cols, vals) = self.row(u);
        match cols.binary_search(&(i as i32)) {
            Ok(p) => vals[p],
            Err(_) => 0.0,
        }
    }

    /// Observed `(user_pos, item_pos, value)` triples in row-major order.
    pub fn triples(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.n_users).flat_map(move |u| {
            let (cols, vals) = self.row(u);
            cols.iter().zip(vals).map(move |(&i, &v)| (u, i as usize, v))
        })
    }

    /// Mean of stored non-zero values, accumulated in f64. `None` when empty.
    pub fn mean(&self) -> Option<f32> {
        if self.data.is_empty() {
            return None;
        }
        let total: f64 = self.data.iter().map(|&v| v as f64).sum();
        Some((total / self.data.len() as f64) as f32)
    }
}

/// Build the interaction matrix and its user/item indices.
///
/// Records are not aggregated: when a (user, item) pair appears more than
/// once, the last record in input order wins and each replacement is logged.
/// Callers that want sums or means must aggregate first.
///
/// Only users and items with at least one stored non-zero cell are indexed.
/// An id whose every record resolves to a zero count is left out, so a model
/// trained on the result treats it as cold start.
pub fn build(records: &[InteractionRecord]) -> Result<(InteractionMatrix, IdIndex, IdIndex)> {
    if records.is_empty() {
        return Err(RecError::EmptyDataset);
    }
    if let Some(bad) = records
        .iter()
        .find(|r| !r.order_count.is_finite() || r.order_count < 0.0)
    {
        return Err(RecError::InvalidRecord {
            user_id: bad.user_id,
            item_id: bad.item_id,
            order_count: bad.order_count,
        });
    }

    // (user_id, item_id, input_order, value); the input order puts the last
    // occurrence of a cell at the end of its run.
    let mut coo: Vec<(i64, i64, usize, f32)> = records
        .iter()
        .enumerate()
        .map(|(order, r)| (r.user_id, r.item_id, order, r.order_count))
        .collect();
    coo.sort_unstable_by_key(|&(u, i, order, _)| (u, i, order));

    let mut overwritten = 0usize;
    let mut cells: Vec<(i64, i64, f32)> = Vec::with_capacity(coo.len());
    for &(u, i, _, v) in &coo {
        match cells.last_mut() {
            Some(last) if last.0 == u && last.1 == i => {
                overwritten += 1;
                warn!(
                    user_id = u,
                    item_id = i,
                    previous = last.2,
                    value = v,
                    "duplicate interaction cell, keeping the later record"
                );
                last.2 = v;
            }
            _ => cells.push((u, i, v)),
        }
    }
    let distinct = cells.len();
    cells.retain(|&(_, _, v)| v != 0.0);

    // Positions are ascending in id, so cells sorted by id stay sorted by
    // position and each row's columns come out ascending.
    let user_index = IdIndex::from_ids(cells.iter().map(|&(u, _, _)| u));
    let item_index = IdIndex::from_ids(cells.iter().map(|&(_, i, _)| i));
    let n_users = user_index.len();
    let n_items = item_index.len();

    let mut indptr = vec![0i64; n_users + 1];
    let mut indices: Vec<i32> = Vec::with_capacity(cells.len());
    let mut data: Vec<f32> = Vec::with_capacity(cells.len());
    for &(u, i, v) in &cells {
        indptr[user_index.positions[&u] as usize + 1] += 1;
        indices.push(item_index.positions[&i] as i32);
        data.push(v);
    }
    for u in 0..n_users {
        indptr[u + 1] += indptr[u];
    }

    info!(
        users = n_users,
        items = n_items,
        nnz = data.len(),
        zero_cells = distinct - data.len(),
        overwritten,
        "built interaction matrix"
    );

    let matrix = InteractionMatrix {
        indptr,
        indices,
        data,
        n_users,
        n_items,
        overwritten,
    };
    Ok((matrix, user_index, item_index))
}
