// Top-N candidate ranking on top of a trained FactorModel.
//
// Candidates are the model's known items minus whatever the caller excludes
// (typically the user's purchase history). Ties rank by ascending item id.

use std::cmp::Ordering;

use ahash::{AHashMap, AHashSet};
use faer::{linalg::matmul::matmul, Accum, MatMut, MatRef, Par};
use rayon::prelude::*;

use crate::model::FactorModel;

/// Users scored per matmul in `recommend_all`; bounds the dense score buffer.
const USER_BLOCK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recommendation {
    pub item_id: i64,
    pub score: f32,
    pub is_cold_start: bool,
}

#[inline]
fn by_score_desc(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}

/// Keep the best `n` of `(score, item_pos)` pairs, best first.
fn top_n(mut scored: Vec<(f32, usize)>, n: usize) -> Vec<(f32, usize)> {
    let take = n.min(scored.len());
    if take == 0 {
        return vec![];
    }
    scored.select_nth_unstable_by(take - 1, by_score_desc);
    scored.truncate(take);
    scored.sort_unstable_by(by_score_desc);
    scored
}

/// Best `n` unseen items for `user_id`.
///
/// A user unknown to the model gets every candidate at the global mean, in
/// ascending item id order, flagged as cold start.
pub fn recommend(model: &FactorModel, user_id: i64, n: usize, exclude: &[i64]) -> Vec<Recommendation> {
    let excluded: AHashSet<i64> = exclude.iter().copied().collect();
    let item_ids = model.known_item_ids();
    let candidates = (0..item_ids.len()).filter(|&i| !excluded.contains(&item_ids[i]));

    let (scored, is_cold_start): (Vec<(f32, usize)>, bool) =
        match model.user_index().position(user_id) {
            Some(u) => (
                candidates.map(|i| (model.score_positions(u, i), i)).collect(),
                false,
            ),
            None => (candidates.map(|i| (model.global_mean(), i)).collect(), true),
        };

    top_n(scored, n)
        .into_iter()
        .map(|(score, i)| Recommendation {
            item_id: item_ids[i],
            score,
            is_cold_start,
        })
        .collect()
}

/// Top-`n` recommendations for every known user, in user id order.
///
/// Scores for a block of users come from one matmul (`U_block × Iᵀ`); ranking
/// runs in parallel per user. Users missing from `histories` exclude nothing.
pub fn recommend_all(
    model: &FactorModel,
    n: usize,
    histories: &AHashMap<i64, Vec<i64>>,
) -> Vec<(i64, Vec<Recommendation>)> {
    recommend_all_blocked(model, n, histories, USER_BLOCK)
}

fn recommend_all_blocked(
    model: &FactorModel,
    n: usize,
    histories: &AHashMap<i64, Vec<i64>>,
    user_block: usize,
) -> Vec<(i64, Vec<Recommendation>)> {
    let k = model.rank();
    let n_users = model.n_users();
    let n_items = model.n_items();
    let user_ids = model.known_user_ids();
    let item_ids = model.known_item_ids();
    let global_mean = model.global_mean();
    if n_items == 0 {
        return user_ids.iter().map(|&u| (u, Vec::new())).collect();
    }
    let item_mat = MatRef::from_row_major_slice(model.item_factors(), n_items, k);

    let mut out = Vec::with_capacity(n_users);
    let user_block = user_block.max(1);
    let mut scores = vec![0.0f32; user_block.min(n_users) * n_items];

    for block_start in (0..n_users).step_by(user_block) {
        let rows = user_block.min(n_users - block_start);
        let block = &model.user_factors()[block_start * k..(block_start + rows) * k];
        let buf = &mut scores[..rows * n_items];
        matmul(
            MatMut::from_row_major_slice_mut(buf, rows, n_items).as_mut(),
            Accum::Replace,
            MatRef::from_row_major_slice(block, rows, k),
            item_mat.transpose(),
            1.0f32,
            Par::rayon(0),
        );

        let ranked: Vec<(i64, Vec<Recommendation>)> = scores[..rows * n_items]
            .par_chunks(n_items)
            .enumerate()
            .map(|(r, row)| {
                let user_id = user_ids[block_start + r];
                let excluded: AHashSet<i64> = histories
                    .get(&user_id)
                    .map(|h| h.iter().copied().collect())
                    .unwrap_or_default();
                let scored: Vec<(f32, usize)> = row
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !excluded.contains(&item_ids[*i]))
                    .map(|(i, &s)| (global_mean + s, i))
                    .collect();
                let recs = top_n(scored, n)
                    .into_iter()
                    .map(|(score, i)| Recommendation {
                        item_id: item_ids[i],
                        score,
                        is_cold_start: false,
                    })
                    .collect();
                (user_id, recs)
            })
            .collect();
        out.extend(ranked);
    }
    out
}
