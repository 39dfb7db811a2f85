use ahash::AHashMap;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::error::{RecError, Result};
use crate::interaction::InteractionRecord;

/// Seeded random split into `(train, test)` with `round(n * test_ratio)`
/// test records. Relative record order is kept inside each half.
pub fn train_test_split(
    records: &[InteractionRecord],
    test_ratio: f32,
    seed: u64,
) -> Result<(Vec<InteractionRecord>, Vec<InteractionRecord>)> {
    if !(0.0..=1.0).contains(&test_ratio) {
        return Err(RecError::InvalidConfig {
            param: "test_ratio",
            value: test_ratio.to_string(),
            constraint: "a value between 0 and 1",
        });
    }

    let n = records.len();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_size = (n as f32 * test_ratio).round() as usize;
    let mut test_idx = indices[..test_size].to_vec();
    let mut train_idx = indices[test_size..].to_vec();
    test_idx.sort_unstable();
    train_idx.sort_unstable();

    Ok((
        train_idx.iter().map(|&i| records[i]).collect(),
        test_idx.iter().map(|&i| records[i]).collect(),
    ))
}

/// Hold out one random record per user for testing.
///
/// Users with a single record keep it in the training half, since a user
/// with nothing in training can only be scored as cold start.
pub fn leave_one_out(
    records: &[InteractionRecord],
    seed: u64,
) -> (Vec<InteractionRecord>, Vec<InteractionRecord>) {
    // Group interactions by user, in first-seen user order
    let mut user_order: Vec<i64> = Vec::new();
    let mut user_interactions: AHashMap<i64, Vec<usize>> = AHashMap::new();
    for (i, r) in records.iter().enumerate() {
        user_interactions
            .entry(r.user_id)
            .or_insert_with(|| {
                user_order.push(r.user_id);
                Vec::new()
            })
            .push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut test_idx = Vec::new();
    for user in &user_order {
        let indices = &user_interactions[user];
        if indices.len() < 2 {
            continue;
        }
        if let Some(&held_out) = indices.choose(&mut rng) {
            test_idx.push(held_out);
        }
    }
    test_idx.sort_unstable();

    let train = records
        .iter()
        .enumerate()
        .filter(|(i, _)| test_idx.binary_search(i).is_err())
        .map(|(_, r)| *r)
        .collect();
    let test = test_idx.iter().map(|&i| records[i]).collect();
    (train, test)
}
