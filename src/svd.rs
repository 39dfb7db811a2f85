// SGD matrix factorization (Funk SVD without per-entity biases).
//
// r̂_ui = μ + p_u · q_i
//
// μ is the mean of the observed counts, fixed before the first epoch and
// stored on the model; it is the only bias term and doubles as the
// cold-start score.

use std::ops::ControlFlow;
use std::time::Instant;

use tracing::{debug, info};

use crate::common::{dot, random_factors, XorShift64};
use crate::config::TrainConfig;
use crate::error::{RecError, Result};
use crate::interaction::{IdIndex, InteractionMatrix};
use crate::model::FactorModel;

/// Training error after one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Root mean squared error over the epoch's updates.
    pub rmse: f64,
}

// ── Factor update with snapshot ───────────────────────────────────────────
// Reads pu[f] and qi[f] before writing either, so both updates use the
// pre-step values.
#[inline(always)]
fn update_factors(pu: &mut [f32], qi: &mut [f32], lr_err: f32, lr_reg: f32) {
    for (p, q) in pu.iter_mut().zip(qi.iter_mut()) {
        let pf = *p;
        let qf = *q;
        *p = pf + lr_err * qf - lr_reg * pf;
        *q = qf + lr_err * pf - lr_reg * qf;
    }
}

/// Train a factor model on the observed entries of `matrix`.
///
/// The indices must be the ones `build` returned alongside `matrix`; they
/// are moved into the model so scores can be looked up by external id.
pub fn train(
    matrix: &InteractionMatrix,
    user_index: IdIndex,
    item_index: IdIndex,
    config: &TrainConfig,
) -> Result<FactorModel> {
    train_with(matrix, user_index, item_index, config, |_| ControlFlow::Continue(()))
}

/// Like [`train`], calling `on_epoch` after every epoch.
///
/// Returning `ControlFlow::Break` stops at that epoch boundary and returns
/// the model as trained so far.
pub fn train_with<F>(
    matrix: &InteractionMatrix,
    user_index: IdIndex,
    item_index: IdIndex,
    config: &TrainConfig,
    mut on_epoch: F,
) -> Result<FactorModel>
where
    F: FnMut(EpochReport) -> ControlFlow<()>,
{
    config.validate()?;
    if user_index.len() != matrix.n_users() || item_index.len() != matrix.n_items() {
        return Err(RecError::InvalidConfig {
            param: "indices",
            value: format!("{}x{}", user_index.len(), item_index.len()),
            constraint: "index sizes equal to the matrix shape",
        });
    }
    let global_mean = matrix.mean().ok_or(RecError::TrainingData)?;

    let n_users = matrix.n_users();
    let n_items = matrix.n_items();
    let n_ratings = matrix.nnz();
    let k = config.rank;
    let lr = config.learning_rate;
    let lr_reg = lr * config.regularization;
    let seed = config.seed;

    let mut user_factors = random_factors(n_users, k, seed);
    let mut item_factors = random_factors(n_items, k, seed.wrapping_add(1));

    info!(
        users = n_users,
        items = n_items,
        ratings = n_ratings,
        factors = k,
        lr,
        reg = config.regularization,
        global_mean,
        "training SGD factorization"
    );

    // SoA layout: separate arrays for user, item, rating
    let mut t_user: Vec<u32> = Vec::with_capacity(n_ratings);
    let mut t_item: Vec<u32> = Vec::with_capacity(n_ratings);
    let mut t_rating: Vec<f32> = Vec::with_capacity(n_ratings);
    for (u, i, r) in matrix.triples() {
        t_user.push(u as u32);
        t_item.push(i as u32);
        t_rating.push(r);
    }

    // Shuffle only u32 indices into the SoA arrays
    let mut order: Vec<u32> = (0..n_ratings as u32).collect();

    let start_time = Instant::now();
    for epoch in 0..config.epochs {
        let epoch_start = Instant::now();

        // Fisher-Yates, reseeded per epoch so runs are reproducible
        let mut shuffler = XorShift64::new(seed.wrapping_add(epoch as u64).wrapping_add(999));
        for i in (1..order.len()).rev() {
            let j = (shuffler.next() as usize) % (i + 1);
            order.swap(i, j);
        }

        let mut sse = 0.0f64;
        for &idx in &order {
            let idx = idx as usize;
            let u = t_user[idx] as usize;
            let i = t_item[idx] as usize;
            let r = t_rating[idx];

            let pu = &mut user_factors[u * k..(u + 1) * k];
            let qi = &mut item_factors[i * k..(i + 1) * k];
            let pred = global_mean + dot(pu, qi);
            let err = r - pred;
            sse += (err as f64) * (err as f64);

            update_factors(pu, qi, lr * err, lr_reg);
        }

        let report = EpochReport {
            epoch: epoch + 1,
            rmse: (sse / n_ratings as f64).sqrt(),
        };
        debug!(
            epoch = report.epoch,
            rmse = report.rmse,
            secs = epoch_start.elapsed().as_secs_f64(),
            "epoch complete"
        );
        if on_epoch(report).is_break() {
            info!(epoch = report.epoch, "training stopped by epoch observer");
            break;
        }
    }

    info!(
        secs = start_time.elapsed().as_secs_f64(),
        "training finished"
    );

    FactorModel::from_parts(
        user_factors,
        item_factors,
        global_mean,
        *config,
        user_index,
        item_index,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{build, InteractionRecord};
    use approx::assert_relative_eq;

    fn scenario() -> Vec<InteractionRecord> {
        vec![
            InteractionRecord::new(1, 10, 2.0),
            InteractionRecord::new(1, 20, 1.0),
            InteractionRecord::new(2, 10, 3.0),
        ]
    }

    fn fit(records: &[InteractionRecord], config: &TrainConfig) -> FactorModel {
        let (m, users, items) = build(records).expect("build");
        train(&m, users, items, config).expect("train")
    }

    #[test]
    fn test_global_mean_is_mean_of_observed() {
        let model = fit(&scenario(), &TrainConfig::default());
        assert_relative_eq!(model.global_mean(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_converges_on_small_scenario() {
        let config = TrainConfig::default()
            .with_rank(4)
            .with_epochs(2000)
            .with_learning_rate(0.05)
            .with_regularization(0.0);
        let model = fit(&scenario(), &config);

        for r in scenario() {
            let res = model.predict(r.user_id, r.item_id);
            assert!(!res.is_cold_start);
            assert!(
                (res.score - r.order_count).abs() < 0.1,
                "({}, {}) predicted {} for {}",
                r.user_id,
                r.item_id,
                res.score,
                r.order_count
            );
        }
    }

    #[test]
    fn test_training_is_reproducible() {
        let config = TrainConfig::default().with_rank(8).with_epochs(15);
        let a = fit(&scenario(), &config);
        let b = fit(&scenario(), &config);
        assert_eq!(a, b);

        let c = fit(&scenario(), &config.with_seed(7));
        assert_ne!(a.user_factors(), c.user_factors());
    }

    #[test]
    fn test_zero_epochs_keeps_random_init_and_finite_scores() {
        let config = TrainConfig::default().with_rank(1).with_epochs(0);
        let model = fit(&scenario(), &config);

        assert_eq!(model.user_factors(), &random_factors(2, 1, config.seed)[..]);
        for r in scenario() {
            let res = model.predict(r.user_id, r.item_id);
            assert!(res.score.is_finite());
            assert!(!res.is_cold_start);
        }
    }

    #[test]
    fn test_all_zero_matrix_fails() {
        let records = vec![InteractionRecord::new(1, 10, 0.0)];
        let (m, users, items) = build(&records).expect("build");
        let err = train(&m, users, items, &TrainConfig::default()).unwrap_err();
        assert!(matches!(err, RecError::TrainingData));
    }

    #[test]
    fn test_zero_only_ids_score_as_cold_start() {
        let mut records = scenario();
        records.push(InteractionRecord::new(7, 30, 0.0));
        let model = fit(&records, &TrainConfig::default().with_rank(3));

        assert_eq!(model.known_item_ids(), &[10, 20]);
        assert_eq!(model.known_user_ids(), &[1, 2]);
        for (u, i) in [(7, 10), (1, 30), (7, 30)] {
            let res = model.predict(u, i);
            assert!(res.is_cold_start, "({u}, {i}) should be cold start");
            assert_eq!(res.score, model.global_mean());
        }
        assert!(!model.predict(1, 20).is_cold_start);
    }

    #[test]
    fn test_invalid_config_fails_before_training() {
        let (m, users, items) = build(&scenario()).expect("build");
        let err = train(&m, users, items, &TrainConfig::default().with_rank(0)).unwrap_err();
        assert!(matches!(err, RecError::InvalidConfig { param: "rank", .. }));
    }

    #[test]
    fn test_mismatched_indices_fail() {
        let (m, users, _) = build(&scenario()).expect("build");
        let err = train(&m, users, IdIndex::from_ids([10]), &TrainConfig::default()).unwrap_err();
        assert!(matches!(err, RecError::InvalidConfig { param: "indices", .. }));
    }

    #[test]
    fn test_input_matrix_is_untouched() {
        let (m, users, items) = build(&scenario()).expect("build");
        let before = m.clone();
        let _ = train(&m, users, items, &TrainConfig::default()).expect("train");
        assert_eq!(m, before);
    }

    #[test]
    fn test_epoch_observer_sees_every_epoch() {
        let (m, users, items) = build(&scenario()).expect("build");
        let mut seen = Vec::new();
        let config = TrainConfig::default().with_epochs(5);
        train_with(&m, users, items, &config, |r| {
            seen.push(r);
            ControlFlow::Continue(())
        })
        .expect("train");

        assert_eq!(seen.iter().map(|r| r.epoch).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(seen.iter().all(|r| r.rmse.is_finite()));
    }

    #[test]
    fn test_break_matches_shorter_training() {
        let config = TrainConfig::default().with_rank(3).with_epochs(10);
        let (m, users, items) = build(&scenario()).expect("build");
        let stopped = train_with(&m, users.clone(), items.clone(), &config, |r| {
            if r.epoch == 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .expect("train");
        let short = train(&m, users, items, &config.with_epochs(4)).expect("train");

        assert_eq!(stopped.user_factors(), short.user_factors());
        assert_eq!(stopped.item_factors(), short.item_factors());
    }
}
