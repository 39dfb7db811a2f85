//! The trained factor model and its scoring contract.
//!
//! A [`FactorModel`] carries the user/item indices it was trained against, so
//! external ids can always be mapped back to factor rows. Ids that were never
//! seen during training fall back to the global mean (cold start).

use serde::{Deserialize, Serialize};

use crate::common::dot;
use crate::config::TrainConfig;
use crate::error::{RecError, Result};
use crate::interaction::IdIndex;

/// Score for one (user, item) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub score: f32,
    /// True when the user or the item (or both) was absent from training.
    pub is_cold_start: bool,
}

/// Immutable result of one training pass.
///
/// Factor matrices are row-major: row `p` of `user_factors` belongs to the
/// user at position `p` of `user_index`. Deserialization runs the same shape
/// checks as [`FactorModel::from_parts`], so a decoded model is always safe
/// to score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelParts", into = "ModelParts")]
pub struct FactorModel {
    user_factors: Vec<f32>,
    item_factors: Vec<f32>,
    global_mean: f32,
    rank: usize,
    config: TrainConfig,
    user_index: IdIndex,
    item_index: IdIndex,
}

/// Unchecked serialized form of [`FactorModel`].
#[derive(Serialize, Deserialize)]
struct ModelParts {
    user_factors: Vec<f32>,
    item_factors: Vec<f32>,
    global_mean: f32,
    rank: usize,
    config: TrainConfig,
    user_index: IdIndex,
    item_index: IdIndex,
}

impl TryFrom<ModelParts> for FactorModel {
    type Error = String;

    fn try_from(parts: ModelParts) -> std::result::Result<Self, Self::Error> {
        let model = Self {
            user_factors: parts.user_factors,
            item_factors: parts.item_factors,
            global_mean: parts.global_mean,
            rank: parts.rank,
            config: parts.config,
            user_index: parts.user_index,
            item_index: parts.item_index,
        };
        model.check_consistency()?;
        Ok(model)
    }
}

impl From<FactorModel> for ModelParts {
    fn from(model: FactorModel) -> Self {
        Self {
            user_factors: model.user_factors,
            item_factors: model.item_factors,
            global_mean: model.global_mean,
            rank: model.rank,
            config: model.config,
            user_index: model.user_index,
            item_index: model.item_index,
        }
    }
}

impl FactorModel {
    /// Assemble a model, checking that factor shapes agree with the indices.
    pub fn from_parts(
        user_factors: Vec<f32>,
        item_factors: Vec<f32>,
        global_mean: f32,
        config: TrainConfig,
        user_index: IdIndex,
        item_index: IdIndex,
    ) -> Result<Self> {
        let model = Self {
            user_factors,
            item_factors,
            global_mean,
            rank: config.rank,
            config,
            user_index,
            item_index,
        };
        model.check_consistency().map_err(RecError::InvalidModel)?;
        Ok(model)
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.rank == 0 || self.rank != self.config.rank {
            return Err(format!(
                "rank {} does not match config rank {}",
                self.rank, self.config.rank
            ));
        }
        let expected_users = self.user_index.len() * self.rank;
        if self.user_factors.len() != expected_users {
            return Err(format!(
                "user factors have {} values, expected {} ({} users x rank {})",
                self.user_factors.len(),
                expected_users,
                self.user_index.len(),
                self.rank
            ));
        }
        let expected_items = self.item_index.len() * self.rank;
        if self.item_factors.len() != expected_items {
            return Err(format!(
                "item factors have {} values, expected {} ({} items x rank {})",
                self.item_factors.len(),
                expected_items,
                self.item_index.len(),
                self.rank
            ));
        }
        if !self.global_mean.is_finite() {
            return Err(format!("global mean is not finite: {}", self.global_mean));
        }
        Ok(())
    }

    /// Predicted affinity for `(user_id, item_id)`.
    ///
    /// Known pairs score `global_mean + dot(p_u, q_i)`. Any unknown id scores
    /// exactly `global_mean` and is flagged as cold start.
    pub fn predict(&self, user_id: i64, item_id: i64) -> PredictionResult {
        match (self.user_factor(user_id), self.item_factor(item_id)) {
            (Some(pu), Some(qi)) => PredictionResult {
                score: self.global_mean + dot(pu, qi),
                is_cold_start: false,
            },
            _ => PredictionResult {
                score: self.global_mean,
                is_cold_start: true,
            },
        }
    }

    /// Score by internal positions. Callers guarantee both are in range.
    #[inline]
    pub(crate) fn score_positions(&self, u: usize, i: usize) -> f32 {
        let k = self.rank;
        self.global_mean
            + dot(
                &self.user_factors[u * k..(u + 1) * k],
                &self.item_factors[i * k..(i + 1) * k],
            )
    }

    /// Latent vector of a known user.
    pub fn user_factor(&self, user_id: i64) -> Option<&[f32]> {
        let u = self.user_index.position(user_id)?;
        Some(&self.user_factors[u * self.rank..(u + 1) * self.rank])
    }

    /// Latent vector of a known item.
    pub fn item_factor(&self, item_id: i64) -> Option<&[f32]> {
        let i = self.item_index.position(item_id)?;
        Some(&self.item_factors[i * self.rank..(i + 1) * self.rank])
    }

    /// Every item id seen in training, ascending.
    pub fn known_item_ids(&self) -> &[i64] {
        self.item_index.ids()
    }

    /// Every user id seen in training, ascending.
    pub fn known_user_ids(&self) -> &[i64] {
        self.user_index.ids()
    }

    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn n_users(&self) -> usize {
        self.user_index.len()
    }

    pub fn n_items(&self) -> usize {
        self.item_index.len()
    }

    pub fn user_index(&self) -> &IdIndex {
        &self.user_index
    }

    pub fn item_index(&self) -> &IdIndex {
        &self.item_index
    }

    pub fn user_factors(&self) -> &[f32] {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &[f32] {
        &self.item_factors
    }
}

/// Free-function form of [`FactorModel::predict`].
pub fn predict(model: &FactorModel, user_id: i64, item_id: i64) -> PredictionResult {
    model.predict(user_id, item_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn toy_model() -> FactorModel {
        // users [1, 2], items [10, 20], rank 2
        FactorModel::from_parts(
            vec![1.0, 0.0, 0.5, 0.5],
            vec![0.2, 0.4, -1.0, 1.0],
            2.0,
            TrainConfig::default().with_rank(2),
            IdIndex::from_ids([1, 2]),
            IdIndex::from_ids([10, 20]),
        )
        .expect("consistent model")
    }

    #[test]
    fn test_predict_known_pair() {
        let model = toy_model();
        let res = model.predict(1, 10);
        assert!(!res.is_cold_start);
        assert_relative_eq!(res.score, 2.2, epsilon = 1e-6);

        let res = predict(&model, 2, 20);
        assert!(!res.is_cold_start);
        assert_relative_eq!(res.score, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_predict_cold_start_variants() {
        let model = toy_model();
        for (u, i) in [(999, 10), (1, 999), (999, 999)] {
            let res = model.predict(u, i);
            assert!(res.is_cold_start, "({u}, {i}) should be cold start");
            assert_eq!(res.score, model.global_mean());
        }
    }

    #[test]
    fn test_known_ids_are_external() {
        let model = toy_model();
        assert_eq!(model.known_item_ids(), &[10, 20]);
        assert_eq!(model.known_user_ids(), &[1, 2]);
        assert_eq!(model.item_factor(20), Some(&[-1.0f32, 1.0][..]));
        assert_eq!(model.item_factor(0), None);
    }

    #[test]
    fn test_from_parts_rejects_shape_mismatch() {
        let err = FactorModel::from_parts(
            vec![1.0, 0.0, 0.5],
            vec![0.2, 0.4, -1.0, 1.0],
            2.0,
            TrainConfig::default().with_rank(2),
            IdIndex::from_ids([1, 2]),
            IdIndex::from_ids([10, 20]),
        )
        .unwrap_err();
        assert!(matches!(err, RecError::InvalidModel(_)));

        let err = FactorModel::from_parts(
            vec![1.0, 0.0],
            vec![0.2, 0.4],
            f32::NAN,
            TrainConfig::default().with_rank(2),
            IdIndex::from_ids([1]),
            IdIndex::from_ids([10]),
        )
        .unwrap_err();
        assert!(matches!(err, RecError::InvalidModel(_)));
    }

    #[test]
    fn test_decode_rejects_inconsistent_model() {
        let mut parts = ModelParts::from(toy_model());
        parts.user_factors.pop();
        let payload = bincode::serialize(&parts).expect("encode");

        let err = bincode::deserialize::<FactorModel>(&payload).unwrap_err();
        assert!(err.to_string().contains("user factors"), "{err}");

        let payload = bincode::serialize(&toy_model()).expect("encode");
        let decoded: FactorModel = bincode::deserialize(&payload).expect("decode");
        assert_eq!(decoded, toy_model());
    }

    #[test]
    fn test_model_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FactorModel>();
    }
}
