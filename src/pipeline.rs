// End-to-end training and scoring: loader → matrix → trainer → handle.

use std::sync::Arc;

use crate::config::TrainConfig;
use crate::error::{RecError, Result};
use crate::handle::ModelHandle;
use crate::interaction::build;
use crate::loader::DataLoader;
use crate::model::{FactorModel, PredictionResult};
use crate::persistence::{save_to_store, BlobStore};
use crate::recommend::{recommend, Recommendation};
use crate::svd::train;

/// Capability contract for a trainable recommender model.
pub trait Recommender {
    /// Train on everything `loader` yields and make the result current.
    fn fit(&self, loader: &dyn DataLoader) -> Result<()>;

    fn predict_score(&self, user_id: i64, item_id: i64) -> Result<PredictionResult>;

    fn save(&self, store: &dyn BlobStore, key: &str) -> Result<()>;

    /// External ids of every item the current model was trained on.
    fn known_item_ids(&self) -> Result<Vec<i64>>;
}

/// Matrix-factorization recommender backed by a swappable [`ModelHandle`].
///
/// `fit` builds and trains a new model off to the side and installs it in one
/// step; scoring calls running meanwhile keep using the previous model.
#[derive(Debug, Clone, Default)]
pub struct MfRecommender {
    config: TrainConfig,
    handle: ModelHandle,
}

impl MfRecommender {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            handle: ModelHandle::new(),
        }
    }

    /// Wrap an already trained (e.g. loaded) model.
    pub fn from_model(config: TrainConfig, model: FactorModel) -> Self {
        Self {
            config,
            handle: ModelHandle::with_model(model),
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Shared handle, for callers that score from other threads.
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn model(&self) -> Result<Arc<FactorModel>> {
        self.handle.current().ok_or(RecError::NotTrained)
    }

    /// Best `n` unseen items for `user_id`, excluding `history`.
    pub fn recommend(&self, user_id: i64, n: usize, history: &[i64]) -> Result<Vec<Recommendation>> {
        let model = self.model()?;
        Ok(recommend(&model, user_id, n, history))
    }

    /// Like [`MfRecommender::recommend`], pulling the history from `loader`.
    pub fn recommend_unseen(
        &self,
        loader: &dyn DataLoader,
        user_id: i64,
        n: usize,
    ) -> Result<Vec<Recommendation>> {
        let history = loader.user_history(user_id)?;
        self.recommend(user_id, n, &history)
    }
}

impl Recommender for MfRecommender {
    fn fit(&self, loader: &dyn DataLoader) -> Result<()> {
        let records = loader.load_records()?;
        let (matrix, users, items) = build(&records)?;
        let model = train(&matrix, users, items, &self.config)?;
        self.handle.replace(model);
        Ok(())
    }

    fn predict_score(&self, user_id: i64, item_id: i64) -> Result<PredictionResult> {
        Ok(self.model()?.predict(user_id, item_id))
    }

    fn save(&self, store: &dyn BlobStore, key: &str) -> Result<()> {
        save_to_store(&*self.model()?, store, key)
    }

    fn known_item_ids(&self) -> Result<Vec<i64>> {
        Ok(self.model()?.known_item_ids().to_vec())
    }
}
