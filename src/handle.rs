use std::sync::{Arc, RwLock};

use tracing::info;

use crate::model::FactorModel;

/// Shared slot holding the model currently used for scoring.
///
/// Readers take an `Arc` snapshot and score against it without holding the
/// lock. Retraining builds a fresh `FactorModel` and swaps it in whole, so a
/// reader sees either the old model or the new one, never a mix.
#[derive(Debug, Default, Clone)]
pub struct ModelHandle {
    slot: Arc<RwLock<Option<Arc<FactorModel>>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: FactorModel) -> Self {
        let handle = Self::new();
        handle.replace(model);
        handle
    }

    /// Snapshot of the current model, if one has been installed.
    pub fn current(&self) -> Option<Arc<FactorModel>> {
        // The slot only ever holds a complete Arc, so a poisoned lock is safe to read.
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    }

    /// Install `model`, returning the one it replaced.
    pub fn replace(&self, model: FactorModel) -> Option<Arc<FactorModel>> {
        let new = Arc::new(model);
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        info!(
            users = new.n_users(),
            items = new.n_items(),
            rank = new.rank(),
            "installed new model"
        );
        slot.replace(new)
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_none()
    }
}
