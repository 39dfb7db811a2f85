use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};

/// Hyperparameters for SGD matrix factorization.
///
/// Missing fields deserialize to their defaults, so a config file only has to
/// name what it overrides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of latent factors per user and item.
    pub rank: usize,
    /// Full passes over the observed entries. No convergence check is made.
    pub epochs: usize,
    pub learning_rate: f32,
    /// L2 penalty applied to both factor vectors on every step.
    pub regularization: f32,
    /// Seed for factor initialisation and per-epoch shuffling.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            rank: 50,
            epochs: 20,
            learning_rate: 0.005,
            regularization: 0.02,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_regularization(mut self, regularization: f32) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            return Err(RecError::InvalidConfig {
                param: "rank",
                value: self.rank.to_string(),
                constraint: "rank >= 1",
            });
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(RecError::InvalidConfig {
                param: "learning_rate",
                value: self.learning_rate.to_string(),
                constraint: "a finite value > 0",
            });
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(RecError::InvalidConfig {
                param: "regularization",
                value: self.regularization.to_string(),
                constraint: "a finite value >= 0",
            });
        }
        Ok(())
    }
}
