//! Error taxonomy for building, training, scoring and persisting models.
//!
//! Cold start is not an error: unknown users or items are reported through
//! [`crate::model::PredictionResult::is_cold_start`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecError {
    /// No records were supplied, so no matrix can be formed.
    #[error("empty dataset: at least one interaction record is required")]
    EmptyDataset,

    /// A record carries a negative or non-finite order count.
    #[error("invalid record: user {user_id}, item {item_id} has order_count {order_count}")]
    InvalidRecord {
        user_id: i64,
        item_id: i64,
        order_count: f32,
    },

    /// The interaction matrix has no non-zero entries to learn from.
    #[error("training data error: interaction matrix has no observed (non-zero) entries")]
    TrainingData,

    /// A persisted model is corrupt or was written by an incompatible format.
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Model parts whose shapes disagree, or a non-finite global mean.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("failed to encode model: {0}")]
    Encode(#[source] bincode::Error),

    #[error("invalid config: {param} = {value}, expected {constraint}")]
    InvalidConfig {
        param: &'static str,
        value: String,
        constraint: &'static str,
    },

    #[error("no model has been trained or loaded yet")]
    NotTrained,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, RecError>;

impl RecError {
    pub(crate) fn model_load(msg: impl Into<String>) -> Self {
        RecError::ModelLoad(msg.into())
    }
}
