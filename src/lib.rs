//! Order-based recommendation with SGD matrix factorization.
//!
//! ```
//! use mfrec::{build, train, InteractionRecord, TrainConfig};
//!
//! let records = vec![
//!     InteractionRecord::new(1, 10, 2.0),
//!     InteractionRecord::new(1, 20, 1.0),
//!     InteractionRecord::new(2, 10, 3.0),
//! ];
//! let (matrix, users, items) = build(&records)?;
//! let model = train(&matrix, users, items, &TrainConfig::default())?;
//!
//! assert!(!model.predict(1, 10).is_cold_start);
//! assert_eq!(model.predict(999, 10).score, model.global_mean());
//! # Ok::<(), mfrec::RecError>(())
//! ```

#[cfg(feature = "python")]
use mimalloc::MiMalloc;

#[cfg(feature = "python")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod common;
pub mod config;
pub mod error;
pub mod handle;
pub mod interaction;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod model_selection;
pub mod persistence;
pub mod pipeline;
#[cfg(feature = "python")]
mod python;
pub mod recommend;
pub mod svd;

pub use config::TrainConfig;
pub use error::{RecError, Result};
pub use handle::ModelHandle;
pub use interaction::{build, IdIndex, InteractionMatrix, InteractionRecord};
pub use loader::{user_history, CsvLoader, DataLoader, MemoryLoader};
pub use model::{predict, FactorModel, PredictionResult};
pub use persistence::{load, save, BlobStore, FileStore, MemoryStore};
pub use pipeline::{MfRecommender, Recommender};
pub use recommend::{recommend, recommend_all, Recommendation};
pub use svd::{train, train_with, EpochReport};
