use crate::error::{RecError, Result};
use crate::interaction::InteractionRecord;
use crate::model::FactorModel;

/// Accuracy of a model over held-out records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub rmse: f64,
    pub mae: f64,
    /// Records that had to be scored as cold start.
    pub cold_start: usize,
    pub n: usize,
}

/// Score every record and compare against its observed count.
/// Cold-start records are included, scored at the global mean.
pub fn evaluate(model: &FactorModel, records: &[InteractionRecord]) -> Result<Evaluation> {
    if records.is_empty() {
        return Err(RecError::EmptyDataset);
    }
    let mut sse = 0.0f64;
    let mut sae = 0.0f64;
    let mut cold_start = 0usize;
    for r in records {
        let pred = model.predict(r.user_id, r.item_id);
        let err = (r.order_count - pred.score) as f64;
        sse += err * err;
        sae += err.abs();
        cold_start += pred.is_cold_start as usize;
    }
    let n = records.len() as f64;
    Ok(Evaluation {
        rmse: (sse / n).sqrt(),
        mae: sae / n,
        cold_start,
        n: records.len(),
    })
}

pub fn rmse(model: &FactorModel, records: &[InteractionRecord]) -> Result<f64> {
    Ok(evaluate(model, records)?.rmse)
}

pub fn mae(model: &FactorModel, records: &[InteractionRecord]) -> Result<f64> {
    Ok(evaluate(model, records)?.mae)
}
