// Python bindings (`_mfrec` extension module).

use std::path::PathBuf;

use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray1};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::config::TrainConfig;
use crate::error::RecError;
use crate::interaction::{build, InteractionRecord};
use crate::model::FactorModel;
use crate::persistence::{load_from_path, save_to_path};
use crate::recommend::recommend;
use crate::svd::train;

impl From<RecError> for PyErr {
    fn from(err: RecError) -> Self {
        match err {
            RecError::Io(_) => PyIOError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

#[pyclass(name = "FactorModel", frozen)]
pub struct PyFactorModel {
    inner: FactorModel,
}

#[pymethods]
impl PyFactorModel {
    /// Returns `(score, is_cold_start)`.
    fn predict(&self, user_id: i64, item_id: i64) -> (f32, bool) {
        let res = self.inner.predict(user_id, item_id);
        (res.score, res.is_cold_start)
    }

    fn known_item_ids<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<i64>> {
        PyArray1::from_slice(py, self.inner.known_item_ids())
    }

    fn known_user_ids<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<i64>> {
        PyArray1::from_slice(py, self.inner.known_user_ids())
    }

    #[pyo3(signature = (user_id, n, exclude=Vec::new()))]
    fn recommend<'py>(
        &self,
        py: Python<'py>,
        user_id: i64,
        n: usize,
        exclude: Vec<i64>,
    ) -> (Bound<'py, PyArray1<i64>>, Bound<'py, PyArray1<f32>>) {
        let recs = recommend(&self.inner, user_id, n, &exclude);
        (
            PyArray1::from_vec(py, recs.iter().map(|r| r.item_id).collect()),
            PyArray1::from_vec(py, recs.iter().map(|r| r.score).collect()),
        )
    }

    #[getter]
    fn global_mean(&self) -> f32 {
        self.inner.global_mean()
    }

    #[getter]
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn user_factors<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f32>>> {
        PyArray1::from_slice(py, self.inner.user_factors())
            .reshape([self.inner.n_users(), self.inner.rank()])
    }

    fn item_factors<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f32>>> {
        PyArray1::from_slice(py, self.inner.item_factors())
            .reshape([self.inner.n_items(), self.inner.rank()])
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        Ok(save_to_path(&self.inner, path)?)
    }

    #[staticmethod]
    fn load(path: PathBuf) -> PyResult<Self> {
        Ok(Self {
            inner: load_from_path(path)?,
        })
    }
}

#[pyfunction]
#[pyo3(signature = (user_ids, item_ids, order_counts, factors=50, iterations=20, learning_rate=0.005, regularization=0.02, seed=42))]
#[allow(clippy::too_many_arguments)]
pub fn train_from_arrays(
    py: Python<'_>,
    user_ids: PyReadonlyArray1<i64>,
    item_ids: PyReadonlyArray1<i64>,
    order_counts: PyReadonlyArray1<f32>,
    factors: usize,
    iterations: usize,
    learning_rate: f32,
    regularization: f32,
    seed: u64,
) -> PyResult<PyFactorModel> {
    let u = user_ids.as_slice()?;
    let i = item_ids.as_slice()?;
    let c = order_counts.as_slice()?;
    if u.len() != i.len() || u.len() != c.len() {
        return Err(PyValueError::new_err(
            "user_ids, item_ids and order_counts must have the same length.",
        ));
    }
    let records: Vec<InteractionRecord> = u
        .iter()
        .zip(i)
        .zip(c)
        .map(|((&u, &i), &c)| InteractionRecord::new(u, i, c))
        .collect();
    let config = TrainConfig {
        rank: factors,
        epochs: iterations,
        learning_rate,
        regularization,
        seed,
    };

    let model = py.detach(|| -> Result<FactorModel, RecError> {
        let (matrix, users, items) = build(&records)?;
        train(&matrix, users, items, &config)
    })?;
    Ok(PyFactorModel { inner: model })
}

#[pymodule]
fn _mfrec(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFactorModel>()?;
    m.add_function(wrap_pyfunction!(train_from_arrays, m)?)?;
    Ok(())
}
