//! Observed `(x, y)` samples.

use ndarray::{Array1, ArrayView1};

use crate::error::{CurveFitError, Result};

/// Two equal-length columns of finite observations, with at least one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl Dataset {
    /// Build a dataset, rejecting mismatched, empty or non-finite columns.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(CurveFitError::InvalidInput(format!(
                "x and y must have the same length ({} != {})",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(CurveFitError::InvalidInput(
                "dataset must contain at least one point".to_string(),
            ));
        }
        if let Some(row) = x
            .iter()
            .zip(y.iter())
            .position(|(a, b)| !a.is_finite() || !b.is_finite())
        {
            return Err(CurveFitError::InvalidInput(format!(
                "row {} contains a non-finite value",
                row
            )));
        }

        Ok(Self {
            x: Array1::from_vec(x),
            y: Array1::from_vec(y),
        })
    }

    /// Build a dataset the way a loader does: rows beyond the shorter column
    /// and rows with a non-finite entry are dropped. An empty result is an error.
    pub fn from_raw(x: &[f64], y: &[f64]) -> Result<Self> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = x
            .iter()
            .zip(y.iter())
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .map(|(a, b)| (*a, *b))
            .unzip();

        let dropped = x.len().max(y.len()) - xs.len();
        if dropped > 0 {
            log::debug!("dropped {} unusable rows while loading data", dropped);
        }
        if xs.is_empty() {
            return Err(CurveFitError::InvalidInput(
                "no usable (x, y) rows in input".to_string(),
            ));
        }
        Self::new(xs, ys)
    }

    /// Build a dataset from `(x, y)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (x, y) = pairs.into_iter().unzip();
        Self::new(x, y)
    }

    /// Independent variable samples.
    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    /// Observed values.
    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false; a dataset has at least one row.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Smallest and largest `x`.
    pub fn x_range(&self) -> (f64, f64) {
        self.x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}
