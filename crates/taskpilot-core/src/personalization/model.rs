//! Prediction interface over trained per-user text models.
//!
//! Artifacts are produced offline by the training job and stored as JSON.
//! Each pairs a TF-IDF vocabulary with a linear head: a ridge-style
//! regressor for completion minutes, or a logistic classifier for importance
//! and friction labels.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Term → feature column, as fitted by the training job.
pub type Vocabulary = HashMap<String, usize>;

/// Anything fitted on a text vocabulary.
pub trait TextModel: Send + Sync {
    /// Terms the model saw during training.
    fn vocabulary(&self) -> &Vocabulary;
}

/// Regression over a task title.
pub trait Regressor: TextModel {
    fn predict(&self, text: &str) -> Result<f64, ModelError>;
}

/// Classification over a task title.
pub trait Classifier: TextModel {
    /// Class labels, aligned with [`Classifier::predict_proba`] output.
    fn classes(&self) -> &[i64];

    fn predict_proba(&self, text: &str) -> Result<Vec<f64>, ModelError>;
}

/// TF-IDF featurizer shared by every artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfFeatures {
    pub vocabulary: Vocabulary,
    pub idf: Vec<f64>,
}

impl TfidfFeatures {
    /// Number of feature columns.
    pub fn width(&self) -> usize {
        self.idf.len()
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.vocabulary.is_empty() {
            return Err(ModelError::NotFitted("empty vocabulary".into()));
        }
        if let Some((term, col)) = self.vocabulary.iter().find(|(_, col)| **col >= self.idf.len()) {
            return Err(ModelError::Malformed(format!(
                "term '{term}' maps to column {col} but idf has {} entries",
                self.idf.len()
            )));
        }
        Ok(())
    }

    /// L2-normalized tf-idf vector for `text`.
    pub fn transform(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        let mut row = vec![0.0; self.idf.len()];
        for token in analyze(text) {
            if let Some(&col) = self.vocabulary.get(&token) {
                let slot = row.get_mut(col).ok_or_else(|| {
                    ModelError::Malformed(format!("column {col} outside feature width"))
                })?;
                *slot += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(row)
    }
}

/// Word tokens of two or more alphanumeric characters, lower-cased.
fn analyze(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Linear regressor on tf-idf features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressor {
    #[serde(flatten)]
    pub features: TfidfFeatures,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressor {
    /// Read and validate an artifact file.
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_artifact(path)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.features.validate()?;
        if self.coefficients.len() != self.features.width() {
            return Err(ModelError::Malformed(format!(
                "regressor has {} coefficients for {} features",
                self.coefficients.len(),
                self.features.width()
            )));
        }
        Ok(())
    }
}

impl TextModel for LinearRegressor {
    fn vocabulary(&self) -> &Vocabulary {
        &self.features.vocabulary
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, text: &str) -> Result<f64, ModelError> {
        let row = self.features.transform(text)?;
        if row.len() != self.coefficients.len() {
            return Err(ModelError::NotFitted("coefficient width mismatch".into()));
        }
        Ok(dot(&row, &self.coefficients) + self.intercept)
    }
}

/// Logistic classifier on tf-idf features.
///
/// A single coefficient row is a binary model scoring `classes[1]`;
/// otherwise there is one row per class and probabilities come from softmax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticClassifier {
    #[serde(flatten)]
    pub features: TfidfFeatures,
    pub classes: Vec<i64>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LogisticClassifier {
    /// Read and validate an artifact file.
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_artifact(path)?;
        model.validate()?;
        Ok(model)
    }

    fn is_binary(&self) -> bool {
        self.coefficients.len() == 1
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.features.validate()?;
        if self.classes.len() < 2 {
            return Err(ModelError::NotFitted(format!(
                "classifier needs at least two classes, found {}",
                self.classes.len()
            )));
        }
        let expected_rows = if self.classes.len() == 2 && self.coefficients.len() == 1 {
            1
        } else {
            self.classes.len()
        };
        if self.coefficients.len() != expected_rows || self.intercepts.len() != expected_rows {
            return Err(ModelError::Malformed(format!(
                "{} classes but {} coefficient rows and {} intercepts",
                self.classes.len(),
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        if let Some(row) = self.coefficients.iter().find(|r| r.len() != self.features.width()) {
            return Err(ModelError::Malformed(format!(
                "coefficient row has {} entries for {} features",
                row.len(),
                self.features.width()
            )));
        }
        Ok(())
    }
}

impl TextModel for LogisticClassifier {
    fn vocabulary(&self) -> &Vocabulary {
        &self.features.vocabulary
    }
}

impl Classifier for LogisticClassifier {
    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn predict_proba(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        let row = self.features.transform(text)?;
        let logits: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(coef, b)| dot(&row, coef) + b)
            .collect();

        if self.is_binary() {
            let p = 1.0 / (1.0 + (-logits[0]).exp());
            return Ok(vec![1.0 - p, p]);
        }

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Err(ModelError::NotFitted("degenerate class scores".into()));
        }
        Ok(exps.into_iter().map(|e| e / sum).collect())
    }
}

fn read_artifact<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ModelError> {
    let content = std::fs::read_to_string(path).map_err(|source| ModelError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ModelError::ParseFailed {
        path: path.to_path_buf(),
        source,
    })
}
