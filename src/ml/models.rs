use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::ModelError;

/// A fitted model that maps feature rows to normalized targets.
pub trait Regressor {
    fn n_features(&self) -> usize;

    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, ModelError> {
        check_width(self.n_features(), x.ncols())?;

        Ok(DVector::from_iterator(
            x.nrows(),
            x.row_iter().map(|row| {
                let values: Vec<f64> = row.iter().copied().collect();
                self.predict_row(&values)
            }),
        ))
    }
}

fn check_width(expected: usize, actual: usize) -> Result<(), ModelError> {
    if expected != actual {
        return Err(ModelError::FeatureMismatch { expected, actual });
    }
    Ok(())
}

/// On-disk model file, one per algorithm.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(LinearRegressionModel),
    DecisionTree(DecisionTreeModel),
    RandomForest(RandomForestModel),
    Svr(SupportVectorRegressor),
}

impl FittedModel {
    pub fn kind(&self) -> &'static str {
        match self {
            FittedModel::Linear(_) => "linear",
            FittedModel::DecisionTree(_) => "decision_tree",
            FittedModel::RandomForest(_) => "random_forest",
            FittedModel::Svr(_) => "svr",
        }
    }

    /// Structural checks run once at load so `predict_row` can index freely.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            FittedModel::Linear(m) => {
                if m.coefficients.is_empty() {
                    return Err(ModelError::InvalidModel("linear model has no coefficients".into()));
                }
                Ok(())
            }
            FittedModel::DecisionTree(m) => m.root.validate(m.n_features),
            FittedModel::RandomForest(m) => {
                if m.trees.is_empty() {
                    return Err(ModelError::InvalidModel("random forest has no trees".into()));
                }
                m.trees.iter().try_for_each(|tree| {
                    check_width(m.n_features, tree.n_features)?;
                    tree.root.validate(tree.n_features)
                })
            }
            FittedModel::Svr(m) => m.validate(),
        }
    }

    fn as_regressor(&self) -> &dyn Regressor {
        match self {
            FittedModel::Linear(m) => m,
            FittedModel::DecisionTree(m) => m,
            FittedModel::RandomForest(m) => m,
            FittedModel::Svr(m) => m,
        }
    }
}

impl Regressor for FittedModel {
    fn n_features(&self) -> usize {
        self.as_regressor().n_features()
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.as_regressor().predict_row(row)
    }
}

/// Ordinary, ridge and lasso regression all reduce to `x·w + b` once fitted.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearRegressionModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl Regressor for LinearRegressionModel {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        row.iter().zip(&self.coefficients).map(|(x, w)| x * w).sum::<f64>() + self.intercept
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, ModelError> {
        check_width(self.coefficients.len(), x.ncols())?;
        let coefficients = DVector::from_column_slice(&self.coefficients);
        Ok(x * coefficients + DVector::from_element(x.nrows(), self.intercept))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        match self {
            TreeNode::Leaf { .. } => Ok(()),
            TreeNode::Split {
                feature,
                left,
                right,
                ..
            } => {
                if *feature >= n_features {
                    return Err(ModelError::InvalidModel(format!(
                        "split on feature {} but model has {} features",
                        feature, n_features
                    )));
                }
                left.validate(n_features)?;
                right.validate(n_features)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTreeModel {
    pub n_features: usize,
    pub root: TreeNode,
}

impl Regressor for DecisionTreeModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.root.evaluate(row)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomForestModel {
    pub n_features: usize,
    pub trees: Vec<DecisionTreeModel>,
}

impl Regressor for RandomForestModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .map(|tree| tree.predict_row(row))
            .collect::<Vec<f64>>()
            .mean()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Poly { gamma: f64, coef0: f64, degree: i32 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Kernel {
    fn apply(&self, a: &[f64], b: &[f64]) -> f64 {
        match *self {
            Kernel::Linear => dot(a, b),
            Kernel::Rbf { gamma } => {
                let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * dist).exp()
            }
            Kernel::Poly {
                gamma,
                coef0,
                degree,
            } => (gamma * dot(a, b) + coef0).powi(degree),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * dot(a, b) + coef0).tanh(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Epsilon-SVR in dual form: `Σ αᵢ K(svᵢ, x) + b`.
#[derive(Debug, Clone, Deserialize)]
pub struct SupportVectorRegressor {
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    pub dual_coefficients: Vec<f64>,
    pub intercept: f64,
}

impl SupportVectorRegressor {
    fn validate(&self) -> Result<(), ModelError> {
        if self.support_vectors.is_empty() {
            return Err(ModelError::InvalidModel("svr has no support vectors".into()));
        }
        if self.support_vectors.len() != self.dual_coefficients.len() {
            return Err(ModelError::InvalidModel(format!(
                "{} support vectors but {} dual coefficients",
                self.support_vectors.len(),
                self.dual_coefficients.len()
            )));
        }
        let width = self.n_features();
        self.support_vectors
            .iter()
            .try_for_each(|sv| check_width(width, sv.len()))
    }
}

impl Regressor for SupportVectorRegressor {
    fn n_features(&self) -> usize {
        self.support_vectors.first().map_or(0, Vec::len)
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coefficients)
            .map(|(sv, alpha)| alpha * self.kernel.apply(sv, row))
            .sum::<f64>()
            + self.intercept
    }
}

/// Coefficient of determination of `y_pred` against `y`.
pub fn r_squared(y: &DVector<f64>, y_pred: &DVector<f64>) -> f64 {
    let y_mean = y.mean();
    let ss_tot: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();
    let ss_res: f64 = y
        .iter()
        .zip(y_pred.iter())
        .map(|(yi, yi_pred)| (yi - yi_pred).powi(2))
        .sum();

    debug!("ss_res={} ss_tot={}", ss_res, ss_tot);

    if ss_tot.abs() < f64::EPSILON {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(threshold: f64, low: f64, high: f64) -> DecisionTreeModel {
        DecisionTreeModel {
            n_features: 4,
            root: TreeNode::Split {
                feature: 2,
                threshold,
                left: Box::new(TreeNode::Leaf { value: low }),
                right: Box::new(TreeNode::Leaf { value: high }),
            },
        }
    }

    fn row(year: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(1, 4, &[1.0, 1.0, year, 0.0])
    }

    #[test]
    fn linear_model_is_affine() {
        let model = LinearRegressionModel {
            coefficients: vec![0.1, 0.0, 0.5, -0.2],
            intercept: -1000.0,
        };
        let y = model.predict(&row(2021.0)).unwrap();
        assert!((y[0] - (0.1 + 1010.5 - 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn tree_splits_inclusive_left() {
        let tree = stump(2020.5, 0.2, 0.9);
        assert_eq!(tree.predict(&row(2020.0)).unwrap()[0], 0.2);
        assert_eq!(tree.predict(&row(2020.5)).unwrap()[0], 0.2);
        assert_eq!(tree.predict(&row(2021.0)).unwrap()[0], 0.9);
    }

    #[test]
    fn forest_averages_trees() {
        let forest = RandomForestModel {
            n_features: 4,
            trees: vec![stump(2020.5, 0.2, 0.8), stump(2019.5, 0.4, 0.6)],
        };
        let y = forest.predict(&row(2020.0)).unwrap();
        assert!((y[0] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn svr_sums_kernel_terms() {
        let svr = SupportVectorRegressor {
            kernel: Kernel::Rbf { gamma: 0.5 },
            support_vectors: vec![vec![1.0, 1.0, 2020.0, 0.0], vec![1.0, 1.0, 2022.0, 0.0]],
            dual_coefficients: vec![0.3, -0.1],
            intercept: 0.5,
        };
        let y = svr.predict(&row(2020.0)).unwrap();
        let expected = 0.3 * 1.0 - 0.1 * (-0.5f64 * 4.0).exp() + 0.5;
        assert!((y[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let model = LinearRegressionModel {
            coefficients: vec![1.0, 2.0],
            intercept: 0.0,
        };
        let err = model.predict(&row(2020.0)).unwrap_err();
        assert!(matches!(err, ModelError::FeatureMismatch { expected: 2, actual: 4 }));
    }

    #[test]
    fn parses_tagged_json() {
        let json = r#"{
            "kind": "decision_tree",
            "n_features": 4,
            "root": {
                "type": "split", "feature": 2, "threshold": 2020.5,
                "left": {"type": "leaf", "value": 0.25},
                "right": {"type": "leaf", "value": 0.75}
            }
        }"#;
        let model: FittedModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.kind(), "decision_tree");
        model.validate().unwrap();
        assert_eq!(model.predict(&row(2021.0)).unwrap()[0], 0.75);

        let svr: FittedModel = serde_json::from_str(
            r#"{"kind": "svr", "kernel": {"type": "linear"},
                "support_vectors": [[0, 0, 1, 0]], "dual_coefficients": [0.001], "intercept": 0.0}"#,
        )
        .unwrap();
        assert!((svr.predict(&row(2000.0)).unwrap()[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn validation_rejects_broken_models() {
        let tree = FittedModel::DecisionTree(DecisionTreeModel {
            n_features: 2,
            root: stump(0.0, 0.0, 1.0).root,
        });
        assert!(tree.validate().is_err());

        let svr = FittedModel::Svr(SupportVectorRegressor {
            kernel: Kernel::Linear,
            support_vectors: vec![vec![1.0; 4]],
            dual_coefficients: vec![],
            intercept: 0.0,
        });
        assert!(svr.validate().is_err());

        let forest = FittedModel::RandomForest(RandomForestModel {
            n_features: 4,
            trees: vec![],
        });
        assert!(forest.validate().is_err());
    }

    #[test]
    fn r_squared_of_perfect_fit_is_one() {
        let y = DVector::from_vec(vec![0.0, 0.5, 1.0]);
        assert!((r_squared(&y, &y) - 1.0).abs() < 1e-12);
        let mean = DVector::from_element(3, 0.5);
        assert!(r_squared(&y, &mean).abs() < 1e-12);
    }
}
