use std::collections::HashMap;
use std::fs;
use tracing::{debug, info, warn};

use super::models::{r_squared, FittedModel, Regressor};
use crate::config::ModelsConfig;
use crate::data::{Dataset, FEATURE_COLUMNS};
use crate::error::ModelError;

/// `Random_Forest` is listed as `Random Forest`.
pub fn display_name(file_stem: &str) -> String {
    file_stem.replace('_', " ")
}

/// Display name to fitted model, in the configured order. Read-only once built.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    names: Vec<String>,
    models: HashMap<String, FittedModel>,
}

impl ModelRegistry {
    pub fn load(config: &ModelsConfig) -> Result<Self, ModelError> {
        let mut registry = Self::default();

        for name in &config.names {
            let path = config.dir.join(format!("{}.json", name));
            debug!("Reading model file {}", path.display());

            let content = fs::read_to_string(&path).map_err(|e| ModelError::LoadError {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let model: FittedModel =
                serde_json::from_str(&content).map_err(|e| ModelError::LoadError {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            model.validate().map_err(|e| ModelError::LoadError {
                path: path.clone(),
                message: e.to_string(),
            })?;
            if model.n_features() != FEATURE_COLUMNS.len() {
                return Err(ModelError::LoadError {
                    path,
                    message: format!(
                        "model takes {} features, expected {} ({})",
                        model.n_features(),
                        FEATURE_COLUMNS.len(),
                        FEATURE_COLUMNS.join(", ")
                    ),
                });
            }

            info!("Loaded {} model {}", model.kind(), name);
            registry.insert(name, model);
        }

        if registry.is_empty() {
            warn!("No models configured, the forecast page will be empty");
        }
        info!("Model registry ready with {} models", registry.len());
        Ok(registry)
    }

    /// Later inserts under the same name replace the model but keep its position.
    pub fn insert(&mut self, file_stem: &str, model: FittedModel) {
        let name = display_name(file_stem);
        if self.models.insert(name.clone(), model).is_none() {
            self.names.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FittedModel> {
        self.models.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// In-sample R² of every model on the normalized series.
    pub fn evaluate(&self, dataset: &Dataset) -> Vec<(String, f64)> {
        let x = dataset.feature_matrix();
        let y = dataset.targets();

        self.names
            .iter()
            .filter_map(|name| {
                let model = self.models.get(name)?;
                match model.predict(&x) {
                    Ok(y_pred) => Some((name.clone(), r_squared(&y, &y_pred))),
                    Err(e) => {
                        warn!("Could not evaluate {}: {}", name, e);
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CovidWindow;
    use crate::ml::models::LinearRegressionModel;

    fn linear(intercept: f64) -> FittedModel {
        FittedModel::Linear(LinearRegressionModel {
            coefficients: vec![0.0; 4],
            intercept,
        })
    }

    #[test]
    fn display_names_replace_underscores() {
        assert_eq!(display_name("Support_Vector_Machine"), "Support Vector Machine");
        assert_eq!(display_name("Linear"), "Linear");
    }

    #[test]
    fn insert_keeps_order_and_replaces_duplicates() {
        let mut registry = ModelRegistry::default();
        registry.insert("Ridge_Regression", linear(1.0));
        registry.insert("Decision_Tree", linear(2.0));
        registry.insert("Ridge_Regression", linear(3.0));

        assert_eq!(registry.names(), &["Ridge Regression", "Decision Tree"]);
        assert!(registry.get("Ridge_Regression").is_none());
        match registry.get("Ridge Regression") {
            Some(FittedModel::Linear(m)) => assert_eq!(m.intercept, 3.0),
            other => panic!("unexpected model {:?}", other),
        }
    }

    #[test]
    fn loads_json_files_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Linear_Regression.json"),
            r#"{"kind": "linear", "coefficients": [0, 0, 0, 0], "intercept": 0.5}"#,
        )
        .unwrap();

        let config = ModelsConfig {
            dir: dir.path().to_path_buf(),
            names: vec!["Linear_Regression".to_string()],
        };
        let registry = ModelRegistry::load(&config).unwrap();
        assert_eq!(registry.names(), &["Linear Regression"]);

        let missing = ModelsConfig {
            names: vec!["Lasso_Regression".to_string()],
            ..config
        };
        assert!(matches!(
            ModelRegistry::load(&missing),
            Err(ModelError::LoadError { .. })
        ));
    }

    #[test]
    fn invalid_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Random_Forest.json"),
            r#"{"kind": "random_forest", "n_features": 4, "trees": []}"#,
        )
        .unwrap();

        let config = ModelsConfig {
            dir: dir.path().to_path_buf(),
            names: vec!["Random_Forest".to_string()],
        };
        assert!(ModelRegistry::load(&config).is_err());
    }

    #[test]
    fn model_with_wrong_feature_count_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Linear_Regression.json"),
            r#"{"kind": "linear", "coefficients": [0.1, 0.2, 0.3], "intercept": 0.0}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("Decision_Tree.json"),
            r#"{"kind": "decision_tree", "n_features": 5, "root": {"type": "leaf", "value": 0.5}}"#,
        )
        .unwrap();

        for name in ["Linear_Regression", "Decision_Tree"] {
            let config = ModelsConfig {
                dir: dir.path().to_path_buf(),
                names: vec![name.to_string()],
            };
            match ModelRegistry::load(&config) {
                Err(ModelError::LoadError { message, .. }) => {
                    assert!(message.contains("expected 4"), "{}", message)
                }
                other => panic!("{} loaded: {:?}", name, other),
            }
        }
    }

    #[test]
    fn evaluate_scores_each_model() {
        let csv = "Date,value of Co2 emissions\n2019-01-01,10\n2019-02-01,20\n2019-03-01,30\n";
        let (dataset, _) = Dataset::from_reader(
            csv.as_bytes(),
            &crate::config::DataConfig::default(),
            &CovidWindow::default(),
        )
        .unwrap();

        let mut registry = ModelRegistry::default();
        // Month 1..3 maps to 0, 0.5, 1.0.
        registry.insert(
            "Exact",
            FittedModel::Linear(LinearRegressionModel {
                coefficients: vec![0.0, 0.5, 0.0, 0.0],
                intercept: -0.5,
            }),
        );
        registry.insert("Mean", linear(0.5));

        let scores = registry.evaluate(&dataset);
        assert_eq!(scores.len(), 2);
        assert!((scores[0].1 - 1.0).abs() < 1e-12);
        assert!(scores[1].1.abs() < 1e-12);
    }
}
