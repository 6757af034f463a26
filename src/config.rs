use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::data::CovidWindow;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub models: ModelsConfig,
    pub covid: CovidConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv_path: PathBuf,
    pub date_column: String,
    pub value_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("World_Dataset_After_preprossing.csv"),
            date_column: "Date".to_string(),
            value_column: "value of Co2 emissions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    /// File stems under `dir`; display names swap `_` for a space.
    pub names: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            names: [
                "Linear_Regression",
                "Ridge_Regression",
                "Lasso_Regression",
                "Decision_Tree",
                "Random_Forest",
                "Support_Vector_Machine",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CovidConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for CovidConfig {
    fn default() -> Self {
        let window = CovidWindow::default();
        Self {
            start: window.start,
            end: window.end,
        }
    }
}

impl CovidConfig {
    pub fn window(&self) -> CovidWindow {
        CovidWindow::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.covid.start > config.covid.end {
            anyhow::bail!(
                "covid window starts after it ends ({} > {})",
                config.covid.start,
                config.covid.end
            );
        }
        Ok(config)
    }
}
