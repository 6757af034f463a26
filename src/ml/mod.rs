pub mod models;
pub mod predictor;
pub mod registry;

pub use predictor::Forecaster;
pub use registry::ModelRegistry;
