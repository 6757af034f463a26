pub mod features;
pub mod loader;
pub mod scaler;

pub use features::{CovidWindow, FeatureRow, FEATURE_COLUMNS};
pub use loader::Dataset;
pub use scaler::MinMaxScaler;
