pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod finalize;
pub mod history;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod rolling;
pub mod schema;

pub use config::{ForecastConfig, ParseOptions};
pub use data::UploadTable;
pub use error::{PipelineError, PipelineResult};
pub use feature::{Direction, FeatureEngineer, categorize_change, engineer_features};
pub use finalize::{Finalized, ModelInput, finalize};
pub use history::ReferenceHistory;
pub use model::{Classifier, ForestModel};
pub use normalize::{DailySeries, Normalizer};
pub use pipeline::{Forecast, ForecastPipeline};
