use std::path::Path;
use std::sync::Arc;

use polars::prelude::DataFrame;
use tracing::info;

use crate::config::{ForecastConfig, ParseOptions};
use crate::data::UploadTable;
use crate::error::{PipelineError, PipelineResult};
use crate::feature::{Direction, FeatureEngineer};
use crate::finalize::{ModelInput, finalize};
use crate::model::Classifier;
use crate::normalize::Normalizer;

/// Result of scoring one upload.
pub struct Forecast {
    /// The upload exactly as read, for echoing back to the user.
    pub upload: DataFrame,
    /// The row handed to the classifier.
    pub input: ModelInput,
    pub direction: Direction,
}

/// Upload → normalize → engineer → finalize → classify.
///
/// The classifier is shared and read-only; every run builds its own frames.
pub struct ForecastPipeline {
    config: ForecastConfig,
    normalizer: Normalizer,
    classifier: Arc<dyn Classifier>,
}

impl ForecastPipeline {
    pub fn new(config: ForecastConfig, classifier: Arc<dyn Classifier>) -> Self {
        let normalizer = Normalizer::new(ParseOptions::from(&config));
        Self {
            config,
            normalizer,
            classifier,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Scores the upload named in the configuration.
    pub fn run_configured(&self) -> PipelineResult<Forecast> {
        self.run(&self.config.upload_csv)
    }

    pub fn run(&self, path: &Path) -> PipelineResult<Forecast> {
        let upload = UploadTable::from_path(path)?;
        self.run_upload(upload)
    }

    pub fn run_frame(&self, raw: DataFrame) -> PipelineResult<Forecast> {
        self.run_upload(UploadTable::from_frame(raw)?)
    }

    pub fn run_upload(&self, upload: UploadTable) -> PipelineResult<Forecast> {
        let input = self.prepare(&upload)?;
        let direction = self.classifier.predict(&input)?;
        info!(date = %input.date, forecast = %direction, "Forecast produced");
        Ok(Forecast {
            upload: upload.frame().clone(),
            input,
            direction,
        })
    }

    /// Runs every stage up to, but not including, the classifier.
    pub fn prepare(&self, upload: &UploadTable) -> PipelineResult<ModelInput> {
        let series = self.normalizer.normalize(upload)?;
        if series.len() < self.config.min_history_days {
            return Err(PipelineError::InsufficientHistory {
                required: self.config.min_history_days,
                available: series.len(),
            });
        }

        let mut engineer = FeatureEngineer::from_series(&series)?;
        engineer.compute_features()?;
        let finalized = finalize(engineer.data_frame())?;
        info!(
            daily_rows = series.len(),
            complete_rows = finalized.height(),
            "Upload prepared for scoring"
        );
        finalized.last_input()
    }
}
