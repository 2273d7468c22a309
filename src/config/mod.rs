//! Top-level configuration, loadable from TOML.
//!
//! Every section is optional in the file and falls back to its defaults:
//!
//! ```toml
//! score_metric = "ate"
//!
//! [optimizer]
//! mode = "batch"
//! max_iterations = 100
//!
//! [weights]
//! coef = [{ gap = 1, coefficient = 1.0 }, { gap = 2, coefficient = 2.0 }]
//! coef_loop = 5.0
//! loop_threshold = 10
//! rotation_scale = 1.0
//!
//! [evaluation]
//! rpe_indices = "full"
//! alignment = "rigid"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::evaluation::{EvaluationConfig, ScoreMetric};
use crate::keyframe::KeyFrameConfig;
use crate::loop_closure::LoopClosureConfig;
use crate::measurement::WeightPolicy;
use crate::optimizer::OptimizerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub optimizer: OptimizerConfig,
    pub weights: WeightPolicy,
    pub evaluation: EvaluationConfig,
    pub keyframe: KeyFrameConfig,
    pub loop_closure: LoopClosureConfig,
    pub score_metric: ScoreMetric,
}

impl AggregationConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AggregationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimizer.validate()?;
        self.weights.validate()?;
        if self.keyframe.period == 0 {
            return Err(ConfigError::Invalid("keyframe period must be > 0".into()));
        }
        if !self.loop_closure.matches_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "loop_closure matches_threshold must be finite".into(),
            ));
        }
        Ok(())
    }
}
