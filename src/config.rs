//! Run configuration, loaded from JSON. Missing fields take the defaults of
//! the reference captures.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::basis::GridConfig;
use crate::error::{ObserverError, Result};
use crate::filters::{EstimationGains, TrainingGains};
use crate::smoothing::EnvelopeConfig;
use crate::storage;
use crate::types::STATE_DIM;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub grid: GridConfig,
    pub training: TrainingGains,
    pub estimation: EstimationGains,
    pub envelope: EnvelopeConfig,
    /// Leading samples ignored when scoring tracking error
    pub transient_steps: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::training_default(),
            training: TrainingGains::default(),
            estimation: EstimationGains::default(),
            envelope: EnvelopeConfig::default(),
            transient_steps: 7,
        }
    }
}

impl ObserverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = storage::read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json(path, self)
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if self.grid.dimension() != STATE_DIM {
            return Err(ObserverError::Configuration(format!(
                "grid has {} axes but the state has {}",
                self.grid.dimension(),
                STATE_DIM
            )));
        }
        self.training.validate()?;
        self.estimation.validate()?;
        if self.envelope.window == 0 {
            return Err(ObserverError::Configuration(
                "envelope window must be at least one sample".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::AxisRange;
    use crate::storage::scratch_path;

    #[test]
    fn test_defaults_are_valid() {
        let config = ObserverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grid.resolution, 12);
        assert_eq!(config.envelope.window, 120);
        assert_eq!(config.training.alpha, 1.5);
        assert_eq!(config.estimation.b, -0.25);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "training": { "lambda": 2.0 }, "envelope": { "window": 60 } }"#;
        let config: ObserverConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.training.lambda, 2.0);
        assert_eq!(config.training.p, 5.0);
        assert_eq!(config.envelope.window, 60);
        assert_eq!(config.envelope.warmup, 20);
        assert_eq!(config.grid, GridConfig::training_default());
    }

    #[test]
    fn test_rejects_wrong_grid_dimension() {
        let config = ObserverConfig {
            grid: GridConfig::new(vec![AxisRange::new(0.0, 1.0); 3], 8),
            ..ObserverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ObserverError::Configuration(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let mut config = ObserverConfig::default();
        config.grid = GridConfig::detection_default();
        config.estimation.b = -0.4;
        config.envelope.window = 90;

        let path = scratch_path("observer_config.json");
        config.save(&path).unwrap();
        let loaded = ObserverConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.grid, GridConfig::detection_default());
        assert_eq!(loaded.estimation.b, -0.4);
        assert_eq!(loaded.envelope.window, 90);
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = ObserverConfig::default();
        config.envelope.window = 0;
        assert!(config.validate().is_err());
    }
}
