//! Scoring constants. A TOML file may override any subset of them:
//!
//! ```toml
//! [aggregate]
//! exam2_weight = 0.7
//!
//! [prediction]
//! jitter = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub aggregate: AggregateConfig,
    pub prediction: PredictionConfig,
    pub risk: RiskConfig,
    pub feedback: FeedbackConfig,
}

impl ScoringConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Same constants with the prediction jitter switched off.
    pub fn deterministic() -> Self {
        let mut config = Self::default();
        config.prediction.jitter = false;
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub exam1_weight: f64,
    pub exam2_weight: f64,
    /// Improvement beyond which a student counts as improving or declining.
    pub trend_threshold: f64,
    pub pass_mark: f64,
    pub excellent_band: f64,
    pub good_band: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            exam1_weight: 0.4,
            exam2_weight: 0.6,
            trend_threshold: 0.5,
            pass_mark: 5.0,
            excellent_band: 8.0,
            good_band: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub current_weight: f64,
    pub improvement_bonus_factor: f64,
    pub improvement_bonus_cap: f64,
    /// Bonus at zero variation, shrinking to 0 at a coefficient of 1.
    pub consistency_bonus_max: f64,
    pub strong_subject_score: f64,
    pub weak_subject_score: f64,
    pub strong_subject_bonus: f64,
    pub weak_subject_penalty: f64,
    pub strong_improvement: f64,
    pub strong_improvement_boost: f64,
    pub strong_decline: f64,
    pub strong_decline_penalty: f64,
    pub upward_extrapolation: f64,
    pub downward_extrapolation: f64,
    /// Next-sitting value when neither sitting has data.
    pub no_data_prediction: f64,
    pub jitter: bool,
    pub confidence_base: f64,
    pub confidence_improvement_slope: f64,
    pub confidence_consistency_slope: f64,
    pub confidence_min: f64,
    pub confidence_max: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            current_weight: 0.4,
            improvement_bonus_factor: 1.0,
            improvement_bonus_cap: 2.5,
            consistency_bonus_max: 3.0,
            strong_subject_score: 8.0,
            weak_subject_score: 5.0,
            strong_subject_bonus: 1.0,
            weak_subject_penalty: 1.0,
            strong_improvement: 1.0,
            strong_improvement_boost: 10.0,
            strong_decline: -1.0,
            strong_decline_penalty: 15.0,
            upward_extrapolation: 0.6,
            downward_extrapolation: 0.3,
            no_data_prediction: 5.0,
            jitter: true,
            confidence_base: 70.0,
            confidence_improvement_slope: 5.0,
            confidence_consistency_slope: 30.0,
            confidence_min: 30.0,
            confidence_max: 95.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Distance below the cohort mean that counts as a risk factor.
    pub mean_gap: f64,
    pub decline: f64,
    pub weak_subject_limit: usize,
    pub consistency_limit: f64,
    pub high_factor_count: usize,
    pub medium_factor_count: usize,
    pub high_average_floor: f64,
    pub medium_average_floor: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            mean_gap: 2.0,
            decline: -1.0,
            weak_subject_limit: 2,
            consistency_limit: 0.6,
            high_factor_count: 3,
            medium_factor_count: 2,
            high_average_floor: 4.0,
            medium_average_floor: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub list_cap: usize,
    pub analytics_list_len: usize,
    pub high_potential_probability: f64,
    /// Coefficient of variation under which a student counts as consistent.
    pub consistent_below: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            list_cap: 3,
            analytics_list_len: 5,
            high_potential_probability: 80.0,
            consistent_below: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = ScoringConfig::from_toml_str(
            "[aggregate]\nexam2_weight = 0.7\n\n[prediction]\njitter = false\n",
        )
        .unwrap();
        assert_eq!(config.aggregate.exam2_weight, 0.7);
        assert_eq!(config.aggregate.exam1_weight, 0.4);
        assert!(!config.prediction.jitter);
        assert_eq!(config.risk, RiskConfig::default());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[risk]\nmean_gap = 1.5").unwrap();
        let config = ScoringConfig::from_path(file.path()).unwrap();
        assert_eq!(config.risk.mean_gap, 1.5);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ScoringConfig::from_path(Path::new("/nonexistent/scoring.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[risk]\nmean_gap = \"wide\"").unwrap();
        let err = ScoringConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
