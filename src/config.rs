//! Policy configuration. Every section is optional in the TOML file and falls
//! back to the built-in presets.
//!
//! ```toml
//! [cohort_risk]
//! critical = 0.5
//! high = 0.3
//! medium = 0.15
//!
//! [student_risk]
//! at_risk = 2
//! high = 3
//! critical = 4
//!
//! [trend.ordinal]
//! window = 3
//! delta = 0.5
//!
//! [trend.numeric]
//! window = 3
//! delta = 1.0
//!
//! [numeric]
//! pass_mark = 11
//! satisfactory = 14
//! outstanding = 17
//! max = 20
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::numeric::NumericScale;
use crate::risk::{CohortRiskPolicy, StudentRiskPolicy};
use crate::trend::TrendConfig;

/// The two trend contexts. A partially written section falls back to its own
/// preset, never to the other context's.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTrendPresets")]
pub struct TrendPresets {
    pub ordinal: TrendConfig,
    pub numeric: TrendConfig,
}

impl Default for TrendPresets {
    fn default() -> Self {
        Self {
            ordinal: TrendConfig::ORDINAL_COMPETENCY,
            numeric: TrendConfig::NUMERIC_STUDENT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrendPresets {
    ordinal: RawTrend,
    numeric: RawTrend,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrend {
    window: Option<usize>,
    delta: Option<f64>,
}

impl RawTrend {
    fn over(self, preset: TrendConfig) -> TrendConfig {
        TrendConfig {
            window: self.window.unwrap_or(preset.window),
            delta: self.delta.unwrap_or(preset.delta),
        }
    }
}

impl From<RawTrendPresets> for TrendPresets {
    fn from(raw: RawTrendPresets) -> Self {
        Self {
            ordinal: raw.ordinal.over(TrendConfig::ORDINAL_COMPETENCY),
            numeric: raw.numeric.over(TrendConfig::NUMERIC_STUDENT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub cohort_risk: CohortRiskPolicy,
    pub student_risk: StudentRiskPolicy,
    pub trend: TrendPresets,
    pub numeric: NumericScale,
    pub logging: LoggingConfig,
}

impl AnalyticsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalyticsConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let cohort = &self.cohort_risk;
        if !(0.0 <= cohort.medium && cohort.medium <= cohort.high && cohort.high <= cohort.critical && cohort.critical <= 1.0) {
            return Err(AnalyticsError::Config(format!(
                "cohort risk thresholds must satisfy 0 <= medium <= high <= critical <= 1, got {} / {} / {}",
                cohort.medium, cohort.high, cohort.critical
            )));
        }

        let student = &self.student_risk;
        if !(1 <= student.at_risk && student.at_risk <= student.high && student.high <= student.critical) {
            return Err(AnalyticsError::Config(format!(
                "student risk counts must satisfy 1 <= at_risk <= high <= critical, got {} / {} / {}",
                student.at_risk, student.high, student.critical
            )));
        }

        for (name, trend) in [("ordinal", &self.trend.ordinal), ("numeric", &self.trend.numeric)] {
            if trend.window == 0 {
                return Err(AnalyticsError::Config(format!("trend.{name}.window must be at least 1")));
            }
            if !(trend.delta >= 0.0) {
                return Err(AnalyticsError::Config(format!(
                    "trend.{name}.delta must be non-negative, got {}",
                    trend.delta
                )));
            }
        }

        let numeric = &self.numeric;
        if !(0.0 < numeric.pass_mark
            && numeric.pass_mark <= numeric.satisfactory
            && numeric.satisfactory <= numeric.outstanding
            && numeric.outstanding <= numeric.max)
        {
            return Err(AnalyticsError::Config(
                "numeric bands must satisfy 0 < pass_mark <= satisfactory <= outstanding <= max".to_string(),
            ));
        }

        Ok(())
    }
}
