//! Academic performance analytics over grade records.
//!
//! Grade records come from an external records service. This crate turns
//! them into per-group distributions ([`aggregate`]), risk tiers for
//! competency cohorts and students ([`risk`]) and windowed trends
//! ([`trend`]). Every computation is a pure function of its inputs.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod numeric;
pub mod period;
pub mod report;
pub mod risk;
pub mod scale;
pub mod source;
pub mod trend;

pub use aggregate::{aggregate, Dimension, GroupKey, Groups};
pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, InvalidGradeError, RecordError, Result};
pub use models::{
    AggregateResult, GradeRecord, Outcome, RiskAssessment, RiskTier, SubjectKind, TrendDirection, TrendResult,
};
pub use risk::{assess_cohort, assess_student, at_risk_roster, CohortRiskPolicy, StudentRiskPolicy};
pub use scale::{rank_of, symbol_of, Grade};
pub use trend::{analyze_trend, analyze_trends, TrendConfig};
