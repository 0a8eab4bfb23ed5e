//! Windowed trend detection over a chronological grade history.
//!
//! The mean of the first `window` values is compared with the mean of the
//! last `window` values. With fewer than `2 * window` values the two windows
//! overlap.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::rejected;
use crate::error::InvalidGradeError;
use crate::models::{GradeRecord, Outcome, TrendDirection, TrendResult};
use crate::period::PeriodKey;
use crate::scale::{mean, Grade};

/// Window size and dead band for one trend context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub window: usize,
    /// Change in mean that must be exceeded before a trend is called.
    pub delta: f64,
}

impl TrendConfig {
    /// Single competency on the four-step letter scale.
    pub const ORDINAL_COMPETENCY: TrendConfig = TrendConfig {
        window: 3,
        delta: 0.5,
    };

    /// Whole-student history of marks out of 20.
    pub const NUMERIC_STUDENT: TrendConfig = TrendConfig {
        window: 3,
        delta: 1.0,
    };
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self::ORDINAL_COMPETENCY
    }
}

/// Direction and window means for a value series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowComparison {
    pub direction: TrendDirection,
    pub baseline_mean: f64,
    pub recent_mean: f64,
}

pub fn compare_windows(values: &[f64], config: &TrendConfig) -> WindowComparison {
    let window = config.window.max(1).min(values.len());
    let baseline_mean = mean(&values[..window]);
    let recent_mean = mean(&values[values.len() - window..]);

    let direction = if values.len() < 2 {
        TrendDirection::InsufficientData
    } else if recent_mean > baseline_mean + config.delta {
        TrendDirection::Improving
    } else if recent_mean < baseline_mean - config.delta {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    WindowComparison {
        direction,
        baseline_mean,
        recent_mean,
    }
}

fn ranks(records: &[GradeRecord]) -> Result<Vec<f64>, InvalidGradeError> {
    records
        .iter()
        .map(|record| record.grade.parse::<Grade>().map(|grade| f64::from(grade.rank())))
        .collect()
}

/// Trend for one student in one competency. `records` must be oldest first
/// (see [`crate::period::sort_chronologically`]).
///
/// The ids in the result come from the first record and are 0 for empty
/// input. A grade outside the scale fails the whole series.
pub fn analyze_trend(records: &[GradeRecord], config: &TrendConfig) -> Result<TrendResult, InvalidGradeError> {
    let values = ranks(records)?;
    let (subject_id, competency_id) = records
        .first()
        .map_or((0, 0), |first| (first.student_id, first.competency_id));

    if records
        .iter()
        .any(|r| r.student_id != subject_id || r.competency_id != competency_id)
    {
        warn!(subject_id, competency_id, "trend input mixes students or competencies");
    }

    let comparison = compare_windows(&values, config);
    debug!(
        subject_id,
        competency_id,
        points = values.len(),
        direction = ?comparison.direction,
        "analyzed trend"
    );

    Ok(TrendResult {
        subject_id,
        competency_id,
        direction: comparison.direction,
        baseline_mean: comparison.baseline_mean,
        recent_mean: comparison.recent_mean,
    })
}

/// Trends for every `(student, competency)` pair in `records`, in order of
/// first occurrence. Each history is put in chronological order first.
/// Records with a grade outside the scale are left out of their history and
/// reported.
pub fn analyze_trends(records: &[GradeRecord], config: &TrendConfig) -> Outcome<Vec<TrendResult>> {
    let mut order: Vec<(u64, u64)> = Vec::new();
    let mut histories: HashMap<(u64, u64), Vec<(PeriodKey, Option<NaiveDate>, f64)>> = HashMap::new();
    let mut errors = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let grade = match record.grade.parse::<Grade>() {
            Ok(grade) => grade,
            Err(error) => {
                errors.push(rejected(index, record, error));
                continue;
            }
        };
        let pair = (record.student_id, record.competency_id);
        histories
            .entry(pair)
            .or_insert_with(|| {
                order.push(pair);
                Vec::new()
            })
            .push((PeriodKey::of(record), record.recorded_on, f64::from(grade.rank())));
    }

    let mut trends = Vec::with_capacity(order.len());
    for pair in order {
        let Some(history) = histories.get_mut(&pair) else {
            continue;
        };
        history.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let values: Vec<f64> = history.iter().map(|(_, _, rank)| *rank).collect();
        let comparison = compare_windows(&values, config);
        trends.push(TrendResult {
            subject_id: pair.0,
            competency_id: pair.1,
            direction: comparison.direction,
            baseline_mean: comparison.baseline_mean,
            recent_mean: comparison.recent_mean,
        });
    }

    debug!(pairs = trends.len(), rejected = errors.len(), "analyzed trends");
    Outcome::new(trends, errors)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionPoint {
    /// `"<period> <year>"`.
    pub label: String,
    pub grade: Grade,
    pub rank: u8,
}

/// Everything shown for one student's progress in one competency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetencyEvolution {
    pub trend: TrendResult,
    pub mean_rank: f64,
    /// Mean rank banded back to a letter, `None` without records.
    pub overall: Option<Grade>,
    pub points: Vec<EvolutionPoint>,
}

pub fn competency_evolution(
    records: &[GradeRecord],
    config: &TrendConfig,
) -> Result<CompetencyEvolution, InvalidGradeError> {
    let trend = analyze_trend(records, config)?;
    let mut points = Vec::with_capacity(records.len());
    for record in records {
        let grade: Grade = record.grade.parse()?;
        points.push(EvolutionPoint {
            label: format!("{} {}", record.period, record.year),
            grade,
            rank: grade.rank(),
        });
    }

    let ranks: Vec<f64> = points.iter().map(|p| f64::from(p.rank)).collect();
    let mean_rank = mean(&ranks);
    Ok(CompetencyEvolution {
        trend,
        mean_rank,
        overall: (!points.is_empty()).then(|| Grade::from_rank(mean_rank)),
        points,
    })
}
