//! Summaries for the legacy 0-20 mark scale used by the section dashboard and
//! the whole-student evolution view. Marks are read from the record's `grade`
//! field.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{fold_groups, rejected, Dimension, Groups};
use crate::error::InvalidGradeError;
use crate::models::{GradeRecord, Outcome, TrendDirection};
use crate::scale::{mean, ScaleKind};
use crate::trend::{compare_windows, TrendConfig};

/// Band boundaries on the 0-20 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericScale {
    /// Marks below this are failing.
    pub pass_mark: f64,
    pub satisfactory: f64,
    pub outstanding: f64,
    pub max: f64,
}

impl NumericScale {
    pub const DEFAULT: NumericScale = NumericScale {
        pass_mark: 11.0,
        satisfactory: 14.0,
        outstanding: 17.0,
        max: 20.0,
    };

    pub fn parse_mark(&self, value: &str) -> Result<f64, InvalidGradeError> {
        match value.trim().parse::<f64>() {
            Ok(mark) if (0.0..=self.max).contains(&mark) => Ok(mark),
            _ => Err(InvalidGradeError::new(value, ScaleKind::Numeric)),
        }
    }

    pub fn band(&self, mark: f64) -> NumericBand {
        match mark {
            m if m < self.pass_mark => NumericBand::AtRisk,
            m if m < self.satisfactory => NumericBand::Regular,
            m if m < self.outstanding => NumericBand::Satisfactory,
            _ => NumericBand::Outstanding,
        }
    }
}

impl Default for NumericScale {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericBand {
    AtRisk,
    Regular,
    Satisfactory,
    Outstanding,
}

impl NumericBand {
    pub const ALL: [NumericBand; 4] = [
        NumericBand::AtRisk,
        NumericBand::Regular,
        NumericBand::Satisfactory,
        NumericBand::Outstanding,
    ];
}

fn empty_bands() -> BTreeMap<NumericBand, usize> {
    NumericBand::ALL.iter().map(|band| (*band, 0)).collect()
}

/// Mark statistics for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericAggregate {
    pub total: usize,
    pub mean: f64,
    pub best: f64,
    pub worst: f64,
    /// Always carries every band, zero when unobserved.
    pub bands: BTreeMap<NumericBand, usize>,
}

impl NumericAggregate {
    pub fn from_marks(marks: &[f64], scale: &NumericScale) -> Self {
        let mut bands = empty_bands();
        for mark in marks {
            *bands.entry(scale.band(*mark)).or_insert(0) += 1;
        }
        let (best, worst) = if marks.is_empty() {
            (0.0, 0.0)
        } else {
            (
                marks.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                marks.iter().copied().fold(f64::INFINITY, f64::min),
            )
        };
        Self {
            total: marks.len(),
            mean: mean(marks),
            best,
            worst,
            bands,
        }
    }
}

/// Plain arithmetic mean of marks per group, with best, worst and band counts.
pub fn aggregate_numeric(
    records: &[GradeRecord],
    group_by: &[Dimension],
    scale: &NumericScale,
) -> Outcome<Groups<NumericAggregate>> {
    let outcome = fold_groups(
        records,
        group_by,
        |record| scale.parse_mark(&record.grade),
        |marks: &mut Vec<f64>, mark| marks.push(mark),
    )
    .map(|groups| groups.map_values(|_, marks| NumericAggregate::from_marks(&marks, scale)));

    debug!(groups = outcome.value.len(), rejected = outcome.errors.len(), "aggregated marks");
    outcome
}

/// Headline figures for one section in one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionDashboard {
    pub student_count: usize,
    pub mean: f64,
    /// Students with at least one mark below the pass mark.
    pub students_at_risk: usize,
    pub best: f64,
    pub bands: BTreeMap<NumericBand, usize>,
    /// Mean mark per student, first seen first.
    pub per_student: Vec<StudentMean>,
    /// Mean mark per competency, first seen first.
    pub per_competency: Vec<CompetencyMean>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentMean {
    pub student_id: u64,
    pub student_name: String,
    pub mean: f64,
    pub band: NumericBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetencyMean {
    pub competency_id: u64,
    pub competency_name: String,
    pub mean: f64,
}

fn valid_marks<'a>(records: &'a [GradeRecord], scale: &NumericScale) -> Outcome<Vec<(&'a GradeRecord, f64)>> {
    let mut valid = Vec::with_capacity(records.len());
    let mut errors = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match scale.parse_mark(&record.grade) {
            Ok(mark) => valid.push((record, mark)),
            Err(error) => errors.push(rejected(index, record, error)),
        }
    }
    Outcome::new(valid, errors)
}

/// First name seen for each id.
fn first_names<'a>(records: &'a [GradeRecord], field: impl Fn(&'a GradeRecord) -> (u64, &'a str)) -> HashMap<u64, &'a str> {
    let mut names = HashMap::new();
    for record in records {
        let (id, name) = field(record);
        names.entry(id).or_insert(name);
    }
    names
}

fn competency_means(records: &[GradeRecord], scale: &NumericScale) -> Vec<CompetencyMean> {
    let names = first_names(records, |r| (r.competency_id, r.competency_name.as_str()));
    aggregate_numeric(records, &[Dimension::Competency], scale)
        .value
        .into_entries()
        .into_iter()
        .filter_map(|(key, aggregate)| {
            let competency_id = key.parts().first()?.parse::<u64>().ok()?;
            Some(CompetencyMean {
                competency_id,
                competency_name: names.get(&competency_id).copied().unwrap_or_default().to_string(),
                mean: aggregate.mean,
            })
        })
        .collect()
}

/// Dashboard over `records`, already narrowed to one section and period.
pub fn section_dashboard(records: &[GradeRecord], scale: &NumericScale) -> Outcome<SectionDashboard> {
    let marked = valid_marks(records, scale);
    let marks: Vec<f64> = marked.value.iter().map(|(_, mark)| *mark).collect();
    let overall = NumericAggregate::from_marks(&marks, scale);
    let valid: Vec<GradeRecord> = marked.value.iter().map(|(r, _)| (*r).clone()).collect();

    let students: HashSet<u64> = marked.value.iter().map(|(r, _)| r.student_id).collect();
    let at_risk: HashSet<u64> = marked
        .value
        .iter()
        .filter(|(_, mark)| *mark < scale.pass_mark)
        .map(|(r, _)| r.student_id)
        .collect();

    let student_names = first_names(&valid, |r| (r.student_id, r.student_name.as_str()));
    let per_student = aggregate_numeric(&valid, &[Dimension::Student], scale)
        .value
        .into_entries()
        .into_iter()
        .filter_map(|(key, aggregate)| {
            let student_id = key.parts().first()?.parse::<u64>().ok()?;
            Some(StudentMean {
                student_id,
                student_name: student_names.get(&student_id).copied().unwrap_or_default().to_string(),
                mean: aggregate.mean,
                band: scale.band(aggregate.mean),
            })
        })
        .collect();

    let dashboard = SectionDashboard {
        student_count: students.len(),
        mean: overall.mean,
        students_at_risk: at_risk.len(),
        best: overall.best,
        bands: overall.bands,
        per_student,
        per_competency: competency_means(&valid, scale),
    };
    debug!(students = dashboard.student_count, at_risk = dashboard.students_at_risk, "built section dashboard");
    Outcome::new(dashboard, marked.errors)
}

/// One student's marks over time, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentEvolution {
    pub student_id: u64,
    pub total: usize,
    pub mean: f64,
    pub best: f64,
    pub worst: f64,
    pub direction: TrendDirection,
    pub baseline_mean: f64,
    pub recent_mean: f64,
    pub per_competency: Vec<CompetencyMean>,
}

/// Evolution of one student's marks. `records` must be oldest first; the
/// trend uses `config` (normally [`TrendConfig::NUMERIC_STUDENT`]).
pub fn student_evolution(
    records: &[GradeRecord],
    scale: &NumericScale,
    config: &TrendConfig,
) -> Outcome<StudentEvolution> {
    let marked = valid_marks(records, scale);
    let marks: Vec<f64> = marked.value.iter().map(|(_, mark)| *mark).collect();
    let overall = NumericAggregate::from_marks(&marks, scale);
    let comparison = compare_windows(&marks, config);
    let valid: Vec<GradeRecord> = marked.value.iter().map(|(r, _)| (*r).clone()).collect();

    let evolution = StudentEvolution {
        student_id: records.first().map_or(0, |r| r.student_id),
        total: overall.total,
        mean: overall.mean,
        best: overall.best,
        worst: overall.worst,
        direction: comparison.direction,
        baseline_mean: comparison.baseline_mean,
        recent_mean: comparison.recent_mean,
        per_competency: competency_means(&valid, scale),
    };
    debug!(student_id = evolution.student_id, direction = ?evolution.direction, "analyzed mark history");
    Outcome::new(evolution, marked.errors)
}
