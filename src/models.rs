use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::scale::Grade;

/// One grade as delivered by the records service. `grade` is kept as the raw
/// symbol so that bad values surface at rank conversion instead of at decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub student_id: u64,
    #[serde(default)]
    pub student_name: String,
    pub competency_id: u64,
    #[serde(default)]
    pub competency_name: String,
    #[serde(default)]
    pub course_id: u64,
    #[serde(default)]
    pub teacher_id: u64,
    pub grade: String,
    pub period: String,
    pub year: i32,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub grade_level: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub recorded_on: Option<NaiveDate>,
}

impl GradeRecord {
    pub fn new(student_id: u64, competency_id: u64, grade: impl Into<String>) -> Self {
        Self {
            student_id,
            student_name: String::new(),
            competency_id,
            competency_name: String::new(),
            course_id: 0,
            teacher_id: 0,
            grade: grade.into(),
            period: String::new(),
            year: 0,
            section: String::new(),
            grade_level: String::new(),
            note: String::new(),
            recorded_on: None,
        }
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Self {
        self.student_name = name.into();
        self
    }

    pub fn with_competency_name(mut self, name: impl Into<String>) -> Self {
        self.competency_name = name.into();
        self
    }

    pub fn with_course(mut self, course_id: u64, teacher_id: u64) -> Self {
        self.course_id = course_id;
        self.teacher_id = teacher_id;
        self
    }

    pub fn with_period(mut self, period: impl Into<String>, year: i32) -> Self {
        self.period = period.into();
        self.year = year;
        self
    }

    pub fn with_section(mut self, grade_level: impl Into<String>, section: impl Into<String>) -> Self {
        self.grade_level = grade_level.into();
        self.section = section.into();
        self
    }

    pub fn with_recorded_on(mut self, date: NaiveDate) -> Self {
        self.recorded_on = Some(date);
        self
    }
}

/// Letter-grade distribution for one group of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    /// Always carries every grade of the scale, zero when unobserved.
    pub counts_per_grade: BTreeMap<Grade, usize>,
    pub total: usize,
    pub mean_rank: f64,
}

impl Default for AggregateResult {
    fn default() -> Self {
        Self {
            counts_per_grade: Grade::ALL.iter().map(|grade| (*grade, 0)).collect(),
            total: 0,
            mean_rank: 0.0,
        }
    }
}

impl AggregateResult {
    pub fn from_grades<I: IntoIterator<Item = Grade>>(grades: I) -> Self {
        let mut result = Self::default();
        let mut rank_sum = 0u64;
        for grade in grades {
            *result.counts_per_grade.entry(grade).or_insert(0) += 1;
            result.total += 1;
            rank_sum += u64::from(grade.rank());
        }
        if result.total > 0 {
            result.mean_rank = rank_sum as f64 / result.total as f64;
        }
        result
    }

    pub fn count(&self, grade: Grade) -> usize {
        self.counts_per_grade.get(&grade).copied().unwrap_or(0)
    }

    /// Share of the group holding `grade`, 0 for an empty group.
    pub fn share(&self, grade: Grade) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.count(grade) as f64 / self.total as f64
        }
    }

    /// The mean rank banded back to a letter.
    pub fn mean_grade(&self) -> Grade {
        Grade::from_rank(self.mean_rank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Student,
    Competency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub subject_id: u64,
    pub subject_kind: SubjectKind,
    pub risk_tier: RiskTier,
    /// Lowest-band observations over all observations.
    pub contributing_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub subject_id: u64,
    pub competency_id: u64,
    pub direction: TrendDirection,
    pub baseline_mean: f64,
    pub recent_mean: f64,
}

/// Results of a bulk computation together with the records it had to skip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub errors: Vec<RecordError>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, errors: Vec<RecordError>) -> Self {
        Self { value, errors }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_aggregate_lists_every_grade() {
        let result = AggregateResult::default();
        assert_eq!(result.counts_per_grade.len(), 4);
        assert!(result.counts_per_grade.values().all(|count| *count == 0));
        assert_eq!(result.share(Grade::C), 0.0);
    }

    #[test]
    fn from_grades_counts_and_averages() {
        let result = AggregateResult::from_grades([Grade::C, Grade::C, Grade::B, Grade::A]);
        assert_eq!(result.total, 4);
        assert_eq!(result.count(Grade::C), 2);
        assert_eq!(result.count(Grade::AD), 0);
        assert!((result.mean_rank - 1.75).abs() < 1e-9);
        assert_eq!(result.mean_grade(), Grade::B);
        assert!((result.share(Grade::C) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn aggregate_serializes_symbol_keys() {
        let result = AggregateResult::from_grades([Grade::AD]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["counts_per_grade"]["AD"], 1);
        assert_eq!(json["counts_per_grade"]["C"], 0);
        assert_eq!(json["total"], 1);
    }

    #[test]
    fn record_decodes_with_optional_fields_missing() {
        let json = r#"{"student_id":7,"competency_id":3,"grade":"A","period":"Bimestre 2","year":2025}"#;
        let record: GradeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, GradeRecord::new(7, 3, "A").with_period("Bimestre 2", 2025));
    }

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
        assert_eq!(serde_json::to_string(&TrendDirection::InsufficientData).unwrap(), "\"insufficient_data\"");
    }
}
