//! Risk policies: competency cohorts by share of `C` grades, students by the
//! number of competencies whose latest grade is `C`. The two policies use
//! different inputs and thresholds and are not interchangeable.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{aggregate, rejected, Dimension};
use crate::filter::RecordFilter;
use crate::models::{AggregateResult, GradeRecord, Outcome, RiskAssessment, RiskTier, SubjectKind};
use crate::period::PeriodKey;
use crate::scale::Grade;

/// Thresholds on the share of `C` grades within a competency cohort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortRiskPolicy {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl CohortRiskPolicy {
    pub const DEFAULT: CohortRiskPolicy = CohortRiskPolicy {
        critical: 0.50,
        high: 0.30,
        medium: 0.15,
    };

    pub fn tier(&self, ratio: f64) -> RiskTier {
        match ratio {
            r if r >= self.critical => RiskTier::Critical,
            r if r >= self.high => RiskTier::High,
            r if r >= self.medium => RiskTier::Medium,
            _ => RiskTier::Low,
        }
    }
}

impl Default for CohortRiskPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Minimum number of `C` competencies for each student tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentRiskPolicy {
    /// Below this a student is not flagged at all; at it the tier is medium.
    pub at_risk: usize,
    pub high: usize,
    pub critical: usize,
}

impl StudentRiskPolicy {
    pub const DEFAULT: StudentRiskPolicy = StudentRiskPolicy {
        at_risk: 2,
        high: 3,
        critical: 4,
    };

    /// Tier for a count of `C` competencies, `None` when not at risk.
    pub fn tier(&self, c_competencies: usize) -> Option<RiskTier> {
        match c_competencies {
            n if n >= self.critical => Some(RiskTier::Critical),
            n if n >= self.high => Some(RiskTier::High),
            n if n >= self.at_risk => Some(RiskTier::Medium),
            _ => None,
        }
    }
}

impl Default for StudentRiskPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `count(C) / total`, 0 for an empty cohort.
pub fn cohort_risk_ratio(counts: &AggregateResult) -> f64 {
    counts.share(Grade::LOWEST)
}

pub fn assess_cohort(competency_id: u64, counts: &AggregateResult, policy: &CohortRiskPolicy) -> RiskAssessment {
    let ratio = cohort_risk_ratio(counts);
    RiskAssessment {
        subject_id: competency_id,
        subject_kind: SubjectKind::Competency,
        risk_tier: policy.tier(ratio),
        contributing_ratio: ratio,
    }
}

/// One row of the competency risk table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetencyRisk {
    pub competency_id: u64,
    pub competency_name: String,
    #[serde(flatten)]
    pub counts: AggregateResult,
    pub risk_ratio: f64,
    /// Ratio as a whole percentage, for display only.
    pub risk_percent: u32,
    pub tier: RiskTier,
}

/// Cohort risk for every competency present in `records`, riskiest first.
/// Callers narrow `records` to one section and period beforehand.
pub fn competency_risk_table(records: &[GradeRecord], policy: &CohortRiskPolicy) -> Outcome<Vec<CompetencyRisk>> {
    let mut names: HashMap<u64, &str> = HashMap::new();
    for record in records {
        names
            .entry(record.competency_id)
            .or_insert(record.competency_name.as_str());
    }

    let outcome = aggregate(records, &[Dimension::Competency]);
    let mut rows: Vec<CompetencyRisk> = Vec::with_capacity(outcome.value.len());
    for (key, counts) in outcome.value.into_entries() {
        let Some(competency_id) = key.parts().first().and_then(|part| part.parse::<u64>().ok()) else {
            continue;
        };
        let assessment = assess_cohort(competency_id, &counts, policy);
        rows.push(CompetencyRisk {
            competency_id,
            competency_name: names.get(&competency_id).copied().unwrap_or_default().to_string(),
            risk_ratio: assessment.contributing_ratio,
            risk_percent: (assessment.contributing_ratio * 100.0).round() as u32,
            tier: assessment.risk_tier,
            counts,
        });
    }

    rows.sort_by(|a, b| b.risk_ratio.partial_cmp(&a.risk_ratio).unwrap_or(std::cmp::Ordering::Equal));
    debug!(competencies = rows.len(), "classified competency cohorts");
    Outcome::new(rows, outcome.errors)
}

/// Per-student academic risk within one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRisk {
    pub student_id: u64,
    pub student_name: String,
    pub grade_level: String,
    pub section: String,
    /// Distinct competencies whose latest grade is `C`.
    pub c_competencies: usize,
    pub graded_competencies: usize,
    /// `None` when the student is below the at-risk count.
    pub tier: Option<RiskTier>,
}

impl StudentRisk {
    pub fn is_at_risk(&self) -> bool {
        self.tier.is_some()
    }

    pub fn assessment(&self) -> RiskAssessment {
        RiskAssessment {
            subject_id: self.student_id,
            subject_kind: SubjectKind::Student,
            risk_tier: self.tier.unwrap_or(RiskTier::Low),
            contributing_ratio: if self.graded_competencies == 0 {
                0.0
            } else {
                self.c_competencies as f64 / self.graded_competencies as f64
            },
        }
    }
}

/// Applies the student policy to all records of one student.
///
/// The latest grade per competency is the one with the greatest
/// `(year, period, recorded_on)`; later input position wins remaining ties.
/// Returns `None` in the outcome when no record has a valid grade.
pub fn assess_student(records: &[GradeRecord], policy: &StudentRiskPolicy) -> Outcome<Option<StudentRisk>> {
    let mut latest: HashMap<u64, (PeriodKey, Option<NaiveDate>, Grade)> = HashMap::new();
    let mut errors = Vec::new();
    let mut profile: Option<&GradeRecord> = None;

    for (index, record) in records.iter().enumerate() {
        let grade = match record.grade.parse::<Grade>() {
            Ok(grade) => grade,
            Err(error) => {
                errors.push(rejected(index, record, error));
                continue;
            }
        };
        profile.get_or_insert(record);

        let key = PeriodKey::of(record);
        let replace = match latest.get(&record.competency_id) {
            Some((seen_key, seen_date, _)) => (&key, record.recorded_on) >= (seen_key, *seen_date),
            None => true,
        };
        if replace {
            latest.insert(record.competency_id, (key, record.recorded_on, grade));
        }
    }

    let risk = profile.map(|first| {
        let c_competencies = latest
            .values()
            .filter(|(_, _, grade)| *grade == Grade::LOWEST)
            .count();
        StudentRisk {
            student_id: first.student_id,
            student_name: first.student_name.clone(),
            grade_level: first.grade_level.clone(),
            section: first.section.clone(),
            c_competencies,
            graded_competencies: latest.len(),
            tier: policy.tier(c_competencies),
        }
    });

    Outcome::new(risk, errors)
}

/// Narrowing applied before building the at-risk roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterQuery {
    pub period: String,
    pub year: i32,
    pub grade_level: Option<String>,
    pub section: Option<String>,
}

/// Students flagged by the student policy in one period, most `C`
/// competencies first, then by name.
pub fn at_risk_roster(
    records: &[GradeRecord],
    query: &RosterQuery,
    policy: &StudentRiskPolicy,
) -> Outcome<Vec<StudentRisk>> {
    let filter = RecordFilter {
        period: Some(query.period.clone()),
        year: Some(query.year),
        grade_level: query.grade_level.clone(),
        section: query.section.clone(),
        ..RecordFilter::default()
    };

    let mut order: Vec<u64> = Vec::new();
    let mut by_student: HashMap<u64, (Vec<usize>, Vec<GradeRecord>)> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        if !filter.matches(record) {
            continue;
        }
        let (indices, student_records) = by_student.entry(record.student_id).or_insert_with(|| {
            order.push(record.student_id);
            (Vec::new(), Vec::new())
        });
        indices.push(index);
        student_records.push(record.clone());
    }

    let mut roster = Vec::new();
    let mut errors = Vec::new();
    for student_id in order {
        let Some((indices, student_records)) = by_student.get(&student_id) else {
            continue;
        };
        let outcome = assess_student(student_records, policy);
        errors.extend(outcome.errors.into_iter().map(|mut err| {
            err.index = indices[err.index];
            err
        }));
        if let Some(risk) = outcome.value.filter(StudentRisk::is_at_risk) {
            roster.push(risk);
        }
    }

    roster.sort_by(|a, b| {
        b.c_competencies
            .cmp(&a.c_competencies)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    debug!(flagged = roster.len(), rejected = errors.len(), "built at-risk roster");
    Outcome::new(roster, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort(grades: &[&str]) -> Vec<GradeRecord> {
        grades
            .iter()
            .enumerate()
            .map(|(i, grade)| {
                GradeRecord::new(i as u64 + 1, 10, *grade)
                    .with_competency_name("Reads texts")
                    .with_period("Bimestre 1", 2025)
            })
            .collect()
    }

    fn cohort_counts(grades: &[&str]) -> AggregateResult {
        AggregateResult::from_grades(grades.iter().map(|g| g.parse::<Grade>().unwrap()))
    }

    #[test]
    fn cohort_tiers_follow_thresholds() {
        let policy = CohortRiskPolicy::DEFAULT;
        assert_eq!(policy.tier(0.50), RiskTier::Critical);
        assert_eq!(policy.tier(0.49), RiskTier::High);
        assert_eq!(policy.tier(0.30), RiskTier::High);
        assert_eq!(policy.tier(0.29), RiskTier::Medium);
        assert_eq!(policy.tier(0.15), RiskTier::Medium);
        assert_eq!(policy.tier(0.14), RiskTier::Low);
        assert_eq!(policy.tier(0.0), RiskTier::Low);
    }

    #[test]
    fn half_c_cohort_is_critical() {
        let assessment = assess_cohort(10, &cohort_counts(&["C", "C", "B", "A"]), &CohortRiskPolicy::DEFAULT);
        assert!((assessment.contributing_ratio - 0.5).abs() < 1e-9);
        assert_eq!(assessment.risk_tier, RiskTier::Critical);
        assert_eq!(assessment.subject_kind, SubjectKind::Competency);
    }

    #[test]
    fn all_c_cohort_is_critical_and_one_in_six_is_medium() {
        let all_c = assess_cohort(10, &cohort_counts(&["C", "C"]), &CohortRiskPolicy::DEFAULT);
        assert_eq!(all_c.contributing_ratio, 1.0);
        assert_eq!(all_c.risk_tier, RiskTier::Critical);

        let one_in_six = assess_cohort(10, &cohort_counts(&["C", "B", "B", "B", "B", "B"]), &CohortRiskPolicy::DEFAULT);
        assert!((one_in_six.contributing_ratio - 1.0 / 6.0).abs() < 1e-9);
        assert_eq!(one_in_six.risk_tier, RiskTier::Medium);
    }

    #[test]
    fn empty_cohort_has_zero_ratio() {
        let assessment = assess_cohort(10, &AggregateResult::default(), &CohortRiskPolicy::DEFAULT);
        assert_eq!(assessment.contributing_ratio, 0.0);
        assert_eq!(assessment.risk_tier, RiskTier::Low);
    }

    #[test]
    fn risk_table_orders_riskiest_first() {
        let mut records = cohort(&["A", "B", "AD"]);
        records.extend(cohort(&["C", "C", "B"]).into_iter().map(|r| GradeRecord {
            competency_id: 11,
            competency_name: "Solves problems".to_string(),
            ..r
        }));

        let outcome = competency_risk_table(&records, &CohortRiskPolicy::DEFAULT);
        assert!(outcome.is_clean());
        let rows = outcome.value;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].competency_id, 11);
        assert_eq!(rows[0].competency_name, "Solves problems");
        assert_eq!(rows[0].risk_percent, 67);
        assert_eq!(rows[0].tier, RiskTier::Critical);
        assert_eq!(rows[1].tier, RiskTier::Low);
        assert_eq!(rows[1].counts.total, 3);
    }

    #[test]
    fn student_tiers_follow_counts() {
        let policy = StudentRiskPolicy::DEFAULT;
        assert_eq!(policy.tier(0), None);
        assert_eq!(policy.tier(1), None);
        assert_eq!(policy.tier(2), Some(RiskTier::Medium));
        assert_eq!(policy.tier(3), Some(RiskTier::High));
        assert_eq!(policy.tier(4), Some(RiskTier::Critical));
        assert_eq!(policy.tier(9), Some(RiskTier::Critical));
    }

    fn student_record(competency: u64, grade: &str, period: &str) -> GradeRecord {
        GradeRecord::new(7, competency, grade)
            .with_student_name("Lucia Quispe")
            .with_section("Tercero", "B")
            .with_period(period, 2025)
    }

    #[test]
    fn two_c_competencies_flag_student_as_medium() {
        let records = vec![
            student_record(1, "C", "Bimestre 1"),
            student_record(2, "C", "Bimestre 1"),
            student_record(3, "A", "Bimestre 1"),
            student_record(4, "AD", "Bimestre 1"),
            student_record(1, "C", "Bimestre 1"),
        ];
        let risk = assess_student(&records, &StudentRiskPolicy::DEFAULT).value.unwrap();
        assert_eq!(risk.c_competencies, 2);
        assert_eq!(risk.graded_competencies, 4);
        assert_eq!(risk.tier, Some(RiskTier::Medium));

        let assessment = risk.assessment();
        assert_eq!(assessment.subject_kind, SubjectKind::Student);
        assert!((assessment.contributing_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn one_c_competency_is_not_flagged() {
        let records = vec![student_record(1, "C", "Bimestre 1"), student_record(2, "B", "Bimestre 1")];
        let risk = assess_student(&records, &StudentRiskPolicy::DEFAULT).value.unwrap();
        assert_eq!(risk.c_competencies, 1);
        assert!(!risk.is_at_risk());
        assert_eq!(risk.assessment().risk_tier, RiskTier::Low);
    }

    #[test]
    fn only_the_latest_grade_per_competency_counts() {
        let records = vec![
            student_record(1, "B", "Bimestre 2"),
            student_record(1, "C", "Bimestre 1"),
            student_record(2, "C", "Bimestre 1"),
            student_record(2, "A", "Bimestre 2"),
        ];
        let risk = assess_student(&records, &StudentRiskPolicy::DEFAULT).value.unwrap();
        assert_eq!(risk.c_competencies, 0);
    }

    #[test]
    fn terms_ending_together_are_ordered_by_recorded_date() {
        let first = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let later = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        let records = vec![
            student_record(1, "C", "Trimestre 3").with_recorded_on(first),
            student_record(2, "C", "Trimestre 3").with_recorded_on(first),
            student_record(1, "A", "Bimestre 4").with_recorded_on(later),
        ];
        let risk = assess_student(&records, &StudentRiskPolicy::DEFAULT).value.unwrap();
        assert_eq!(risk.c_competencies, 1);
        assert_eq!(risk.tier, None);

        let reversed: Vec<GradeRecord> = records.into_iter().rev().collect();
        let risk = assess_student(&reversed, &StudentRiskPolicy::DEFAULT).value.unwrap();
        assert_eq!(risk.c_competencies, 1);
    }

    #[test]
    fn student_with_only_invalid_grades_has_no_assessment() {
        let outcome = assess_student(&[student_record(1, "D", "Bimestre 1")], &StudentRiskPolicy::DEFAULT);
        assert!(outcome.value.is_none());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn roster_lists_flagged_students_in_period() {
        let mut records = Vec::new();
        for (id, name, c_count) in [(1u64, "Ana", 2usize), (2, "Bruno", 4), (3, "Carla", 1), (4, "Diego", 3)] {
            for competency in 0..5u64 {
                let grade = if (competency as usize) < c_count { "C" } else { "A" };
                records.push(
                    GradeRecord::new(id, competency, grade)
                        .with_student_name(name)
                        .with_section("Primero", "A")
                        .with_period("Bimestre 1", 2025),
                );
            }
        }
        records.push(
            GradeRecord::new(3, 0, "C")
                .with_student_name("Carla")
                .with_section("Primero", "A")
                .with_period("Bimestre 2", 2025),
        );
        records.push(GradeRecord::new(1, 9, "Z").with_period("Bimestre 1", 2025));

        let query = RosterQuery {
            period: "Bimestre 1".to_string(),
            year: 2025,
            ..RosterQuery::default()
        };
        let outcome = at_risk_roster(&records, &query, &StudentRiskPolicy::DEFAULT);

        let names: Vec<_> = outcome.value.iter().map(|s| s.student_name.as_str()).collect();
        assert_eq!(names, vec!["Bruno", "Diego", "Ana"]);
        let tiers: Vec<_> = outcome.value.iter().filter_map(|s| s.tier).collect();
        assert_eq!(tiers, vec![RiskTier::Critical, RiskTier::High, RiskTier::Medium]);

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, records.len() - 1);
    }

    #[test]
    fn roster_period_matches_any_capitalization() {
        let records = vec![
            GradeRecord::new(1, 1, "C").with_period("Bimestre 1", 2025),
            GradeRecord::new(1, 2, "C").with_period("Bimestre 1", 2025),
        ];
        let query = RosterQuery {
            period: "bimestre 1".to_string(),
            year: 2025,
            ..RosterQuery::default()
        };
        let outcome = at_risk_roster(&records, &query, &StudentRiskPolicy::DEFAULT);
        assert_eq!(outcome.value.len(), 1);
    }

    #[test]
    fn roster_narrows_by_section() {
        let records = vec![
            GradeRecord::new(1, 1, "C").with_section("Primero", "A").with_period("Bimestre 1", 2025),
            GradeRecord::new(1, 2, "C").with_section("Primero", "A").with_period("Bimestre 1", 2025),
            GradeRecord::new(2, 1, "C").with_section("Primero", "B").with_period("Bimestre 1", 2025),
            GradeRecord::new(2, 2, "C").with_section("Primero", "B").with_period("Bimestre 1", 2025),
        ];
        let query = RosterQuery {
            period: "Bimestre 1".to_string(),
            year: 2025,
            grade_level: Some("Primero".to_string()),
            section: Some("B".to_string()),
        };
        let outcome = at_risk_roster(&records, &query, &StudentRiskPolicy::DEFAULT);
        assert_eq!(outcome.value.len(), 1);
        assert_eq!(outcome.value[0].student_id, 2);
    }
}
