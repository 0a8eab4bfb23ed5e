use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{TrendDirection, TrendResult};
use crate::risk::{CompetencyRisk, StudentRisk};
use crate::scale::Grade;

/// Everything the section report prints. Callers compute the parts with the
/// analytics functions and keep them for other uses as well.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    /// e.g. `"Primero A"`, `None` for all sections.
    pub scope: Option<&'a str>,
    pub period: &'a str,
    pub year: i32,
    pub generated_on: NaiveDate,
    pub competencies: &'a [CompetencyRisk],
    pub roster: &'a [StudentRisk],
    pub trends: &'a [TrendResult],
    pub rejected: usize,
}

fn direction_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Improving => "improving",
        TrendDirection::Declining => "declining",
        TrendDirection::Stable => "stable",
        TrendDirection::InsufficientData => "not enough history",
    }
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();
    let scope_label = input.scope.unwrap_or("all sections");

    let _ = writeln!(output, "# Academic Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} {}) on {}",
        scope_label, input.period, input.year, input.generated_on
    );
    if input.rejected > 0 {
        let _ = writeln!(
            output,
            "{} records were skipped because their grade is not on the scale.",
            input.rejected
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution by Competency");

    if input.competencies.is_empty() {
        let _ = writeln!(output, "No grades recorded for this period.");
    } else {
        let header: Vec<&str> = Grade::ALL.iter().rev().map(|g| g.symbol()).collect();
        let _ = writeln!(output, "| Competency | {} | Total | C share | Risk |", header.join(" | "));
        let _ = writeln!(output, "|---|{}---|---|---|", "---|".repeat(header.len()));
        for row in input.competencies {
            let counts: Vec<String> = Grade::ALL
                .iter()
                .rev()
                .map(|grade| row.counts.count(*grade).to_string())
                .collect();
            let _ = writeln!(
                output,
                "| {} | {} | {} | {}% | {:?} |",
                row.competency_name,
                counts.join(" | "),
                row.counts.total,
                row.risk_percent,
                row.tier
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students at Academic Risk");

    if input.roster.is_empty() {
        let _ = writeln!(output, "No students at risk in this period.");
    } else {
        for student in input.roster.iter() {
            let tier = student.tier.map_or_else(String::new, |tier| format!("{tier:?}"));
            let _ = writeln!(
                output,
                "- {} ({} {}) {} competencies in C of {} graded [{}]",
                student.student_name,
                student.grade_level,
                student.section,
                student.c_competencies,
                student.graded_competencies,
                tier
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trends");

    let mut declining: Vec<&TrendResult> = input
        .trends
        .iter()
        .filter(|t| t.direction == TrendDirection::Declining)
        .collect();
    declining.sort_by(|a, b| {
        (a.recent_mean - a.baseline_mean)
            .partial_cmp(&(b.recent_mean - b.baseline_mean))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if input.trends.is_empty() {
        let _ = writeln!(output, "No trend data for this scope.");
    } else {
        for direction in [
            TrendDirection::Improving,
            TrendDirection::Stable,
            TrendDirection::Declining,
            TrendDirection::InsufficientData,
        ] {
            let count = input.trends.iter().filter(|t| t.direction == direction).count();
            let _ = writeln!(output, "- {}: {}", direction_label(direction), count);
        }
        for trend in declining.iter().take(10) {
            let _ = writeln!(
                output,
                "  - student {} in competency {}: {} -> {}",
                trend.subject_id,
                trend.competency_id,
                Grade::from_rank(trend.baseline_mean),
                Grade::from_rank(trend.recent_mean)
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateResult, RiskTier};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 30).unwrap()
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(&ReportInput {
            scope: None,
            period: "Bimestre 2",
            year: 2025,
            generated_on: date(),
            competencies: &[],
            roster: &[],
            trends: &[],
            rejected: 0,
        });
        assert!(report.starts_with("# Academic Performance Report"));
        assert!(report.contains("Generated for all sections (Bimestre 2 2025) on 2025-05-30"));
        assert!(report.contains("No grades recorded for this period."));
        assert!(report.contains("No students at risk in this period."));
        assert!(report.contains("No trend data for this scope."));
        assert!(!report.contains("skipped"));
    }

    #[test]
    fn report_lists_rows_roster_and_declines() {
        let competencies = vec![CompetencyRisk {
            competency_id: 10,
            competency_name: "Reads texts".to_string(),
            counts: AggregateResult::from_grades([Grade::C, Grade::C, Grade::A, Grade::AD]),
            risk_ratio: 0.5,
            risk_percent: 50,
            tier: RiskTier::Critical,
        }];
        let roster = vec![StudentRisk {
            student_id: 1,
            student_name: "Ana Rojas".to_string(),
            grade_level: "Primero".to_string(),
            section: "A".to_string(),
            c_competencies: 3,
            graded_competencies: 5,
            tier: Some(RiskTier::High),
        }];
        let trends = vec![TrendResult {
            subject_id: 1,
            competency_id: 10,
            direction: TrendDirection::Declining,
            baseline_mean: 3.0,
            recent_mean: 1.33,
        }];

        let report = build_report(&ReportInput {
            scope: Some("Primero A"),
            period: "Bimestre 2",
            year: 2025,
            generated_on: date(),
            competencies: &competencies,
            roster: &roster,
            trends: &trends,
            rejected: 2,
        });

        assert!(report.contains("2 records were skipped"));
        assert!(report.contains("| Competency | AD | A | B | C | Total | C share | Risk |"));
        assert!(report.contains("| Reads texts | 1 | 1 | 0 | 2 | 4 | 50% | Critical |"));
        assert!(report.contains("- Ana Rojas (Primero A) 3 competencies in C of 5 graded [High]"));
        assert!(report.contains("- declining: 1"));
        assert!(report.contains("student 1 in competency 10: A -> C"));
    }
}
