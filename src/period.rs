//! Chronological ordering of academic periods.
//!
//! A school year is split either into four bimesters (`Bimestre 1..4`) or
//! three trimesters (`Trimestre 1..3`). Both are placed on a common scale of
//! twelfths of a year by the month in which the term ends, so mixed labels
//! within one year still sort sensibly.

use std::cmp::Ordering;

use crate::models::GradeRecord;

const BIMESTERS: u8 = 4;
const TRIMESTERS: u8 = 3;

/// Twelfth of the year at which a known term ends, `None` for labels outside
/// the calendar.
pub fn period_slot(label: &str) -> Option<u8> {
    let mut parts = label.split_whitespace();
    let kind = parts.next()?.to_lowercase();
    let number: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || number == 0 {
        return None;
    }

    let terms = match kind.as_str() {
        "bimestre" => BIMESTERS,
        "trimestre" => TRIMESTERS,
        _ => return None,
    };
    if number > terms {
        return None;
    }
    Some(number * (12 / terms))
}

/// Period label with case and spacing folded, so `"bimestre  2"` and
/// `"Bimestre 2"` name the same term.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sort key for `(year, period)`. Known terms compare by slot only, so terms
/// ending in the same month tie. Unknown period labels follow the known ones
/// of the same year and compare by label.
#[derive(Debug, Clone)]
pub struct PeriodKey {
    pub year: i32,
    slot: Option<u8>,
    label: String,
}

impl PeriodKey {
    pub fn new(year: i32, label: &str) -> Self {
        Self {
            year,
            slot: period_slot(label),
            label: normalize_label(label),
        }
    }

    pub fn of(record: &GradeRecord) -> Self {
        Self::new(record.year, &record.period)
    }

    pub fn is_known(&self) -> bool {
        self.slot.is_some()
    }
}

impl Ord for PeriodKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then_with(|| match (self.slot, other.slot) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => self.label.cmp(&other.label),
            })
    }
}

impl PartialEq for PeriodKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PeriodKey {}

impl PartialOrd for PeriodKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders records oldest first by `(year, period, recorded_on)`. Stable, so
/// records that tie keep their input order.
pub fn sort_chronologically(records: &mut [GradeRecord]) {
    records.sort_by(|a, b| {
        PeriodKey::of(a)
            .cmp(&PeriodKey::of(b))
            .then_with(|| a.recorded_on.cmp(&b.recorded_on))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn slots_follow_term_end() {
        assert_eq!(period_slot("Bimestre 1"), Some(3));
        assert_eq!(period_slot("Bimestre 4"), Some(12));
        assert_eq!(period_slot("Trimestre 1"), Some(4));
        assert_eq!(period_slot("trimestre 3"), Some(12));
        assert_eq!(period_slot("Bimestre 5"), None);
        assert_eq!(period_slot("Trimestre 0"), None);
        assert_eq!(period_slot("Semestre 1"), None);
        assert_eq!(period_slot(""), None);
    }

    #[test]
    fn keys_order_by_year_then_term() {
        let mut keys = vec![
            PeriodKey::new(2025, "Bimestre 2"),
            PeriodKey::new(2024, "Bimestre 4"),
            PeriodKey::new(2025, "Summer school"),
            PeriodKey::new(2025, "Bimestre 1"),
        ];
        keys.sort();
        let labels: Vec<_> = keys.iter().map(|k| (k.year, k.label.as_str())).collect();
        assert_eq!(
            labels,
            vec![
                (2024, "bimestre 4"),
                (2025, "bimestre 1"),
                (2025, "bimestre 2"),
                (2025, "summer school"),
            ]
        );
    }

    #[test]
    fn terms_ending_in_the_same_month_tie() {
        assert_eq!(PeriodKey::new(2025, "Bimestre 4"), PeriodKey::new(2025, "Trimestre 3"));
        assert_eq!(PeriodKey::new(2025, "Bimestre 2"), PeriodKey::new(2025, " bimestre  2"));
        assert!(PeriodKey::new(2025, "Summer school") != PeriodKey::new(2025, "Winter school"));
    }

    #[test]
    fn same_slot_falls_back_to_recorded_date() {
        let early = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let late = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        let mut records = vec![
            GradeRecord::new(1, 1, "A").with_period("Bimestre 4", 2025).with_recorded_on(late),
            GradeRecord::new(1, 1, "C").with_period("Trimestre 3", 2025).with_recorded_on(early),
        ];
        sort_chronologically(&mut records);
        assert_eq!(records[0].grade, "C");
        assert_eq!(records[1].grade, "A");
    }

    #[test]
    fn labels_normalize_case_and_spacing() {
        assert_eq!(normalize_label("  Bimestre   1 "), "bimestre 1");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn sort_uses_recorded_date_as_tiebreaker() {
        let early = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let late = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let mut records = vec![
            GradeRecord::new(1, 1, "A").with_period("Bimestre 2", 2025),
            GradeRecord::new(1, 1, "B").with_period("Bimestre 1", 2025).with_recorded_on(late),
            GradeRecord::new(1, 1, "C").with_period("Bimestre 1", 2025).with_recorded_on(early),
        ];
        sort_chronologically(&mut records);
        let grades: Vec<_> = records.iter().map(|r| r.grade.as_str()).collect();
        assert_eq!(grades, vec!["C", "B", "A"]);
    }
}
