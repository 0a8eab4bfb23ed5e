//! Grouping of grade records by one or more dimensions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::{InvalidGradeError, RecordError};
use crate::models::{AggregateResult, GradeRecord, Outcome};
use crate::scale::Grade;

/// A field records can be grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Student,
    Competency,
    Course,
    GradeLevel,
    Section,
    Period,
    Year,
}

impl Dimension {
    pub fn value_of(self, record: &GradeRecord) -> String {
        match self {
            Dimension::Student => record.student_id.to_string(),
            Dimension::Competency => record.competency_id.to_string(),
            Dimension::Course => record.course_id.to_string(),
            Dimension::GradeLevel => record.grade_level.clone(),
            Dimension::Section => record.section.clone(),
            Dimension::Period => record.period.clone(),
            Dimension::Year => record.year.to_string(),
        }
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "student" | "student_id" => Ok(Dimension::Student),
            "competency" | "competency_id" => Ok(Dimension::Competency),
            "course" | "course_id" => Ok(Dimension::Course),
            "grade_level" => Ok(Dimension::GradeLevel),
            "section" => Ok(Dimension::Section),
            "period" => Ok(Dimension::Period),
            "year" => Ok(Dimension::Year),
            other => Err(format!("unknown grouping dimension: {other}")),
        }
    }
}

/// Values of the requested dimensions, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    pub fn of(record: &GradeRecord, group_by: &[Dimension]) -> Self {
        GroupKey(group_by.iter().map(|dim| dim.value_of(record)).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" / "))
    }
}

/// Per-group values kept in order of first occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Groups<V> {
    entries: Vec<(GroupKey, V)>,
    index: HashMap<GroupKey, usize>,
}

impl<V> Default for Groups<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> Groups<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&V> {
        self.index.get(key).map(|pos| &self.entries[*pos].1)
    }

    /// Lookup by the key parts, e.g. `get_by(&["12", "Bimestre 1"])`.
    pub fn get_by(&self, parts: &[&str]) -> Option<&V> {
        let key = GroupKey(parts.iter().map(|part| (*part).to_string()).collect());
        self.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &V)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn into_entries(self) -> Vec<(GroupKey, V)> {
        self.entries
    }

    pub(crate) fn entry_or_default(&mut self, key: GroupKey) -> &mut V
    where
        V: Default,
    {
        let pos = match self.index.get(&key) {
            Some(pos) => *pos,
            None => {
                let pos = self.entries.len();
                self.index.insert(key.clone(), pos);
                self.entries.push((key, V::default()));
                pos
            }
        };
        &mut self.entries[pos].1
    }

    pub fn map_values<U>(self, mut f: impl FnMut(&GroupKey, V) -> U) -> Groups<U> {
        let entries: Vec<(GroupKey, U)> = self
            .entries
            .into_iter()
            .map(|(key, value)| {
                let mapped = f(&key, value);
                (key, mapped)
            })
            .collect();
        Groups {
            entries,
            index: self.index,
        }
    }
}

#[derive(Serialize)]
struct GroupEntry<'a, V> {
    key: &'a GroupKey,
    #[serde(flatten)]
    value: &'a V,
}

impl<V: Serialize> Serialize for Groups<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            seq.serialize_element(&GroupEntry { key, value })?;
        }
        seq.end()
    }
}

/// Logs and wraps a record that failed grade conversion.
pub(crate) fn rejected(index: usize, record: &GradeRecord, error: InvalidGradeError) -> RecordError {
    warn!(
        index,
        student_id = record.student_id,
        competency_id = record.competency_id,
        %error,
        "skipping record"
    );
    RecordError {
        index,
        student_id: record.student_id,
        competency_id: record.competency_id,
        error,
    }
}

/// Groups `records`, folding every value `parse` accepts into its group's
/// accumulator. Records `parse` rejects are reported and never create a group.
pub(crate) fn fold_groups<T, A: Default>(
    records: &[GradeRecord],
    group_by: &[Dimension],
    parse: impl Fn(&GradeRecord) -> Result<T, InvalidGradeError>,
    mut fold: impl FnMut(&mut A, T),
) -> Outcome<Groups<A>> {
    let mut groups: Groups<A> = Groups::default();
    let mut errors = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match parse(record) {
            Ok(value) => fold(groups.entry_or_default(GroupKey::of(record, group_by)), value),
            Err(error) => errors.push(rejected(index, record, error)),
        }
    }

    Outcome::new(groups, errors)
}

/// Letter-grade distribution and mean rank per group.
///
/// An empty `group_by` puts every record in a single group. Records with a
/// grade outside the scale are skipped and listed in the outcome's errors.
pub fn aggregate(records: &[GradeRecord], group_by: &[Dimension]) -> Outcome<Groups<AggregateResult>> {
    let outcome = fold_groups(
        records,
        group_by,
        |record| record.grade.parse::<Grade>(),
        |grades: &mut Vec<Grade>, grade| grades.push(grade),
    )
    .map(|groups| groups.map_values(|_, grades| AggregateResult::from_grades(grades)));

    debug!(
        records = records.len(),
        groups = outcome.value.len(),
        rejected = outcome.errors.len(),
        "aggregated grades"
    );
    outcome
}
