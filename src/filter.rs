//! Narrowing of record sets: field filters, viewer scoping and grade ordering.

use serde::{Deserialize, Serialize};

use crate::models::GradeRecord;
use crate::period::normalize_label;
use crate::scale::Grade;

/// Optional constraints on record fields. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub student_id: Option<u64>,
    pub competency_id: Option<u64>,
    pub course_id: Option<u64>,
    pub teacher_id: Option<u64>,
    pub grade_level: Option<String>,
    pub section: Option<String>,
    pub period: Option<String>,
    pub year: Option<i32>,
}

impl RecordFilter {
    pub fn student(mut self, id: u64) -> Self {
        self.student_id = Some(id);
        self
    }

    pub fn competency(mut self, id: u64) -> Self {
        self.competency_id = Some(id);
        self
    }

    pub fn course(mut self, id: u64) -> Self {
        self.course_id = Some(id);
        self
    }

    pub fn teacher(mut self, id: u64) -> Self {
        self.teacher_id = Some(id);
        self
    }

    pub fn section(mut self, grade_level: impl Into<String>, section: impl Into<String>) -> Self {
        self.grade_level = Some(grade_level.into());
        self.section = Some(section.into());
        self
    }

    pub fn period(mut self, period: impl Into<String>, year: i32) -> Self {
        self.period = Some(period.into());
        self.year = Some(year);
        self
    }

    pub fn matches(&self, record: &GradeRecord) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, have: &T) -> bool {
            want.as_ref().map_or(true, |want| want == have)
        }

        eq(&self.student_id, &record.student_id)
            && eq(&self.competency_id, &record.competency_id)
            && eq(&self.course_id, &record.course_id)
            && eq(&self.teacher_id, &record.teacher_id)
            && eq(&self.grade_level, &record.grade_level)
            && eq(&self.section, &record.section)
            && self
                .period
                .as_ref()
                .map_or(true, |period| normalize_label(period) == normalize_label(&record.period))
            && eq(&self.year, &record.year)
    }

    pub fn apply(&self, records: &[GradeRecord]) -> Vec<GradeRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
}

/// The user a query runs on behalf of, as resolved by the caller's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: u64,
    pub role: Role,
}

impl Viewer {
    pub fn admin(user_id: u64) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn teacher(user_id: u64) -> Self {
        Self {
            user_id,
            role: Role::Teacher,
        }
    }
}

/// A teacher's assignment to teach a course in one section for a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherAssignment {
    pub teacher_id: u64,
    pub course_id: u64,
    #[serde(default)]
    pub course_name: String,
    pub grade_level: String,
    pub section: String,
    pub year: i32,
}

impl TeacherAssignment {
    fn covers(&self, record: &GradeRecord) -> bool {
        self.course_id == record.course_id
            && self.grade_level == record.grade_level
            && self.section == record.section
            && self.year == record.year
    }
}

/// Records visible to `viewer`. Admins see everything; teachers see records
/// of the course sections they are assigned to.
pub fn scope_records(
    records: &[GradeRecord],
    viewer: &Viewer,
    assignments: &[TeacherAssignment],
) -> Vec<GradeRecord> {
    match viewer.role {
        Role::Admin => records.to_vec(),
        Role::Teacher => {
            let own: Vec<&TeacherAssignment> = assignments
                .iter()
                .filter(|a| a.teacher_id == viewer.user_id)
                .collect();
            records
                .iter()
                .filter(|record| own.iter().any(|a| a.covers(record)))
                .cloned()
                .collect()
        }
    }
}

/// One assignment per course the teacher teaches; the first one seen wins.
pub fn courses_for(assignments: &[TeacherAssignment], teacher_id: u64) -> Vec<&TeacherAssignment> {
    let mut courses: Vec<&TeacherAssignment> = Vec::new();
    for assignment in assignments.iter().filter(|a| a.teacher_id == teacher_id) {
        if !courses.iter().any(|c| c.course_id == assignment.course_id) {
            courses.push(assignment);
        }
    }
    courses
}

/// Distinct sections the teacher teaches `course_id` in, first seen first.
pub fn sections_for(assignments: &[TeacherAssignment], teacher_id: u64, course_id: u64) -> Vec<String> {
    distinct(
        assignments
            .iter()
            .filter(|a| a.teacher_id == teacher_id && a.course_id == course_id)
            .map(|a| a.section.clone()),
    )
}

/// Distinct grade levels the teacher is assigned to, first seen first.
pub fn grade_levels_for(assignments: &[TeacherAssignment], teacher_id: u64) -> Vec<String> {
    distinct(
        assignments
            .iter()
            .filter(|a| a.teacher_id == teacher_id)
            .map(|a| a.grade_level.clone()),
    )
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Orders records from `C` up to `AD`; unknown grades go first. Stable.
pub fn sort_by_grade(records: &mut [GradeRecord]) {
    records.sort_by_key(|record| {
        record
            .grade
            .parse::<Grade>()
            .map_or(0, Grade::rank)
    });
}
