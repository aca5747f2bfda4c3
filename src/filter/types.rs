use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bound query parameter. Caller-controlled values only ever reach SQL as one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Uuid(Uuid),
    Text(String),
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// Filterable columns of the results view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ResultId,
    StudentId,
    ClassId,
    SubjectId,
    ExamType,
    AcademicYear,
}

impl Column {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Column::ResultId => "r.id",
            Column::StudentId => "r.student_id",
            // class membership is the student's current class
            Column::ClassId => "st.class_id",
            Column::SubjectId => "r.subject_id",
            Column::ExamType => "r.exam_type",
            Column::AcademicYear => "r.academic_year",
        }
    }
}

/// Typed predicate; a filter is an ordered list of these, ANDed together
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Column, SqlValue),
    /// (class, subject) pair must be one of the listed pairs
    ClassSubjectIn(Vec<(Uuid, Uuid)>),
    /// Case-insensitive substring match over first name, last name, full name and roll number
    NameSearch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Allow-listed sort keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    StudentName,
    SubjectName,
    Marks,
    Grade,
    ExamDate,
    ExamType,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "student_name" => Some(SortKey::StudentName),
            "subject_name" => Some(SortKey::SubjectName),
            "marks" | "marks_obtained" => Some(SortKey::Marks),
            "grade" => Some(SortKey::Grade),
            "exam_date" => Some(SortKey::ExamDate),
            "exam_type" => Some(SortKey::ExamType),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            key: SortKey::ExamDate,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Clamp caller-supplied paging into `page >= 1` and `1 <= limit <= max_limit`
    pub fn clamped(page: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlValue>,
}
