use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::grade::Grade;

/// One exam result as returned to callers, joined with student and subject details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ResultRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub exam_type: String,
    pub academic_year: String,
    pub marks_obtained: i32,
    pub max_marks: i32,
    pub grade: String,
    pub teacher_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
    pub roll_number: Option<String>,
    pub class_id: Option<Uuid>,
    pub class_name: Option<String>,
    pub subject_code: String,
    pub subject_name: String,
}

/// Minimal projection used by the ranking aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScoreRow {
    pub student_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub roll_number: Option<String>,
    pub class_id: Option<Uuid>,
    pub class_name: Option<String>,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub exam_type: String,
    pub marks_obtained: i32,
    pub max_marks: i32,
}

impl ScoreRow {
    pub fn student_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

pub fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

/// A (teacher, subject, class) grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TeachingAssignment {
    pub teacher_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
}

/// Result payload as submitted by a caller. Every field is optional so that
/// missing values surface as validation errors instead of JSON rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultInput {
    /// Only meaningful for PUT
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    pub subject_id: Option<Uuid>,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default, alias = "obtained_marks")]
    pub marks_obtained: Option<i32>,
    #[serde(default, alias = "possible_marks", alias = "total_marks")]
    pub max_marks: Option<i32>,
    /// Accepted so existing clients keep working; the stored grade is always recomputed
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(default)]
    pub teacher_id: Option<Uuid>,
}

/// Natural key of a result row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub exam_type: String,
    pub academic_year: String,
}

/// Validated, graded row ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct ResultWrite {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub exam_type: String,
    pub academic_year: String,
    pub marks_obtained: i32,
    pub max_marks: i32,
    pub grade: Grade,
    pub teacher_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub exam_date: Option<NaiveDate>,
}

impl ResultWrite {
    pub fn key(&self) -> ResultKey {
        ResultKey {
            student_id: self.student_id,
            subject_id: self.subject_id,
            exam_type: self.exam_type.clone(),
            academic_year: self.academic_year.clone(),
        }
    }
}

/// In-place change to an existing row (PUT by id)
#[derive(Debug, Clone, PartialEq)]
pub struct MarksUpdate {
    pub marks_obtained: i32,
    pub max_marks: i32,
    pub grade: Grade,
    pub teacher_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub exam_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl WriteSummary {
    pub fn count(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// Query-string ids: empty strings and "all" mean "no filter"
pub fn optional_uuid<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(s) => Uuid::parse_str(s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Query-string text: blank means "no filter"
pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// Query-string numbers: blank or unparseable means "not supplied", out-of-range saturates
pub fn optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(str::trim).and_then(lenient_i64))
}

fn lenient_i64(s: &str) -> Option<i64> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    // float-to-int `as` truncates and saturates at the i64 bounds
    s.parse::<f64>().ok().filter(|f| !f.is_nan()).map(|f| f as i64)
}
