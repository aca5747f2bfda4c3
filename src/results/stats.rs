use serde::Serialize;

use super::error::ResultsError;
use super::grade::Grade;
use super::model::ScoreRow;
use super::ranking::{compute_rankings, ClassStanding, RankingTable, StudentStanding, SubjectPerformance};
use super::scope::Scope;
use super::store::ResultStore;
use crate::config::ResultsConfig;

/// Read every score row of the year and rank it
pub async fn load_rankings(store: &dyn ResultStore, academic_year: &str) -> Result<RankingTable, ResultsError> {
    let rows = store.score_rows(academic_year).await?;
    tracing::debug!("Ranking {} score rows for {}", rows.len(), academic_year);
    Ok(compute_rankings(&rows, academic_year))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub academic_year: String,
    pub total_obtained: i64,
    pub total_possible: i64,
    pub percentage: f64,
    pub grade: Option<Grade>,
    pub school_rank: Option<u32>,
    pub class_rank: Option<u32>,
    pub records_count: usize,
}

impl StudentSummary {
    fn from_standing(academic_year: &str, standing: Option<&StudentStanding>) -> Self {
        match standing {
            Some(s) => Self {
                academic_year: academic_year.to_string(),
                total_obtained: s.grand_total,
                total_possible: s.max_possible,
                percentage: s.percentage,
                grade: Some(s.grade),
                school_rank: Some(s.school_rank),
                class_rank: s.class_rank,
                records_count: s.records_count,
            },
            None => Self {
                academic_year: academic_year.to_string(),
                total_obtained: 0,
                total_possible: 0,
                percentage: 0.0,
                grade: None,
                school_rank: None,
                class_rank: None,
                records_count: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSummary {
    pub academic_year: String,
    pub student_count: usize,
    pub class_wise: Vec<ClassStanding>,
    pub subject_wise: Vec<SubjectPerformance>,
    pub top_performers: Vec<StudentStanding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultStats {
    Student(StudentSummary),
    School(SchoolSummary),
}

/// Year whose stats accompany a listing, or `None` for scopes that get none (teachers)
pub fn stats_year<'a>(scope: &Scope, requested: Option<&'a str>, config: &'a ResultsConfig) -> Option<&'a str> {
    match scope {
        Scope::AssignedClassSubjects { .. } => None,
        _ => Some(requested.unwrap_or(config.default_academic_year.as_str())),
    }
}

/// Role-dependent summary of one year's score rows. Teachers get none.
pub fn summarize(scope: &Scope, academic_year: &str, rows: &[ScoreRow], config: &ResultsConfig) -> Option<ResultStats> {
    let table = compute_rankings(rows, academic_year);

    match scope {
        Scope::AssignedClassSubjects { .. } => None,
        Scope::OwnRecordsOnly { student_id } => Some(ResultStats::Student(StudentSummary::from_standing(
            academic_year,
            table.standing(*student_id),
        ))),
        Scope::Unrestricted => Some(ResultStats::School(SchoolSummary {
            academic_year: table.academic_year.clone(),
            student_count: table.grand_total_rankings.len(),
            top_performers: table
                .grand_total_rankings
                .iter()
                .take(config.top_performers)
                .cloned()
                .collect(),
            class_wise: table.class_wise_rankings,
            subject_wise: table.subject_wise_performance,
        })),
    }
}
