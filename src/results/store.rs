use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::ResultsError;
use super::model::{MarksUpdate, Page, ResultRecord, ResultWrite, ScoreRow, TeachingAssignment, WriteSummary};
use crate::filter::Filter;

/// Profile and assignment lookups needed to scope a caller
#[async_trait]
pub trait Directory: Send + Sync {
    async fn student_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ResultsError>;

    async fn teacher_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ResultsError>;

    async fn teaching_assignments(&self, teacher_id: Uuid) -> Result<Vec<TeachingAssignment>, ResultsError>;

    /// Current class of each listed student. Unknown students are absent from the map.
    async fn student_classes(&self, student_ids: &[Uuid]) -> Result<HashMap<Uuid, Option<Uuid>>, ResultsError>;
}

/// A listing page and, when requested, every score row of one academic year
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub page: Page<ResultRecord>,
    pub score_rows: Option<Vec<ScoreRow>>,
}

/// Inspects the locked row and returns its new values. An error aborts the update.
pub type MarksPatch<'a> = dyn Fn(&ResultRecord) -> Result<MarksUpdate, ResultsError> + Send + Sync + 'a;

/// The score store
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Filtered, sorted page plus the total row count, and the score rows of
    /// `score_year` when given, all read from one snapshot
    async fn find_page(&self, filter: &Filter, score_year: Option<&str>) -> Result<Snapshot, ResultsError>;

    /// Every result row of an academic year, read in a single statement
    async fn score_rows(&self, academic_year: &str) -> Result<Vec<ScoreRow>, ResultsError>;

    /// Insert-or-update each write by natural key, all inside one transaction
    async fn upsert_batch(&self, writes: &[ResultWrite]) -> Result<WriteSummary, ResultsError>;

    /// Lock the row and its student, apply `patch`, and return the stored
    /// record, in one transaction. `None` when no row has this id.
    async fn update_locked(&self, id: Uuid, patch: &MarksPatch<'_>) -> Result<Option<ResultRecord>, ResultsError>;

    /// Returns false when no row has this id
    async fn delete(&self, id: Uuid) -> Result<bool, ResultsError>;

    async fn ping(&self) -> Result<(), ResultsError>;
}
