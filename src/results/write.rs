use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

use super::error::ResultsError;
use super::grade::classify;
use super::model::{MarksUpdate, ResultInput, ResultRecord, ResultWrite, WriteSummary};
use super::scope::Scope;
use super::store::{Directory, ResultStore};
use crate::config::ResultsConfig;

/// "record 2 (student ..., subject ...)" for error messages
fn describe(index: usize, input: &ResultInput) -> String {
    let id = |v: Option<Uuid>| v.map(|u| u.to_string()).unwrap_or_else(|| "?".to_string());
    format!(
        "record {} (student {}, subject {})",
        index + 1,
        id(input.student_id),
        id(input.subject_id)
    )
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn check_marks(label: &str, obtained: i32, possible: i32) -> Result<(), ResultsError> {
    if possible <= 0 {
        return Err(ResultsError::field(
            format!("{}: max_marks must be greater than zero", label),
            "max_marks",
            "must be greater than zero",
        ));
    }
    if obtained < 0 || obtained > possible {
        return Err(ResultsError::field(
            format!("{}: marks_obtained must be between 0 and {}", label, possible),
            "marks_obtained",
            format!("must be between 0 and {}", possible),
        ));
    }
    Ok(())
}

fn validate_input(index: usize, input: &ResultInput, config: &ResultsConfig) -> Result<ResultWrite, ResultsError> {
    let label = describe(index, input);
    let missing = |field: &str| ResultsError::field(format!("{}: {} is required", label, field), field, "required");

    let student_id = input.student_id.ok_or_else(|| missing("student_id"))?;
    let subject_id = input.subject_id.ok_or_else(|| missing("subject_id"))?;
    let exam_type = trimmed(&input.exam_type).ok_or_else(|| missing("exam_type"))?;
    let marks_obtained = input.marks_obtained.ok_or_else(|| missing("marks_obtained"))?;
    let max_marks = input.max_marks.ok_or_else(|| missing("max_marks"))?;
    check_marks(&label, marks_obtained, max_marks)?;

    let academic_year = trimmed(&input.academic_year).unwrap_or_else(|| config.default_academic_year.clone());

    Ok(ResultWrite {
        student_id,
        subject_id,
        exam_type,
        academic_year,
        marks_obtained,
        max_marks,
        grade: classify(marks_obtained, max_marks)?,
        teacher_id: input.teacher_id,
        remarks: trimmed(&input.remarks),
        exam_date: input.exam_date,
    })
}

/// Validate and grade a whole batch without touching storage.
///
/// Fails on the first bad record; duplicate natural keys inside one batch are
/// rejected because the upsert would silently keep only the last of them.
pub fn validate_batch(inputs: &[ResultInput], config: &ResultsConfig) -> Result<Vec<ResultWrite>, ResultsError> {
    if inputs.is_empty() {
        return Err(ResultsError::validation("no results supplied"));
    }

    let mut seen = HashSet::new();
    let mut writes = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let write = validate_input(index, input, config)?;
        if !seen.insert(write.key()) {
            return Err(ResultsError::validation(format!(
                "{}: duplicates an earlier record for the same exam and academic year",
                describe(index, input)
            )));
        }
        writes.push(write);
    }
    Ok(writes)
}

/// Check every write against the caller's scope and stamp provenance
async fn authorize_writes(
    directory: &dyn Directory,
    scope: &Scope,
    writes: &mut [ResultWrite],
) -> Result<(), ResultsError> {
    let student_ids: Vec<Uuid> = writes
        .iter()
        .map(|w| w.student_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let classes = directory.student_classes(&student_ids).await?;

    for write in writes.iter_mut() {
        let class_id = classes
            .get(&write.student_id)
            .ok_or_else(|| ResultsError::not_found(format!("student {} does not exist", write.student_id)))?;

        if let Scope::AssignedClassSubjects { teacher_id, .. } = scope {
            if !scope.permits_pair(*class_id, write.subject_id) {
                let class = class_id.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string());
                tracing::warn!(
                    "Teacher {} denied write for subject {} in class {}",
                    teacher_id,
                    write.subject_id,
                    class
                );
                return Err(ResultsError::forbidden(format!(
                    "not assigned to teach subject {} in class {}",
                    write.subject_id, class
                )));
            }
            write.teacher_id = Some(*teacher_id);
        }
    }
    Ok(())
}

/// Validate, authorize and upsert a batch. Nothing is written unless every
/// record passes, and the store applies the batch in one transaction.
pub async fn upsert_results(
    store: &dyn ResultStore,
    directory: &dyn Directory,
    scope: &Scope,
    inputs: &[ResultInput],
    config: &ResultsConfig,
) -> Result<WriteSummary, ResultsError> {
    if !scope.can_write() {
        tracing::warn!("Rejected result write from {} scope", scope.label());
        return Err(ResultsError::forbidden("students cannot modify results"));
    }

    let mut writes = validate_batch(inputs, config)?;
    authorize_writes(directory, scope, &mut writes).await?;

    let summary = store.upsert_batch(&writes).await?;
    tracing::info!(
        "Saved {} results ({} inserted, {} updated) via {} scope",
        summary.count(),
        summary.inserted,
        summary.updated,
        scope.label()
    );
    Ok(summary)
}

pub async fn upsert_result(
    store: &dyn ResultStore,
    directory: &dyn Directory,
    scope: &Scope,
    input: ResultInput,
    config: &ResultsConfig,
) -> Result<WriteSummary, ResultsError> {
    upsert_results(store, directory, scope, std::slice::from_ref(&input), config).await
}

/// PUT by id. Fields left out of the payload keep their stored values; the
/// grade is recomputed from the resulting marks.
pub async fn update_result(
    store: &dyn ResultStore,
    scope: &Scope,
    input: ResultInput,
) -> Result<ResultRecord, ResultsError> {
    if !scope.can_write() {
        tracing::warn!("Rejected result update from {} scope", scope.label());
        return Err(ResultsError::forbidden("students cannot modify results"));
    }
    let id = input
        .id
        .ok_or_else(|| ResultsError::field("result id is required", "id", "required"))?;

    // runs against the locked row, so the scope check sees the student's current class
    let patch = |existing: &ResultRecord| -> Result<MarksUpdate, ResultsError> {
        // out-of-scope rows are reported exactly like missing ones
        if !scope.permits_record(existing.student_id, existing.class_id, existing.subject_id) {
            tracing::warn!("Update of result {} outside {} scope", id, scope.label());
            return Err(ResultsError::not_found(format!("result {} does not exist", id)));
        }

        let marks_obtained = input.marks_obtained.unwrap_or(existing.marks_obtained);
        let max_marks = input.max_marks.unwrap_or(existing.max_marks);
        check_marks(&format!("result {}", id), marks_obtained, max_marks)?;

        let teacher_id = match scope {
            Scope::AssignedClassSubjects { teacher_id, .. } => Some(*teacher_id),
            _ => input.teacher_id.or(existing.teacher_id),
        };

        Ok(MarksUpdate {
            marks_obtained,
            max_marks,
            grade: classify(marks_obtained, max_marks)?,
            teacher_id,
            remarks: if input.remarks.is_some() { trimmed(&input.remarks) } else { existing.remarks.clone() },
            exam_date: input.exam_date.or(existing.exam_date),
        })
    };

    let record = store
        .update_locked(id, &patch)
        .await?
        .ok_or_else(|| ResultsError::not_found(format!("result {} does not exist", id)))?;
    tracing::info!(
        "Updated result {} to {}/{} ({})",
        id,
        record.marks_obtained,
        record.max_marks,
        record.grade
    );
    Ok(record)
}

/// Principal-only removal of a single row
pub async fn delete_result(store: &dyn ResultStore, scope: &Scope, id: Uuid) -> Result<(), ResultsError> {
    if !scope.is_unrestricted() {
        tracing::warn!("Rejected delete of result {} from {} scope", id, scope.label());
        return Err(ResultsError::forbidden("only principals can delete results"));
    }
    if !store.delete(id).await? {
        return Err(ResultsError::not_found(format!("result {} does not exist", id)));
    }
    tracing::info!("Deleted result {}", id);
    Ok(())
}
