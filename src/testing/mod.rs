//! In-memory `ResultStore` and `Directory` for unit and router tests.
//!
//! Honors the same predicate semantics, natural-key upsert and
//! all-or-nothing batch behavior as the Postgres store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::filter::{Column, Filter, Predicate, SortDirection, SortKey, SqlValue};
use crate::results::grade::{classify, Grade};
use crate::results::model::{Page, ResultRecord, ResultWrite, ScoreRow, TeachingAssignment, WriteSummary};
use crate::results::store::{Directory, MarksPatch, ResultStore, Snapshot};
use crate::results::ResultsError;

/// Profile id plus the login user it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Person {
    pub id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
struct StudentRow {
    person: Person,
    first_name: String,
    last_name: String,
    roll_number: String,
    class_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct StoredResult {
    id: Uuid,
    student_id: Uuid,
    subject_id: Uuid,
    exam_type: String,
    academic_year: String,
    marks_obtained: i32,
    max_marks: i32,
    grade: String,
    teacher_id: Option<Uuid>,
    remarks: Option<String>,
    exam_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    classes: HashMap<Uuid, String>,
    subjects: HashMap<Uuid, (String, String)>,
    students: Vec<StudentRow>,
    teachers: Vec<Person>,
    assignments: Vec<TeachingAssignment>,
    results: Vec<StoredResult>,
    fail_at: Option<usize>,
}

impl Inner {
    fn student(&self, id: Uuid) -> Option<&StudentRow> {
        self.students.iter().find(|s| s.person.id == id)
    }

    fn record(&self, stored: &StoredResult) -> Option<ResultRecord> {
        let student = self.student(stored.student_id)?;
        let (subject_code, subject_name) = self.subjects.get(&stored.subject_id)?.clone();
        Some(ResultRecord {
            id: stored.id,
            student_id: stored.student_id,
            subject_id: stored.subject_id,
            exam_type: stored.exam_type.clone(),
            academic_year: stored.academic_year.clone(),
            marks_obtained: stored.marks_obtained,
            max_marks: stored.max_marks,
            grade: stored.grade.clone(),
            teacher_id: stored.teacher_id,
            remarks: stored.remarks.clone(),
            exam_date: stored.exam_date,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
            roll_number: Some(student.roll_number.clone()),
            class_id: student.class_id,
            class_name: student.class_id.and_then(|c| self.classes.get(&c).cloned()),
            subject_code,
            subject_name,
        })
    }

    fn records(&self) -> Vec<ResultRecord> {
        self.results.iter().filter_map(|r| self.record(r)).collect()
    }

    fn page(&self, filter: &Filter) -> Page<ResultRecord> {
        let mut rows: Vec<ResultRecord> = self
            .records()
            .into_iter()
            .filter(|r| filter.predicates().iter().all(|p| matches(r, p)))
            .collect();

        let order = filter.order_by();
        rows.sort_by(|a, b| {
            let primary = compare(a, b, order.key);
            let primary = match order.direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = rows.len() as i64;
        match filter.pagination() {
            Some(p) => Page {
                items: rows
                    .into_iter()
                    .skip(p.offset() as usize)
                    .take(p.limit as usize)
                    .collect(),
                page: p.page,
                limit: p.limit,
                total,
                total_pages: p.total_pages(total),
            },
            None => Page {
                items: rows,
                page: 1,
                limit: total,
                total,
                total_pages: if total > 0 { 1 } else { 0 },
            },
        }
    }

    fn score_rows(&self, academic_year: &str) -> Vec<ScoreRow> {
        self.records()
            .into_iter()
            .filter(|r| r.academic_year == academic_year)
            .map(|r| ScoreRow {
                student_id: r.student_id,
                first_name: r.first_name,
                last_name: r.last_name,
                roll_number: r.roll_number,
                class_id: r.class_id,
                class_name: r.class_name,
                subject_id: r.subject_id,
                subject_name: r.subject_name,
                exam_type: r.exam_type,
                marks_obtained: r.marks_obtained,
                max_marks: r.max_marks,
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_class(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().classes.insert(id, name.to_string());
        id
    }

    pub fn add_subject(&self, code: &str, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().subjects.insert(id, (code.to_string(), name.to_string()));
        id
    }

    pub fn add_student(&self, first: &str, last: &str, class_id: Option<Uuid>, roll: &str) -> Person {
        let person = Person { id: Uuid::new_v4(), user_id: Uuid::new_v4() };
        self.lock().students.push(StudentRow {
            person,
            first_name: first.to_string(),
            last_name: last.to_string(),
            roll_number: roll.to_string(),
            class_id,
        });
        person
    }

    pub fn add_teacher(&self) -> Person {
        let person = Person { id: Uuid::new_v4(), user_id: Uuid::new_v4() };
        self.lock().teachers.push(person);
        person
    }

    pub fn assign(&self, teacher_id: Uuid, class_id: Uuid, subject_id: Uuid) {
        self.lock().assignments.push(TeachingAssignment { teacher_id, class_id, subject_id });
    }

    /// Seed a row directly, bypassing validation. Returns the row id.
    pub fn add_result(
        &self,
        student_id: Uuid,
        subject_id: Uuid,
        exam_type: &str,
        academic_year: &str,
        marks_obtained: i32,
        max_marks: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.lock().results.push(StoredResult {
            id,
            student_id,
            subject_id,
            exam_type: exam_type.to_string(),
            academic_year: academic_year.to_string(),
            marks_obtained,
            max_marks,
            grade: classify(marks_obtained, max_marks).unwrap().to_string(),
            teacher_id: None,
            remarks: None,
            exam_date: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Reassign a student to another class (or none)
    pub fn move_student(&self, student_id: Uuid, class_id: Option<Uuid>) {
        if let Some(student) = self.lock().students.iter_mut().find(|s| s.person.id == student_id) {
            student.class_id = class_id;
        }
    }

    /// Make the batch write at this index fail, after earlier writes were staged
    pub fn fail_writes_after(&self, index: usize) {
        self.lock().fail_at = Some(index);
    }

    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }

    pub fn all_results(&self) -> Vec<ResultRecord> {
        self.lock().records()
    }
}

fn matches(record: &ResultRecord, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Eq(column, value) => match (column, value) {
            (Column::ResultId, SqlValue::Uuid(v)) => record.id == *v,
            (Column::StudentId, SqlValue::Uuid(v)) => record.student_id == *v,
            (Column::ClassId, SqlValue::Uuid(v)) => record.class_id == Some(*v),
            (Column::SubjectId, SqlValue::Uuid(v)) => record.subject_id == *v,
            (Column::ExamType, SqlValue::Text(v)) => record.exam_type == *v,
            (Column::AcademicYear, SqlValue::Text(v)) => record.academic_year == *v,
            _ => false,
        },
        Predicate::ClassSubjectIn(pairs) => record
            .class_id
            .is_some_and(|class_id| pairs.contains(&(class_id, record.subject_id))),
        Predicate::NameSearch(term) => {
            let term = term.to_lowercase();
            let full = format!("{} {}", record.first_name, record.last_name);
            [
                record.first_name.as_str(),
                record.last_name.as_str(),
                full.as_str(),
                record.roll_number.as_deref().unwrap_or(""),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
        }
    }
}

fn grade_rank(grade: &str) -> Option<Grade> {
    Grade::from_str(grade).ok()
}

fn compare(a: &ResultRecord, b: &ResultRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::StudentName => (&a.first_name, &a.last_name).cmp(&(&b.first_name, &b.last_name)),
        SortKey::SubjectName => a.subject_name.cmp(&b.subject_name),
        SortKey::Marks => a.marks_obtained.cmp(&b.marks_obtained),
        SortKey::Grade => grade_rank(&a.grade).cmp(&grade_rank(&b.grade)),
        // NULLs sort as the largest value, like Postgres
        SortKey::ExamDate => match (a.exam_date, b.exam_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
        },
        SortKey::ExamType => a.exam_type.cmp(&b.exam_type),
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn student_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ResultsError> {
        Ok(self
            .lock()
            .students
            .iter()
            .find(|s| s.person.user_id == user_id)
            .map(|s| s.person.id))
    }

    async fn teacher_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ResultsError> {
        Ok(self.lock().teachers.iter().find(|t| t.user_id == user_id).map(|t| t.id))
    }

    async fn teaching_assignments(&self, teacher_id: Uuid) -> Result<Vec<TeachingAssignment>, ResultsError> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|a| a.teacher_id == teacher_id)
            .copied()
            .collect())
    }

    async fn student_classes(&self, student_ids: &[Uuid]) -> Result<HashMap<Uuid, Option<Uuid>>, ResultsError> {
        let inner = self.lock();
        Ok(student_ids
            .iter()
            .filter_map(|id| inner.student(*id).map(|s| (*id, s.class_id)))
            .collect())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn find_page(&self, filter: &Filter, score_year: Option<&str>) -> Result<Snapshot, ResultsError> {
        let inner = self.lock();
        Ok(Snapshot {
            page: inner.page(filter),
            score_rows: score_year.map(|year| inner.score_rows(year)),
        })
    }

    async fn score_rows(&self, academic_year: &str) -> Result<Vec<ScoreRow>, ResultsError> {
        Ok(self.lock().score_rows(academic_year))
    }

    async fn upsert_batch(&self, writes: &[ResultWrite]) -> Result<WriteSummary, ResultsError> {
        let mut inner = self.lock();
        // stage on a copy; only a fully applied batch replaces the table
        let mut staged = inner.results.clone();
        let mut summary = WriteSummary::default();
        let now = Utc::now();

        for (index, write) in writes.iter().enumerate() {
            if inner.fail_at == Some(index) {
                return Err(ResultsError::Storage("injected write failure".to_string()));
            }
            if inner.student(write.student_id).is_none() || !inner.subjects.contains_key(&write.subject_id) {
                return Err(ResultsError::not_found("referenced student or subject does not exist"));
            }

            let key = write.key();
            let existing = staged.iter_mut().find(|r| {
                r.student_id == key.student_id
                    && r.subject_id == key.subject_id
                    && r.exam_type == key.exam_type
                    && r.academic_year == key.academic_year
            });
            match existing {
                Some(row) => {
                    row.marks_obtained = write.marks_obtained;
                    row.max_marks = write.max_marks;
                    row.grade = write.grade.to_string();
                    row.teacher_id = write.teacher_id.or(row.teacher_id);
                    row.remarks = write.remarks.clone().or(row.remarks.take());
                    row.exam_date = write.exam_date.or(row.exam_date);
                    row.updated_at = now;
                    summary.updated += 1;
                }
                None => {
                    staged.push(StoredResult {
                        id: Uuid::new_v4(),
                        student_id: write.student_id,
                        subject_id: write.subject_id,
                        exam_type: write.exam_type.clone(),
                        academic_year: write.academic_year.clone(),
                        marks_obtained: write.marks_obtained,
                        max_marks: write.max_marks,
                        grade: write.grade.to_string(),
                        teacher_id: write.teacher_id,
                        remarks: write.remarks.clone(),
                        exam_date: write.exam_date,
                        created_at: now,
                        updated_at: now,
                    });
                    summary.inserted += 1;
                }
            }
        }

        inner.results = staged;
        Ok(summary)
    }

    async fn update_locked(&self, id: Uuid, patch: &MarksPatch<'_>) -> Result<Option<ResultRecord>, ResultsError> {
        let mut inner = self.lock();
        let Some(index) = inner.results.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let Some(existing) = inner.record(&inner.results[index]) else {
            return Ok(None);
        };

        let update = patch(&existing)?;
        let row = &mut inner.results[index];
        row.marks_obtained = update.marks_obtained;
        row.max_marks = update.max_marks;
        row.grade = update.grade.to_string();
        row.teacher_id = update.teacher_id;
        row.remarks = update.remarks;
        row.exam_date = update.exam_date;
        row.updated_at = Utc::now();

        Ok(inner.record(&inner.results[index]))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ResultsError> {
        let mut inner = self.lock();
        let before = inner.results.len();
        inner.results.retain(|r| r.id != id);
        Ok(inner.results.len() < before)
    }

    async fn ping(&self) -> Result<(), ResultsError> {
        Ok(())
    }
}
