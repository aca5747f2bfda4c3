use async_trait::async_trait;
use sqlx::{postgres::PgArguments, FromRow, PgConnection, PgPool, Postgres, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::filter::{Column, Filter, Predicate, SqlResult, SqlValue};
use crate::results::model::{Page, ResultRecord, ResultWrite, ScoreRow, TeachingAssignment, WriteSummary};
use crate::results::store::{Directory, MarksPatch, ResultStore, Snapshot};
use crate::results::ResultsError;

const SCORE_ROWS_SQL: &str = "SELECT r.student_id, u.first_name, u.last_name, st.roll_number, st.class_id, \
(c.grade_level || c.section) AS class_name, r.subject_id, sub.name AS subject_name, \
r.exam_type, r.marks_obtained, r.max_marks \
FROM results r \
JOIN students st ON st.id = r.student_id \
JOIN users u ON u.id = st.user_id \
JOIN subjects sub ON sub.id = r.subject_id \
LEFT JOIN classes c ON c.id = st.class_id \
WHERE r.academic_year = $1";

// xmax = 0 only for rows created by this statement
const UPSERT_SQL: &str = "INSERT INTO results \
(student_id, subject_id, exam_type, academic_year, marks_obtained, max_marks, grade, teacher_id, remarks, exam_date) \
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
ON CONFLICT (student_id, subject_id, exam_type, academic_year) DO UPDATE SET \
marks_obtained = EXCLUDED.marks_obtained, \
max_marks = EXCLUDED.max_marks, \
grade = EXCLUDED.grade, \
teacher_id = COALESCE(EXCLUDED.teacher_id, results.teacher_id), \
remarks = COALESCE(EXCLUDED.remarks, results.remarks), \
exam_date = COALESCE(EXCLUDED.exam_date, results.exam_date), \
updated_at = NOW() \
RETURNING (xmax = 0) AS inserted";

const UPDATE_SQL: &str = "UPDATE results SET marks_obtained = $2, max_marks = $3, grade = $4, \
teacher_id = $5, remarks = $6, exam_date = $7, updated_at = NOW() WHERE id = $1";

/// `ResultStore` and `Directory` over Postgres
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    slow_query_threshold: Option<Duration>,
}

impl PgStore {
    pub fn new(pool: PgPool, config: &DatabaseConfig) -> Self {
        let slow_query_threshold = config
            .enable_slow_query_warning
            .then(|| Duration::from_millis(config.slow_query_threshold_ms));
        Self { pool, slow_query_threshold }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn observe(&self, operation: &str, started: Instant) {
        let elapsed = started.elapsed();
        match self.slow_query_threshold {
            Some(threshold) if elapsed > threshold => {
                warn!("Slow query: {} took {}ms", operation, elapsed.as_millis());
            }
            _ => debug!("{} took {}ms", operation, elapsed.as_millis()),
        }
    }
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    v: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match v {
        SqlValue::Uuid(u) => q.bind(*u),
        SqlValue::Text(s) => q.bind(s.as_str()),
    }
}

fn bind_value_as<'q, O>(
    q: sqlx::query::QueryAs<'q, Postgres, O, PgArguments>,
    v: &'q SqlValue,
) -> sqlx::query::QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
{
    match v {
        SqlValue::Uuid(u) => q.bind(*u),
        SqlValue::Text(s) => q.bind(s.as_str()),
    }
}

fn record_by_id_sql(id: Uuid) -> Result<SqlResult, ResultsError> {
    let mut filter = Filter::new();
    filter.push(Predicate::Eq(Column::ResultId, SqlValue::Uuid(id)));
    Ok(filter.to_sql()?)
}

async fn fetch_record<'q>(conn: &mut PgConnection, sql: &'q str, params: &'q [SqlValue]) -> Result<Option<ResultRecord>, ResultsError> {
    let mut q = sqlx::query_as::<_, ResultRecord>(sql);
    for p in params {
        q = bind_value_as(q, p);
    }
    Ok(q.fetch_optional(conn).await?)
}

async fn read_page(conn: &mut PgConnection, filter: &Filter) -> Result<Page<ResultRecord>, ResultsError> {
    let count_sql = filter.to_count_sql()?;
    let page_sql = filter.to_sql()?;

    let mut count_q = sqlx::query(&count_sql.query);
    for p in count_sql.params.iter() {
        count_q = bind_value(count_q, p);
    }
    let total: i64 = count_q.fetch_one(&mut *conn).await?.try_get("count")?;

    let mut page_q = sqlx::query_as::<_, ResultRecord>(&page_sql.query);
    for p in page_sql.params.iter() {
        page_q = bind_value_as(page_q, p);
    }
    let items = page_q.fetch_all(&mut *conn).await?;

    Ok(match filter.pagination() {
        Some(p) => Page {
            items,
            page: p.page,
            limit: p.limit,
            total,
            total_pages: p.total_pages(total),
        },
        None => Page {
            items,
            page: 1,
            limit: total,
            total,
            total_pages: if total > 0 { 1 } else { 0 },
        },
    })
}

#[async_trait]
impl Directory for PgStore {
    async fn student_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ResultsError> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM students WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn teacher_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ResultsError> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM teachers WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn teaching_assignments(&self, teacher_id: Uuid) -> Result<Vec<TeachingAssignment>, ResultsError> {
        let rows = sqlx::query_as::<_, TeachingAssignment>(
            "SELECT teacher_id, class_id, subject_id FROM teacher_assignments WHERE teacher_id = $1",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn student_classes(&self, student_ids: &[Uuid]) -> Result<HashMap<Uuid, Option<Uuid>>, ResultsError> {
        let rows = sqlx::query("SELECT id, class_id FROM students WHERE id = ANY($1)")
            .bind(student_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut classes = HashMap::with_capacity(rows.len());
        for row in rows {
            classes.insert(row.try_get::<Uuid, _>("id")?, row.try_get::<Option<Uuid>, _>("class_id")?);
        }
        Ok(classes)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn find_page(&self, filter: &Filter, score_year: Option<&str>) -> Result<Snapshot, ResultsError> {
        let started = Instant::now();

        // count, page and score rows must see the same snapshot
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let page = read_page(&mut tx, filter).await?;
        let score_rows = match score_year {
            Some(year) => Some(
                sqlx::query_as::<_, ScoreRow>(SCORE_ROWS_SQL)
                    .bind(year)
                    .fetch_all(&mut *tx)
                    .await?,
            ),
            None => None,
        };
        tx.commit().await?;

        self.observe("find_page", started);
        Ok(Snapshot { page, score_rows })
    }

    async fn score_rows(&self, academic_year: &str) -> Result<Vec<ScoreRow>, ResultsError> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, ScoreRow>(SCORE_ROWS_SQL)
            .bind(academic_year)
            .fetch_all(&self.pool)
            .await?;
        self.observe("score_rows", started);
        Ok(rows)
    }

    async fn upsert_batch(&self, writes: &[ResultWrite]) -> Result<WriteSummary, ResultsError> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        let mut summary = WriteSummary::default();

        for write in writes {
            // an early return drops `tx`, which rolls the batch back
            let inserted = sqlx::query_scalar::<_, bool>(UPSERT_SQL)
                .bind(write.student_id)
                .bind(write.subject_id)
                .bind(&write.exam_type)
                .bind(&write.academic_year)
                .bind(write.marks_obtained)
                .bind(write.max_marks)
                .bind(write.grade.as_str())
                .bind(write.teacher_id)
                .bind(write.remarks.as_deref())
                .bind(write.exam_date)
                .fetch_one(&mut *tx)
                .await?;
            if inserted {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }

        tx.commit().await?;
        self.observe("upsert_batch", started);
        Ok(summary)
    }

    async fn update_locked(&self, id: Uuid, patch: &MarksPatch<'_>) -> Result<Option<ResultRecord>, ResultsError> {
        let started = Instant::now();
        let sql = record_by_id_sql(id)?;
        // the student row is share-locked so a class change waits for this update
        let locking = format!("{} FOR UPDATE OF r FOR SHARE OF st", sql.query);

        let mut tx = self.pool.begin().await?;
        let Some(existing) = fetch_record(&mut tx, &locking, &sql.params).await? else {
            return Ok(None);
        };

        // an error from the patch drops `tx`, which rolls back
        let update = patch(&existing)?;
        sqlx::query(UPDATE_SQL)
            .bind(id)
            .bind(update.marks_obtained)
            .bind(update.max_marks)
            .bind(update.grade.as_str())
            .bind(update.teacher_id)
            .bind(update.remarks.as_deref())
            .bind(update.exam_date)
            .execute(&mut *tx)
            .await?;

        let record = fetch_record(&mut tx, &sql.query, &sql.params).await?;
        tx.commit().await?;
        self.observe("update_locked", started);
        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ResultsError> {
        let result = sqlx::query("DELETE FROM results WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), ResultsError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
