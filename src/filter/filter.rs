use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{OrderBy, Pagination, Predicate, SqlResult};

/// Columns returned for a result row, joined with student, user, subject and class data
pub const RESULT_COLUMNS: &str = "r.id, r.student_id, r.subject_id, r.exam_type, r.academic_year, \
r.marks_obtained, r.max_marks, r.grade, r.teacher_id, r.remarks, r.exam_date, r.created_at, r.updated_at, \
u.first_name, u.last_name, st.roll_number, st.class_id, \
(c.grade_level || c.section) AS class_name, sub.code AS subject_code, sub.name AS subject_name";

pub const RESULT_FROM: &str = "FROM results r \
JOIN students st ON st.id = r.student_id \
JOIN users u ON u.id = st.user_id \
JOIN subjects sub ON sub.id = r.subject_id \
LEFT JOIN classes c ON c.id = st.class_id";

/// Filtered, sorted, paginated view over the results table
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
    order: OrderBy,
    pagination: Option<Pagination>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order(&mut self, order: OrderBy) -> &mut Self {
        self.order = order;
        self
    }

    pub fn paginate(&mut self, pagination: Pagination) -> Result<&mut Self, FilterError> {
        if pagination.page < 1 {
            return Err(FilterError::InvalidPagination("page must be at least 1".to_string()));
        }
        if pagination.limit < 1 {
            return Err(FilterError::InvalidPagination("limit must be at least 1".to_string()));
        }
        self.pagination = Some(pagination);
        Ok(self)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order_by(&self) -> OrderBy {
        self.order
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    /// Page query: filter, then sort, then LIMIT/OFFSET
    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let order_clause = FilterOrder::generate(&self.order);
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT {}", RESULT_COLUMNS),
            RESULT_FROM.to_string(),
            format!("WHERE {}", where_result.query),
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = FilterWhere::generate(&self.predicates, 0)?;
        Ok(SqlResult { query: where_clause, params })
    }

    /// Total row count for the same predicates, ignoring order and paging
    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let query = format!("SELECT COUNT(*) AS count {} WHERE {}", RESULT_FROM, where_result.query);
        Ok(SqlResult { query, params: where_result.params })
    }

    fn build_limit_clause(&self) -> String {
        match self.pagination {
            Some(p) => format!("LIMIT {} OFFSET {}", p.limit, p.offset()),
            None => String::new(),
        }
    }
}
