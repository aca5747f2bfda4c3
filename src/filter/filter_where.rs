use super::error::FilterError;
use super::types::{Predicate, SqlValue};

pub struct FilterWhere {
    param_values: Vec<SqlValue>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Render predicates as an ANDed WHERE body with `$n` placeholders
    pub fn generate(predicates: &[Predicate], starting_param_index: usize) -> Result<(String, Vec<SqlValue>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(predicates)
    }

    fn build(&mut self, predicates: &[Predicate]) -> Result<(String, Vec<SqlValue>), FilterError> {
        let mut sql_conditions = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            sql_conditions.push(self.build_sql_condition(predicate)?);
        }
        let where_clause = if sql_conditions.is_empty() { "1=1".to_string() } else { sql_conditions.join(" AND ") };
        Ok((where_clause, std::mem::take(&mut self.param_values)))
    }

    fn build_sql_condition(&mut self, predicate: &Predicate) -> Result<String, FilterError> {
        match predicate {
            Predicate::Eq(column, value) => Ok(format!("{} = {}", column.to_sql(), self.param(value.clone()))),
            Predicate::ClassSubjectIn(pairs) => {
                if pairs.is_empty() {
                    return Ok("1=0".to_string());
                }
                let tuples: Vec<String> = pairs
                    .iter()
                    .map(|(class_id, subject_id)| {
                        let c = self.param(SqlValue::Uuid(*class_id));
                        let s = self.param(SqlValue::Uuid(*subject_id));
                        format!("({}, {})", c, s)
                    })
                    .collect();
                Ok(format!("(st.class_id, r.subject_id) IN ({})", tuples.join(", ")))
            }
            Predicate::NameSearch(term) => {
                let term = term.trim();
                if term.is_empty() {
                    return Err(FilterError::InvalidPredicate("search term cannot be empty".to_string()));
                }
                // one placeholder, referenced four times
                let p = self.param(SqlValue::Text(like_pattern(term)));
                Ok(format!(
                    "(u.first_name ILIKE {p} OR u.last_name ILIKE {p} OR (u.first_name || ' ' || u.last_name) ILIKE {p} OR st.roll_number ILIKE {p})"
                ))
            }
        }
    }

    fn param(&mut self, value: SqlValue) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// `%term%` with LIKE metacharacters escaped (backslash is the default ESCAPE in Postgres)
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
