use super::types::{OrderBy, SortDirection, SortKey};

pub struct FilterOrder;

impl FilterOrder {
    /// Resolve caller sort input against the allow-list.
    /// Unknown keys fall back to the default order (exam date, newest first).
    pub fn parse(sort_by: Option<&str>, sort_order: Option<&str>) -> OrderBy {
        let Some(key) = sort_by.and_then(SortKey::parse) else {
            if let Some(raw) = sort_by {
                tracing::debug!("Ignoring unknown sort key {:?}, using default order", raw);
            }
            return OrderBy::default();
        };
        let direction = match sort_order.map(|s| s.trim().to_ascii_lowercase()) {
            Some(ref s) if s == "asc" => SortDirection::Asc,
            _ => SortDirection::Desc,
        };
        OrderBy { key, direction }
    }

    pub fn generate(order: &OrderBy) -> String {
        let dir = order.direction.to_sql();
        let parts: Vec<String> = Self::expressions(order.key)
            .iter()
            .map(|expr| format!("{} {}", expr, dir))
            .collect();
        // r.id keeps pagination stable when the sort key ties
        format!("ORDER BY {}, r.id ASC", parts.join(", "))
    }

    fn expressions(key: SortKey) -> &'static [&'static str] {
        match key {
            SortKey::StudentName => &["u.first_name", "u.last_name"],
            SortKey::SubjectName => &["sub.name"],
            SortKey::Marks => &["r.marks_obtained"],
            SortKey::Grade => &[
                "CASE r.grade WHEN 'A+' THEN 8 WHEN 'A' THEN 7 WHEN 'B+' THEN 6 WHEN 'B' THEN 5 \
                 WHEN 'C+' THEN 4 WHEN 'C' THEN 3 WHEN 'D' THEN 2 ELSE 1 END",
            ],
            SortKey::ExamDate => &["r.exam_date"],
            SortKey::ExamType => &["r.exam_type"],
        }
    }
}
