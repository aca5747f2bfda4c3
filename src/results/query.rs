use serde::Deserialize;
use uuid::Uuid;

use super::error::ResultsError;
use super::model::{optional_i64, optional_text, optional_uuid, Page, ResultRecord};
use super::scope::Scope;
use super::stats::{stats_year, summarize, ResultStats};
use super::store::ResultStore;
use crate::config::ResultsConfig;
use crate::filter::filter_order::FilterOrder;
use crate::filter::{Column, Filter, Pagination, Predicate, SqlValue};

/// Caller-supplied listing filters (query string of `GET /api/results`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultFilters {
    #[serde(default, deserialize_with = "optional_uuid")]
    pub class_id: Option<Uuid>,
    #[serde(default, deserialize_with = "optional_uuid")]
    pub subject_id: Option<Uuid>,
    #[serde(default, deserialize_with = "optional_uuid")]
    pub student_id: Option<Uuid>,
    #[serde(default, deserialize_with = "optional_text")]
    pub exam_type: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub limit: Option<i64>,
}

/// Compose the scoped filter for a listing request.
///
/// Scope predicates come first, then the caller's filters. Students always get
/// their own id regardless of the `student_id` they sent. Teachers asking for a
/// class or subject outside their assignments get `Authorization` rather than
/// an empty page.
pub fn build_filter(scope: &Scope, filters: &ResultFilters, config: &ResultsConfig) -> Result<Filter, ResultsError> {
    let mut filter = Filter::new();

    match scope {
        Scope::Unrestricted => {
            if let Some(class_id) = filters.class_id {
                filter.push(Predicate::Eq(Column::ClassId, SqlValue::Uuid(class_id)));
            }
            if let Some(subject_id) = filters.subject_id {
                filter.push(Predicate::Eq(Column::SubjectId, SqlValue::Uuid(subject_id)));
            }
            if let Some(student_id) = filters.student_id {
                filter.push(Predicate::Eq(Column::StudentId, SqlValue::Uuid(student_id)));
            }
        }
        Scope::OwnRecordsOnly { student_id } => {
            if filters.student_id.is_some_and(|requested| requested != *student_id) {
                tracing::debug!("Overriding student filter with caller's own id {}", student_id);
            }
            filter.push(Predicate::Eq(Column::StudentId, SqlValue::Uuid(*student_id)));
            if let Some(class_id) = filters.class_id {
                filter.push(Predicate::Eq(Column::ClassId, SqlValue::Uuid(class_id)));
            }
            if let Some(subject_id) = filters.subject_id {
                filter.push(Predicate::Eq(Column::SubjectId, SqlValue::Uuid(subject_id)));
            }
        }
        Scope::AssignedClassSubjects { teacher_id, pairs } => {
            if let Some(class_id) = filters.class_id {
                if !pairs.iter().any(|(c, _)| *c == class_id) {
                    tracing::warn!("Teacher {} requested unassigned class {}", teacher_id, class_id);
                    return Err(ResultsError::forbidden(format!("not assigned to teach in class {}", class_id)));
                }
            }
            if let Some(subject_id) = filters.subject_id {
                if !pairs.iter().any(|(_, s)| *s == subject_id) {
                    tracing::warn!("Teacher {} requested unassigned subject {}", teacher_id, subject_id);
                    return Err(ResultsError::forbidden(format!("not assigned to teach subject {}", subject_id)));
                }
            }

            let narrowed: Vec<(Uuid, Uuid)> = pairs
                .iter()
                .copied()
                .filter(|(c, s)| {
                    filters.class_id.map_or(true, |class_id| class_id == *c)
                        && filters.subject_id.map_or(true, |subject_id| subject_id == *s)
                })
                .collect();

            if let (Some(class_id), Some(subject_id)) = (filters.class_id, filters.subject_id) {
                if narrowed.is_empty() {
                    tracing::warn!("Teacher {} requested unassigned pair ({}, {})", teacher_id, class_id, subject_id);
                    return Err(ResultsError::forbidden(format!(
                        "not assigned to teach subject {} in class {}",
                        subject_id, class_id
                    )));
                }
            }

            filter.push(Predicate::ClassSubjectIn(narrowed));
            if let Some(student_id) = filters.student_id {
                filter.push(Predicate::Eq(Column::StudentId, SqlValue::Uuid(student_id)));
            }
        }
    }

    if let Some(exam_type) = &filters.exam_type {
        filter.push(Predicate::Eq(Column::ExamType, SqlValue::Text(exam_type.clone())));
    }
    if let Some(year) = &filters.academic_year {
        filter.push(Predicate::Eq(Column::AcademicYear, SqlValue::Text(year.clone())));
    }
    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filter.push(Predicate::NameSearch(search.to_string()));
    }

    filter.order(FilterOrder::parse(filters.sort_by.as_deref(), filters.sort_order.as_deref()));
    filter.paginate(Pagination::clamped(
        filters.page,
        filters.limit,
        config.default_page_size,
        config.max_page_size,
    ))?;

    if config.debug_logging {
        tracing::debug!("Built {} result filter with {} predicates", scope.label(), filter.predicates().len());
    }
    Ok(filter)
}

/// A listing page and the role stats computed from the same snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub page: Page<ResultRecord>,
    pub stats: Option<ResultStats>,
}

/// Scoped, read-only listing of result rows plus role stats
pub async fn query_results(
    store: &dyn ResultStore,
    scope: &Scope,
    filters: &ResultFilters,
    config: &ResultsConfig,
) -> Result<Listing, ResultsError> {
    let filter = build_filter(scope, filters, config)?;
    let year = stats_year(scope, filters.academic_year.as_deref(), config);

    let snapshot = store.find_page(&filter, year).await?;
    let stats = match (year, snapshot.score_rows) {
        (Some(year), Some(rows)) => summarize(scope, year, &rows, config),
        _ => None,
    };
    Ok(Listing { page: snapshot.page, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::filter::OrderBy;
    use crate::testing::MemoryStore;
    use std::collections::BTreeSet;

    fn config() -> ResultsConfig {
        AppConfig::development().results
    }

    fn teacher_scope(pairs: &[(Uuid, Uuid)]) -> Scope {
        Scope::AssignedClassSubjects {
            teacher_id: Uuid::new_v4(),
            pairs: pairs.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn principal_filters_are_anded_in_order() {
        let class_id = Uuid::new_v4();
        let filters = ResultFilters {
            class_id: Some(class_id),
            exam_type: Some("Final Exam".into()),
            search: Some("  rao ".into()),
            ..Default::default()
        };
        let filter = build_filter(&Scope::Unrestricted, &filters, &config()).unwrap();
        assert_eq!(
            filter.predicates(),
            &[
                Predicate::Eq(Column::ClassId, SqlValue::Uuid(class_id)),
                Predicate::Eq(Column::ExamType, SqlValue::Text("Final Exam".into())),
                Predicate::NameSearch("rao".into()),
            ]
        );
    }

    #[test]
    fn student_filter_is_overridden_for_students() {
        let own = Uuid::new_v4();
        let filters = ResultFilters { student_id: Some(Uuid::new_v4()), ..Default::default() };
        let filter = build_filter(&Scope::OwnRecordsOnly { student_id: own }, &filters, &config()).unwrap();
        assert_eq!(filter.predicates(), &[Predicate::Eq(Column::StudentId, SqlValue::Uuid(own))]);
    }

    #[test]
    fn teacher_pair_outside_assignments_is_forbidden() {
        let class = Uuid::new_v4();
        let math = Uuid::new_v4();
        let physics = Uuid::new_v4();
        let other_class = Uuid::new_v4();
        let scope = teacher_scope(&[(class, math), (other_class, physics)]);

        // class and subject are each assigned somewhere, but not together
        let filters = ResultFilters { class_id: Some(class), subject_id: Some(physics), ..Default::default() };
        assert!(matches!(build_filter(&scope, &filters, &config()), Err(ResultsError::Authorization(_))));

        let filters = ResultFilters { subject_id: Some(Uuid::new_v4()), ..Default::default() };
        assert!(matches!(build_filter(&scope, &filters, &config()), Err(ResultsError::Authorization(_))));

        let filters = ResultFilters { class_id: Some(Uuid::new_v4()), ..Default::default() };
        assert!(matches!(build_filter(&scope, &filters, &config()), Err(ResultsError::Authorization(_))));
    }

    #[test]
    fn teacher_filters_narrow_the_pair_set() {
        let class = Uuid::new_v4();
        let math = Uuid::new_v4();
        let physics = Uuid::new_v4();
        let scope = teacher_scope(&[(class, math), (class, physics)]);

        let filters = ResultFilters { subject_id: Some(math), ..Default::default() };
        let filter = build_filter(&scope, &filters, &config()).unwrap();
        assert_eq!(filter.predicates(), &[Predicate::ClassSubjectIn(vec![(class, math)])]);
    }

    #[test]
    fn unknown_sort_and_bad_paging_fall_back() {
        let filters = ResultFilters {
            sort_by: Some("r.id; DROP TABLE results".into()),
            page: Some(-4),
            limit: Some(0),
            ..Default::default()
        };
        let filter = build_filter(&Scope::Unrestricted, &filters, &config()).unwrap();
        assert_eq!(filter.order_by(), OrderBy::default());
        assert_eq!(filter.pagination(), Some(Pagination { page: 1, limit: 1 }));
        assert!(!filter.to_sql().unwrap().query.contains("DROP"));
    }

    #[tokio::test]
    async fn teacher_reads_empty_page_for_assigned_pair_without_rows() {
        let store = MemoryStore::new();
        let class = store.add_class("10A");
        let math = store.add_subject("MATH", "Mathematics");
        let physics = store.add_subject("PHY", "Physics");
        let student = store.add_student("Asha", "Rao", Some(class), "01");
        store.add_result(student.id, physics, "Final Exam", "2024-2025", 70, 100);
        let scope = teacher_scope(&[(class, math)]);

        let filters = ResultFilters { class_id: Some(class), subject_id: Some(math), ..Default::default() };
        let page = query_results(&store, &scope, &filters, &config()).await.unwrap().page;
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);

        let filters = ResultFilters { class_id: Some(class), subject_id: Some(physics), ..Default::default() };
        let err = query_results(&store, &scope, &filters, &config()).await.unwrap_err();
        assert!(matches!(err, ResultsError::Authorization(_)));
    }

    #[tokio::test]
    async fn student_never_sees_other_students() {
        let store = MemoryStore::new();
        let class = store.add_class("9A");
        let math = store.add_subject("MATH", "Mathematics");
        let me = store.add_student("Asha", "Rao", Some(class), "01");
        let other = store.add_student("Ben", "Okafor", Some(class), "02");
        store.add_result(me.id, math, "Final Exam", "2024-2025", 81, 100);
        store.add_result(other.id, math, "Final Exam", "2024-2025", 64, 100);

        let filters = ResultFilters { student_id: Some(other.id), ..Default::default() };
        let page = query_results(&store, &Scope::OwnRecordsOnly { student_id: me.id }, &filters, &config())
            .await
            .unwrap()
            .page;
        assert_eq!(page.total, 1);
        assert!(page.items.iter().all(|r| r.student_id == me.id));
    }

    #[tokio::test]
    async fn search_matches_full_name_case_insensitively() {
        let store = MemoryStore::new();
        let class = store.add_class("9A");
        let math = store.add_subject("MATH", "Mathematics");
        let asha = store.add_student("Asha", "Rao", Some(class), "01");
        let ben = store.add_student("Ben", "Okafor", Some(class), "02");
        store.add_result(asha.id, math, "Final Exam", "2024-2025", 81, 100);
        store.add_result(ben.id, math, "Final Exam", "2024-2025", 64, 100);

        let filters = ResultFilters { search: Some("asha r".into()), ..Default::default() };
        let page = query_results(&store, &Scope::Unrestricted, &filters, &config()).await.unwrap().page;
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].student_id, asha.id);
    }

    #[tokio::test]
    async fn pages_after_sorting() {
        let store = MemoryStore::new();
        let class = store.add_class("9A");
        let math = store.add_subject("MATH", "Mathematics");
        for (i, marks) in [55, 91, 73, 40, 88].into_iter().enumerate() {
            let s = store.add_student(&format!("S{}", i), "Test", Some(class), &format!("{:02}", i));
            store.add_result(s.id, math, "Final Exam", "2024-2025", marks, 100);
        }

        let filters = ResultFilters {
            sort_by: Some("marks".into()),
            sort_order: Some("desc".into()),
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        };
        let page = query_results(&store, &Scope::Unrestricted, &filters, &config()).await.unwrap().page;
        let marks: Vec<i32> = page.items.iter().map(|r| r.marks_obtained).collect();
        assert_eq!(marks, vec![73, 55]);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
    }

    #[tokio::test]
    async fn listing_and_stats_come_from_one_read() {
        let store = MemoryStore::new();
        let class = store.add_class("9A");
        let math = store.add_subject("MATH", "Mathematics");
        let year = config().default_academic_year;
        let asha = store.add_student("Asha", "Rao", Some(class), "01");
        let ben = store.add_student("Ben", "Okafor", Some(class), "02");
        store.add_result(asha.id, math, "Final Exam", &year, 81, 100);
        store.add_result(ben.id, math, "Final Exam", &year, 64, 100);

        let listing = query_results(&store, &Scope::Unrestricted, &ResultFilters::default(), &config())
            .await
            .unwrap();
        assert_eq!(listing.page.total, 2);
        match listing.stats {
            Some(ResultStats::School(summary)) => assert_eq!(summary.student_count, 2),
            other => panic!("unexpected {:?}", other),
        }

        let own = Scope::OwnRecordsOnly { student_id: ben.id };
        let listing = query_results(&store, &own, &ResultFilters::default(), &config()).await.unwrap();
        match listing.stats {
            Some(ResultStats::Student(summary)) => {
                assert_eq!(summary.total_obtained, 64);
                assert_eq!(summary.school_rank, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }

        let listing = query_results(&store, &teacher_scope(&[(class, math)]), &ResultFilters::default(), &config())
            .await
            .unwrap();
        assert_eq!(listing.page.total, 2);
        assert_eq!(listing.stats, None);

        // no year requested, no score rows read
        let snapshot = store.find_page(&Filter::new(), None).await.unwrap();
        assert_eq!(snapshot.score_rows, None);
        assert_eq!(snapshot.page.total, 2);
    }
}
