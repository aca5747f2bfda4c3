//! Results core: grading, access scoping, listing, ranking and writes.
//!
//! Storage sits behind [`ResultStore`] and [`Directory`]; everything above
//! those traits is independent of Postgres.

pub mod error;
pub mod grade;
pub mod model;
pub mod query;
pub mod ranking;
pub mod scope;
pub mod stats;
pub mod store;
pub mod write;

pub use error::ResultsError;
pub use grade::{classify, percentage, Grade, GradeError};
pub use model::{Page, ResultInput, ResultRecord, ScoreRow, TeachingAssignment, WriteSummary};
pub use query::{build_filter, query_results, Listing, ResultFilters};
pub use ranking::{competition_ranks, compute_rankings, RankingTable, StudentView};
pub use scope::{resolve_scope, Scope};
pub use stats::{load_rankings, stats_year, summarize, ResultStats};
pub use store::{Directory, MarksPatch, ResultStore, Snapshot};
pub use write::{delete_result, update_result, upsert_result, upsert_results, validate_batch};
