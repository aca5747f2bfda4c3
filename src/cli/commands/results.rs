use clap::Args;
use uuid::Uuid;

use crate::cli::client::ApiClient;
use crate::cli::utils::{self, cell};
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct ResultsArgs {
    #[arg(long)]
    pub class_id: Option<Uuid>,
    #[arg(long)]
    pub subject_id: Option<Uuid>,
    #[arg(long)]
    pub student_id: Option<Uuid>,
    #[arg(long)]
    pub exam_type: Option<String>,
    #[arg(long)]
    pub academic_year: Option<String>,
    #[arg(long, help = "Match student name or roll number")]
    pub search: Option<String>,
    #[arg(long, help = "student_name, subject_name, marks, grade, exam_date or exam_type")]
    pub sort_by: Option<String>,
    #[arg(long, help = "asc or desc")]
    pub sort_order: Option<String>,
    #[arg(long)]
    pub page: Option<i64>,
    #[arg(long)]
    pub limit: Option<i64>,
}

impl ResultsArgs {
    fn query(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("class_id", self.class_id.map(|v| v.to_string())),
            ("subject_id", self.subject_id.map(|v| v.to_string())),
            ("student_id", self.student_id.map(|v| v.to_string())),
            ("exam_type", self.exam_type.clone()),
            ("academic_year", self.academic_year.clone()),
            ("search", self.search.clone()),
            ("sort_by", self.sort_by.clone()),
            ("sort_order", self.sort_order.clone()),
            ("page", self.page.map(|v| v.to_string())),
            ("limit", self.limit.map(|v| v.to_string())),
        ]
    }
}

pub async fn handle(client: &ApiClient, args: ResultsArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let data = client.get("/api/results", &args.query()).await?;
    let results = data["results"].as_array().cloned().unwrap_or_default();

    if results.is_empty() {
        return utils::output_empty_collection(&output_format, "results", "No results found");
    }

    match output_format {
        OutputFormat::Json => utils::output_json(&data),
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = results
                .iter()
                .map(|r| {
                    vec![
                        format!("{} {}", cell(&r["first_name"]), cell(&r["last_name"])),
                        cell(&r["class_name"]),
                        cell(&r["subject_name"]),
                        cell(&r["exam_type"]),
                        cell(&r["academic_year"]),
                        format!("{}/{}", cell(&r["marks_obtained"]), cell(&r["max_marks"])),
                        cell(&r["grade"]),
                    ]
                })
                .collect();
            println!(
                "{}",
                utils::format_table(&["Student", "Class", "Subject", "Exam", "Year", "Marks", "Grade"], &rows)
            );

            let pagination = &data["pagination"];
            println!(
                "\nPage {} of {} ({} results)",
                cell(&pagination["page"]),
                cell(&pagination["totalPages"]),
                cell(&pagination["total"])
            );
            Ok(())
        }
    }
}
