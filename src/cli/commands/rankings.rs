use clap::Args;
use serde_json::Value;

use crate::cli::client::ApiClient;
use crate::cli::utils::{self, cell};
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct RankingsArgs {
    #[arg(long, help = "Academic year, e.g. 2024-2025 (server default when omitted)")]
    pub academic_year: Option<String>,

    #[arg(long, help = "Only print the first N students")]
    pub top: Option<usize>,
}

pub async fn handle(client: &ApiClient, args: RankingsArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let data = client
        .get("/api/rankings", &[("academic_year", args.academic_year.clone())])
        .await?;

    match output_format {
        OutputFormat::Json => utils::output_json(&data),
        OutputFormat::Text => {
            print!("{}", render_text(&data, args.top));
            Ok(())
        }
    }
}

fn render_text(data: &Value, top: Option<usize>) -> String {
    let year = cell(&data["academicYear"]);
    let standings = data["grandTotalRankings"].as_array().cloned().unwrap_or_default();
    if standings.is_empty() {
        return format!("No results recorded for {}\n", year);
    }

    let rows: Vec<Vec<String>> = standings
        .iter()
        .take(top.unwrap_or(usize::MAX))
        .map(|s| {
            vec![
                cell(&s["schoolRank"]),
                cell(&s["classRank"]),
                cell(&s["studentName"]),
                cell(&s["className"]),
                format!("{}/{}", cell(&s["grandTotal"]), cell(&s["maxPossible"])),
                format!("{}%", cell(&s["percentage"])),
                cell(&s["grade"]),
            ]
        })
        .collect();

    let mut out = format!("Rankings for {} ({} students)\n\n", year, standings.len());
    out.push_str(&utils::format_table(
        &["Rank", "Class Rank", "Student", "Class", "Total", "Percent", "Grade"],
        &rows,
    ));
    out.push('\n');

    if let Some(mine) = data.get("studentSpecificData").filter(|v| !v.is_null()) {
        out.push_str(&format!(
            "\nYour standing: rank {} of {} (class rank {})\n",
            cell(&mine["standing"]["schoolRank"]),
            cell(&mine["schoolSize"]),
            cell(&mine["standing"]["classRank"]),
        ));
    }
    out
}
